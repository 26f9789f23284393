use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use graphnav::graph::{GraphAccessor, InMemoryGraph, SqliteGraph};
use graphnav::mcp::tools;
use graphnav::Config;
use serde_json::{json, Map, Value};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "query")]
#[command(about = "Run one graph operation and print the JSON response")]
struct Args {
    /// Read the graph from a JSON snapshot instead of the configured database
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    /// Fail if the response exceeds the configured token budget
    #[arg(long, global = true)]
    enforce_budget: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simple paths between two entities, shortest first
    Paths {
        from: String,
        to: String,
        #[arg(long)]
        max_depth: Option<i64>,
        #[arg(long)]
        max_paths: Option<i64>,
    },
    /// Subgraph around one or more seed entities
    Subgraph {
        #[arg(required = true)]
        entities: Vec<String>,
        #[arg(long)]
        max_hop: Option<i64>,
        #[arg(long)]
        include_paths: bool,
        /// "fail" or "skip"
        #[arg(long)]
        missing_ids: Option<String>,
    },
    /// Outgoing-relation tree from one entity
    Traverse {
        start: String,
        #[arg(long)]
        depth: Option<i64>,
        /// Cut the tree breadth-first to fit the token budget instead of failing
        #[arg(long)]
        truncate: bool,
    },
    /// Every relation touching one entity
    Relations { entity: String },
}

impl Command {
    /// Tool name and MCP-style arguments, so the CLI shares the tool validation
    fn to_tool_call(&self) -> (&'static str, Value) {
        let mut args = Map::new();
        let mut put = |key: &str, value: Option<Value>| {
            if let Some(v) = value {
                args.insert(key.to_string(), v);
            }
        };
        let name = match self {
            Command::Paths { from, to, max_depth, max_paths } => {
                put("from_uuid", Some(json!(from)));
                put("to_uuid", Some(json!(to)));
                put("max_depth", max_depth.map(|v| json!(v)));
                put("max_paths", max_paths.map(|v| json!(v)));
                tools::FIND_PATHS
            }
            Command::Subgraph { entities, max_hop, include_paths, missing_ids } => {
                put("entity_uuids", Some(json!(entities)));
                put("max_hop", max_hop.map(|v| json!(v)));
                put("include_paths", Some(json!(include_paths)));
                put("missing_ids", missing_ids.as_ref().map(|v| json!(v)));
                tools::BUILD_SUBGRAPH
            }
            Command::Traverse { start, depth, truncate } => {
                put("start_node_uuid", Some(json!(start)));
                put("depth", depth.map(|v| json!(v)));
                put("truncate", Some(json!(truncate)));
                tools::TRAVERSE
            }
            Command::Relations { entity } => {
                put("entity_uuid", Some(json!(entity)));
                tools::ENTITY_RELATIONS
            }
        };
        (name, Value::Object(args))
    }
}

async fn run<A: GraphAccessor>(accessor: &A, config: &Config, args: &Args) -> Result<String> {
    let (name, arguments) = args.command.to_tool_call();
    log::debug!("{} {}", name, arguments);
    let coded = |e: graphnav::GraphnavError| anyhow::anyhow!("{}: {}", e.code(), e);
    let value = tools::call_tool(accessor, config, name, &arguments).await.map_err(coded)?;
    let text = tools::render(&value).map_err(coded)?;
    if args.enforce_budget {
        let tokens = config.token_budget().check_text(&text).map_err(coded)?;
        log::info!("Response ~{} tokens", tokens);
    }
    Ok(text)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "warn")).init();

    let args = Args::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) if args.snapshot.is_some() => {
            log::debug!("No usable config ({:#}); using defaults", e);
            Config::default()
        }
        Err(e) => return Err(e),
    };

    let text = match &args.snapshot {
        Some(path) => {
            let graph = InMemoryGraph::load(path)
                .with_context(|| format!("Failed to load snapshot {}", path.display()))?;
            run(&graph, &config, &args).await?
        }
        None => {
            let graph = SqliteGraph::open(config.db_path())?;
            run(&graph, &config, &args).await?
        }
    };

    println!("{}", text);
    Ok(())
}
