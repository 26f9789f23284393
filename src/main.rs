use anyhow::{Context, Result};
use graphnav::db::{migrate, Db};
use graphnav::graph::SqliteGraph;
use graphnav::mcp::McpServer;
use graphnav::{Config, GraphnavError};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    // stderr only: stdout carries the MCP protocol
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.graphnav.log_level.as_str()),
    )
    .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("verify");

    match command {
        "serve" => run_mcp_server(config).await?,
        "verify" => run_schema_verification(config).await?,
        other => anyhow::bail!("Unknown command: {} (expected serve or verify)", other),
    }

    Ok(())
}

/// `./migrations` when running from a checkout, else the crate's own copy
fn migrations_dir() -> PathBuf {
    let local = PathBuf::from("migrations");
    if local.is_dir() {
        local
    } else {
        migrate::default_migrations_dir()
    }
}

async fn migrate_database(db: &Db) -> Result<()> {
    let dir = migrations_dir();
    db.with_connection(move |conn| migrate::run_migrations(conn, &dir).map(|_| ()))
        .await
        .with_context(|| format!("Failed to migrate {}", db.path().display()))?;
    Ok(())
}

/// Run MCP server (stdio transport)
async fn run_mcp_server(config: Config) -> Result<()> {
    // the file must already exist; only `verify` creates a database
    let graph = SqliteGraph::open(config.db_path())?;
    migrate_database(graph.db()).await?;
    let (nodes, edges) = graph.counts().await?;
    log::info!(
        "Serving {} ({} entities, {} relations)",
        graph.db().path().display(),
        nodes,
        edges
    );

    let server = McpServer::new(graph, config);
    server.run().await?;
    Ok(())
}

/// Check schema, pragmas and integrity of the graph database
async fn run_schema_verification(config: Config) -> Result<()> {
    log::info!("graphnav v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Database path: {}", config.db_path().display());

    let db = Db::new(config.db_path());
    migrate_database(&db).await?;

    db.with_connection(|conn| {
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let missing: Vec<&str> = ["nodes", "edges", "schema_migrations"]
            .into_iter()
            .filter(|t| !tables.iter().any(|have| have.as_str() == *t))
            .collect();
        if !missing.is_empty() {
            return Err(GraphnavError::Config(format!("Missing tables: {}", missing.join(", "))));
        }
        log::debug!("✓ Tables present");

        let applied = migrate::get_applied_migrations(conn)?;
        log::debug!("✓ {} migration(s) applied", applied.len());

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            return Err(GraphnavError::Config(format!("Journal mode is not WAL: {}", journal_mode)));
        }

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(GraphnavError::Config(format!("Database integrity check failed: {}", integrity)));
        }
        log::info!("✓ Database integrity: OK");

        let dangling: i64 = conn.query_row(
            "SELECT COUNT(*) FROM edges e \
             WHERE NOT EXISTS (SELECT 1 FROM nodes n WHERE n.id = e.source_id) \
                OR NOT EXISTS (SELECT 1 FROM nodes n WHERE n.id = e.target_id)",
            [],
            |row| row.get(0),
        )?;
        if dangling > 0 {
            log::warn!("{} edge(s) reference missing nodes and will be ignored", dangling);
        }

        Ok(())
    })
    .await?;

    let (nodes, edges) = SqliteGraph::new(db).counts().await?;
    log::info!("✓ Verification complete: {} entities, {} relations", nodes, edges);
    Ok(())
}
