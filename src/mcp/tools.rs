use crate::budget::TokenBudget;
use crate::config::Config;
use crate::error::{GraphnavError, Result};
use crate::graph::{
    build_subgraph, entity_relations, find_paths, traverse, Edge, GraphAccessor, MissingIdPolicy, Node, Path,
    Subgraph, SubgraphOptions, TraversalTree,
};
use crate::mcp::types::{ContentItem, Tool, ToolsCallResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

pub const FIND_PATHS: &str = "find_paths_between_entities";
pub const BUILD_SUBGRAPH: &str = "build_subgraph";
pub const TRAVERSE: &str = "traverse_knowledge_graph";
pub const ENTITY_RELATIONS: &str = "get_entity_relations";

/// Get all tool definitions for tools/list
pub fn get_tool_definitions(config: &Config) -> Vec<Tool> {
    let limits = &config.limits;
    vec![
        Tool {
            name: FIND_PATHS.to_string(),
            description: "Find simple paths between two entities over RELATES_TO edges, shortest first".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "from_uuid": {
                        "type": "string",
                        "description": "UUID of the starting entity"
                    },
                    "to_uuid": {
                        "type": "string",
                        "description": "UUID of the target entity"
                    },
                    "max_depth": {
                        "type": "integer",
                        "description": "Maximum path length in edges",
                        "default": limits.default_max_depth,
                        "minimum": 1,
                        "maximum": limits.max_path_depth
                    },
                    "max_paths": {
                        "type": "integer",
                        "description": "Maximum number of paths to return",
                        "default": limits.default_max_paths,
                        "minimum": 1
                    }
                },
                "required": ["from_uuid", "to_uuid"]
            }),
        },
        Tool {
            name: BUILD_SUBGRAPH.to_string(),
            description: "Build the subgraph within max_hop hops of one or more entities, with adjacency list".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "entity_uuids": {
                        "type": "array",
                        "items": {"type": "string"},
                        "minItems": 1,
                        "description": "Seed entity UUIDs"
                    },
                    "max_hop": {
                        "type": "integer",
                        "description": "Radius around the seeds",
                        "default": limits.default_max_hop,
                        "minimum": 0,
                        "maximum": limits.max_hop
                    },
                    "include_paths": {
                        "type": "boolean",
                        "default": false,
                        "description": "Also compute paths between every pair of included entities"
                    },
                    "missing_ids": {
                        "type": "string",
                        "enum": ["fail", "skip"],
                        "description": "Fail on an unknown seed, or skip it and report it in skipped_ids"
                    }
                },
                "required": ["entity_uuids"]
            }),
        },
        Tool {
            name: TRAVERSE.to_string(),
            description: "Traverse outgoing relations from an entity into a nested tree; cycles are marked, not followed".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "start_node_uuid": {
                        "type": "string",
                        "description": "UUID of the root entity"
                    },
                    "depth": {
                        "type": "integer",
                        "description": "Tree depth in edges",
                        "default": limits.default_traverse_depth,
                        "minimum": 0,
                        "maximum": limits.max_traverse_depth
                    },
                    "truncate": {
                        "type": "boolean",
                        "default": false,
                        "description": "Instead of failing when the tree exceeds the response budget, keep a breadth-first prefix and mark cut nodes as truncated"
                    }
                },
                "required": ["start_node_uuid"]
            }),
        },
        Tool {
            name: ENTITY_RELATIONS.to_string(),
            description: "List every relation (fact edge) connected to an entity".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "entity_uuid": {
                        "type": "string",
                        "description": "UUID of the entity"
                    }
                },
                "required": ["entity_uuid"]
            }),
        },
    ]
}

pub fn is_known_tool(name: &str) -> bool {
    matches!(name, FIND_PATHS | BUILD_SUBGRAPH | TRAVERSE | ENTITY_RELATIONS)
}

/// Run one tool by name. Unknown names are an `McpProtocol` error.
pub async fn call_tool<A: GraphAccessor>(
    accessor: &A,
    config: &Config,
    name: &str,
    arguments: &Value,
) -> Result<Value> {
    match name {
        FIND_PATHS => handle_find_paths(accessor, config, arguments).await,
        BUILD_SUBGRAPH => handle_build_subgraph(accessor, config, arguments).await,
        TRAVERSE => handle_traverse(accessor, config, arguments).await,
        ENTITY_RELATIONS => handle_entity_relations(accessor, arguments).await,
        other => Err(GraphnavError::McpProtocol(format!("Unknown tool: {}", other))),
    }
}

/// The exact text sent as tool content.
pub fn render(value: &Value) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| GraphnavError::Parse(format!("JSON serialization failed: {}", e)))
}

/// Wrap a tool outcome as MCP content, enforcing the response budget on the
/// rendered text.
///
/// Failures become `isError` results whose text starts with the error code.
pub fn into_call_result(outcome: Result<Value>, budget: TokenBudget) -> ToolsCallResult {
    let rendered = outcome.and_then(|value| {
        let text = render(&value)?;
        budget.check_text(&text)?;
        Ok(text)
    });

    match rendered {
        Ok(text) => ToolsCallResult {
            content: vec![text_item(text)],
            is_error: None,
        },
        Err(e) => {
            log::warn!("Tool call failed: {}", e);
            ToolsCallResult {
                content: vec![text_item(format!("{}: {}", e.code(), e))],
                is_error: Some(true),
            }
        }
    }
}

fn text_item(text: String) -> ContentItem {
    ContentItem {
        content_type: "text".to_string(),
        text,
    }
}

fn parse_args<T: DeserializeOwned>(arguments: &Value) -> Result<T> {
    let arguments = if arguments.is_null() {
        json!({})
    } else {
        arguments.clone()
    };
    serde_json::from_value(arguments).map_err(|e| GraphnavError::invalid("arguments", e.to_string()))
}

/// Resolve an optional integer argument: `default` when absent, an error
/// below `min`, clamped to `cap` above it.
fn capped(name: &str, value: Option<i64>, default: usize, min: usize, cap: usize) -> Result<usize> {
    let Some(raw) = value else {
        return Ok(default);
    };
    if raw < min as i64 {
        return Err(GraphnavError::invalid(name, format!("must be at least {}, got {}", min, raw)));
    }
    let requested = usize::try_from(raw).unwrap_or(usize::MAX);
    if requested > cap {
        log::debug!("{}={} clamped to {}", name, requested, cap);
        return Ok(cap);
    }
    Ok(requested)
}

fn require_id(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(GraphnavError::invalid(name, "must not be empty"));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct FindPathsParams {
    from_uuid: String,
    to_uuid: String,
    max_depth: Option<i64>,
    max_paths: Option<i64>,
}

/// Handle find_paths_between_entities tool
pub async fn handle_find_paths<A: GraphAccessor>(
    accessor: &A,
    config: &Config,
    arguments: &Value,
) -> Result<Value> {
    let params: FindPathsParams = parse_args(arguments)?;
    require_id("from_uuid", &params.from_uuid)?;
    require_id("to_uuid", &params.to_uuid)?;
    let limits = &config.limits;
    let max_depth = capped("max_depth", params.max_depth, limits.default_max_depth, 1, limits.max_path_depth)?;
    let max_paths = capped("max_paths", params.max_paths, limits.default_max_paths, 1, usize::MAX)?;

    let paths = find_paths(accessor, &params.from_uuid, &params.to_uuid, max_depth, max_paths).await?;
    paths_response(&params.from_uuid, &params.to_uuid, max_depth, max_paths, &paths)
}

#[derive(Debug, Deserialize)]
struct SubgraphParams {
    entity_uuids: Vec<String>,
    max_hop: Option<i64>,
    #[serde(default)]
    include_paths: bool,
    missing_ids: Option<MissingIdPolicy>,
}

/// Handle build_subgraph tool
pub async fn handle_build_subgraph<A: GraphAccessor>(
    accessor: &A,
    config: &Config,
    arguments: &Value,
) -> Result<Value> {
    let params: SubgraphParams = parse_args(arguments)?;
    if params.entity_uuids.is_empty() {
        return Err(GraphnavError::invalid("entity_uuids", "must contain at least one entity UUID"));
    }
    let limits = &config.limits;
    let options = SubgraphOptions {
        max_hop: capped("max_hop", params.max_hop, limits.default_max_hop, 0, limits.max_hop)?,
        include_paths: params.include_paths,
        missing_ids: params.missing_ids.unwrap_or(config.subgraph.missing_ids),
        pairwise_max_paths: limits.pairwise_max_paths,
    };

    let subgraph = build_subgraph(accessor, &params.entity_uuids, &options).await?;
    subgraph_response(&params.entity_uuids, &options, &subgraph)
}

#[derive(Debug, Deserialize)]
struct TraverseParams {
    start_node_uuid: String,
    depth: Option<i64>,
    #[serde(default)]
    truncate: bool,
}

/// Handle traverse_knowledge_graph tool
pub async fn handle_traverse<A: GraphAccessor>(
    accessor: &A,
    config: &Config,
    arguments: &Value,
) -> Result<Value> {
    let params: TraverseParams = parse_args(arguments)?;
    require_id("start_node_uuid", &params.start_node_uuid)?;
    let limits = &config.limits;
    let depth = match params.depth {
        None => limits.default_traverse_depth,
        Some(d) if d >= 0 && d as u64 <= limits.max_traverse_depth as u64 => d as usize,
        Some(d) => {
            return Err(GraphnavError::invalid(
                "depth",
                format!("must be between 0 and {}, got {}", limits.max_traverse_depth, d),
            ))
        }
    };

    let tree = traverse(accessor, &params.start_node_uuid, depth).await?;
    if params.truncate {
        fit_traverse(&params.start_node_uuid, depth, &tree, config.token_budget())
    } else {
        traverse_response(&params.start_node_uuid, depth, &tree, 0)
    }
}

/// Largest breadth-first prefix of `tree` whose rendered response fits
/// `budget`. Falls back to the whole tree when not even the root fits, so
/// the budget check at the boundary still reports it.
fn fit_traverse(start: &str, depth: usize, tree: &TraversalTree, budget: TokenBudget) -> Result<Value> {
    let full = traverse_response(start, depth, tree, 0)?;
    if budget.fits(&render(&full)?) {
        return Ok(full);
    }

    let total = tree.node_count();
    let respond = |keep: usize| -> Result<(Value, bool)> {
        let cut = tree.truncated_to(keep)?;
        let value = traverse_response(start, depth, &cut, total - cut.node_count())?;
        let fits = budget.fits(&render(&value)?);
        Ok((value, fits))
    };

    let (mut best, fits) = respond(0)?;
    if !fits {
        return Ok(full);
    }
    // respond(lo) fits, the untruncated tree (total - 1 entries) does not
    let (mut lo, mut hi) = (0, total - 1);
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        let (value, fits) = respond(mid)?;
        if fits {
            lo = mid;
            best = value;
        } else {
            hi = mid;
        }
    }
    log::debug!("traverse {} truncated to {} of {} tree node(s)", start, lo + 1, total);
    Ok(best)
}

#[derive(Debug, Deserialize)]
struct RelationsParams {
    entity_uuid: String,
}

/// Handle get_entity_relations tool
pub async fn handle_entity_relations<A: GraphAccessor>(accessor: &A, arguments: &Value) -> Result<Value> {
    let params: RelationsParams = parse_args(arguments)?;
    require_id("entity_uuid", &params.entity_uuid)?;
    let edges = entity_relations(accessor, &params.entity_uuid).await?;
    relations_response(&params.entity_uuid, &edges)
}

fn to_value<T: serde::Serialize>(item: &T) -> Result<Value> {
    serde_json::to_value(item).map_err(|e| GraphnavError::Parse(format!("JSON serialization failed: {}", e)))
}

fn path_json(path_id: usize, path: &Path) -> Value {
    json!({
        "path_id": path_id,
        "length": path.len(),
        "node_sequence": path.node_ids(),
        "edge_sequence": path.edge_ids(),
    })
}

pub fn paths_response(from: &str, to: &str, max_depth: usize, max_paths: usize, paths: &[Path]) -> Result<Value> {
    let mut node_details = Map::new();
    let mut edge_details = Map::new();
    for path in paths {
        for node in &path.nodes {
            if !node_details.contains_key(&node.id) {
                node_details.insert(node.id.clone(), to_value(node)?);
            }
        }
        for edge in &path.edges {
            if !edge_details.contains_key(&edge.id) {
                edge_details.insert(edge.id.clone(), to_value(edge)?);
            }
        }
    }

    let message = if paths.is_empty() {
        "No paths found between the specified entities".to_string()
    } else {
        format!("Found {} path(s) between entities", paths.len())
    };

    Ok(json!({
        "message": message,
        "paths": paths.iter().enumerate().map(|(i, p)| path_json(i + 1, p)).collect::<Vec<_>>(),
        "node_details": node_details,
        "edge_details": edge_details,
        "metadata": {
            "from_uuid": from,
            "to_uuid": to,
            "max_depth": max_depth,
            "max_paths": max_paths,
            "total_paths_found": paths.len(),
        },
    }))
}

pub fn subgraph_response(seeds: &[String], options: &SubgraphOptions, subgraph: &Subgraph) -> Result<Value> {
    let nodes = subgraph
        .nodes
        .iter()
        .map(|n: &Node| -> Result<(String, Value)> { Ok((n.id.clone(), to_value(n)?)) })
        .collect::<Result<Map<String, Value>>>()?;
    let edges = subgraph.edges.iter().map(|e: &Edge| to_value(e)).collect::<Result<Vec<Value>>>()?;

    let mut pairs = Map::new();
    for pair in &subgraph.paths_between_entities {
        pairs.insert(
            format!("{}_to_{}", pair.from_id, pair.to_id),
            Value::Array(pair.paths.iter().enumerate().map(|(i, p)| path_json(i + 1, p)).collect()),
        );
    }

    Ok(json!({
        "message": format!(
            "Subgraph built with {} nodes and {} edges",
            subgraph.nodes.len(),
            subgraph.edges.len()
        ),
        "subgraph": {
            "nodes": nodes,
            "edges": edges,
            "adjacency_list": to_value(&subgraph.adjacency)?,
        },
        "statistics": {
            "node_count": subgraph.nodes.len(),
            "edge_count": subgraph.edges.len(),
        },
        "paths_between_entities": pairs,
        "skipped_ids": subgraph.skipped_ids,
        "metadata": {
            "entity_uuids": seeds,
            "max_hop": options.max_hop,
            "include_paths": options.include_paths,
            "missing_ids": options.missing_ids,
        },
    }))
}

/// `omitted` counts tree nodes cut to fit the response budget.
pub fn traverse_response(start: &str, depth: usize, tree: &TraversalTree, omitted: usize) -> Result<Value> {
    let node_count = tree.node_count();
    let mut message = format!("Traversed {} node(s) from {} to depth {}", node_count, start, depth);
    if omitted > 0 {
        message.push_str(&format!("; {} node(s) omitted to fit the response budget", omitted));
    }
    Ok(json!({
        "message": message,
        "tree": to_value(tree)?,
        "metadata": {
            "start_node_uuid": start,
            "depth": depth,
            "node_count": node_count,
            "max_depth_reached": tree.depth(),
            "truncated": omitted > 0,
            "omitted_nodes": omitted,
        },
    }))
}

fn fact_json(edge: &Edge) -> Value {
    json!({
        "uuid": edge.id,
        "name": edge.name,
        "fact": edge.fact,
        "created_at": edge.created_at.to_rfc3339(),
        "valid_at": edge.valid_at.map(|t| t.to_rfc3339()),
        "invalid_at": edge.invalid_at.map(|t| t.to_rfc3339()),
        "source_uuid": edge.source_id,
        "target_uuid": edge.target_id,
        "episodes": edge.episodes,
    })
}

pub fn relations_response(entity: &str, edges: &[Edge]) -> Result<Value> {
    Ok(json!({
        "entity_uuid": entity,
        "relation_count": edges.len(),
        "relations": edges.iter().map(fact_json).collect::<Vec<_>>(),
    }))
}
