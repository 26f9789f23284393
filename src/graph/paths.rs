//! Bounded enumeration of simple paths between two entities.

use std::collections::HashSet;

use serde::Serialize;

use crate::graph::snapshot::{Neighbor, Snapshot};
use crate::graph::{Direction, Edge, GraphAccessor, Node};
use crate::{GraphnavError, Result};

pub const DEFAULT_MAX_DEPTH: usize = 5;
pub const DEFAULT_MAX_PATHS: usize = 10;

/// Alternating node/edge sequence: `nodes[i] --edges[i]-- nodes[i + 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Path {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Path {
    /// Number of edges.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    pub fn edge_ids(&self) -> Vec<&str> {
        self.edges.iter().map(|e| e.id.as_str()).collect()
    }
}

/// Find up to `max_paths` simple paths of at most `max_depth` edges from
/// `from_id` to `to_id`, treating `RELATES_TO` edges as undirected.
///
/// Paths come back shortest first; paths of equal length follow the
/// accessor's edge order. `from_id == to_id` yields the single zero-edge path.
/// No path within the bound is an empty result, not an error.
pub async fn find_paths<A: GraphAccessor>(
    accessor: &A,
    from_id: &str,
    to_id: &str,
    max_depth: usize,
    max_paths: usize,
) -> Result<Vec<Path>> {
    let mut snapshot = Snapshot::new(accessor);
    let paths = find_paths_within(&mut snapshot, from_id, to_id, max_depth, max_paths, None).await?;
    log::debug!(
        "find_paths {} -> {} (max_depth={}, max_paths={}): {} path(s)",
        from_id,
        to_id,
        max_depth,
        max_paths,
        paths.len()
    );
    Ok(paths)
}

/// Path search over an existing snapshot. When `allowed` is given, every
/// intermediate node must belong to it.
pub(crate) async fn find_paths_within<A: GraphAccessor>(
    snapshot: &mut Snapshot<'_, A>,
    from_id: &str,
    to_id: &str,
    max_depth: usize,
    max_paths: usize,
    allowed: Option<&HashSet<String>>,
) -> Result<Vec<Path>> {
    if max_depth == 0 {
        return Err(GraphnavError::invalid("max_depth", "must be at least 1"));
    }
    if max_paths == 0 {
        return Err(GraphnavError::invalid("max_paths", "must be at least 1"));
    }

    let start = snapshot.require_entity(from_id).await?;
    snapshot.require_entity(to_id).await?;

    if from_id == to_id {
        return Ok(vec![Path {
            nodes: vec![start],
            edges: Vec::new(),
        }]);
    }

    // Depth-limited DFS with a growing limit: round `limit` only emits paths
    // of exactly `limit` edges, so discovery order is shortest first.
    let mut paths = Vec::new();
    for limit in 1..=max_depth {
        collect_paths_of_length(snapshot, &start, to_id, limit, max_paths, allowed, &mut paths).await?;
        if paths.len() >= max_paths {
            break;
        }
    }
    Ok(paths)
}

struct Frame {
    neighbors: Vec<Neighbor>,
    next: usize,
}

async fn collect_paths_of_length<A: GraphAccessor>(
    snapshot: &mut Snapshot<'_, A>,
    start: &Node,
    to_id: &str,
    limit: usize,
    max_paths: usize,
    allowed: Option<&HashSet<String>>,
    paths: &mut Vec<Path>,
) -> Result<()> {
    let mut node_stack = vec![start.clone()];
    let mut edge_stack: Vec<Edge> = Vec::new();
    let mut on_path: HashSet<String> = HashSet::from([start.id.clone()]);
    let mut frames = vec![Frame {
        neighbors: snapshot.neighbors(&start.id, Direction::Both).await?,
        next: 0,
    }];

    while let Some(frame) = frames.last_mut() {
        if frame.next >= frame.neighbors.len() {
            frames.pop();
            if let Some(node) = node_stack.pop() {
                on_path.remove(&node.id);
            }
            edge_stack.pop();
            continue;
        }

        let Neighbor { edge, node } = frame.neighbors[frame.next].clone();
        frame.next += 1;

        if on_path.contains(&node.id) {
            continue;
        }
        let depth = edge_stack.len() + 1;

        if node.id == to_id {
            if depth == limit {
                let mut nodes = node_stack.clone();
                nodes.push(node);
                let mut edges = edge_stack.clone();
                edges.push(edge);
                paths.push(Path { nodes, edges });
                if paths.len() >= max_paths {
                    return Ok(());
                }
            }
            continue;
        }

        if depth >= limit {
            continue;
        }
        if let Some(allowed) = allowed {
            if !allowed.contains(&node.id) {
                continue;
            }
        }

        let neighbors = snapshot.neighbors(&node.id, Direction::Both).await?;
        on_path.insert(node.id.clone());
        node_stack.push(node);
        edge_stack.push(edge);
        frames.push(Frame { neighbors, next: 0 });
    }

    Ok(())
}
