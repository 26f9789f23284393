//! Bounded-radius subgraph around one or more seed entities.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::graph::paths::{find_paths_within, Path};
use crate::graph::snapshot::{Neighbor, Snapshot};
use crate::graph::{Direction, Edge, GraphAccessor, Node};
use crate::{GraphnavError, Result};

pub const DEFAULT_MAX_HOP: usize = 1;
pub const DEFAULT_PAIRWISE_MAX_PATHS: usize = 5;

/// What to do with a seed id that does not resolve to an Entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingIdPolicy {
    /// Abort with `NotFound` naming the id.
    #[default]
    Fail,
    /// Log a warning, record the id in `skipped_ids`, keep building.
    Skip,
}

impl FromStr for MissingIdPolicy {
    type Err = GraphnavError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fail" => Ok(MissingIdPolicy::Fail),
            "skip" => Ok(MissingIdPolicy::Skip),
            other => Err(GraphnavError::invalid(
                "missing_ids",
                format!("expected \"fail\" or \"skip\", got \"{}\"", other),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubgraphOptions {
    pub max_hop: usize,
    pub include_paths: bool,
    pub missing_ids: MissingIdPolicy,
    /// Per-pair cap used when `include_paths` is set.
    pub pairwise_max_paths: usize,
}

impl Default for SubgraphOptions {
    fn default() -> Self {
        Self {
            max_hop: DEFAULT_MAX_HOP,
            include_paths: false,
            missing_ids: MissingIdPolicy::Fail,
            pairwise_max_paths: DEFAULT_PAIRWISE_MAX_PATHS,
        }
    }
}

/// One adjacency record: `direction` is relative to the owning node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdjacencyEntry {
    pub neighbor_id: String,
    pub edge_id: String,
    pub direction: Direction,
}

/// Paths found between one unordered pair of subgraph nodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairPaths {
    pub from_id: String,
    pub to_id: String,
    pub paths: Vec<Path>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subgraph {
    /// Unique by id, in discovery order (seeds first).
    pub nodes: Vec<Node>,
    /// Unique by id, in discovery order.
    pub edges: Vec<Edge>,
    /// Every node has an entry, possibly empty.
    pub adjacency: BTreeMap<String, Vec<AdjacencyEntry>>,
    pub paths_between_entities: Vec<PairPaths>,
    pub skipped_ids: Vec<String>,
}

impl Subgraph {
    pub fn contains_node(&self, id: &str) -> bool {
        self.adjacency.contains_key(id)
    }

    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    pub fn edge_ids(&self) -> Vec<&str> {
        self.edges.iter().map(|e| e.id.as_str()).collect()
    }
}

/// Build the subgraph within `max_hop` hops of the seeds.
///
/// Multi-source BFS: seeds sit at hop 0 and each node is expanded at most
/// once, at its lowest hop. Nodes at hop `max_hop` are included but not
/// expanded, so every kept edge has both endpoints in the node set.
pub async fn build_subgraph<A: GraphAccessor>(
    accessor: &A,
    entity_ids: &[String],
    options: &SubgraphOptions,
) -> Result<Subgraph> {
    if entity_ids.is_empty() {
        return Err(GraphnavError::invalid(
            "entity_ids",
            "must contain at least one entity id",
        ));
    }

    let mut snapshot = Snapshot::new(accessor);
    let mut nodes: Vec<Node> = Vec::new();
    let mut node_index: HashSet<String> = HashSet::new();
    let mut skipped_ids: Vec<String> = Vec::new();
    let mut frontier: Vec<String> = Vec::new();

    for id in entity_ids {
        if node_index.contains(id) || skipped_ids.contains(id) {
            continue;
        }
        match snapshot.entity(id).await? {
            Some(node) => {
                node_index.insert(id.clone());
                frontier.push(id.clone());
                nodes.push(node);
            }
            None => match options.missing_ids {
                MissingIdPolicy::Fail => return Err(GraphnavError::NotFound(id.clone())),
                MissingIdPolicy::Skip => {
                    log::warn!("Skipping unknown entity {} in subgraph seeds", id);
                    skipped_ids.push(id.clone());
                }
            },
        }
    }

    let mut edges: Vec<Edge> = Vec::new();
    let mut edge_index: HashSet<String> = HashSet::new();

    for hop in 0..options.max_hop {
        if frontier.is_empty() {
            break;
        }
        let mut next = Vec::new();
        for id in &frontier {
            for Neighbor { edge, node } in snapshot.neighbors(id, Direction::Both).await? {
                if node_index.insert(node.id.clone()) {
                    next.push(node.id.clone());
                    nodes.push(node);
                }
                if edge_index.insert(edge.id.clone()) {
                    edges.push(edge);
                }
            }
        }
        log::debug!("subgraph hop {}: {} new node(s)", hop + 1, next.len());
        frontier = next;
    }

    let mut paths_between_entities = Vec::new();
    if options.include_paths && options.max_hop > 0 && nodes.len() > 1 {
        let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
        for (i, from_id) in ids.iter().enumerate() {
            for to_id in &ids[i + 1..] {
                let paths = find_paths_within(
                    &mut snapshot,
                    from_id,
                    to_id,
                    options.max_hop,
                    options.pairwise_max_paths,
                    Some(&node_index),
                )
                .await?;
                if paths.is_empty() {
                    continue;
                }
                for edge in paths.iter().flat_map(|p| p.edges.iter()) {
                    if edge_index.insert(edge.id.clone()) {
                        edges.push(edge.clone());
                    }
                }
                paths_between_entities.push(PairPaths {
                    from_id: from_id.clone(),
                    to_id: to_id.clone(),
                    paths,
                });
            }
        }
    }

    let adjacency = assemble_adjacency(&nodes, &edges);
    log::debug!(
        "build_subgraph seeds={} max_hop={}: {} nodes, {} edges, {} pair(s) with paths",
        entity_ids.len(),
        options.max_hop,
        nodes.len(),
        edges.len(),
        paths_between_entities.len()
    );

    Ok(Subgraph {
        nodes,
        edges,
        adjacency,
        paths_between_entities,
        skipped_ids,
    })
}

/// One `Outgoing` entry at the source and one `Incoming` entry at the target
/// per edge, in edge order.
fn assemble_adjacency(nodes: &[Node], edges: &[Edge]) -> BTreeMap<String, Vec<AdjacencyEntry>> {
    let mut adjacency: BTreeMap<String, Vec<AdjacencyEntry>> =
        nodes.iter().map(|n| (n.id.clone(), Vec::new())).collect();

    for edge in edges {
        debug_assert!(adjacency.contains_key(&edge.source_id) && adjacency.contains_key(&edge.target_id));
        if let Some(entries) = adjacency.get_mut(&edge.source_id) {
            entries.push(AdjacencyEntry {
                neighbor_id: edge.target_id.clone(),
                edge_id: edge.id.clone(),
                direction: Direction::Outgoing,
            });
        }
        if let Some(entries) = adjacency.get_mut(&edge.target_id) {
            entries.push(AdjacencyEntry {
                neighbor_id: edge.source_id.clone(),
                edge_id: edge.id.clone(),
                direction: Direction::Incoming,
            });
        }
    }

    adjacency
}
