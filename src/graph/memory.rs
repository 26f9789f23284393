//! Deterministic in-memory graph adapter.
//!
//! Backs the test suite and the `query --snapshot` mode. Nodes are returned as
//! stored (labels included); edges come back ordered by edge id.

use std::collections::{BTreeMap, HashMap};
use std::path::Path as FsPath;

use serde::{Deserialize, Serialize};

use crate::graph::{strip_embeddings, Direction, Edge, GraphAccessor, Node};
use crate::{GraphnavError, Result};

/// Serializable form of a whole graph: `{"nodes": [...], "edges": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// Adjacency lists keyed by node id, edges stored once by id.
///
/// `outgoing[a]` holds ids of edges leaving a, `incoming[b]` ids of edges
/// entering b. Both are populated by [`InMemoryGraph::add_edge`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryGraph {
    nodes: HashMap<String, Node>,
    edges: BTreeMap<String, Edge>,
    outgoing: HashMap<String, Vec<String>>,
    incoming: HashMap<String, Vec<String>>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let mut graph = Self::new();
        for node in snapshot.nodes {
            graph.add_node(node);
        }
        for edge in snapshot.edges {
            graph.add_edge(edge);
        }
        graph
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: GraphSnapshot = serde_json::from_str(json)
            .map_err(|e| GraphnavError::Parse(format!("Invalid graph snapshot: {}", e)))?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Load a JSON snapshot file.
    pub fn load<P: AsRef<FsPath>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let graph = Self::from_json(&json)?;
        log::info!(
            "Loaded graph snapshot {}: {} nodes, {} edges",
            path.as_ref().display(),
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }

    /// Register a node, replacing any previous node with the same id.
    pub fn add_node(&mut self, mut node: Node) {
        strip_embeddings(&mut node.attributes);
        self.nodes.insert(node.id.clone(), node);
    }

    /// Add a directed edge. Endpoints need not be registered as nodes; such
    /// edges are dropped by the algorithms.
    pub fn add_edge(&mut self, mut edge: Edge) {
        strip_embeddings(&mut edge.attributes);
        if let Some(old) = self.edges.remove(&edge.id) {
            self.unlink(&old);
        }
        self.outgoing
            .entry(edge.source_id.clone())
            .or_default()
            .push(edge.id.clone());
        self.incoming
            .entry(edge.target_id.clone())
            .or_default()
            .push(edge.id.clone());
        self.edges.insert(edge.id.clone(), edge);
    }

    fn unlink(&mut self, edge: &Edge) {
        if let Some(ids) = self.outgoing.get_mut(&edge.source_id) {
            ids.retain(|id| id != &edge.id);
        }
        if let Some(ids) = self.incoming.get_mut(&edge.target_id) {
            ids.retain(|id| id != &edge.id);
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    fn edge_ids(&self, id: &str, direction: Direction) -> Vec<&String> {
        let out = self.outgoing.get(id).into_iter().flatten();
        let inc = self.incoming.get(id).into_iter().flatten();
        let mut ids: Vec<&String> = match direction {
            Direction::Outgoing => out.collect(),
            Direction::Incoming => inc.collect(),
            Direction::Both => out.chain(inc).collect(),
        };
        ids.sort();
        ids.dedup();
        ids
    }
}

impl GraphAccessor for InMemoryGraph {
    async fn get_node(&self, id: &str) -> Result<Option<Node>> {
        Ok(self.nodes.get(id).cloned())
    }

    async fn get_edges_for_node(
        &self,
        id: &str,
        direction: Direction,
        type_filter: &str,
    ) -> Result<Vec<Edge>> {
        Ok(self
            .edge_ids(id, direction)
            .into_iter()
            .filter_map(|edge_id| self.edges.get(edge_id))
            .filter(|edge| edge.edge_type == type_filter)
            .cloned()
            .collect())
    }

    async fn get_nodes(&self, ids: &[String]) -> Result<HashMap<String, Node>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.nodes.get(id).map(|n| (id.clone(), n.clone())))
            .collect())
    }
}
