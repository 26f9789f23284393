//! Knowledge graph module: data model, accessor adapters and the read-path
//! algorithms (path finding, subgraph building, cycle-safe traversal).
//!
//! Only `Entity` nodes joined by `RELATES_TO` edges ever appear in results.
//! Provenance (`Episodic`) nodes and embedding vectors are filtered out.

pub mod accessor;
pub mod memory;
pub mod paths;
pub mod relations;
pub mod snapshot;
pub mod sqlite;
pub mod subgraph;
pub mod traverse;

pub use accessor::GraphAccessor;
pub use memory::{GraphSnapshot, InMemoryGraph};
pub use paths::{find_paths, Path};
pub use relations::entity_relations;
pub use sqlite::SqliteGraph;
pub use subgraph::{build_subgraph, AdjacencyEntry, MissingIdPolicy, PairPaths, Subgraph, SubgraphOptions};
pub use traverse::{traverse, TraversalChild, TraversalTree};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The only relationship type the algorithms navigate.
pub const RELATES_TO: &str = "RELATES_TO";

/// Node category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeLabel {
    Entity,
    /// Provenance bookkeeping (source ingestion events). Never traversed.
    Episodic,
    Other(String),
}

impl From<String> for NodeLabel {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Entity" => NodeLabel::Entity,
            "Episodic" => NodeLabel::Episodic,
            _ => NodeLabel::Other(s),
        }
    }
}

impl From<NodeLabel> for String {
    fn from(label: NodeLabel) -> Self {
        match label {
            NodeLabel::Entity => "Entity".to_string(),
            NodeLabel::Episodic => "Episodic".to_string(),
            NodeLabel::Other(s) => s,
        }
    }
}

/// A node record as returned by a [`GraphAccessor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub label: NodeLabel,
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Scalar/text attributes. Embedding-valued keys are stripped on load.
    #[serde(default)]
    pub attributes: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl Node {
    /// Convenience constructor for an `Entity` node.
    pub fn entity(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            label: NodeLabel::Entity,
            name: name.to_string(),
            summary: String::new(),
            group_id: None,
            attributes: Map::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_label(mut self, label: NodeLabel) -> Self {
        self.label = label;
        self
    }

    pub fn is_entity(&self) -> bool {
        self.label == NodeLabel::Entity
    }
}

/// A typed, directed edge record (source --edge_type--> target).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    /// Storage relationship type, e.g. `RELATES_TO`.
    #[serde(rename = "type")]
    pub edge_type: String,
    /// Relation label, e.g. `WORKS_AT`.
    #[serde(default)]
    pub name: String,
    pub source_id: String,
    pub target_id: String,
    /// Human-readable description of the relationship.
    #[serde(default)]
    pub fact: String,
    #[serde(default)]
    pub valid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub invalid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Ids of the episodes this fact was extracted from.
    #[serde(default)]
    pub episodes: Vec<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Edge {
    /// Convenience constructor for a `RELATES_TO` edge.
    pub fn relates_to(id: &str, source_id: &str, target_id: &str, fact: &str) -> Self {
        Self {
            id: id.to_string(),
            edge_type: RELATES_TO.to_string(),
            name: String::new(),
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            fact: fact.to_string(),
            valid_at: None,
            invalid_at: None,
            created_at: Utc::now(),
            episodes: Vec::new(),
            attributes: Map::new(),
        }
    }

    pub fn is_relates_to(&self) -> bool {
        self.edge_type == RELATES_TO
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source_id == node_id || self.target_id == node_id
    }

    /// The endpoint opposite `node_id` (the node itself for a self-loop).
    pub fn other_end(&self, node_id: &str) -> &str {
        if self.source_id == node_id {
            &self.target_id
        } else {
            &self.source_id
        }
    }
}

/// Edge direction relative to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// Remove embedding-valued attributes (`name_embedding`, `fact_embedding`, ...).
pub fn strip_embeddings(attributes: &mut Map<String, Value>) {
    attributes.retain(|key, _| !key.ends_with("_embedding"));
}
