//! Per-call read-through view over a [`GraphAccessor`].
//!
//! One operation call owns one `Snapshot`: every node and neighbor list is
//! fetched at most once, so repeated visits (iterative deepening, pairwise
//! path searches, tree branches reaching the same node) see the same data.

use std::collections::HashMap;

use crate::graph::{Direction, Edge, GraphAccessor, Node, RELATES_TO};
use crate::{GraphnavError, Result};

/// An eligible edge together with the Entity node on its far side.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub edge: Edge,
    pub node: Node,
}

pub struct Snapshot<'a, A: GraphAccessor> {
    accessor: &'a A,
    nodes: HashMap<String, Option<Node>>,
    neighbors: HashMap<(String, Direction), Vec<Neighbor>>,
}

impl<'a, A: GraphAccessor> Snapshot<'a, A> {
    pub fn new(accessor: &'a A) -> Self {
        Self {
            accessor,
            nodes: HashMap::new(),
            neighbors: HashMap::new(),
        }
    }

    /// Resolve `id` to an Entity node; `None` for unknown or non-Entity ids.
    pub async fn entity(&mut self, id: &str) -> Result<Option<Node>> {
        if let Some(cached) = self.nodes.get(id) {
            return Ok(cached.clone());
        }
        let node = self
            .accessor
            .get_node(id)
            .await?
            .filter(|n| n.is_entity() && n.id == id);
        self.nodes.insert(id.to_string(), node.clone());
        Ok(node)
    }

    /// Like [`Snapshot::entity`] but fails with `NotFound` naming the id.
    pub async fn require_entity(&mut self, id: &str) -> Result<Node> {
        self.entity(id)
            .await?
            .ok_or_else(|| GraphnavError::NotFound(id.to_string()))
    }

    /// `RELATES_TO` edges incident to `id` whose far endpoint is an Entity,
    /// in accessor order.
    pub async fn neighbors(&mut self, id: &str, direction: Direction) -> Result<Vec<Neighbor>> {
        let key = (id.to_string(), direction);
        if let Some(cached) = self.neighbors.get(&key) {
            return Ok(cached.clone());
        }

        let edges = self
            .accessor
            .get_edges_for_node(id, direction, RELATES_TO)
            .await?;

        let mut far_ids = Vec::new();
        for edge in &edges {
            if !edge.touches(id) {
                return Err(GraphnavError::Accessor(format!(
                    "edge {} returned for node {} does not touch it",
                    edge.id, id
                )));
            }
            let far = far_end(edge, id, direction).to_string();
            if !self.nodes.contains_key(&far) && !far_ids.contains(&far) {
                far_ids.push(far);
            }
        }

        if !far_ids.is_empty() {
            let mut fetched = self.accessor.get_nodes(&far_ids).await?;
            for far in far_ids {
                let node = fetched.remove(&far).filter(|n| n.is_entity());
                self.nodes.insert(far, node);
            }
        }

        let mut out = Vec::with_capacity(edges.len());
        for edge in edges {
            if !edge.is_relates_to() {
                continue;
            }
            let far = far_end(&edge, id, direction);
            if let Some(Some(node)) = self.nodes.get(far) {
                out.push(Neighbor {
                    node: node.clone(),
                    edge,
                });
            }
        }

        log::trace!("{} eligible {:?} neighbors for {}", out.len(), direction, id);
        self.neighbors.insert(key, out.clone());
        Ok(out)
    }
}

fn far_end<'e>(edge: &'e Edge, id: &str, direction: Direction) -> &'e str {
    match direction {
        Direction::Outgoing => &edge.target_id,
        Direction::Incoming => &edge.source_id,
        Direction::Both => edge.other_end(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{InMemoryGraph, NodeLabel};

    fn graph() -> InMemoryGraph {
        let mut g = InMemoryGraph::new();
        g.add_node(Node::entity("a", "A"));
        g.add_node(Node::entity("b", "B"));
        g.add_node(Node::entity("ep", "Episode 1").with_label(NodeLabel::Episodic));
        g.add_edge(Edge::relates_to("e1", "a", "b", "a knows b"));
        g.add_edge(Edge::relates_to("e2", "ep", "a", "mentions"));
        let mut other = Edge::relates_to("e3", "b", "a", "");
        other.edge_type = "MENTIONS".to_string();
        g.add_edge(other);
        g
    }

    #[tokio::test]
    async fn test_entity_filters_episodic() {
        let g = graph();
        let mut snap = Snapshot::new(&g);
        assert!(snap.entity("a").await.unwrap().is_some());
        assert!(snap.entity("ep").await.unwrap().is_none());
        assert!(snap.entity("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_require_entity_names_missing_id() {
        let g = graph();
        let mut snap = Snapshot::new(&g);
        let err = snap.require_entity("ghost").await.unwrap_err();
        assert!(matches!(err, GraphnavError::NotFound(ref id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_neighbors_skip_episodic_and_other_types() {
        let g = graph();
        let mut snap = Snapshot::new(&g);
        let both = snap.neighbors("a", Direction::Both).await.unwrap();
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].edge.id, "e1");
        assert_eq!(both[0].node.id, "b");

        let incoming = snap.neighbors("b", Direction::Incoming).await.unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].node.id, "a");

        let outgoing = snap.neighbors("b", Direction::Outgoing).await.unwrap();
        assert!(outgoing.is_empty());
    }

    /// Answers every edge read with an edge between two other nodes.
    struct StrayEdgeGraph(InMemoryGraph);

    impl GraphAccessor for StrayEdgeGraph {
        async fn get_node(&self, id: &str) -> Result<Option<Node>> {
            self.0.get_node(id).await
        }

        async fn get_edges_for_node(&self, _id: &str, _direction: Direction, _type_filter: &str) -> Result<Vec<Edge>> {
            Ok(vec![Edge::relates_to("stray", "b", "ep", "")])
        }

        async fn get_nodes(&self, ids: &[String]) -> Result<HashMap<String, Node>> {
            self.0.get_nodes(ids).await
        }
    }

    #[tokio::test]
    async fn test_edge_not_touching_node_rejected() {
        let g = StrayEdgeGraph(graph());
        let mut snap = Snapshot::new(&g);
        let err = snap.neighbors("a", Direction::Both).await.unwrap_err();
        assert!(matches!(err, GraphnavError::Accessor(ref msg) if msg.contains("stray") && msg.contains(" a ")));

        let err = crate::graph::find_paths(&g, "a", "b", 3, 5).await.unwrap_err();
        assert!(matches!(err, GraphnavError::Accessor(_)));
    }
}
