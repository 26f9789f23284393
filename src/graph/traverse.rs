//! Depth-bounded, cycle-safe traversal into a nested tree.

use std::collections::VecDeque;

use serde::Serialize;

use crate::graph::snapshot::{Neighbor, Snapshot};
use crate::graph::{Direction, Edge, GraphAccessor, Node};
use crate::{GraphnavError, Result};

pub const DEFAULT_DEPTH: usize = 1;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraversalTree {
    pub node: Node,
    pub children: Vec<TraversalChild>,
    /// Some of this node's children were cut by [`TraversalTree::truncated_to`].
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

/// A child reached over one outgoing edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraversalChild {
    pub edge: Edge,
    /// The target is already an ancestor; its subtree is left empty.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cycle: bool,
    pub tree: TraversalTree,
}

impl TraversalTree {
    /// Longest root-to-leaf edge count.
    pub fn depth(&self) -> usize {
        self.children
            .iter()
            .map(|c| 1 + c.tree.depth())
            .max()
            .unwrap_or(0)
    }

    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.tree.node_count()).sum::<usize>()
    }

    pub fn child_ids(&self) -> Vec<&str> {
        self.children.iter().map(|c| c.tree.node.id.as_str()).collect()
    }

    /// Copy of the tree holding only the first `keep` child entries in
    /// breadth-first order. Every node that lost children is flagged
    /// `truncated`, so shallow levels survive before deep ones.
    pub fn truncated_to(&self, keep: usize) -> Result<TraversalTree> {
        let mut arena = vec![Slot {
            node: self.node.clone(),
            link: None,
            children: Vec::new(),
            truncated: self.truncated,
        }];
        let mut queue = VecDeque::from([(0usize, self)]);

        while let Some((slot, tree)) = queue.pop_front() {
            for child in &tree.children {
                // arena holds the root plus one slot per kept entry
                if arena.len() > keep {
                    arena[slot].truncated = true;
                    break;
                }
                let idx = arena.len();
                arena.push(Slot {
                    node: child.tree.node.clone(),
                    link: Some((child.edge.clone(), child.cycle)),
                    children: Vec::new(),
                    truncated: child.tree.truncated,
                });
                arena[slot].children.push(idx);
                queue.push_back((idx, &child.tree));
            }
        }
        assemble(arena)
    }
}

struct Slot {
    node: Node,
    link: Option<(Edge, bool)>,
    children: Vec<usize>,
    truncated: bool,
}

struct Work {
    slot: usize,
    remaining: usize,
    /// Root-to-node id chain for this frame only.
    ancestors: Vec<String>,
}

/// Expand outgoing `RELATES_TO` edges from `start_id` down to `depth` levels.
///
/// A target already on the current root-to-node chain is reported as a
/// `cycle` child with no children. Nodes reached along independent branches
/// are expanded once per occurrence.
pub async fn traverse<A: GraphAccessor>(
    accessor: &A,
    start_id: &str,
    depth: usize,
) -> Result<TraversalTree> {
    let mut snapshot = Snapshot::new(accessor);
    let root = snapshot.require_entity(start_id).await?;

    let mut arena = vec![Slot {
        node: root,
        link: None,
        children: Vec::new(),
        truncated: false,
    }];
    let mut stack = vec![Work {
        slot: 0,
        remaining: depth,
        ancestors: vec![start_id.to_string()],
    }];

    while let Some(work) = stack.pop() {
        if work.remaining == 0 {
            continue;
        }
        let node_id = arena[work.slot].node.id.clone();
        let mut pending = Vec::new();

        for Neighbor { edge, node } in snapshot.neighbors(&node_id, Direction::Outgoing).await? {
            let cycle = work.ancestors.contains(&node.id);
            let child_id = node.id.clone();
            let idx = arena.len();
            arena.push(Slot {
                node,
                link: Some((edge, cycle)),
                children: Vec::new(),
                truncated: false,
            });
            arena[work.slot].children.push(idx);

            if !cycle && work.remaining > 1 {
                let mut ancestors = work.ancestors.clone();
                ancestors.push(child_id);
                pending.push(Work {
                    slot: idx,
                    remaining: work.remaining - 1,
                    ancestors,
                });
            }
        }
        // reversed so the first edge is expanded first
        stack.extend(pending.into_iter().rev());
    }

    log::debug!("traverse {} depth={}: {} tree node(s)", start_id, depth, arena.len());
    assemble(arena)
}

/// Children always sit at higher arena indices than their parent, so a
/// single reverse sweep builds every subtree before it is needed.
fn assemble(arena: Vec<Slot>) -> Result<TraversalTree> {
    let mut built: Vec<Option<(Option<(Edge, bool)>, TraversalTree)>> =
        std::iter::repeat_with(|| None).take(arena.len()).collect();

    for (idx, slot) in arena.into_iter().enumerate().rev() {
        let mut children = Vec::with_capacity(slot.children.len());
        for child in slot.children {
            if let Some((Some((edge, cycle)), tree)) = built[child].take() {
                children.push(TraversalChild { edge, cycle, tree });
            }
        }
        built[idx] = Some((
            slot.link,
            TraversalTree {
                node: slot.node,
                children,
                truncated: slot.truncated,
            },
        ));
    }

    built
        .into_iter()
        .next()
        .flatten()
        .map(|(_, tree)| tree)
        .ok_or_else(|| GraphnavError::Accessor("traversal produced no root".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{InMemoryGraph, NodeLabel};

    /// A->B, B->C, C->D, A->D
    fn square() -> InMemoryGraph {
        let mut g = InMemoryGraph::new();
        for id in ["A", "B", "C", "D"] {
            g.add_node(Node::entity(id, id));
        }
        g.add_edge(Edge::relates_to("ab", "A", "B", ""));
        g.add_edge(Edge::relates_to("bc", "B", "C", ""));
        g.add_edge(Edge::relates_to("cd", "C", "D", ""));
        g.add_edge(Edge::relates_to("ad", "A", "D", ""));
        g
    }

    #[tokio::test]
    async fn test_depth_zero_is_root_only() {
        let g = square();
        let tree = traverse(&g, "A", 0).await.unwrap();
        assert_eq!(tree.node.id, "A");
        assert!(tree.children.is_empty());
    }

    #[tokio::test]
    async fn test_square_scenario() {
        let g = square();
        let tree = traverse(&g, "A", 2).await.unwrap();
        assert_eq!(tree.child_ids(), vec!["B", "D"]);
        let b = &tree.children[0];
        assert_eq!(b.edge.id, "ab");
        assert_eq!(b.tree.child_ids(), vec!["C"]);
        assert!(b.tree.children[0].tree.children.is_empty());
        let d = &tree.children[1];
        assert!(d.tree.children.is_empty());
        assert_eq!(tree.depth(), 2);
    }

    #[tokio::test]
    async fn test_back_edge_reported_as_cycle() {
        let mut g = square();
        g.add_edge(Edge::relates_to("da", "D", "A", "back"));
        let tree = traverse(&g, "A", 2).await.unwrap();
        let d = &tree.children[1];
        assert_eq!(d.tree.child_ids(), vec!["A"]);
        assert!(d.tree.children[0].cycle);
        assert_eq!(d.tree.children[0].edge.id, "da");
        assert!(d.tree.children[0].tree.children.is_empty());
    }

    #[tokio::test]
    async fn test_cycle_terminates_within_depth() {
        // ring of three: x -> y -> z -> x
        let mut g = InMemoryGraph::new();
        for id in ["x", "y", "z"] {
            g.add_node(Node::entity(id, id));
        }
        g.add_edge(Edge::relates_to("xy", "x", "y", ""));
        g.add_edge(Edge::relates_to("yz", "y", "z", ""));
        g.add_edge(Edge::relates_to("zx", "z", "x", ""));

        for depth in 0..8 {
            let tree = traverse(&g, "x", depth).await.unwrap();
            assert!(tree.depth() <= depth);
            assert!(tree.node_count() <= 4);
        }
        let tree = traverse(&g, "x", 5).await.unwrap();
        let z = &tree.children[0].tree.children[0];
        assert_eq!(z.tree.node.id, "z");
        let back = &z.tree.children[0];
        assert_eq!(back.tree.node.id, "x");
        assert!(back.cycle);
        assert!(back.tree.children.is_empty());
    }

    #[tokio::test]
    async fn test_self_loop_is_cycle() {
        let mut g = square();
        g.add_edge(Edge::relates_to("aa", "A", "A", "self"));
        let tree = traverse(&g, "A", 3).await.unwrap();
        let looped = tree.children.iter().find(|c| c.edge.id == "aa").unwrap();
        assert!(looped.cycle);
        assert!(looped.tree.children.is_empty());
    }

    #[tokio::test]
    async fn test_shared_descendant_expanded_per_branch() {
        // D is reached from A directly and via B->C->D; both copies expand
        let mut g = square();
        g.add_node(Node::entity("E", "E"));
        g.add_edge(Edge::relates_to("de", "D", "E", ""));
        let tree = traverse(&g, "A", 4).await.unwrap();
        let via_chain = &tree.children[0].tree.children[0].tree.children[0];
        assert_eq!(via_chain.tree.node.id, "D");
        assert_eq!(via_chain.tree.child_ids(), vec!["E"]);
        let direct = &tree.children[1];
        assert_eq!(direct.tree.node.id, "D");
        assert_eq!(direct.tree.child_ids(), vec!["E"]);
        assert!(!direct.cycle);
    }

    #[tokio::test]
    async fn test_only_outgoing_entity_edges() {
        let mut g = square();
        g.add_node(Node::entity("ep", "episode").with_label(NodeLabel::Episodic));
        g.add_edge(Edge::relates_to("a-ep", "A", "ep", ""));
        g.add_node(Node::entity("Z", "Z"));
        g.add_edge(Edge::relates_to("za", "Z", "A", "incoming only"));
        let tree = traverse(&g, "A", 1).await.unwrap();
        assert_eq!(tree.child_ids(), vec!["B", "D"]);
    }

    #[tokio::test]
    async fn test_missing_start() {
        let g = square();
        let err = traverse(&g, "nope", 2).await.unwrap_err();
        assert!(matches!(err, GraphnavError::NotFound(ref id) if id == "nope"));
    }

    #[tokio::test]
    async fn test_cycle_flag_omitted_when_false() {
        let g = square();
        let tree = traverse(&g, "A", 1).await.unwrap();
        let value = serde_json::to_value(&tree).unwrap();
        assert!(value["children"][0].get("cycle").is_none());
        assert_eq!(value["children"][0]["tree"]["node"]["id"], "B");
    }

    #[tokio::test]
    async fn test_deterministic() {
        let g = square();
        let first = traverse(&g, "A", 3).await.unwrap();
        let second = traverse(&g, "A", 3).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_truncated_keeps_breadth_first_prefix() {
        let g = square();
        let tree = traverse(&g, "A", 3).await.unwrap();
        // A -> {B, D}, B -> C, C -> D
        assert_eq!(tree.node_count(), 5);

        let cut = tree.truncated_to(2).unwrap();
        assert_eq!(cut.node_count(), 3);
        assert_eq!(cut.child_ids(), vec!["B", "D"]);
        assert!(!cut.truncated);
        assert!(cut.children[0].tree.truncated);
        assert!(cut.children[0].tree.children.is_empty());
        assert!(!cut.children[1].tree.truncated);

        let root_only = tree.truncated_to(0).unwrap();
        assert_eq!(root_only.node_count(), 1);
        assert!(root_only.truncated);

        let whole = tree.truncated_to(tree.node_count()).unwrap();
        assert_eq!(whole, tree);
    }

    #[tokio::test]
    async fn test_truncated_flag_omitted_when_false() {
        let g = square();
        let tree = traverse(&g, "A", 2).await.unwrap();
        let value = serde_json::to_value(&tree).unwrap();
        assert!(value.get("truncated").is_none());
        let value = serde_json::to_value(tree.truncated_to(1).unwrap()).unwrap();
        assert_eq!(value["truncated"], true);
    }
}
