//! Storage-agnostic read interface consumed by the graph algorithms.

use std::collections::HashMap;

use crate::graph::{Direction, Edge, Node};
use crate::Result;

/// Read capability over a graph store.
///
/// Implementations must:
/// - return edges of `get_edges_for_node` in canonical order (edge id ascending);
/// - never return embedding-valued attributes;
/// - report store failures as errors rather than empty results.
///
/// The algorithms re-check node labels and edge types on top of this.
#[allow(async_fn_in_trait)]
pub trait GraphAccessor: Send + Sync {
    /// Fetch a single node. `Ok(None)` when the id does not resolve.
    async fn get_node(&self, id: &str) -> Result<Option<Node>>;

    /// Fetch edges of `type_filter` incident to `id` in the given direction.
    /// A self-loop is returned once.
    async fn get_edges_for_node(
        &self,
        id: &str,
        direction: Direction,
        type_filter: &str,
    ) -> Result<Vec<Edge>>;

    /// Fetch several nodes at once. Missing ids are simply absent.
    async fn get_nodes(&self, ids: &[String]) -> Result<HashMap<String, Node>>;
}
