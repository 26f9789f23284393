use crate::graph::snapshot::Snapshot;
use crate::graph::{Direction, Edge, GraphAccessor};
use crate::Result;

/// Every `RELATES_TO` edge touching `entity_id` whose other endpoint is an
/// Entity, in canonical (edge id) order.
pub async fn entity_relations<A: GraphAccessor>(accessor: &A, entity_id: &str) -> Result<Vec<Edge>> {
    let mut snapshot = Snapshot::new(accessor);
    snapshot.require_entity(entity_id).await?;
    let edges: Vec<Edge> = snapshot
        .neighbors(entity_id, Direction::Both)
        .await?
        .into_iter()
        .map(|n| n.edge)
        .collect();
    log::debug!("{} relation(s) for {}", edges.len(), entity_id);
    Ok(edges)
}
