//! Read-only `GraphAccessor` over the SQLite graph store.
//!
//! Only `Entity` nodes are ever selected, and edges are joined against their
//! endpoints so a `RELATES_TO` edge into a provenance node never leaves the
//! database. Vector columns (`name_embedding`, `fact_embedding`) are not
//! selected.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params_from_iter, Connection, Row};
use serde_json::{Map, Value};

use crate::db::Db;
use crate::graph::{strip_embeddings, Direction, Edge, GraphAccessor, Node, NodeLabel};
use crate::{GraphnavError, Result};

// SQLite's default host parameter limit is 999 on older builds.
const IN_CHUNK: usize = 500;

const NODE_COLUMNS: &str = "id, label, name, summary, group_id, attributes_json, created_at";

const EDGE_SELECT: &str = "SELECT e.id, e.edge_type, e.name, e.source_id, e.target_id, e.fact, \
            e.valid_at, e.invalid_at, e.episodes_json, e.attributes_json, e.created_at \
     FROM edges e \
     JOIN nodes s ON s.id = e.source_id AND s.label = 'Entity' \
     JOIN nodes t ON t.id = e.target_id AND t.label = 'Entity'";

const RELATION_COUNT: &str = "SELECT COUNT(*) FROM edges e \
     JOIN nodes s ON s.id = e.source_id AND s.label = 'Entity' \
     JOIN nodes t ON t.id = e.target_id AND t.label = 'Entity' \
     WHERE e.edge_type = 'RELATES_TO'";

pub struct SqliteGraph {
    db: Db,
}

impl SqliteGraph {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Open an existing graph database.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        if !path.exists() {
            return Err(GraphnavError::Config(format!(
                "Graph database not found: {}",
                path.display()
            )));
        }
        Ok(Self::new(Db::new(path)))
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Entity and entity-to-entity `RELATES_TO` totals, for `verify` and
    /// startup logging.
    pub async fn counts(&self) -> Result<(usize, usize)> {
        self.db
            .with_connection(|conn| {
                let nodes: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM nodes WHERE label = 'Entity'",
                    [],
                    |row| row.get(0),
                )?;
                let edges: i64 = conn.query_row(RELATION_COUNT, [], |row| row.get(0))?;
                Ok((nodes as usize, edges as usize))
            })
            .await
    }
}

struct RawNode {
    id: String,
    label: String,
    name: String,
    summary: String,
    group_id: Option<String>,
    attributes_json: String,
    created_at: String,
}

impl RawNode {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            label: row.get(1)?,
            name: row.get(2)?,
            summary: row.get(3)?,
            group_id: row.get(4)?,
            attributes_json: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_node(self) -> Result<Node> {
        let mut attributes = parse_object(&self.attributes_json, &self.id)?;
        strip_embeddings(&mut attributes);
        Ok(Node {
            created_at: parse_time(&self.created_at, &self.id)?,
            id: self.id,
            label: NodeLabel::from(self.label),
            name: self.name,
            summary: self.summary,
            group_id: self.group_id,
            attributes,
        })
    }
}

struct RawEdge {
    id: String,
    edge_type: String,
    name: String,
    source_id: String,
    target_id: String,
    fact: String,
    valid_at: Option<String>,
    invalid_at: Option<String>,
    episodes_json: String,
    attributes_json: String,
    created_at: String,
}

impl RawEdge {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            edge_type: row.get(1)?,
            name: row.get(2)?,
            source_id: row.get(3)?,
            target_id: row.get(4)?,
            fact: row.get(5)?,
            valid_at: row.get(6)?,
            invalid_at: row.get(7)?,
            episodes_json: row.get(8)?,
            attributes_json: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    fn into_edge(self) -> Result<Edge> {
        let mut attributes = parse_object(&self.attributes_json, &self.id)?;
        strip_embeddings(&mut attributes);
        let episodes: Vec<String> = serde_json::from_str(&self.episodes_json).map_err(|e| {
            GraphnavError::Accessor(format!("edge {}: invalid episodes_json: {}", self.id, e))
        })?;
        Ok(Edge {
            valid_at: parse_optional_time(self.valid_at.as_deref(), &self.id)?,
            invalid_at: parse_optional_time(self.invalid_at.as_deref(), &self.id)?,
            created_at: parse_time(&self.created_at, &self.id)?,
            id: self.id,
            edge_type: self.edge_type,
            name: self.name,
            source_id: self.source_id,
            target_id: self.target_id,
            fact: self.fact,
            episodes,
            attributes,
        })
    }
}

fn parse_object(json: &str, owner: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(other) => Err(GraphnavError::Accessor(format!(
            "{}: attributes_json is not an object: {}",
            owner, other
        ))),
        Err(e) => Err(GraphnavError::Accessor(format!(
            "{}: invalid attributes_json: {}",
            owner, e
        ))),
    }
}

fn parse_time(value: &str, owner: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| GraphnavError::Accessor(format!("{}: invalid timestamp {:?}: {}", owner, value, e)))
}

fn parse_optional_time(value: Option<&str>, owner: &str) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_time(v, owner)).transpose()
}

fn query_nodes(conn: &Connection, ids: &[String]) -> Result<Vec<RawNode>> {
    let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let query = format!(
        "SELECT {} FROM nodes WHERE label = 'Entity' AND id IN ({})",
        NODE_COLUMNS, placeholders
    );
    let mut stmt = conn.prepare(&query)?;
    let rows = stmt.query_map(params_from_iter(ids.iter()), RawNode::from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

impl GraphAccessor for SqliteGraph {
    async fn get_node(&self, id: &str) -> Result<Option<Node>> {
        let id = id.to_string();
        let raw = self
            .db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM nodes WHERE id = ?1 AND label = 'Entity'",
                    NODE_COLUMNS
                ))?;
                let mut rows = stmt.query_map([&id], RawNode::from_row)?;
                Ok(rows.next().transpose()?)
            })
            .await?;
        raw.map(RawNode::into_node).transpose()
    }

    async fn get_edges_for_node(
        &self,
        id: &str,
        direction: Direction,
        type_filter: &str,
    ) -> Result<Vec<Edge>> {
        let condition = match direction {
            Direction::Outgoing => "e.source_id = ?1",
            Direction::Incoming => "e.target_id = ?1",
            Direction::Both => "(e.source_id = ?1 OR e.target_id = ?1)",
        };
        let query = format!(
            "{} WHERE {} AND e.edge_type = ?2 ORDER BY e.id",
            EDGE_SELECT, condition
        );
        let id = id.to_string();
        let type_filter = type_filter.to_string();

        let raw = self
            .db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(&query)?;
                let rows = stmt.query_map([&id, &type_filter], RawEdge::from_row)?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await?;
        raw.into_iter().map(RawEdge::into_edge).collect()
    }

    async fn get_nodes(&self, ids: &[String]) -> Result<HashMap<String, Node>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids = ids.to_vec();
        let raw = self
            .db
            .with_connection(move |conn| {
                let mut out = Vec::with_capacity(ids.len());
                for chunk in ids.chunks(IN_CHUNK) {
                    out.extend(query_nodes(conn, chunk)?);
                }
                Ok(out)
            })
            .await?;

        let mut nodes = HashMap::with_capacity(raw.len());
        for r in raw {
            let node = r.into_node()?;
            nodes.insert(node.id.clone(), node);
        }
        Ok(nodes)
    }
}
