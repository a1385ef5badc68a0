//! In-process reference store. Nodes and edges live in SQLite with their properties
//! stored as JSON; [`SqliteStore`] answers the same traversal, search and count calls a
//! remote view-based graph store would, with offset cursors, a payload limit that
//! triggers the oversized-query error, scripted faults and a call log.

mod faults;
mod schema;

use std::{collections::BTreeMap, path::Path};

use ahash::AHashSet;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Map, Value};

use crate::{
    backend::QueryBackend,
    errors::GraphQueryError,
    filter::Filter,
    instance::{EdgeRecord, Instance, InstanceId, NodeRecord, ViewId},
    query::{QueryRequest, QueryResponse, ResultBatch, ResultSetExpression},
    step::{Direction, Selection, StepExpression},
};

pub use faults::{FaultPoint, FaultRegistry};
use schema::ensure_schema;

const BAD_REQUEST: u16 = 400;

const NODE_COLUMNS: &str = "id, space, external_id, view, data";
const EDGE_COLUMNS: &str = "id, space, external_id, type_space, type_external_id, \
     start_space, start_external_id, end_space, end_external_id, data";

#[derive(Clone, Debug, PartialEq)]
pub enum StoreCall {
    Query {
        limits: BTreeMap<String, u64>,
        cursors: BTreeMap<String, String>,
    },
    Search {
        filter: Filter,
        limit: usize,
    },
    Count,
}

pub struct SqliteStore {
    conn: Connection,
    payload_limit: u64,
    page_size: Option<u64>,
    faults: FaultRegistry,
    calls: Mutex<Vec<StoreCall>>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GraphQueryError> {
        let conn =
            Connection::open(path).map_err(|e| GraphQueryError::connection(e.to_string()))?;
        ensure_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, GraphQueryError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| GraphQueryError::connection(e.to_string()))?;
        ensure_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Requests whose summed step limits exceed `limit` are rejected as oversized.
    pub fn with_payload_limit(mut self, limit: u64) -> Self {
        self.payload_limit = limit;
        self
    }

    /// Caps every step's page regardless of the requested limit.
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    pub fn faults(&self) -> &FaultRegistry {
        &self.faults
    }

    pub fn fail_next(&self, point: FaultPoint, failures: usize, code: u16) {
        self.faults.configure(point, failures, code);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn insert_node(
        &self,
        view: Option<&ViewId>,
        node: &NodeRecord,
    ) -> Result<i64, GraphQueryError> {
        validate_id(&node.id)?;
        let data = serde_json::to_string(&node.properties)
            .map_err(|e| GraphQueryError::invalid_input(e.to_string()))?;
        self.conn
            .execute(
                "INSERT INTO store_nodes(space, external_id, view, data) VALUES(?1, ?2, ?3, ?4)",
                params![
                    node.id.space.as_str(),
                    node.id.external_id.as_str(),
                    view.map(ViewId::to_string),
                    data,
                ],
            )
            .map_err(|e| GraphQueryError::query(e.to_string()))?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_edge(&self, edge: &EdgeRecord) -> Result<i64, GraphQueryError> {
        validate_id(&edge.id)?;
        validate_id(&edge.start_node)?;
        validate_id(&edge.end_node)?;
        let data = serde_json::to_string(&edge.properties)
            .map_err(|e| GraphQueryError::invalid_input(e.to_string()))?;
        self.conn
            .execute(
                "INSERT INTO store_edges(space, external_id, type_space, type_external_id, \
                 start_space, start_external_id, end_space, end_external_id, data) \
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    edge.id.space.as_str(),
                    edge.id.external_id.as_str(),
                    edge.edge_type.space.as_str(),
                    edge.edge_type.external_id.as_str(),
                    edge.start_node.space.as_str(),
                    edge.start_node.external_id.as_str(),
                    edge.end_node.space.as_str(),
                    edge.end_node.external_id.as_str(),
                    data,
                ],
            )
            .map_err(|e| GraphQueryError::query(e.to_string()))?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn node_count(&self) -> Result<u64, GraphQueryError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM store_nodes", [], |row| row.get(0))
            .map_err(|e| GraphQueryError::query(e.to_string()))?;
        Ok(count.max(0) as u64)
    }
}

impl QueryBackend for SqliteStore {
    fn query(&self, request: &QueryRequest) -> Result<QueryResponse, GraphQueryError> {
        self.calls.lock().push(StoreCall::Query {
            limits: request
                .with
                .iter()
                .map(|clause| (clause.name.clone(), clause.expression.limit))
                .collect(),
            cursors: request.cursors.clone(),
        });
        self.faults.check(FaultPoint::Query)?;
        let payload = request.total_limit();
        if payload > self.payload_limit {
            return Err(GraphQueryError::oversized(format!(
                "requested {payload} instances, limit is {}",
                self.payload_limit
            )));
        }

        let mut pages: BTreeMap<&str, Vec<Instance>> = BTreeMap::new();
        // Position of every result set's page; a child cursor is only valid for the
        // parent page it was issued against.
        let mut page_keys: BTreeMap<&str, String> = BTreeMap::new();
        let mut response = QueryResponse::new();
        for clause in &request.with {
            let expression = &clause.expression;
            let parent = match expression.from.as_deref() {
                Some(from) => Some(pages.get(from).map(Vec::as_slice).ok_or_else(|| {
                    GraphQueryError::store(BAD_REQUEST, format!("unknown result set {from}"))
                })?),
                None => None,
            };
            let matching: Vec<Instance> = self
                .candidates(expression, parent)?
                .into_iter()
                .filter(|instance| {
                    expression
                        .filter
                        .as_ref()
                        .is_none_or(|filter| filter.matches(instance))
                })
                .collect();

            let parent_key = expression
                .from
                .as_deref()
                .and_then(|from| page_keys.get(from))
                .cloned();
            let offset = match request.cursors.get(&clause.name) {
                Some(cursor) => decode_cursor(cursor, parent_key.as_deref())?,
                None => 0,
            };
            let take = expression.limit.min(self.page_size.unwrap_or(u64::MAX)) as usize;
            let end = offset.saturating_add(take).min(matching.len());
            let page = matching.get(offset..end).map(<[Instance]>::to_vec).unwrap_or_default();
            let cursor =
                (end < matching.len()).then(|| encode_cursor(parent_key.as_deref(), end));
            let page_key = match parent_key {
                Some(parent_key) => format!("{parent_key}/{offset}"),
                None => offset.to_string(),
            };
            page_keys.insert(clause.name.as_str(), page_key);

            if let Some(selection) = request.select.get(&clause.name) {
                let records = page.iter().map(|record| project(record, selection)).collect();
                response.insert(&clause.name, ResultBatch::new(records, cursor));
            }
            pages.insert(clause.name.as_str(), page);
        }
        Ok(response)
    }

    fn search_nodes(
        &self,
        view: Option<&ViewId>,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<NodeRecord>, GraphQueryError> {
        self.calls.lock().push(StoreCall::Search {
            filter: filter.clone(),
            limit,
        });
        self.faults.check(FaultPoint::Search)?;
        Ok(self
            .load_nodes(view)?
            .into_iter()
            .map(|(_, node)| Instance::Node(node))
            .filter(|instance| filter.matches(instance))
            .take(limit)
            .filter_map(|instance| match instance {
                Instance::Node(node) => Some(node),
                Instance::Edge(_) => None,
            })
            .collect())
    }

    fn count_nodes(
        &self,
        view: Option<&ViewId>,
        filter: Option<&Filter>,
    ) -> Result<u64, GraphQueryError> {
        self.calls.lock().push(StoreCall::Count);
        self.faults.check(FaultPoint::Count)?;
        let count = self
            .load_nodes(view)?
            .into_iter()
            .map(|(_, node)| Instance::Node(node))
            .filter(|instance| filter.is_none_or(|filter| filter.matches(instance)))
            .count();
        Ok(count as u64)
    }
}

impl SqliteStore {
    fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            payload_limit: u64::MAX,
            page_size: None,
            faults: FaultRegistry::default(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn candidates(
        &self,
        expression: &ResultSetExpression,
        parent: Option<&[Instance]>,
    ) -> Result<Vec<Instance>, GraphQueryError> {
        let view = expression.view.as_ref();
        let rows = match (&expression.traversal, parent) {
            (StepExpression::Nodes(_), None) => nodes_only(self.load_nodes(view)?),
            (StepExpression::Nodes(nodes), Some(parent)) => {
                let parent_nodes: Vec<&NodeRecord> =
                    parent.iter().filter_map(Instance::as_node).collect();
                match (&nodes.through, nodes.direction) {
                    (Some(through), Direction::Outwards) => {
                        let ids: Vec<InstanceId> = parent_nodes
                            .iter()
                            .flat_map(|node| node.relation_ids(&through.property))
                            .collect();
                        nodes_only(self.nodes_by_ids(&ids, view)?)
                    }
                    (Some(through), Direction::Inwards) => {
                        let parent_ids: AHashSet<&InstanceId> =
                            parent_nodes.iter().map(|node| &node.id).collect();
                        let referencing = self
                            .load_nodes(view)?
                            .into_iter()
                            .filter(|(_, node)| {
                                node.relation_ids(&through.property)
                                    .iter()
                                    .any(|id| parent_ids.contains(id))
                            })
                            .collect();
                        nodes_only(referencing)
                    }
                    (None, direction) => {
                        if !parent_nodes.is_empty() {
                            return Err(GraphQueryError::store(
                                BAD_REQUEST,
                                "node traversal from nodes requires a through property",
                            ));
                        }
                        let ids: Vec<InstanceId> = parent
                            .iter()
                            .filter_map(Instance::as_edge)
                            .map(|edge| match direction {
                                Direction::Outwards => edge.end_node.clone(),
                                Direction::Inwards => edge.start_node.clone(),
                            })
                            .collect();
                        nodes_only(self.nodes_by_ids(&ids, view)?)
                    }
                }
            }
            (StepExpression::Edges(edges), parent) => {
                let rows = match parent {
                    None => self.load_edges(None)?,
                    Some(parent) => {
                        if parent.iter().any(|record| record.as_edge().is_some()) {
                            return Err(GraphQueryError::store(
                                BAD_REQUEST,
                                "edge traversal must start from nodes",
                            ));
                        }
                        let ids: Vec<InstanceId> =
                            parent.iter().map(|record| record.id().clone()).collect();
                        self.load_edges(Some((ids.as_slice(), edges.direction)))?
                    }
                };
                rows.into_iter()
                    .filter(|(_, edge)| {
                        edges
                            .edge_type
                            .as_ref()
                            .is_none_or(|edge_type| &edge.edge_type == edge_type)
                    })
                    .map(|(rowid, edge)| (rowid, Instance::Edge(edge)))
                    .collect()
            }
        };
        Ok(ordered(rows))
    }

    fn load_nodes(&self, view: Option<&ViewId>) -> Result<Vec<(i64, NodeRecord)>, GraphQueryError> {
        let (sql, args) = match view {
            Some(view) => (
                format!("SELECT {NODE_COLUMNS} FROM store_nodes WHERE view=?1 ORDER BY id"),
                vec![view.to_string()],
            ),
            None => (
                format!("SELECT {NODE_COLUMNS} FROM store_nodes ORDER BY id"),
                Vec::new(),
            ),
        };
        let mut stmt = self
            .conn
            .prepare_cached(&sql)
            .map_err(|e| GraphQueryError::query(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), row_to_node)
            .map_err(|e| GraphQueryError::query(e.to_string()))?;
        let mut nodes = Vec::new();
        for row in rows {
            let (rowid, _, node) = row.map_err(|e| GraphQueryError::query(e.to_string()))?;
            nodes.push((rowid, node));
        }
        Ok(nodes)
    }

    fn nodes_by_ids(
        &self,
        ids: &[InstanceId],
        view: Option<&ViewId>,
    ) -> Result<Vec<(i64, NodeRecord)>, GraphQueryError> {
        let wanted_view = view.map(ViewId::to_string);
        let mut stmt = self
            .conn
            .prepare_cached(&format!(
                "SELECT {NODE_COLUMNS} FROM store_nodes WHERE space=?1 AND external_id=?2"
            ))
            .map_err(|e| GraphQueryError::query(e.to_string()))?;
        let mut nodes = Vec::new();
        for id in ids {
            let found = stmt
                .query_row(params![id.space, id.external_id], row_to_node)
                .optional()
                .map_err(|e| GraphQueryError::query(e.to_string()))?;
            if let Some((rowid, node_view, node)) = found {
                if wanted_view.is_none() || node_view == wanted_view {
                    nodes.push((rowid, node));
                }
            }
        }
        Ok(nodes)
    }

    fn load_edges(
        &self,
        touching: Option<(&[InstanceId], Direction)>,
    ) -> Result<Vec<(i64, EdgeRecord)>, GraphQueryError> {
        let Some((ids, direction)) = touching else {
            let mut stmt = self
                .conn
                .prepare_cached(&format!("SELECT {EDGE_COLUMNS} FROM store_edges ORDER BY id"))
                .map_err(|e| GraphQueryError::query(e.to_string()))?;
            let rows = stmt
                .query_map([], row_to_edge)
                .map_err(|e| GraphQueryError::query(e.to_string()))?;
            let mut edges = Vec::new();
            for row in rows {
                edges.push(row.map_err(|e| GraphQueryError::query(e.to_string()))?);
            }
            return Ok(edges);
        };
        let sql = match direction {
            Direction::Outwards => format!(
                "SELECT {EDGE_COLUMNS} FROM store_edges \
                 WHERE start_space=?1 AND start_external_id=?2 ORDER BY id"
            ),
            Direction::Inwards => format!(
                "SELECT {EDGE_COLUMNS} FROM store_edges \
                 WHERE end_space=?1 AND end_external_id=?2 ORDER BY id"
            ),
        };
        let mut stmt = self
            .conn
            .prepare_cached(&sql)
            .map_err(|e| GraphQueryError::query(e.to_string()))?;
        let mut edges = Vec::new();
        for id in ids {
            let rows = stmt
                .query_map(params![id.space, id.external_id], row_to_edge)
                .map_err(|e| GraphQueryError::query(e.to_string()))?;
            for row in rows {
                edges.push(row.map_err(|e| GraphQueryError::query(e.to_string()))?);
            }
        }
        Ok(edges)
    }
}

fn encode_cursor(parent_key: Option<&str>, offset: usize) -> String {
    match parent_key {
        Some(parent_key) => format!("{parent_key}@{offset}"),
        None => offset.to_string(),
    }
}

/// Offset encoded in `cursor`. A child cursor issued against another parent page
/// restarts at 0.
fn decode_cursor(cursor: &str, parent_key: Option<&str>) -> Result<usize, GraphQueryError> {
    let invalid = || GraphQueryError::store(BAD_REQUEST, format!("invalid cursor {cursor}"));
    match parent_key {
        None => cursor.parse().map_err(|_| invalid()),
        Some(parent_key) => {
            let (issued_for, offset) = cursor.rsplit_once('@').ok_or_else(invalid)?;
            let offset = offset.parse().map_err(|_| invalid())?;
            Ok(if issued_for == parent_key { offset } else { 0 })
        }
    }
}

fn nodes_only(rows: Vec<(i64, NodeRecord)>) -> Vec<(i64, Instance)> {
    rows.into_iter()
        .map(|(rowid, node)| (rowid, Instance::Node(node)))
        .collect()
}

/// Storage order with duplicates (reached through several parents) collapsed.
fn ordered(mut rows: Vec<(i64, Instance)>) -> Vec<Instance> {
    rows.sort_by_key(|(rowid, _)| *rowid);
    rows.dedup_by_key(|(rowid, _)| *rowid);
    rows.into_iter().map(|(_, instance)| instance).collect()
}

fn project(instance: &Instance, selection: &Selection) -> Instance {
    let Selection::Properties(keep) = selection else {
        return instance.clone();
    };
    let retain = |properties: &Map<String, Value>| -> Map<String, Value> {
        properties
            .iter()
            .filter(|(key, _)| keep.contains(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    };
    match instance {
        Instance::Node(node) => Instance::Node(NodeRecord {
            id: node.id.clone(),
            properties: retain(&node.properties),
        }),
        Instance::Edge(edge) => Instance::Edge(EdgeRecord {
            properties: retain(&edge.properties),
            ..edge.clone()
        }),
    }
}

fn validate_id(id: &InstanceId) -> Result<(), GraphQueryError> {
    if id.space.trim().is_empty() || id.external_id.trim().is_empty() {
        return Err(GraphQueryError::invalid_input(
            "instance space and external id must be set",
        ));
    }
    Ok(())
}

fn parse_properties(data: String) -> Result<Map<String, Value>, rusqlite::Error> {
    serde_json::from_str(&data).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            data.len(),
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

fn row_to_node(
    row: &rusqlite::Row<'_>,
) -> Result<(i64, Option<String>, NodeRecord), rusqlite::Error> {
    let data: String = row.get(4)?;
    Ok((
        row.get(0)?,
        row.get(3)?,
        NodeRecord {
            id: InstanceId::new(row.get::<_, String>(1)?, row.get::<_, String>(2)?),
            properties: parse_properties(data)?,
        },
    ))
}

fn row_to_edge(row: &rusqlite::Row<'_>) -> Result<(i64, EdgeRecord), rusqlite::Error> {
    let data: String = row.get(9)?;
    Ok((
        row.get(0)?,
        EdgeRecord {
            id: InstanceId::new(row.get::<_, String>(1)?, row.get::<_, String>(2)?),
            edge_type: InstanceId::new(row.get::<_, String>(3)?, row.get::<_, String>(4)?),
            start_node: InstanceId::new(row.get::<_, String>(5)?, row.get::<_, String>(6)?),
            end_node: InstanceId::new(row.get::<_, String>(7)?, row.get::<_, String>(8)?),
            properties: parse_properties(data)?,
        },
    ))
}
