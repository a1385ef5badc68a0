#![allow(dead_code)]

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde_json::{Value, json};
use viewgraph::{
    EdgeRecord, ExecutionObserver, Filter, GraphQueryError, Instance, InstanceId, NodeRecord,
    QueryBackend, QueryRequest, QueryResponse, ResultBatch, RoundProgress, ViewId,
};

pub const SPACE: &str = "test";

pub fn id(xid: &str) -> InstanceId {
    InstanceId::new(SPACE, xid)
}

pub fn reference(xid: &str) -> Value {
    id(xid).to_value()
}

pub fn view() -> ViewId {
    ViewId::new(SPACE, "Asset", "v1")
}

pub fn node(xid: &str, properties: Value) -> Instance {
    Instance::Node(NodeRecord::new(id(xid), properties))
}

pub fn plain_nodes(prefix: &str, count: usize) -> Vec<Instance> {
    (0..count)
        .map(|idx| node(&format!("{prefix}{idx}"), json!({ "idx": idx })))
        .collect()
}

pub fn edge(xid: &str, start: &str, end: &str) -> Instance {
    Instance::Edge(EdgeRecord::new(
        id(xid),
        id("linksTo"),
        id(start),
        id(end),
        json!({}),
    ))
}

pub fn batch(records: Vec<Instance>, cursor: Option<&str>) -> ResultBatch {
    ResultBatch::new(records, cursor.map(str::to_string))
}

pub fn response(batches: Vec<(&str, ResultBatch)>) -> QueryResponse {
    let mut response = QueryResponse::new();
    for (name, batch) in batches {
        response.insert(name, batch);
    }
    response
}

pub enum Scripted {
    Respond(QueryResponse),
    Fail(u16),
}

/// Backend answering `query` from a script and `search_nodes` from a node pool.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<QueryRequest>>,
    searches: Mutex<Vec<(Filter, usize)>>,
    pool: Vec<NodeRecord>,
    count: Option<u64>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, response: QueryResponse) -> Self {
        self.script.lock().push_back(Scripted::Respond(response));
        self
    }

    pub fn fail(self, code: u16) -> Self {
        self.script.lock().push_back(Scripted::Fail(code));
        self
    }

    pub fn with_pool(mut self, pool: Vec<Instance>) -> Self {
        self.pool = pool
            .into_iter()
            .filter_map(|record| match record {
                Instance::Node(node) => Some(node),
                Instance::Edge(_) => None,
            })
            .collect();
        self
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    pub fn requests(&self) -> Vec<QueryRequest> {
        self.requests.lock().clone()
    }

    pub fn searches(&self) -> Vec<(Filter, usize)> {
        self.searches.lock().clone()
    }
}

impl QueryBackend for ScriptedBackend {
    fn query(&self, request: &QueryRequest) -> Result<QueryResponse, GraphQueryError> {
        self.requests.lock().push(request.clone());
        match self.script.lock().pop_front() {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(code)) => Err(GraphQueryError::store(code, "scripted failure")),
            None => Ok(QueryResponse::new()),
        }
    }

    fn search_nodes(
        &self,
        _view: Option<&ViewId>,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<NodeRecord>, GraphQueryError> {
        self.searches.lock().push((filter.clone(), limit));
        Ok(self
            .pool
            .iter()
            .filter(|node| filter.matches(&Instance::Node((*node).clone())))
            .take(limit)
            .cloned()
            .collect())
    }

    fn count_nodes(
        &self,
        _view: Option<&ViewId>,
        _filter: Option<&Filter>,
    ) -> Result<u64, GraphQueryError> {
        self.count
            .ok_or_else(|| GraphQueryError::store(503, "count unavailable"))
    }
}

#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub rounds: Vec<RoundProgress>,
    pub reductions: Vec<u64>,
}

impl ExecutionObserver for RecordingObserver {
    fn on_round_complete(&mut self, progress: &RoundProgress) {
        self.rounds.push(*progress);
    }

    fn on_batch_reduced(&mut self, new_limit: u64) {
        self.reductions.push(new_limit);
    }
}
