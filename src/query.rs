//! Wire-level request and response shapes exchanged with the store once per round.

use std::collections::BTreeMap;

use ahash::AHashMap;
use serde::Serialize;

use crate::{
    filter::Filter,
    instance::{Instance, ViewId},
    step::{Selection, StepExpression},
};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResultSetExpression {
    pub from: Option<String>,
    #[serde(flatten)]
    pub traversal: StepExpression,
    pub view: Option<ViewId>,
    pub filter: Option<Filter>,
    pub limit: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WithClause {
    pub name: String,
    pub expression: ResultSetExpression,
}

/// One combined request. `with` is in plan order so parents precede children.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct QueryRequest {
    pub with: Vec<WithClause>,
    pub select: BTreeMap<String, Selection>,
    pub cursors: BTreeMap<String, String>,
}

impl QueryRequest {
    pub fn expression(&self, name: &str) -> Option<&ResultSetExpression> {
        self.with
            .iter()
            .find(|clause| clause.name == name)
            .map(|clause| &clause.expression)
    }

    pub fn total_limit(&self) -> u64 {
        self.with
            .iter()
            .map(|clause| clause.expression.limit)
            .sum()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultBatch {
    pub records: Vec<Instance>,
    /// Continuation token; `None` once the stream is exhausted.
    pub cursor: Option<String>,
}

impl ResultBatch {
    pub fn new(records: Vec<Instance>, cursor: Option<String>) -> Self {
        Self { records, cursor }
    }
}

#[derive(Clone, Debug, Default)]
pub struct QueryResponse {
    batches: AHashMap<String, ResultBatch>,
}

impl QueryResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, batch: ResultBatch) {
        self.batches.insert(name.to_string(), batch);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.batches.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ResultBatch> {
        self.batches.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ResultBatch> {
        self.batches.remove(name)
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.batches.keys().map(String::as_str)
    }
}

impl IntoIterator for QueryResponse {
    type Item = (String, ResultBatch);
    type IntoIter = std::collections::hash_map::IntoIter<String, ResultBatch>;

    fn into_iter(self) -> Self::IntoIter {
        self.batches.into_iter()
    }
}
