use ahash::AHashSet;
use tracing::debug;

use crate::{
    backend::QueryBackend,
    errors::GraphQueryError,
    filter::Filter,
    instance::{Instance, InstanceId},
    query::{QueryResponse, ResultBatch},
    step::{Step, StepExpression},
};

/// Size limit of the search endpoint's "is one of" clause.
pub const IN_FILTER_CHUNK_SIZE: usize = 100;
/// Per-call result cap of the search endpoint.
pub const SEARCH_LIMIT: usize = 10_000;

/// Resolves reverse one-to-many direct relations with chunked search calls.
pub struct SideChannelResolver<'a, B: QueryBackend + ?Sized> {
    backend: &'a B,
    chunk_size: usize,
    search_limit: usize,
}

impl<'a, B: QueryBackend + ?Sized> SideChannelResolver<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            chunk_size: IN_FILTER_CHUNK_SIZE,
            search_limit: SEARCH_LIMIT,
        }
    }

    pub fn with_limits(mut self, chunk_size: usize, search_limit: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self.search_limit = search_limit;
        self
    }

    /// Splices `step`'s records into `response` if its parent produced records this round.
    /// Returns the number of search calls issued.
    pub fn resolve(
        &self,
        step: &Step,
        response: &mut QueryResponse,
    ) -> Result<usize, GraphQueryError> {
        let through = match &step.expression {
            StepExpression::Nodes(nodes) => nodes.through.as_ref(),
            StepExpression::Edges(_) => {
                return Err(GraphQueryError::configuration(format!(
                    "side-channel step {} must be a node traversal",
                    step.name
                )));
            }
        };
        let Some(through) = through else {
            return Err(GraphQueryError::configuration(format!(
                "side-channel step {} has no through property",
                step.name
            )));
        };
        let Some(parent) = step.parent_name.as_deref() else {
            return Err(GraphQueryError::invalid_plan(format!(
                "side-channel step {} has no parent",
                step.name
            )));
        };
        let parent_ids = match response.get(parent) {
            Some(batch) if !batch.records.is_empty() => distinct_ids(&batch.records),
            _ => return Ok(0),
        };

        let limit = match step.remaining() {
            Some(remaining) => self.search_limit.min(remaining as usize),
            None => self.search_limit,
        };
        let view = through.view.as_ref().or(step.view_id.as_ref());
        let mut records = Vec::new();
        let mut calls = 0;
        for chunk in parent_ids.chunks(self.chunk_size) {
            let selected = Filter::references_any(&through.property, chunk);
            let filter = match &step.raw_filter {
                Some(raw) => selected.and(raw.clone()),
                None => selected,
            };
            let found = self.backend.search_nodes(view, &filter, limit)?;
            calls += 1;
            debug!(
                step = %step.name,
                chunk = chunk.len(),
                found = found.len(),
                "side-channel search"
            );
            records.extend(found.into_iter().map(Instance::Node));
        }
        response.insert(&step.name, ResultBatch::new(records, None));
        Ok(calls)
    }
}

fn distinct_ids(records: &[Instance]) -> Vec<InstanceId> {
    let mut seen = AHashSet::new();
    records
        .iter()
        .map(Instance::id)
        .filter(|id| seen.insert(*id))
        .cloned()
        .collect()
}
