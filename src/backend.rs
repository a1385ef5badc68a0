//! Contract between the execution engine and the remote graph store. The engine only
//! ever talks to the store through [`QueryBackend`]; [`crate::store::SqliteStore`] is the
//! in-process reference implementation.

use crate::{
    errors::GraphQueryError,
    filter::Filter,
    instance::{NodeRecord, ViewId},
    query::{QueryRequest, QueryResponse},
};

pub trait QueryBackend {
    /// Runs one combined traversal request. Oversized requests fail with
    /// [`GraphQueryError::is_oversized`] set.
    fn query(&self, request: &QueryRequest) -> Result<QueryResponse, GraphQueryError>;

    /// Unpaginated node search, capped at `limit` results.
    fn search_nodes(
        &self,
        view: Option<&ViewId>,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<NodeRecord>, GraphQueryError>;

    /// Approximate number of nodes matching `filter`.
    fn count_nodes(
        &self,
        view: Option<&ViewId>,
        filter: Option<&Filter>,
    ) -> Result<u64, GraphQueryError>;
}

impl<'a, B> QueryBackend for &'a B
where
    B: QueryBackend + ?Sized,
{
    fn query(&self, request: &QueryRequest) -> Result<QueryResponse, GraphQueryError> {
        (*self).query(request)
    }

    fn search_nodes(
        &self,
        view: Option<&ViewId>,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<NodeRecord>, GraphQueryError> {
        (*self).search_nodes(view, filter, limit)
    }

    fn count_nodes(
        &self,
        view: Option<&ViewId>,
        filter: Option<&Filter>,
    ) -> Result<u64, GraphQueryError> {
        (*self).count_nodes(view, filter)
    }
}
