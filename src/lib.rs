//! Paginated execution of declarative traversal plans against view-based graph stores.
//! Run Criterion benchmarks with `cargo bench` to inspect reports under `target/criterion`.

pub mod backend;
pub mod compiler;
pub mod config;
pub mod dataset;
pub mod errors;
pub mod executor;
pub mod filter;
pub mod instance;
pub mod plan;
pub mod progress;
pub mod prune;
pub mod query;
pub mod side_channel;
pub mod step;
#[cfg(feature = "sqlite-store")]
pub mod store;
pub mod unpack;

pub use crate::backend::QueryBackend;
pub use crate::compiler::{CompiledQuery, compile};
pub use crate::config::EngineConfig;
pub use crate::errors::{GraphQueryError, PAYLOAD_TOO_LARGE};
pub use crate::executor::{DriverState, ExecutionSummary, QueryExecutor};
pub use crate::filter::Filter;
pub use crate::instance::{EdgeRecord, Instance, InstanceId, NodeRecord, ViewId};
pub use crate::plan::{PlanTree, QueryPlan};
pub use crate::progress::{
    ExecutionObserver, LoggingObserver, NoopObserver, ProgressReport, RoundProgress,
};
pub use crate::prune::{PruneReport, remove_not_connected};
pub use crate::query::{QueryRequest, QueryResponse, ResultBatch};
pub use crate::side_channel::SideChannelResolver;
pub use crate::step::{Cardinality, Direction, Selection, Step, Through};
#[cfg(feature = "sqlite-store")]
pub use crate::store::{FaultPoint, SqliteStore, StoreCall};
pub use crate::unpack::{Document, Unpacked, unpack};
