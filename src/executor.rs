//! Pagination driver: runs a [`QueryPlan`] against a [`QueryBackend`] round by round
//! until the root step is exhausted.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::{
    backend::QueryBackend,
    compiler::compile,
    config::EngineConfig,
    errors::GraphQueryError,
    plan::QueryPlan,
    progress::{ExecutionObserver, LoggingObserver, RoundProgress},
    prune::remove_not_connected,
    side_channel::SideChannelResolver,
    step::StepExpression,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Init,
    Running,
    Adapting,
    Done,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecutionSummary {
    /// Rounds whose data was consumed.
    pub rounds: usize,
    /// Requests sent to the store, including rejected oversized attempts.
    pub attempts: usize,
    pub batch_reductions: usize,
    pub side_channel_calls: usize,
    pub estimated_total: Option<u64>,
    pub elapsed: Duration,
}

pub struct QueryExecutor<'a, B: QueryBackend + ?Sized> {
    backend: &'a B,
    config: EngineConfig,
}

impl<'a, B: QueryBackend + ?Sized> QueryExecutor<'a, B> {
    pub fn new(backend: &'a B, config: EngineConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn execute(&self, plan: &mut QueryPlan) -> Result<ExecutionSummary, GraphQueryError> {
        let mut observer = LoggingObserver::new(&self.config);
        self.execute_with_observer(plan, &mut observer)
    }

    pub fn execute_with_observer(
        &self,
        plan: &mut QueryPlan,
        observer: &mut dyn ExecutionObserver,
    ) -> Result<ExecutionSummary, GraphQueryError> {
        self.config.validate()?;
        if plan.is_empty() {
            return Err(GraphQueryError::invalid_plan("plan has no steps"));
        }
        plan.reset();
        for step in plan.steps_mut() {
            step.clamp_batch_limit(self.config.max_batch_limit);
        }

        let started = Instant::now();
        let resolver = SideChannelResolver::new(self.backend)
            .with_limits(self.config.in_filter_chunk_size, self.config.search_limit);
        let mut summary = ExecutionSummary {
            estimated_total: self.estimate_total(plan),
            ..ExecutionSummary::default()
        };
        let mut state = DriverState::Init;
        let mut warned = false;
        let mut at_floor = false;

        while state != DriverState::Done {
            for step in plan.steps_mut() {
                step.update_limit_for_round();
            }
            let compiled = compile(plan)?;
            let round_started = Instant::now();
            summary.attempts += 1;
            let mut response = match self.backend.query(&compiled.request) {
                Ok(response) => response,
                Err(err) if err.is_oversized() => {
                    if !plan.reduce_batch_caps() {
                        if at_floor {
                            return Err(err);
                        }
                        at_floor = true;
                    }
                    state = DriverState::Adapting;
                    summary.batch_reductions += 1;
                    let new_limit = plan.root().map_or(1, |root| root.max_batch_limit());
                    debug!(?state, new_limit, "oversized query rejected");
                    if !warned {
                        observer.on_batch_reduced(new_limit);
                        warned = true;
                    }
                    continue;
                }
                Err(err) => return Err(err),
            };
            state = DriverState::Running;

            for name in &compiled.side_channel {
                let Some(step) = plan.step(name) else {
                    continue;
                };
                summary.side_channel_calls += resolver.resolve(step, &mut response)?;
            }
            for (name, batch) in response {
                let Some(step) = plan.step_mut(&name) else {
                    continue;
                };
                if compiled.temporary_selects.contains(&name) {
                    step.skip_batch(batch);
                } else {
                    step.record_batch(batch);
                }
            }
            summary.rounds += 1;

            if let Some(root) = plan.root() {
                let progress = RoundProgress {
                    round: summary.rounds,
                    batch_count: root.last_batch_count(),
                    retrieved: root.total_retrieved(),
                    estimated_total: summary.estimated_total,
                    round_elapsed: round_started.elapsed(),
                    total_elapsed: started.elapsed(),
                };
                debug!(
                    round = progress.round,
                    batch = progress.batch_count,
                    retrieved = progress.retrieved,
                    "round complete"
                );
                observer.on_round_complete(&progress);
            }
            if plan.is_exhausted() {
                state = DriverState::Done;
            }
        }

        if self.config.remove_not_connected {
            remove_not_connected(plan)?;
        }
        summary.elapsed = started.elapsed();
        Ok(summary)
    }

    /// Best-effort size of the root result; any failure only disables the estimate.
    fn estimate_total(&self, plan: &QueryPlan) -> Option<u64> {
        if !self.config.estimate_total {
            return None;
        }
        let root = plan.root()?;
        if !matches!(root.expression, StepExpression::Nodes(_)) {
            return None;
        }
        match self
            .backend
            .count_nodes(root.view_id.as_ref(), root.raw_filter.as_ref())
        {
            Ok(count) => Some(root.max_retrieve_limit.map_or(count, |limit| count.min(limit))),
            Err(err) => {
                debug!(error = %err, "count unavailable, progress estimate disabled");
                None
            }
        }
    }
}
