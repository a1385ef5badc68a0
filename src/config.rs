//! Tunables of the execution engine.

use std::{env, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    errors::GraphQueryError,
    side_channel::{IN_FILTER_CHUNK_SIZE, SEARCH_LIMIT},
    step::ACTUAL_INSTANCE_QUERY_LIMIT,
};

const MAX_BATCH_LIMIT_ENV: &str = "VIEWGRAPH_MAX_BATCH_LIMIT";
const REMOVE_NOT_CONNECTED_ENV: &str = "VIEWGRAPH_REMOVE_NOT_CONNECTED";

/// Engine configuration.
///
/// ```rust
/// use viewgraph::EngineConfig;
/// let config = EngineConfig::default();
/// assert_eq!(config.max_batch_limit, 10_000);
/// assert_eq!(config.in_filter_chunk_size, 100);
/// assert!(!config.remove_not_connected);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Initial adaptive cap; the store's hard per-request limit.
    pub max_batch_limit: u64,
    /// Result cap of every side-channel search call.
    pub search_limit: usize,
    pub in_filter_chunk_size: usize,
    /// Progress is only reported once the projected runtime exceeds this.
    pub progress_threshold_secs: u64,
    /// Root records between two progress reports.
    pub progress_cadence: u64,
    /// Weight of the newest round in the smoothed rate estimate.
    pub progress_smoothing: f64,
    /// Issue the best-effort count call before the first round.
    pub estimate_total: bool,
    /// Run the pruner once pagination completes.
    pub remove_not_connected: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_batch_limit: ACTUAL_INSTANCE_QUERY_LIMIT,
            search_limit: SEARCH_LIMIT,
            in_filter_chunk_size: IN_FILTER_CHUNK_SIZE,
            progress_threshold_secs: 30,
            progress_cadence: 10_000,
            progress_smoothing: 0.1,
            estimate_total: true,
            remove_not_connected: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json(input: &str) -> Result<Self, GraphQueryError> {
        let config: EngineConfig = serde_json::from_str(input)
            .map_err(|e| GraphQueryError::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_env_overrides(mut self) -> Result<Self, GraphQueryError> {
        if let Ok(raw) = env::var(MAX_BATCH_LIMIT_ENV) {
            self.max_batch_limit = raw.trim().parse().map_err(|_| {
                GraphQueryError::configuration(format!("{MAX_BATCH_LIMIT_ENV} must be a number"))
            })?;
        }
        if let Ok(raw) = env::var(REMOVE_NOT_CONNECTED_ENV) {
            self.remove_not_connected = matches!(raw.trim(), "1" | "true" | "yes");
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), GraphQueryError> {
        if self.max_batch_limit == 0 {
            return Err(GraphQueryError::configuration(
                "max_batch_limit must be positive",
            ));
        }
        if self.in_filter_chunk_size == 0 {
            return Err(GraphQueryError::configuration(
                "in_filter_chunk_size must be positive",
            ));
        }
        if !(self.progress_smoothing > 0.0 && self.progress_smoothing <= 1.0) {
            return Err(GraphQueryError::configuration(
                "progress_smoothing must be in (0, 1]",
            ));
        }
        Ok(())
    }

    pub fn progress_threshold(&self) -> Duration {
        Duration::from_secs(self.progress_threshold_secs)
    }

    pub fn remove_not_connected(mut self, enabled: bool) -> Self {
        self.remove_not_connected = enabled;
        self
    }

    pub fn max_batch_limit(mut self, limit: u64) -> Self {
        self.max_batch_limit = limit;
        self
    }
}
