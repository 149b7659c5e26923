use crate::store::Assignments;
use crate::tag_interface::AccumulatedDetectionSet;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_STOP_GRACE_MS: u64 = 2_000;
pub const DEFAULT_STORE_KEY: &str = "assignedTags";

/// Shared configuration for a reconciliation session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScanConfig {
    pub poll_interval_ms: u64,
    /// How long `stop()` waits for an in-flight tick before aborting it.
    pub stop_grace_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            stop_grace_ms: DEFAULT_STOP_GRACE_MS,
        }
    }
}

impl ScanConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// Input handed to a view on every recompute.
#[derive(Debug, Clone, Copy)]
pub struct ViewInput<'a> {
    pub accumulated: &'a AccumulatedDetectionSet,
    pub assignments: &'a Assignments,
}

/// Output produced by each view.
#[derive(Debug, Clone)]
pub struct ViewOutput<T> {
    pub view: T,
    pub metadata: ViewMetadata,
}

/// Metadata used for notifications and telemetry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewMetadata {
    /// Object names that became present in this cycle.
    pub newly_present: Vec<String>,
    pub entry_count: usize,
    pub notes: Vec<String>,
}

/// Common error type for the reconciliation core.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconError {
    #[error("radio command failed: {0}")]
    RadioCommand(String),
    #[error("radio read failed: {0}")]
    RadioRead(String),
    #[error("name store read failed: {0}")]
    StoreRead(String),
    #[error("name store write failed: {0}")]
    StoreWrite(String),
    #[error("invalid assignment: {0}")]
    InvalidAssignment(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("a scanning session is already active")]
    AlreadyScanning,
}

pub type ReconResult<T> = Result<T, ReconError>;

/// A derived view recomputed by the reconciliation loop after every tick.
pub trait ReconciliationView: Send {
    type Output: Clone + Default + Send + Sync + 'static;

    fn initialize(&mut self, config: &ScanConfig) -> ReconResult<()>;
    fn execute(&mut self, input: ViewInput<'_>) -> ReconResult<ViewOutput<Self::Output>>;
    /// Drops any state carried between cycles.
    fn cleanup(&mut self);
}
