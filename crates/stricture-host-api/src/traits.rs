//! Controllable-process capability trait

use async_trait::async_trait;
use thiserror::Error;

/// Errors from controllable-process operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    /// The process (or whatever fronts it) could not be reached
    #[error("Process unreachable: {0}")]
    Unreachable(String),

    /// Reached, but temporarily unable to serve the request
    #[error("Process unavailable: {0}")]
    Unavailable(String),

    /// Reached, and the request was refused
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProcessError {
    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::Unreachable(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Transient errors are retried; anything else is fatal to the control loop
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Unavailable(_))
    }
}

pub type ProcessResult<T> = Result<T, ProcessError>;

/// The four operations the orchestrator drives.
///
/// Every operation may be re-issued after a transient failure without
/// knowing whether the failed attempt took effect, so implementations
/// must make repeated calls harmless (pausing a paused process is a no-op).
#[async_trait]
pub trait ControllableProcess: Send + Sync {
    /// Start the managed process
    async fn launch(&self) -> ProcessResult<()>;

    /// Suspend the managed process
    async fn pause(&self) -> ProcessResult<()>;

    /// Continue a suspended process
    async fn resume(&self) -> ProcessResult<()>;

    /// Whether the managed process still exists (paused counts as alive)
    async fn is_alive(&self) -> ProcessResult<bool>;

    /// Human-readable name for logs
    fn describe(&self) -> String {
        "process".to_string()
    }
}
