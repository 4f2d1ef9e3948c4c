//! Events emitted by the orchestrator

use chrono::{DateTime, Utc};
use std::fmt;
use stricture_util::Verdict;

use crate::Reason;

/// An operation the orchestrator issues against the managed process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Launch,
    Pause,
    Resume,
    IsAlive,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Launch => "launch",
            Operation::Pause => "pause",
            Operation::Resume => "resume",
            Operation::IsAlive => "is_alive",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorEvent {
    /// The schedule verdict differs from the previous cycle's
    VerdictChanged {
        previous: Option<Verdict>,
        current: Verdict,
        reason: Reason,
        at: DateTime<Utc>,
    },

    /// First launch of the managed process
    Launched,

    /// Launched again after the process was found dead
    Relaunched,

    Paused,

    Resumed,

    /// Retries ran out; the operation will be attempted again next cycle
    OperationAbandoned { operation: Operation, attempts: u32 },

    /// The control loop stopped
    Terminated,
}
