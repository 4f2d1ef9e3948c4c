//! Schedule engine and control loop for stricture
//!
//! This crate contains:
//! - Schedule evaluation (is this instant restricted or unrestricted?)
//! - The orchestrator state machine (NotStarted -> Running <-> Paused -> Terminated)
//! - Retry and cancellation handling around process operations

mod engine;
mod events;
mod orchestrator;

pub use engine::*;
pub use events::*;
pub use orchestrator::*;
