//! Controllable-process capability interface for stricture
//!
//! This crate defines the boundary between the control loop and whatever
//! actually runs the managed activity. It contains no transport code itself.

mod mock;
mod traits;

pub use mock::*;
pub use traits::*;
