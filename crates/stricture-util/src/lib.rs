//! Shared utilities for stricture
//!
//! This crate provides:
//! - Wall-clock primitives (time of day, daily windows, weekday sets)
//! - The `Verdict` a schedule evaluates to
//! - Clocks (system clock with mock time, manual clock for tests)
//! - Retry policy for operations on the managed process
//! - Default config path

mod paths;
mod retry;
mod time;

pub use paths::*;
pub use retry::*;
pub use time::*;
