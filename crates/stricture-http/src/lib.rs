//! HTTP demo harness for stricture
//!
//! - [`server`]: a counting service whose counters can be launched, paused
//!   and resumed over HTTP
//! - [`HttpProcess`]: a [`ControllableProcess`](stricture_host_api::ControllableProcess)
//!   that drives one counter of that service

pub mod api;
mod client;
pub mod server;

pub use client::*;
