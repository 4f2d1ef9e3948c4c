//! Raw configuration schema (as parsed from TOML or JSON)

use serde::{Deserialize, Serialize};

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// How the managed process is reached and polled
    #[serde(default)]
    pub service: RawServiceConfig,

    /// When the managed process may run
    #[serde(default)]
    pub schedule: RawSchedule,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// Base URL of the controllable process API (default: http://127.0.0.1:5000/)
    pub endpoint: Option<String>,

    /// Seconds between schedule checks (default: 60)
    pub poll_interval_seconds: Option<u64>,

    /// Retry behaviour for failed launch/pause/resume/status calls
    pub retry: Option<RawRetry>,
}

/// Retry settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRetry {
    /// Delay before the first retry in milliseconds (default: 1000)
    pub delay_ms: Option<u64>,

    /// Total attempts per cycle; absent means retry until shutdown
    pub max_attempts: Option<u32>,

    /// "fixed" or "exponential" (default: "fixed")
    pub backoff: Option<String>,

    /// Upper bound for exponential backoff in milliseconds (default: 30000)
    pub max_delay_ms: Option<u64>,
}

/// Declarative schedule definition
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSchedule {
    /// IANA timezone name (default: "UTC")
    pub timezone: Option<String>,

    /// "restricted", "unrestricted" or "prohibited" (default: "unrestricted")
    pub assume: Option<String>,

    /// Daily window start (HH:MM format)
    pub start_time: Option<String>,

    /// Daily window stop (HH:MM format)
    pub stop_time: Option<String>,

    /// Days on which the daily window applies
    #[serde(default)]
    pub restricted_days: Vec<String>,

    /// Days on which the daily window applies, or that are free when no window is set
    #[serde(default)]
    pub unrestricted_days: Vec<String>,

    /// Days that are restricted all day
    #[serde(default)]
    pub prohibited_days: Vec<String>,

    /// Date-specific overrides, earlier entries win
    #[serde(default)]
    pub specific_dates: Vec<RawSpecificDate>,
}

/// Date-specific override
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawSpecificDate {
    /// First day (YYYY-MM-DD), inclusive
    pub start_date: String,

    /// Last day (YYYY-MM-DD), inclusive
    pub stop_date: String,

    /// Optional sub-window start (HH:MM format)
    pub start_time: Option<String>,

    /// Optional sub-window stop (HH:MM format)
    pub stop_time: Option<String>,

    /// "restricted", "unrestricted" or "prohibited"
    pub mode: String,
}
