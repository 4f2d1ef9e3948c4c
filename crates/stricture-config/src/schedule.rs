//! Validated schedule and service structures

use crate::schema::{RawConfig, RawRetry, RawSchedule, RawServiceConfig, RawSpecificDate};
use crate::validation::{parse_date, parse_mode, parse_time, parse_timezone, parse_weekday, validate_schedule};
use crate::{ConfigError, ConfigResult};
use chrono::{NaiveDate, Weekday};
use chrono_tz::Tz;
use stricture_util::{DailyWindow, RetryPolicy, TimeOfDay, Verdict, WeekdaySet};
use std::time::Duration;

/// Default endpoint of the demo counting service
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5000/";

/// Default seconds between schedule checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Validated configuration ready for use by the daemon
#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub schedule: ScheduleConfig,
}

impl Config {
    /// Convert from raw config (after validation)
    pub(crate) fn from_raw(raw: RawConfig) -> ConfigResult<Self> {
        Ok(Self {
            service: ServiceConfig::from_raw(raw.service),
            schedule: ScheduleConfig::try_from(raw.schedule)?,
        })
    }
}

/// How the managed process is reached and how often the schedule is checked
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub endpoint: String,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            endpoint: raw.endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            poll_interval: raw
                .poll_interval_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            retry: raw.retry.map(convert_retry).unwrap_or_default(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry: RetryPolicy::default(),
        }
    }
}

/// Which weekdays gate the daily window, and which are blocked outright.
///
/// The three sets are disjoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayOfWeekRule {
    pub restricted_days: WeekdaySet,
    pub unrestricted_days: WeekdaySet,
    pub prohibited_days: WeekdaySet,
}

impl DayOfWeekRule {
    pub fn is_prohibited(&self, day: Weekday) -> bool {
        self.prohibited_days.contains(day)
    }

    /// True if either restricted or unrestricted days are configured
    pub fn has_gating_days(&self) -> bool {
        !(self.restricted_days | self.unrestricted_days).is_empty()
    }

    /// True if the daily window is consulted on this day
    pub fn gates(&self, day: Weekday) -> bool {
        self.restricted_days.contains(day) || self.unrestricted_days.contains(day)
    }
}

/// A calendar-date-scoped rule (holiday, blackout, allow period)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateOverride {
    /// First day, inclusive
    pub start_date: NaiveDate,
    /// Last day, inclusive
    pub stop_date: NaiveDate,
    pub mode: Verdict,
    /// If set, `mode` applies outside this window only
    pub sub_window: Option<DailyWindow>,
}

impl DateOverride {
    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.stop_date
    }
}

/// Immutable schedule definition.
///
/// Only constructed through validation (`TryFrom<RawSchedule>` or the
/// loaders in this crate), so every field is known to be well-formed.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    timezone: Tz,
    default_assumption: Verdict,
    daily_window: Option<DailyWindow>,
    day_rules: DayOfWeekRule,
    date_overrides: Vec<DateOverride>,
}

impl ScheduleConfig {
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn default_assumption(&self) -> Verdict {
        self.default_assumption
    }

    pub fn daily_window(&self) -> Option<DailyWindow> {
        self.daily_window
    }

    pub fn day_rules(&self) -> &DayOfWeekRule {
        &self.day_rules
    }

    /// Date overrides in precedence order
    pub fn date_overrides(&self) -> &[DateOverride] {
        &self.date_overrides
    }
}

impl TryFrom<RawSchedule> for ScheduleConfig {
    type Error = ConfigError;

    fn try_from(raw: RawSchedule) -> ConfigResult<Self> {
        let errors = validate_schedule(&raw);
        if !errors.is_empty() {
            return Err(ConfigError::ValidationFailed { errors });
        }

        // Validated above; the conversions below cannot fail
        let timezone = match raw.timezone.as_deref() {
            Some(name) => parse_timezone(name).unwrap_or(Tz::UTC),
            None => Tz::UTC,
        };
        let default_assumption = raw
            .assume
            .as_deref()
            .and_then(|a| parse_mode(a).ok())
            .unwrap_or_default();

        Ok(Self {
            timezone,
            default_assumption,
            daily_window: convert_window(raw.start_time.as_deref(), raw.stop_time.as_deref()),
            day_rules: DayOfWeekRule {
                restricted_days: convert_days(&raw.restricted_days),
                unrestricted_days: convert_days(&raw.unrestricted_days),
                prohibited_days: convert_days(&raw.prohibited_days),
            },
            date_overrides: raw
                .specific_dates
                .iter()
                .filter_map(convert_override)
                .collect(),
        })
    }
}

// Conversion helpers

fn convert_time(s: &str) -> Option<TimeOfDay> {
    let (hour, minute) = parse_time(s).ok()?;
    TimeOfDay::new(hour, minute)
}

fn convert_window(start: Option<&str>, stop: Option<&str>) -> Option<DailyWindow> {
    Some(DailyWindow::new(convert_time(start?)?, convert_time(stop?)?))
}

fn convert_days(days: &[String]) -> WeekdaySet {
    days.iter().filter_map(|d| parse_weekday(d).ok()).collect()
}

fn convert_override(raw: &RawSpecificDate) -> Option<DateOverride> {
    Some(DateOverride {
        start_date: parse_date(&raw.start_date).ok()?,
        stop_date: parse_date(&raw.stop_date).ok()?,
        mode: parse_mode(&raw.mode).ok()?,
        sub_window: convert_window(raw.start_time.as_deref(), raw.stop_time.as_deref()),
    })
}

fn convert_retry(raw: RawRetry) -> RetryPolicy {
    let mut policy = RetryPolicy::fixed(
        raw.delay_ms
            .map(Duration::from_millis)
            .unwrap_or(RetryPolicy::DEFAULT_DELAY),
    );

    if let Some(attempts) = raw.max_attempts {
        policy = policy.with_max_attempts(attempts);
    }

    if raw.backoff.as_deref().map(str::to_lowercase).as_deref() == Some("exponential") {
        let max_delay = raw
            .max_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_MAX_RETRY_DELAY);
        policy = policy.with_exponential_backoff(max_delay);
    }

    policy
}
