//! Time utilities for stricture
//!
//! Provides the wall-clock primitives used by schedules (time of day,
//! daily windows, weekday sets) and the clock abstraction the control
//! loop reads "now" from.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `STRICTURE_MOCK_TIME` environment variable can be set
//! to override the system time seen by [`SystemClock`]. The value is read as
//! UTC and advances at the same rate as real time from process start.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2024-05-03 17:00:00`)
//!
//! Example:
//! ```bash
//! STRICTURE_MOCK_TIME="2024-05-03 17:00:00" strictured --config ./config.toml
//! ```

use chrono::{DateTime, NaiveDateTime, TimeZone, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "STRICTURE_MOCK_TIME";

/// Format accepted by [`MOCK_TIME_ENV_VAR`]
pub const MOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const MINUTES_PER_DAY: u16 = 24 * 60;

/// Cached mock time offset from the real time when the process started.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            let mock_time_str = std::env::var(MOCK_TIME_ENV_VAR).ok()?;
            match NaiveDateTime::parse_from_str(&mock_time_str, MOCK_TIME_FORMAT) {
                Ok(naive_dt) => {
                    let mock_dt = Utc.from_utc_datetime(&naive_dt);
                    let offset = mock_dt.signed_duration_since(Utc::now());
                    tracing::info!(
                        mock_time = %mock_time_str,
                        offset_secs = offset.num_seconds(),
                        "Mock time enabled"
                    );
                    Some(offset)
                }
                Err(_) => {
                    tracing::warn!(
                        mock_time = %mock_time_str,
                        expected_format = MOCK_TIME_FORMAT,
                        "Invalid mock time format"
                    );
                    None
                }
            }
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current UTC instant, respecting mock time settings in debug builds.
pub fn now() -> DateTime<Utc> {
    let real_now = Utc::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Source of "now" for anything that evaluates schedules over time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The process clock (honours mock time in debug builds)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        now()
    }
}

/// A clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.lock() = instant;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut current = self.lock();
        *current += by;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        // A poisoned clock still holds a valid instant
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }
}

/// Outcome of evaluating a schedule at an instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// The managed activity must be paused
    #[serde(alias = "prohibited")]
    Restricted,
    /// The managed activity may run
    Unrestricted,
}

impl Verdict {
    pub fn is_restricted(self) -> bool {
        matches!(self, Verdict::Restricted)
    }

    pub fn allows_running(self) -> bool {
        matches!(self, Verdict::Unrestricted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Restricted => "restricted",
            Verdict::Unrestricted => "unrestricted",
        }
    }
}

impl Default for Verdict {
    fn default() -> Self {
        Self::Unrestricted
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "restricted" | "prohibited" => Ok(Self::Restricted),
            "unrestricted" => Ok(Self::Unrestricted),
            other => Err(format!(
                "Unknown mode '{}' (expected restricted, unrestricted or prohibited)",
                other
            )),
        }
    }
}

/// Wall-clock time of day with minute resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay { hour: 0, minute: 0 };

    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    /// Time of day of an instant as seen in its own timezone, seconds dropped
    pub fn of<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        Self {
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
        }
    }

    pub fn minutes_from_midnight(self) -> u16 {
        (self.hour as u16) * 60 + self.minute as u16
    }
}

impl PartialOrd for TimeOfDay {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeOfDay {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.minutes_from_midnight()
            .cmp(&other.minutes_from_midnight())
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// A recurring daily interval `[start, stop)`, possibly spanning midnight.
///
/// `start == stop` covers the whole day. `start > stop` wraps past
/// midnight, so 17:00-09:00 is inside from 17:00 until 09:00 the next
/// morning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyWindow {
    pub start: TimeOfDay,
    pub stop: TimeOfDay,
}

impl DailyWindow {
    pub fn new(start: TimeOfDay, stop: TimeOfDay) -> Self {
        Self { start, stop }
    }

    pub fn is_full_day(&self) -> bool {
        self.start == self.stop
    }

    pub fn crosses_midnight(&self) -> bool {
        self.start > self.stop
    }

    /// Check if a time of day falls within this window
    pub fn contains_time(&self, time: TimeOfDay) -> bool {
        let t = time.minutes_from_midnight();
        let start = self.start.minutes_from_midnight();
        let stop = self.stop.minutes_from_midnight();

        if start == stop {
            true
        } else if start < stop {
            t >= start && t < stop
        } else {
            t >= start || t < stop
        }
    }

    /// Check if a localized instant falls within this window
    pub fn contains<Tz: TimeZone>(&self, dt: &DateTime<Tz>) -> bool {
        self.contains_time(TimeOfDay::of(dt))
    }

    /// Length of the window
    pub fn duration(&self) -> Duration {
        let start = self.start.minutes_from_midnight();
        let stop = self.stop.minutes_from_midnight();
        let minutes = if start == stop {
            MINUTES_PER_DAY
        } else if start < stop {
            stop - start
        } else {
            MINUTES_PER_DAY - start + stop
        };
        Duration::from_secs(minutes as u64 * 60)
    }
}

impl fmt::Display for DailyWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.stop)
    }
}

/// A set of weekdays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const MONDAY: u8 = 1 << 0;
    pub const TUESDAY: u8 = 1 << 1;
    pub const WEDNESDAY: u8 = 1 << 2;
    pub const THURSDAY: u8 = 1 << 3;
    pub const FRIDAY: u8 = 1 << 4;
    pub const SATURDAY: u8 = 1 << 5;
    pub const SUNDAY: u8 = 1 << 6;

    pub const WEEKDAYS: WeekdaySet = WeekdaySet(
        Self::MONDAY | Self::TUESDAY | Self::WEDNESDAY | Self::THURSDAY | Self::FRIDAY,
    );
    pub const WEEKENDS: WeekdaySet = WeekdaySet(Self::SATURDAY | Self::SUNDAY);
    pub const ALL_DAYS: WeekdaySet = WeekdaySet(0x7F);
    pub const NONE: WeekdaySet = WeekdaySet(0);

    pub fn new(mask: u8) -> Self {
        Self(mask & 0x7F)
    }

    fn bit(weekday: Weekday) -> u8 {
        1 << weekday.num_days_from_monday()
    }

    pub fn contains(&self, weekday: Weekday) -> bool {
        (self.0 & Self::bit(weekday)) != 0
    }

    pub fn insert(&mut self, weekday: Weekday) {
        self.0 |= Self::bit(weekday);
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn intersection(self, other: WeekdaySet) -> WeekdaySet {
        WeekdaySet(self.0 & other.0)
    }

    pub fn iter(self) -> impl Iterator<Item = Weekday> {
        [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ]
        .into_iter()
        .filter(move |d| self.contains(*d))
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = WeekdaySet::NONE;
        for day in iter {
            set.insert(day);
        }
        set
    }
}

impl std::ops::BitOr for WeekdaySet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Helper to format durations in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else if seconds > 0 || d.is_zero() {
        format!("{}s", seconds)
    } else {
        format!("{}ms", d.as_millis())
    }
}
