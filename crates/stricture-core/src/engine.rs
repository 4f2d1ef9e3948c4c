//! Schedule evaluation engine
//!
//! Classifies an instant as restricted or unrestricted. Rules are tried in
//! precedence order and the first one that matches decides:
//!
//! 1. The first date override covering the local date. Without a sub-window
//!    its mode holds all day. With a sub-window its mode holds outside the
//!    sub-window, and inside it evaluation continues with rule 2.
//! 2. Prohibited weekday: restricted all day.
//! 3. Daily window on a weekday listed in restricted or unrestricted days:
//!    unrestricted inside the window, restricted outside.
//! 4. Daily window with no weekday lists at all: same test, every day.
//! 5. No window, weekday listed in unrestricted days: unrestricted all day.
//! 6. Otherwise the default assumption.
//!
//! All comparisons happen in the schedule's timezone.

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::sync::Arc;
use stricture_config::ScheduleConfig;
use stricture_util::{TimeOfDay, Verdict};

/// The rule that decided a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Whole-day override, or outside an override's sub-window
    DateOverride { index: usize },
    ProhibitedDay,
    /// No window configured and the day is listed as unrestricted
    UnrestrictedDay,
    /// Window test on a listed weekday
    DayWindow { inside: bool },
    /// Window test applied to every day
    Window { inside: bool },
    Default,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::DateOverride { index } => write!(f, "date override #{}", index),
            Reason::ProhibitedDay => f.write_str("prohibited day"),
            Reason::UnrestrictedDay => f.write_str("unrestricted day"),
            Reason::DayWindow { inside: true } => f.write_str("inside daily window"),
            Reason::DayWindow { inside: false } => f.write_str("outside daily window"),
            Reason::Window { inside: true } => f.write_str("inside window"),
            Reason::Window { inside: false } => f.write_str("outside window"),
            Reason::Default => f.write_str("default assumption"),
        }
    }
}

/// A verdict together with how it was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub reason: Reason,
    /// The instant in the schedule's timezone
    pub local: DateTime<Tz>,
    /// Set when the instant fell inside this override's sub-window
    pub sub_window_of: Option<usize>,
}

/// Classify `instant` against `config`
pub fn evaluate(config: &ScheduleConfig, instant: DateTime<Utc>) -> Verdict {
    evaluate_detailed(config, instant).verdict
}

/// Classify `instant` against `config`, reporting the deciding rule
pub fn evaluate_detailed(config: &ScheduleConfig, instant: DateTime<Utc>) -> Evaluation {
    let local = instant.with_timezone(&config.timezone());
    let date = local.date_naive();
    let weekday = local.weekday();
    let time = TimeOfDay::of(&local);

    let decided = |verdict: Verdict, reason: Reason, sub_window_of: Option<usize>| Evaluation {
        verdict,
        reason,
        local,
        sub_window_of,
    };

    // Only the first covering override is consulted
    let mut sub_window_of = None;
    if let Some((index, date_override)) = config
        .date_overrides()
        .iter()
        .enumerate()
        .find(|(_, o)| o.covers(date))
    {
        match date_override.sub_window {
            Some(window) if window.contains_time(time) => sub_window_of = Some(index),
            _ => return decided(date_override.mode, Reason::DateOverride { index }, None),
        }
    }

    let days = config.day_rules();
    if days.is_prohibited(weekday) {
        return decided(Verdict::Restricted, Reason::ProhibitedDay, sub_window_of);
    }

    match config.daily_window() {
        Some(window) => {
            let inside = window.contains_time(time);
            let verdict = if inside {
                Verdict::Unrestricted
            } else {
                Verdict::Restricted
            };

            if !days.has_gating_days() {
                return decided(verdict, Reason::Window { inside }, sub_window_of);
            }
            if days.gates(weekday) {
                return decided(verdict, Reason::DayWindow { inside }, sub_window_of);
            }
        }
        None => {
            if days.unrestricted_days.contains(weekday) {
                return decided(Verdict::Unrestricted, Reason::UnrestrictedDay, sub_window_of);
            }
        }
    }

    decided(config.default_assumption(), Reason::Default, sub_window_of)
}

/// Shared, read-only handle to a schedule
#[derive(Debug, Clone)]
pub struct ScheduleEngine {
    config: Arc<ScheduleConfig>,
}

impl ScheduleEngine {
    pub fn new(config: Arc<ScheduleConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    pub fn evaluate(&self, instant: DateTime<Utc>) -> Verdict {
        evaluate(&self.config, instant)
    }

    pub fn evaluate_detailed(&self, instant: DateTime<Utc>) -> Evaluation {
        evaluate_detailed(&self.config, instant)
    }
}
