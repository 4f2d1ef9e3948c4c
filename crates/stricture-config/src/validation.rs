//! Configuration validation

use crate::schema::{RawConfig, RawRetry, RawSchedule, RawSpecificDate};
use chrono::{NaiveDate, Weekday};
use chrono_tz::Tz;
use stricture_util::Verdict;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid timezone '{0}': not an IANA timezone name")]
    InvalidTimezone(String),

    #[error("Invalid time format '{value}': {message}")]
    InvalidTimeFormat { value: String, message: String },

    #[error("Invalid date '{value}': {message}")]
    InvalidDate { value: String, message: String },

    #[error("Invalid mode '{value}': {message}")]
    InvalidMode { value: String, message: String },

    #[error("Unknown day: {0}")]
    UnknownDay(String),

    #[error("{day} is listed in both {first} and {second}")]
    DayInMultipleSets {
        day: Weekday,
        first: &'static str,
        second: &'static str,
    },

    #[error("{context}: start_time and stop_time must be given together")]
    IncompleteWindow { context: String },

    #[error("Date override #{index}: start_date {start} is after stop_date {stop}")]
    InvertedDateRange {
        index: usize,
        start: NaiveDate,
        stop: NaiveDate,
    },

    #[error("Date overrides #{first} ({first_mode}) and #{second} ({second_mode}) overlap with different modes")]
    ContradictoryOverrides {
        first: usize,
        first_mode: Verdict,
        second: usize,
        second_mode: Verdict,
    },

    #[error("Service config error: {0}")]
    ServiceError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.service.poll_interval_seconds == Some(0) {
        errors.push(ValidationError::ServiceError(
            "poll_interval_seconds must be greater than 0".into(),
        ));
    }

    if let Some(endpoint) = &config.service.endpoint
        && endpoint.trim().is_empty()
    {
        errors.push(ValidationError::ServiceError("endpoint cannot be empty".into()));
    }

    if let Some(retry) = &config.service.retry {
        errors.extend(validate_retry(retry));
    }

    errors.extend(validate_schedule(&config.schedule));

    errors
}

fn validate_retry(retry: &RawRetry) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if retry.max_attempts == Some(0) {
        errors.push(ValidationError::ServiceError(
            "retry.max_attempts must be at least 1".into(),
        ));
    }

    if let Some(backoff) = &retry.backoff
        && !matches!(backoff.to_lowercase().as_str(), "fixed" | "exponential")
    {
        errors.push(ValidationError::ServiceError(format!(
            "Unknown retry backoff '{}' (expected fixed or exponential)",
            backoff
        )));
    }

    errors
}

/// Validate a raw schedule definition
pub fn validate_schedule(schedule: &RawSchedule) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(tz) = &schedule.timezone
        && let Err(e) = parse_timezone(tz)
    {
        errors.push(e);
    }

    if let Some(assume) = &schedule.assume
        && let Err(e) = parse_mode(assume)
    {
        errors.push(e);
    }

    errors.extend(validate_window(
        schedule.start_time.as_deref(),
        schedule.stop_time.as_deref(),
        "daily window",
    ));

    errors.extend(validate_day_sets(schedule));

    for (index, date) in schedule.specific_dates.iter().enumerate() {
        errors.extend(validate_specific_date(index, date));
    }

    errors.extend(find_contradictory_overrides(&schedule.specific_dates));

    errors
}

fn validate_window(start: Option<&str>, stop: Option<&str>, context: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    match (start, stop) {
        (None, None) => {}
        (Some(start), Some(stop)) => {
            for value in [start, stop] {
                if let Err(message) = parse_time(value) {
                    errors.push(ValidationError::InvalidTimeFormat {
                        value: value.to_string(),
                        message,
                    });
                }
            }
        }
        _ => errors.push(ValidationError::IncompleteWindow {
            context: context.to_string(),
        }),
    }

    errors
}

fn validate_day_sets(schedule: &RawSchedule) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let sets = [
        ("restricted_days", &schedule.restricted_days),
        ("unrestricted_days", &schedule.unrestricted_days),
        ("prohibited_days", &schedule.prohibited_days),
    ];

    let mut parsed: Vec<(&'static str, Vec<Weekday>)> = Vec::new();
    for (name, days) in sets {
        let mut valid = Vec::new();
        for day in days {
            match parse_weekday(day) {
                Ok(d) => valid.push(d),
                Err(_) => errors.push(ValidationError::UnknownDay(day.clone())),
            }
        }
        parsed.push((name, valid));
    }

    for (i, (first, first_days)) in parsed.iter().enumerate() {
        for (second, second_days) in parsed.iter().skip(i + 1) {
            let mut reported = Vec::new();
            for day in first_days {
                if second_days.contains(day) && !reported.contains(day) {
                    reported.push(*day);
                    errors.push(ValidationError::DayInMultipleSets {
                        day: *day,
                        first: *first,
                        second: *second,
                    });
                }
            }
        }
    }

    errors
}

fn validate_specific_date(index: usize, date: &RawSpecificDate) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let start = parse_date(&date.start_date);
    let stop = parse_date(&date.stop_date);
    for (value, result) in [(&date.start_date, &start), (&date.stop_date, &stop)] {
        if let Err(message) = result {
            errors.push(ValidationError::InvalidDate {
                value: value.clone(),
                message: message.clone(),
            });
        }
    }

    if let (Ok(start), Ok(stop)) = (start, stop)
        && start > stop
    {
        errors.push(ValidationError::InvertedDateRange { index, start, stop });
    }

    if let Err(e) = parse_mode(&date.mode) {
        errors.push(e);
    }

    errors.extend(validate_window(
        date.start_time.as_deref(),
        date.stop_time.as_deref(),
        &format!("date override #{}", index),
    ));

    errors
}

/// Overlapping overrides are allowed only when they agree on the mode
fn find_contradictory_overrides(dates: &[RawSpecificDate]) -> Vec<ValidationError> {
    let parsed: Vec<Option<(NaiveDate, NaiveDate, Verdict)>> = dates
        .iter()
        .map(|d| {
            let start = parse_date(&d.start_date).ok()?;
            let stop = parse_date(&d.stop_date).ok()?;
            let mode = parse_mode(&d.mode).ok()?;
            (start <= stop).then_some((start, stop, mode))
        })
        .collect();

    let mut errors = Vec::new();
    for (i, a) in parsed.iter().enumerate() {
        let Some((a_start, a_stop, a_mode)) = a else {
            continue;
        };
        for (j, b) in parsed.iter().enumerate().skip(i + 1) {
            let Some((b_start, b_stop, b_mode)) = b else {
                continue;
            };
            if a_start <= b_stop && b_start <= a_stop && a_mode != b_mode {
                errors.push(ValidationError::ContradictoryOverrides {
                    first: i,
                    first_mode: *a_mode,
                    second: j,
                    second_mode: *b_mode,
                });
            }
        }
    }

    errors
}

/// Parse H:MM or HH:MM time format
pub fn parse_time(s: &str) -> Result<(u8, u8), String> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    if parts.len() != 2 || parts[1].len() != 2 || parts[0].is_empty() || parts[0].len() > 2 {
        return Err("Expected HH:MM format".into());
    }
    if !parts.iter().all(|part| part.bytes().all(|b| b.is_ascii_digit())) {
        return Err("Expected HH:MM format".into());
    }

    let hour: u8 = parts[0]
        .parse()
        .map_err(|_| "Invalid hour".to_string())?;
    let minute: u8 = parts[1]
        .parse()
        .map_err(|_| "Invalid minute".to_string())?;

    if hour >= 24 {
        return Err("Hour must be 0-23".into());
    }
    if minute >= 60 {
        return Err("Minute must be 0-59".into());
    }

    Ok((hour, minute))
}

/// Parse YYYY-MM-DD date format
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| format!("Expected YYYY-MM-DD ({})", e))
}

/// Parse a weekday name ("friday", "Fri", ...)
pub fn parse_weekday(s: &str) -> Result<Weekday, String> {
    match s.trim().to_lowercase().as_str() {
        "mon" | "monday" => Ok(Weekday::Mon),
        "tue" | "tuesday" => Ok(Weekday::Tue),
        "wed" | "wednesday" => Ok(Weekday::Wed),
        "thu" | "thursday" => Ok(Weekday::Thu),
        "fri" | "friday" => Ok(Weekday::Fri),
        "sat" | "saturday" => Ok(Weekday::Sat),
        "sun" | "sunday" => Ok(Weekday::Sun),
        other => Err(format!("Unknown day: {}", other)),
    }
}

/// Parse an IANA timezone name
pub fn parse_timezone(s: &str) -> Result<Tz, ValidationError> {
    s.trim()
        .parse::<Tz>()
        .map_err(|_| ValidationError::InvalidTimezone(s.to_string()))
}

/// Parse a restricted/unrestricted/prohibited mode
pub fn parse_mode(s: &str) -> Result<Verdict, ValidationError> {
    s.parse::<Verdict>().map_err(|message| ValidationError::InvalidMode {
        value: s.to_string(),
        message,
    })
}
