//! Resolution of NLU date/time parameters into clinic-local wall-clock values.
//!
//! Slots are stored timezone-naive in clinic time, so any offset attached to
//! an incoming string is discarded and its clock reading is taken as local.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::models::DateTimeParam;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DateResolveError {
    #[error("unparsable date/time: {0:?}")]
    Unparsable(String),

    #[error("range ends before it starts: {start} > {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },
}

/// Resolves a parameter into a single appointment time, truncated to the minute.
pub fn resolve_instant(param: &DateTimeParam) -> Result<NaiveDateTime, DateResolveError> {
    let dt = match param {
        DateTimeParam::Instant { value } => parse_local_datetime(value)?,
        DateTimeParam::Range { start, .. } => parse_local_datetime(start)?,
        DateTimeParam::Parts { date, time } => {
            let date = parse_local_date(date)?;
            let time = parse_local_time(time)?;
            date.and_time(time)
        }
    };
    Ok(truncate_to_minute(dt))
}

/// Resolves a parameter into a half-open `[start, end)` range of whole days.
pub fn resolve_range(
    param: &DateTimeParam,
) -> Result<(NaiveDateTime, NaiveDateTime), DateResolveError> {
    match param {
        DateTimeParam::Instant { value } => Ok(whole_day(parse_local_date(value)?)),
        DateTimeParam::Parts { date, .. } => Ok(whole_day(parse_local_date(date)?)),
        DateTimeParam::Range { start, end } => {
            let start = parse_local_date(start)?;
            let end = parse_local_date(end)?;
            if end < start {
                return Err(DateResolveError::InvertedRange { start, end });
            }
            let start_dt = start.and_time(NaiveTime::MIN);
            let mut end_dt = end.and_time(NaiveTime::MIN);
            if start == end {
                end_dt += Duration::days(1);
            }
            Ok((start_dt, end_dt))
        }
    }
}

fn whole_day(date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let start = date.and_time(NaiveTime::MIN);
    (start, start + Duration::days(1))
}

fn truncate_to_minute(dt: NaiveDateTime) -> NaiveDateTime {
    dt.with_second(0)
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt)
}

/// Drops a trailing `Z` or `±HH:MM` / `±HHMM` offset, but only after the
/// time component so date hyphens are left alone.
fn strip_offset(s: &str) -> &str {
    let s = s.trim();
    if let Some(stripped) = s.strip_suffix('Z').or_else(|| s.strip_suffix('z')) {
        return stripped;
    }
    let Some(t_pos) = s.find(['T', 't', ' ']) else {
        return s;
    };
    match s[t_pos..].rfind(['+', '-']) {
        Some(rel) => &s[..t_pos + rel],
        None => s,
    }
}

fn parse_local_datetime(raw: &str) -> Result<NaiveDateTime, DateResolveError> {
    let s = strip_offset(raw);
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|d| d.and_time(NaiveTime::MIN))
        .map_err(|_| DateResolveError::Unparsable(raw.to_string()))
}

fn parse_local_date(raw: &str) -> Result<NaiveDate, DateResolveError> {
    parse_local_datetime(raw).map(|dt| dt.date())
}

/// Accepts a bare time (`13:00`, `13:00:00`) or the time part of a full
/// datetime string.
fn parse_local_time(raw: &str) -> Result<NaiveTime, DateResolveError> {
    let stripped = strip_offset(raw);
    let time_part = match stripped.find(['T', 't']) {
        Some(pos) => &stripped[pos + 1..],
        None => stripped,
    };
    let time_part = match time_part.rfind(['+', '-']) {
        Some(pos) => &time_part[..pos],
        None => time_part,
    };
    ["%H:%M:%S%.f", "%H:%M"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(time_part, fmt).ok())
        .ok_or_else(|| DateResolveError::Unparsable(raw.to_string()))
}
