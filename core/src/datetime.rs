//! String parsers for the calendar types: ISO-8601 dates and timestamps, and
//! SQL interval syntax.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;

use crate::err::{Error, Result};
use crate::types::Interval;

lazy_static! {
    static ref INTERVAL_TERM: Regex = Regex::new(
        r"(?i)(\d+)\s*(years?|months?|days?|hours?|minutes?|seconds?|milliseconds?|microseconds?)"
    )
    .unwrap();
    static ref INTERVAL_TIME: Regex =
        Regex::new(r"(\d+):(\d{2}):(\d{2})(?:\.(\d{1,6}))?").unwrap();
}

fn epoch_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
}

fn malformed(value: &[u8], data_type: &str) -> Error {
    Error::MalformedValue {
        value: String::from_utf8_lossy(value).into_owned(),
        data_type: data_type.to_string(),
    }
}

/// Parses `YYYY-MM-DD` into days since the Unix epoch.
pub fn parse_date(value: &[u8]) -> Result<i32> {
    let s = std::str::from_utf8(value).map_err(|_| malformed(value, "DATE"))?;
    let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| malformed(value, "DATE"))?;
    Ok(date.signed_duration_since(epoch_date()).num_days() as i32)
}

/// Parses an ISO-8601 timestamp (space or `T` separator, optional fractional
/// seconds, a bare date also accepted) into microseconds since the epoch.
pub fn parse_timestamp(value: &[u8]) -> Result<i64> {
    let s = std::str::from_utf8(value)
        .map_err(|_| malformed(value, "TIMESTAMP"))?
        .trim();
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(ts.timestamp_micros());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0).unwrap().timestamp_micros());
    }
    Err(malformed(value, "TIMESTAMP"))
}

/// Parses SQL interval syntax, e.g. `1 year 2 months 3 days 04:05:06.5`.
/// Unit terms may appear in any order; an `HH:MM:SS[.ffffff]` literal
/// contributes the sub-day part.
pub fn parse_interval(value: &[u8]) -> Result<Interval> {
    let s = std::str::from_utf8(value)
        .map_err(|_| malformed(value, "INTERVAL"))?
        .trim();
    if s.is_empty() {
        return Err(malformed(value, "INTERVAL"));
    }

    let mut result = Interval::default();
    let mut consumed = vec![false; s.len()];
    for caps in INTERVAL_TERM.captures_iter(s) {
        let full = caps.get(0).unwrap();
        consumed[full.start()..full.end()].fill(true);
        let amount: i64 = caps[1]
            .parse()
            .map_err(|_| malformed(value, "INTERVAL"))?;
        match caps[2].to_ascii_lowercase().as_str() {
            u if u.starts_with("year") => result.months += amount as i32 * 12,
            u if u.starts_with("month") => result.months += amount as i32,
            u if u.starts_with("day") => result.days += amount as i32,
            u if u.starts_with("hour") => result.micros += amount * 3_600_000_000,
            u if u.starts_with("minute") => result.micros += amount * 60_000_000,
            u if u.starts_with("millisecond") => result.micros += amount * 1_000,
            u if u.starts_with("microsecond") => result.micros += amount,
            u if u.starts_with("second") => result.micros += amount * 1_000_000,
            _ => return Err(malformed(value, "INTERVAL")),
        }
    }
    if let Some(caps) = INTERVAL_TIME.captures(s) {
        let full = caps.get(0).unwrap();
        if !consumed[full.start()] {
            consumed[full.start()..full.end()].fill(true);
            let hours: i64 = caps[1]
                .parse()
                .map_err(|_| malformed(value, "INTERVAL"))?;
            let minutes: i64 = caps[2].parse().unwrap();
            let seconds: i64 = caps[3].parse().unwrap();
            let fraction = caps
                .get(4)
                .map(|m| {
                    let digits = m.as_str();
                    let mut micros: i64 = digits.parse().unwrap();
                    for _ in digits.len()..6 {
                        micros *= 10;
                    }
                    micros
                })
                .unwrap_or(0);
            result.micros +=
                hours * 3_600_000_000 + minutes * 60_000_000 + seconds * 1_000_000 + fraction;
        }
    }

    // Everything outside matched terms must be whitespace, otherwise the
    // cell is not an interval at all.
    let recognized = s
        .bytes()
        .zip(consumed.iter())
        .any(|(_, &used)| used);
    let leftover = s
        .bytes()
        .zip(consumed.iter())
        .any(|(b, &used)| !used && !b.is_ascii_whitespace());
    if !recognized || leftover {
        return Err(malformed(value, "INTERVAL"));
    }
    Ok(result)
}

/// Renders days-since-epoch back to `YYYY-MM-DD`.
pub fn date_to_string(days: i32) -> String {
    (epoch_date() + Duration::days(days as i64))
        .format("%Y-%m-%d")
        .to_string()
}

/// Renders microseconds-since-epoch back to an ISO-8601 timestamp.
pub fn timestamp_to_string(micros: i64) -> String {
    NaiveDateTime::from_timestamp_micros(micros)
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string())
        .unwrap_or_else(|| format!("{micros} us"))
}
