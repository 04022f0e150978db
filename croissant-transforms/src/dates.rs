//! Date and date-time parsing

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{Error, Result};

/// Date-time layouts tried, in order, when no format is declared
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

/// Date layouts tried, in order, when no format is declared
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d", "%d/%m/%Y", "%B %d, %Y", "%d %B %Y"];

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Parse `text` with an explicit strftime-style `format`
///
/// Formats without a time component yield midnight.
pub fn parse_with_format(text: &str, format: &str) -> Result<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, format)
        .or_else(|_| NaiveDate::parse_from_str(text, format).map(midnight))
        .or_else(|_| DateTime::parse_from_str(text, format).map(|dt| dt.naive_utc()))
        .map_err(|e| Error::Date(format!("cannot parse \"{text}\" with format \"{format}\": {e}")))
}

/// Parse `text` trying common layouts, RFC 3339 and RFC 2822 first
pub fn parse_any(text: &str) -> Result<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Ok(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok().map(midnight))
        })
        .or_else(|| {
            // A bare year.
            text.parse::<i32>()
                .ok()
                .filter(|_| text.len() == 4)
                .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
                .map(midnight)
        })
        .ok_or_else(|| Error::Date(format!("cannot parse \"{text}\" as a date")))
}

/// Parse with `format` when one is declared, otherwise guess the layout
pub fn parse_datetime(text: &str, format: Option<&str>) -> Result<NaiveDateTime> {
    match format {
        Some(format) => parse_with_format(text, format),
        None => parse_any(text),
    }
}

/// Seconds since the Unix epoch
pub fn from_timestamp(seconds: i64) -> Result<NaiveDateTime> {
    DateTime::from_timestamp(seconds, 0)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| Error::Date(format!("timestamp {seconds} is out of range")))
}
