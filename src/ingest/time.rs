//! Decoding of the per-profile time variable (JULD).
//!
//! The representation is detected once per dataset and decoded with an ordered
//! list of strategies:
//!
//! 1. numeric values: days since a reference epoch (default 1950-01-01, or the
//!    date named by a `days since ...` units attribute)
//! 2. calendar text: RFC 3339 / ISO 8601 timestamps
//! 3. loose text: compact Argo stamps (`YYYYMMDDHHMISS`), slash dates, bare
//!    dates, and numeric strings read as days since the epoch
//!
//! A strategy either decodes every value or the next one is tried. When none
//! succeeds the file is rejected; no default timestamp is ever substituted.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};

use super::dataset::{Values, Variable};
use crate::error::{IngestError, Result};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

const CALENDAR_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
];

const LOOSE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const LOOSE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Which strategy decoded a dataset's times
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeStrategy {
    DaysSinceEpoch,
    CalendarText,
    LooseText,
}

impl TimeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeStrategy::DaysSinceEpoch => "days_since_epoch",
            TimeStrategy::CalendarText => "calendar_text",
            TimeStrategy::LooseText => "loose_text",
        }
    }
}

/// One timestamp per element of the time variable
#[derive(Debug, Clone)]
pub struct DecodedTimes {
    pub times: Vec<DateTime<Utc>>,
    pub strategy: TimeStrategy,
}

/// Decode a time variable into concrete UTC timestamps
pub fn decode_times(var: &Variable) -> Result<DecodedTimes> {
    match &var.values {
        Values::Numeric(values) => {
            let epoch = reference_epoch(var.units.as_deref())?;
            let times = values
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    let days = v.ok_or_else(|| {
                        IngestError::MalformedInput(format!("JULD[{}] is missing", i))
                    })?;
                    days_after(epoch, days).ok_or_else(|| {
                        IngestError::MalformedInput(format!("JULD[{}] = {} is out of range", i, days))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(DecodedTimes { times, strategy: TimeStrategy::DaysSinceEpoch })
        }
        Values::Text(values) => {
            if let Some(times) = decode_all(values, parse_calendar) {
                return Ok(DecodedTimes { times, strategy: TimeStrategy::CalendarText });
            }
            log::debug!("JULD is not uniform calendar text, trying loose parsing");

            // Units only matter for numeric strings
            let epoch = reference_epoch(var.units.as_deref()).ok();
            let loose = |s: &str| parse_loose(s, epoch);
            if let Some(times) = decode_all(values, loose) {
                return Ok(DecodedTimes { times, strategy: TimeStrategy::LooseText });
            }

            let bad = values
                .iter()
                .find(|s| parse_loose(s, epoch).is_none())
                .map(String::as_str)
                .unwrap_or_default();
            Err(IngestError::MalformedInput(format!("unparseable JULD value {:?}", bad)))
        }
    }
}

fn decode_all<F>(values: &[String], parse: F) -> Option<Vec<DateTime<Utc>>>
where
    F: Fn(&str) -> Option<DateTime<Utc>>,
{
    values.iter().map(|s| parse(s.as_str())).collect()
}

/// Epoch named by a `days since <date>` units attribute, or 1950-01-01
pub fn reference_epoch(units: Option<&str>) -> Result<DateTime<Utc>> {
    let Some(units) = units.map(str::trim).filter(|u| !u.is_empty()) else {
        return NaiveDate::from_ymd_opt(1950, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
            .ok_or_else(|| IngestError::Config("invalid default reference epoch".to_string()));
    };

    let lower = units.to_ascii_lowercase();
    let rest = lower.strip_prefix("days since").ok_or_else(|| {
        IngestError::MalformedInput(format!("unsupported JULD units {:?}", units))
    })?;

    let rest = rest.trim().trim_end_matches("utc").trim().trim_end_matches('z');
    let rest = rest.replace('t', " ");
    parse_naive(&rest, &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"], &["%Y-%m-%d"])
        .map(|naive| naive.and_utc())
        .ok_or_else(|| IngestError::MalformedInput(format!("unparseable JULD units {:?}", units)))
}

fn days_after(epoch: DateTime<Utc>, days: f64) -> Option<DateTime<Utc>> {
    if !days.is_finite() {
        return None;
    }
    let millis = (days * MILLIS_PER_DAY).round();
    if millis.abs() >= i64::MAX as f64 {
        return None;
    }
    let delta = TimeDelta::try_milliseconds(millis as i64)?;
    epoch.checked_add_signed(delta)
}

fn parse_calendar(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    parse_naive(value.trim_end_matches('Z'), CALENDAR_FORMATS, &[]).map(|n| n.and_utc())
}

fn parse_loose(value: &str, epoch: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    if let Some(dt) = parse_calendar(value) {
        return Some(dt);
    }

    let trimmed = value.trim();
    let trimmed = trimmed
        .strip_suffix("UTC")
        .unwrap_or(trimmed)
        .trim()
        .trim_end_matches('Z');

    if let Some(naive) = parse_compact(trimmed) {
        return Some(naive.and_utc());
    }
    if let Some(naive) = parse_naive(trimmed, LOOSE_DATETIME_FORMATS, LOOSE_DATE_FORMATS) {
        return Some(naive.and_utc());
    }

    let days = trimmed.parse::<f64>().ok()?;
    days_after(epoch?, days)
}

/// `YYYYMMDD` or `YYYYMMDDHHMISS`
fn parse_compact(value: &str) -> Option<NaiveDateTime> {
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let field = |range: std::ops::Range<usize>| value.get(range)?.parse::<u32>().ok();
    let date = |v: &str| -> Option<NaiveDate> {
        let year = v.get(0..4)?.parse::<i32>().ok()?;
        NaiveDate::from_ymd_opt(year, field(4..6)?, field(6..8)?)
    };

    match value.len() {
        8 => date(value)?.and_hms_opt(0, 0, 0),
        14 => date(value)?.and_hms_opt(field(8..10)?, field(10..12)?, field(12..14)?),
        _ => None,
    }
}

fn parse_naive(value: &str, datetime_formats: &[&str], date_formats: &[&str]) -> Option<NaiveDateTime> {
    datetime_formats
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            date_formats
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn text(values: &[&str]) -> Variable {
        Variable::text(vec![values.len()], values.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_numeric_days_since_default_epoch() {
        let var = Variable::numeric(vec![2], vec![Some(0.0), Some(1.5)]);
        let decoded = decode_times(&var).unwrap();
        assert_eq!(decoded.strategy, TimeStrategy::DaysSinceEpoch);
        assert_eq!(decoded.times[0], Utc.with_ymd_and_hms(1950, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(decoded.times[1], Utc.with_ymd_and_hms(1950, 1, 2, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_numeric_days_honour_units_epoch() {
        let var = Variable::numeric(vec![1], vec![Some(1.0)])
            .with_units("days since 2000-01-01 00:00:00 UTC");
        let decoded = decode_times(&var).unwrap();
        assert_eq!(decoded.times[0], Utc.with_ymd_and_hms(2000, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_unsupported_units_rejected() {
        let var = Variable::numeric(vec![1], vec![Some(1.0)]).with_units("seconds since 1970-01-01");
        assert!(matches!(decode_times(&var), Err(IngestError::MalformedInput(_))));
    }

    #[test]
    fn test_missing_numeric_time_rejected() {
        let var = Variable::numeric(vec![2], vec![Some(1.0), None]);
        let err = decode_times(&var).unwrap_err();
        assert!(err.to_string().contains("JULD[1]"));
    }

    #[test]
    fn test_calendar_text() {
        let decoded = decode_times(&text(&["2005-03-17T04:22:36Z", "2005-03-27 04:22:36"])).unwrap();
        assert_eq!(decoded.strategy, TimeStrategy::CalendarText);
        assert_eq!(decoded.times[0], Utc.with_ymd_and_hms(2005, 3, 17, 4, 22, 36).unwrap());
        assert_eq!(decoded.times[1], Utc.with_ymd_and_hms(2005, 3, 27, 4, 22, 36).unwrap());
    }

    #[test]
    fn test_loose_text_fallback_covers_mixed_values() {
        let decoded = decode_times(&text(&["2005-03-17T04:22:36Z", "20050318120000", "2005/03/19"])).unwrap();
        assert_eq!(decoded.strategy, TimeStrategy::LooseText);
        assert_eq!(decoded.times[1], Utc.with_ymd_and_hms(2005, 3, 18, 12, 0, 0).unwrap());
        assert_eq!(decoded.times[2], Utc.with_ymd_and_hms(2005, 3, 19, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_numeric_text_read_as_days() {
        let decoded = decode_times(&text(&["1.0"])).unwrap();
        assert_eq!(decoded.strategy, TimeStrategy::LooseText);
        assert_eq!(decoded.times[0], Utc.with_ymd_and_hms(1950, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_text_with_non_day_units_still_decodes() {
        let var = text(&["2005-03-17T04:22:36Z"]).with_units("UTC");
        let decoded = decode_times(&var).unwrap();
        assert_eq!(decoded.strategy, TimeStrategy::CalendarText);
        assert_eq!(decoded.times[0], Utc.with_ymd_and_hms(2005, 3, 17, 4, 22, 36).unwrap());

        let var = text(&["20050318120000"]).with_units("UTC");
        assert_eq!(decode_times(&var).unwrap().strategy, TimeStrategy::LooseText);
    }

    #[test]
    fn test_numeric_text_needs_day_units() {
        let var = text(&["1.0"]).with_units("seconds since 1970-01-01");
        assert!(matches!(decode_times(&var), Err(IngestError::MalformedInput(_))));
    }

    #[test]
    fn test_unparseable_text_rejected() {
        let err = decode_times(&text(&["2005-03-17", "not a date"])).unwrap_err();
        assert!(matches!(err, IngestError::MalformedInput(_)));
        assert!(err.to_string().contains("not a date"));
    }
}
