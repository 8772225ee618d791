//! Text -> typed value conversions. Every function here is total: bad input
//! yields `None`, never a panic or an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Spellings treated as "no value" in any letter case once the text is trimmed.
const NULL_SENTINELS: [&str; 3] = ["nan", "null", "none"];

/// Matched exactly; "Na" is a legitimate short name.
const NOT_AVAILABLE: &str = "NA";

const ISO_OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

const ISO_NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const FALLBACK_OFFSET_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
];

const FALLBACK_DATETIME_FORMATS: [&str; 6] = [
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y%m%dT%H%M%S",
    "%d %b %Y %H:%M:%S",
];

const FALLBACK_DATE_FORMATS: [&str; 11] = [
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%Y.%m.%d",
    "%Y%m%d",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%B %d %Y",
];

pub fn is_null_sentinel(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty()
        || trimmed == NOT_AVAILABLE
        || NULL_SENTINELS
            .iter()
            .any(|sentinel| trimmed.eq_ignore_ascii_case(sentinel))
}

/// Integer identifier. Decimal text is truncated toward zero.
pub fn parse_identifier(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if is_null_sentinel(trimmed) {
        return None;
    }
    if !trimmed.contains('.') {
        return trimmed.parse().ok();
    }

    let value: f64 = trimmed.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    let truncated = value.trunc();
    if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return None;
    }
    Some(truncated as i64)
}

/// Calendar date: strict ISO-8601 first, then the permissive layouts.
///
/// Date-times with an offset keep their local calendar date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if is_null_sentinel(trimmed) {
        return None;
    }
    parse_iso_date(trimmed).or_else(|| parse_permissive_date(trimmed))
}

fn parse_iso_date(text: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }

    let normalized = match text.strip_suffix('Z').or_else(|| text.strip_suffix('z')) {
        Some(head) => format!("{head}+00:00"),
        None => text.to_string(),
    };
    let with_offset = ISO_OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(&normalized, fmt).ok())
        .map(|dt| dt.date_naive());
    if with_offset.is_some() {
        return with_offset;
    }
    ISO_NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())
        .map(|dt| dt.date())
}

fn parse_permissive_date(text: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.date_naive());
    }
    FALLBACK_OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(text, fmt).ok())
        .map(|dt| dt.date_naive())
        .or_else(|| {
            FALLBACK_DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| {
            FALLBACK_DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonName {
    pub first: String,
    /// Everything after the first space; empty when the name is a single token.
    pub last: String,
}

pub fn split_name(raw: &str) -> Option<PersonName> {
    let trimmed = raw.trim();
    if is_null_sentinel(trimmed) {
        return None;
    }
    let (first, last) = trimmed.split_once(' ').unwrap_or((trimmed, ""));
    Some(PersonName {
        first: first.to_string(),
        last: last.to_string(),
    })
}
