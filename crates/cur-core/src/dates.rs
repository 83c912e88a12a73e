//! Usage-date parsing for billing rows.
//!
//! Billing exports use RFC 3339 timestamps (`2025-09-01T00:00:00Z`) but
//! hand-edited and third-party exports drift into other layouts, so several
//! patterns are tried in order.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use regex::Regex;

const FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%MZ",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

fn iso_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}([T ].*)?$").expect("regex is valid"))
}

/// `true` when `value` looks like an ISO date or timestamp.
///
/// Used to detect column misalignment: a product code never looks like this.
pub fn looks_like_iso_date(value: &str) -> bool {
    iso_date_re().is_match(value.trim())
}

/// Parse a usage date into UTC. Returns `None` for blank or unrecognised
/// input; callers treat that as "no date" rather than an error.
pub fn parse_usage_date(value: &str) -> Option<DateTime<Utc>> {
    let s = value.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    let without_z = s.strip_suffix('Z').unwrap_or(s);
    for fmt in FORMATS {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(without_z, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            let naive = date.and_hms_opt(0, 0, 0)?;
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    None
}
