//! Display formatting for dates, durations, and diff sizes.
//!
//! Absent values (no timing samples yet) always format as "N/A" so the
//! rendering side never sees a hole in the table.

use chrono::{DateTime, Datelike, Utc};

/// Formats `value` with at most `max_decimals` decimal places, without
/// padding trailing zeros (`2.0` formats as "2", `2.5` as "2.5").
pub fn to_trimmed(max_decimals: usize, value: f64) -> String {
    let printed = value.to_string();
    let decimals = printed.split('.').nth(1).map_or(0, str::len);
    format!("{:.*}", decimals.min(max_decimals), value)
}

/// Renders a millisecond duration as fractional hours, e.g. "3.2 hours".
pub fn humanize_duration(millis: Option<f64>) -> String {
    match millis {
        None => "N/A".to_string(),
        Some(ms) => {
            let hours = ms / 1000.0 / 60.0 / 60.0;
            format!("{} hours", to_trimmed(1, hours))
        }
    }
}

/// Renders average added/removed line counts as "153 (+120/-33)".
pub fn diff_summary(additions: Option<f64>, deletions: Option<f64>) -> String {
    match (additions, deletions) {
        (Some(add), Some(del)) => format!(
            "{} (+{}/-{})",
            to_trimmed(0, add + del),
            to_trimmed(0, add),
            to_trimmed(0, del)
        ),
        _ => "N/A".to_string(),
    }
}

/// M/D/YYYY in UTC, the header format the overlay displays.
pub fn format_date(date: &DateTime<Utc>) -> String {
    format!("{}/{}/{}", date.month(), date.day(), date.year())
}
