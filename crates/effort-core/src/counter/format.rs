//! Rendering counter values as filename prefixes.

use chrono::NaiveDate;

/// Zero-pad `count` to `width` digits; wider values are never truncated.
pub fn format_count(count: u64, width: usize) -> String {
    format!("{count:0width$}")
}

/// `YYYYMMDD-` followed by [`format_count`].
pub fn format_dated(count: u64, width: usize, date: NaiveDate) -> String {
    format!("{}-{}", date.format("%Y%m%d"), format_count(count, width))
}
