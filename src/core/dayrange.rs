//! Day keys and date ranges.
//!
//! Days are identified by fixed-width `YYYY-MM-DD` strings so that ordinal
//! string comparison agrees with chronological order. That invariant is what
//! makes the cheap string range-checks in the scanners valid.

use chrono::{Days, NaiveDate};

/// Format a date as a zero-padded `YYYY-MM-DD` day key.
#[must_use]
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parse a day key back into a date. Malformed input yields `None`.
///
/// Only fixed-width `YYYY-MM-DD` is accepted; chrono alone would also
/// parse unpadded dates, which would break ordinal comparison.
#[must_use]
pub fn parse_day_key(key: &str) -> Option<NaiveDate> {
    if key.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()
}

/// Whether `key` falls within `[since, until]`, inclusive both ends.
///
/// Ordinal comparison only; all three arguments must be day keys.
#[must_use]
pub fn in_range(key: &str, since: &str, until: &str) -> bool {
    key >= since && key <= until
}

/// A nominal day range plus the padded range used while scanning raw logs.
///
/// The scan range extends one day on each side to tolerate timestamps
/// recorded in a timezone that can push an event's local-log date one day
/// outside the nominal UTC range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayRange {
    pub since: String,
    pub until: String,
    pub scan_since: String,
    pub scan_until: String,
}

impl DayRange {
    /// Build a range from inclusive endpoint dates.
    #[must_use]
    pub fn new(since: NaiveDate, until: NaiveDate) -> Self {
        let scan_since = since.checked_sub_days(Days::new(1)).unwrap_or(since);
        let scan_until = until.checked_add_days(Days::new(1)).unwrap_or(until);
        Self {
            since: day_key(since),
            until: day_key(until),
            scan_since: day_key(scan_since),
            scan_until: day_key(scan_until),
        }
    }

    /// The rolling window ending at `today`, covering `days` days inclusive.
    #[must_use]
    pub fn last_days(days: u32, today: NaiveDate) -> Self {
        let since = today
            .checked_sub_days(Days::new(u64::from(days.saturating_sub(1))))
            .unwrap_or(today);
        Self::new(since, today)
    }

    /// Whether a day key is in the nominal range.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        in_range(key, &self.since, &self.until)
    }

    /// Whether a day key is in the padded scan range.
    #[must_use]
    pub fn scan_contains(&self, key: &str) -> bool {
        in_range(key, &self.scan_since, &self.scan_until)
    }
}
