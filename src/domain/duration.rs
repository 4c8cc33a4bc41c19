//! Subscription duration parsing
//!
//! Plans carry their duration as free text ("30", "1 month", "2 years").
//! This module formalizes that into a tagged unit/count pair so expiry
//! arithmetic and entitlement provisioning agree on one interpretation.

use regex::Regex;
use std::sync::OnceLock;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Recognized duration units, each reducible to a day count except the
/// sub-day units used only for second conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl DurationUnit {
    fn seconds(&self) -> i64 {
        match self {
            DurationUnit::Minute => 60,
            DurationUnit::Hour => 60 * 60,
            DurationUnit::Day => SECONDS_PER_DAY,
            DurationUnit::Week => 7 * SECONDS_PER_DAY,
            DurationUnit::Month => 30 * SECONDS_PER_DAY,
            DurationUnit::Year => 365 * SECONDS_PER_DAY,
        }
    }
}

/// A parsed duration: unit plus count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationSpec {
    pub unit: DurationUnit,
    pub count: u32,
}

fn digits() -> &'static Regex {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    DIGITS.get_or_init(|| Regex::new(r"\d+").expect("digit pattern is valid"))
}

impl DurationSpec {
    /// Parse a free-form duration string.
    ///
    /// "month" → 30-day units, "year" → 365-day units, "week" → 7-day units,
    /// "day"/bare integer → days; "hour"/"minute" are kept for second
    /// conversion. Unparseable input falls back to 30 days.
    pub fn parse(raw: &str) -> Self {
        let text = raw.to_lowercase();
        let count = digits()
            .find(&text)
            .and_then(|m| m.as_str().parse::<u32>().ok());

        let unit = if text.contains("month") {
            DurationUnit::Month
        } else if text.contains("year") {
            DurationUnit::Year
        } else if text.contains("week") {
            DurationUnit::Week
        } else if text.contains("day") {
            DurationUnit::Day
        } else if text.contains("hour") {
            DurationUnit::Hour
        } else if text.contains("minute") || text.contains("min") {
            DurationUnit::Minute
        } else if count.is_some() {
            DurationUnit::Day
        } else {
            // Unparseable: default to one month's worth of days
            return DurationSpec { unit: DurationUnit::Day, count: 30 };
        };

        DurationSpec { unit, count: count.unwrap_or(1) }
    }

    /// Whole days, rounding sub-day units up to at least one day so an
    /// expiry date always moves forward.
    pub fn days(&self) -> i64 {
        let seconds = self.seconds();
        (seconds + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
    }

    pub fn seconds(&self) -> i64 {
        self.unit.seconds() * self.count as i64
    }
}
