//! Billing dates and interval arithmetic.

use chrono::{DateTime, Days, Months, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Days added for a `bi-monthly` subscription unless configured otherwise.
pub const DEFAULT_BI_MONTHLY_INTERVAL_DAYS: u32 = 14;

/// Distance between two billing dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingInterval {
    Months(u32),
    Days(u32),
}

/// Interval lengths that are a product decision rather than a calendar fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalPolicy {
    pub bi_monthly_days: u32,
}

impl Default for IntervalPolicy {
    fn default() -> Self {
        Self {
            bi_monthly_days: DEFAULT_BI_MONTHLY_INTERVAL_DAYS,
        }
    }
}

/// A date as stored in the subscription file.
///
/// Older records carry full UTC timestamps (`2024-03-01T00:00:00.000Z`),
/// newer ones plain dates. Both are written back in the form they were read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsoDate {
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
}

#[derive(Debug, thiserror::Error)]
#[error("invalid ISO-8601 date '{0}'")]
pub struct InvalidDate(pub String);

impl IsoDate {
    /// The UTC calendar day, time of day discarded.
    pub fn calendar_date(&self) -> NaiveDate {
        match self {
            IsoDate::Date(date) => *date,
            IsoDate::DateTime(timestamp) => timestamp.date_naive(),
        }
    }

    /// Move forward by `interval`. Month arithmetic clamps to the last day of
    /// a shorter month. Returns `None` only on calendar overflow.
    pub fn advance(&self, interval: BillingInterval) -> Option<IsoDate> {
        match (self, interval) {
            (IsoDate::Date(date), BillingInterval::Months(n)) => {
                date.checked_add_months(Months::new(n)).map(IsoDate::Date)
            }
            (IsoDate::Date(date), BillingInterval::Days(n)) => date
                .checked_add_days(Days::new(u64::from(n)))
                .map(IsoDate::Date),
            (IsoDate::DateTime(ts), BillingInterval::Months(n)) => {
                ts.checked_add_months(Months::new(n)).map(IsoDate::DateTime)
            }
            (IsoDate::DateTime(ts), BillingInterval::Days(n)) => ts
                .checked_add_days(Days::new(u64::from(n)))
                .map(IsoDate::DateTime),
        }
    }
}

impl From<NaiveDate> for IsoDate {
    fn from(date: NaiveDate) -> Self {
        IsoDate::Date(date)
    }
}

impl FromStr for IsoDate {
    type Err = InvalidDate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(IsoDate::Date(date));
        }
        if let Ok(timestamp) = DateTime::parse_from_rfc3339(s) {
            return Ok(IsoDate::DateTime(timestamp.with_timezone(&Utc)));
        }
        // Timestamps without an offset are taken as UTC.
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| IsoDate::DateTime(naive.and_utc()))
            .map_err(|_| InvalidDate(s.to_string()))
    }
}

impl fmt::Display for IsoDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsoDate::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            IsoDate::DateTime(ts) => {
                write!(f, "{}", ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
        }
    }
}

impl Serialize for IsoDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IsoDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}
