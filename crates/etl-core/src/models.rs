use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One country's cumulative counts on one reported date.
///
/// Produced by the extractor; `(country, date)` is unique across a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDailyPoint {
    pub country: String,
    pub date: NaiveDate,
    /// Running total of confirmed cases.
    pub cumulative_cases: u64,
    /// Running total of deaths.
    pub cumulative_deaths: u64,
    /// Running total of recoveries (0 when the source omits it).
    #[serde(default)]
    pub cumulative_recovered: u64,
}

/// A [`RawDailyPoint`] extended with the metrics derived from its country's
/// date-ordered history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedDailyRecord {
    pub country: String,
    pub date: NaiveDate,
    pub cumulative_cases: u64,
    pub cumulative_deaths: u64,
    pub cumulative_recovered: u64,
    /// Day-over-day change in cumulative cases (0 on a country's first day).
    pub new_cases: i64,
    pub new_deaths: i64,
    pub new_recovered: i64,
    /// `new_cases` as a percentage of the previous day's cumulative cases,
    /// rounded half-to-even to two decimals; 0 when indeterminate.
    pub growth_rate_pct: f64,
    /// Trailing mean of `new_cases` over up to seven records.
    pub new_cases_7day: i64,
    /// Trailing mean of `new_deaths` over up to seven records.
    pub new_deaths_7day: i64,
}

/// A single point of the per-country series view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountrySeriesPoint {
    pub date: NaiveDate,
    pub new_cases_7day: i64,
    pub growth_rate_pct: f64,
}

/// Sum of cumulative cases across all countries reporting on `date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalDailyTotal {
    pub date: NaiveDate,
    pub total_cases: i64,
}

/// A country's cumulative cases as of its own latest reported date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryTotal {
    pub country: String,
    pub latest_date: NaiveDate,
    pub total_cases: i64,
}

/// Earliest and latest dates present in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateBounds {
    pub min: NaiveDate,
    pub max: NaiveDate,
}

impl DateBounds {
    /// `true` when `date` lies within `min..=max`.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.min <= date && date <= self.max
    }
}

/// Inclusive date range used to filter query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl From<DateBounds> for DateRange {
    fn from(bounds: DateBounds) -> Self {
        DateRange {
            from: bounds.min,
            to: bounds.max,
        }
    }
}
