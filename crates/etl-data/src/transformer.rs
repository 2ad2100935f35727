//! Per-country derivation of daily metrics.
//!
//! Points are grouped by country, each group is sorted by date, and every
//! group is handed to [`DailyTransformer::derive_country`], a pure function
//! of that one country's cumulative history.

use std::collections::BTreeMap;

use etl_core::calculations::{MetricCalculator, ROLLING_WINDOW};
use etl_core::models::{DerivedDailyRecord, RawDailyPoint};
use tracing::{debug, info, warn};

// ── TransformSummary ──────────────────────────────────────────────────────────

/// Counters describing one transform run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformSummary {
    pub countries: usize,
    pub records: usize,
    /// Growth values forced to 0 because the previous cumulative was 0.
    pub coerced_growth: usize,
    /// Points dropped because their `(country, date)` was already seen.
    pub duplicates_dropped: usize,
}

// ── DailyTransformer ──────────────────────────────────────────────────────────

/// Stateless helper that turns raw cumulative points into derived records.
pub struct DailyTransformer;

impl DailyTransformer {
    /// Derive metrics for every country.
    ///
    /// Output is grouped by country (ascending) with each country's records in
    /// date order.
    pub fn transform(points: Vec<RawDailyPoint>) -> Vec<DerivedDailyRecord> {
        Self::transform_with_summary(points).0
    }

    /// Same as [`DailyTransformer::transform`], also returning run counters.
    pub fn transform_with_summary(
        points: Vec<RawDailyPoint>,
    ) -> (Vec<DerivedDailyRecord>, TransformSummary) {
        let mut summary = TransformSummary::default();
        let groups = Self::group_by_country(points, &mut summary);
        summary.countries = groups.len();

        let mut records = Vec::new();
        for (country, series) in &groups {
            summary.coerced_growth += series
                .windows(2)
                .filter(|pair| pair[0].cumulative_cases == 0)
                .count();
            let derived = Self::derive_country(series);
            debug!("{}: {} derived records", country, derived.len());
            records.extend(derived);
        }
        summary.records = records.len();

        info!(
            countries = summary.countries,
            records = summary.records,
            coerced_growth = summary.coerced_growth,
            "Transform complete"
        );

        (records, summary)
    }

    /// Derive one country's records from its date-ascending points.
    ///
    /// The caller guarantees `series` belongs to a single country, is sorted by
    /// date and has no repeated dates.
    pub fn derive_country(series: &[RawDailyPoint]) -> Vec<DerivedDailyRecord> {
        let cases: Vec<u64> = series.iter().map(|p| p.cumulative_cases).collect();
        let deaths: Vec<u64> = series.iter().map(|p| p.cumulative_deaths).collect();
        let recovered: Vec<u64> = series.iter().map(|p| p.cumulative_recovered).collect();

        let new_cases = MetricCalculator::daily_deltas(&cases);
        let new_deaths = MetricCalculator::daily_deltas(&deaths);
        let new_recovered = MetricCalculator::daily_deltas(&recovered);

        let growth = MetricCalculator::growth_rates(&new_cases, &cases);
        let cases_7day = MetricCalculator::rolling_mean(&new_cases, ROLLING_WINDOW);
        let deaths_7day = MetricCalculator::rolling_mean(&new_deaths, ROLLING_WINDOW);

        series
            .iter()
            .enumerate()
            .map(|(i, point)| DerivedDailyRecord {
                country: point.country.clone(),
                date: point.date,
                cumulative_cases: point.cumulative_cases,
                cumulative_deaths: point.cumulative_deaths,
                cumulative_recovered: point.cumulative_recovered,
                new_cases: new_cases[i],
                new_deaths: new_deaths[i],
                new_recovered: new_recovered[i],
                growth_rate_pct: growth[i],
                new_cases_7day: cases_7day[i],
                new_deaths_7day: deaths_7day[i],
            })
            .collect()
    }

    // ── Private ───────────────────────────────────────────────────────────────

    /// Group points by country, sort each group by date and drop repeated
    /// dates (first occurrence wins).
    fn group_by_country(
        points: Vec<RawDailyPoint>,
        summary: &mut TransformSummary,
    ) -> BTreeMap<String, Vec<RawDailyPoint>> {
        let mut groups: BTreeMap<String, Vec<RawDailyPoint>> = BTreeMap::new();
        for point in points {
            groups.entry(point.country.clone()).or_default().push(point);
        }

        for (country, series) in groups.iter_mut() {
            series.sort_by_key(|p| p.date);
            let before = series.len();
            series.dedup_by_key(|p| p.date);
            let dropped = before - series.len();
            if dropped > 0 {
                warn!("{}: dropped {} repeated dates", country, dropped);
                summary.duplicates_dropped += dropped;
            }
        }

        groups
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn point(country: &str, d: &str, cases: u64, deaths: u64) -> RawDailyPoint {
        RawDailyPoint {
            country: country.to_string(),
            date: date(d),
            cumulative_cases: cases,
            cumulative_deaths: deaths,
            cumulative_recovered: 0,
        }
    }

    fn for_country<'a>(records: &'a [DerivedDailyRecord], country: &str) -> Vec<&'a DerivedDailyRecord> {
        records.iter().filter(|r| r.country == country).collect()
    }

    // ── worked example ────────────────────────────────────────────────────────

    #[test]
    fn test_worked_example() {
        let points = vec![
            point("X", "2020-01-22", 10, 1),
            point("X", "2020-01-23", 15, 1),
            point("X", "2020-01-24", 27, 2),
        ];
        let records = DailyTransformer::transform(points);

        let new_cases: Vec<i64> = records.iter().map(|r| r.new_cases).collect();
        let new_deaths: Vec<i64> = records.iter().map(|r| r.new_deaths).collect();
        let growth: Vec<f64> = records.iter().map(|r| r.growth_rate_pct).collect();
        let cases_7day: Vec<i64> = records.iter().map(|r| r.new_cases_7day).collect();
        let deaths_7day: Vec<i64> = records.iter().map(|r| r.new_deaths_7day).collect();

        assert_eq!(new_cases, vec![0, 5, 12]);
        assert_eq!(new_deaths, vec![0, 0, 1]);
        assert_eq!(growth, vec![0.0, 50.0, 80.0]);
        // Mean of [0, 5] is 2.5, which rounds half-to-even to 2.
        assert_eq!(cases_7day, vec![0, 2, 6]);
        // Means 0, 0, 1/3.
        assert_eq!(deaths_7day, vec![0, 0, 0]);
    }

    // ── ordering and grouping ─────────────────────────────────────────────────

    #[test]
    fn test_unsorted_input_is_sorted_per_country() {
        let points = vec![
            point("X", "2020-01-24", 27, 2),
            point("Y", "2020-01-22", 4, 0),
            point("X", "2020-01-22", 10, 1),
            point("X", "2020-01-23", 15, 1),
        ];
        let records = DailyTransformer::transform(points);
        let x = for_country(&records, "X");

        let dates: Vec<NaiveDate> = x.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![date("2020-01-22"), date("2020-01-23"), date("2020-01-24")]);
        assert_eq!(x[1].new_cases, 5);
    }

    #[test]
    fn test_countries_are_independent() {
        let points = vec![
            point("X", "2020-01-22", 10, 0),
            point("X", "2020-01-23", 20, 0),
            point("Y", "2020-01-23", 1000, 0),
        ];
        let records = DailyTransformer::transform(points);
        let y = for_country(&records, "Y");

        // Y's first day is not diffed against X's last day.
        assert_eq!(y.len(), 1);
        assert_eq!(y[0].new_cases, 0);
        assert_eq!(y[0].growth_rate_pct, 0.0);
    }

    #[test]
    fn test_output_grouped_by_country_ascending() {
        let points = vec![
            point("Zambia", "2020-01-22", 1, 0),
            point("Albania", "2020-01-22", 1, 0),
        ];
        let records = DailyTransformer::transform(points);
        assert_eq!(records[0].country, "Albania");
        assert_eq!(records[1].country, "Zambia");
    }

    #[test]
    fn test_repeated_dates_are_dropped() {
        let points = vec![
            point("X", "2020-01-22", 10, 0),
            point("X", "2020-01-22", 99, 0),
            point("X", "2020-01-23", 12, 0),
        ];
        let (records, summary) = DailyTransformer::transform_with_summary(points);
        assert_eq!(records.len(), 2);
        assert_eq!(summary.duplicates_dropped, 1);
        assert_eq!(records[1].new_cases, 2);
    }

    // ── first-day policy ──────────────────────────────────────────────────────

    #[test]
    fn test_first_day_deltas_are_zero() {
        let mut first = point("X", "2020-01-22", 500, 20);
        first.cumulative_recovered = 7;
        let records = DailyTransformer::transform(vec![first]);

        assert_eq!(records[0].new_cases, 0);
        assert_eq!(records[0].new_deaths, 0);
        assert_eq!(records[0].new_recovered, 0);
        assert_eq!(records[0].growth_rate_pct, 0.0);
    }

    // ── growth coercion ───────────────────────────────────────────────────────

    #[test]
    fn test_growth_after_zero_cumulative_is_zero() {
        let points = vec![
            point("X", "2020-01-22", 0, 0),
            point("X", "2020-01-23", 3, 0),
            point("X", "2020-01-24", 6, 0),
        ];
        let (records, summary) = DailyTransformer::transform_with_summary(points);

        assert_eq!(records[1].growth_rate_pct, 0.0);
        assert_eq!(records[2].growth_rate_pct, 100.0);
        assert_eq!(summary.coerced_growth, 1);
        assert!(records.iter().all(|r| r.growth_rate_pct.is_finite()));
    }

    // ── rolling window ────────────────────────────────────────────────────────

    #[test]
    fn test_rolling_window_caps_at_seven() {
        // Cumulative grows by 7 for seven days, then by 14.
        let mut points = Vec::new();
        let start = date("2020-03-01");
        let mut total = 0;
        for i in 0..9 {
            total += if i == 8 { 14 } else if i == 0 { 0 } else { 7 };
            let d = start + chrono::Duration::days(i);
            points.push(point("X", &d.format("%Y-%m-%d").to_string(), total, 0));
        }
        let records = DailyTransformer::transform(points);
        let means: Vec<i64> = records.iter().map(|r| r.new_cases_7day).collect();

        // new_cases: [0, 7, 7, 7, 7, 7, 7, 7, 14]
        // i = 6: 42 / 7 = 6; i = 7: 49 / 7 = 7; i = 8: 56 / 7 = 8
        assert_eq!(means[6], 6);
        assert_eq!(means[7], 7);
        assert_eq!(means[8], 8);
    }

    // ── summary ───────────────────────────────────────────────────────────────

    #[test]
    fn test_summary_counts() {
        let points = vec![
            point("X", "2020-01-22", 1, 0),
            point("X", "2020-01-23", 2, 0),
            point("Y", "2020-01-22", 1, 0),
        ];
        let (_, summary) = DailyTransformer::transform_with_summary(points);
        assert_eq!(summary.countries, 2);
        assert_eq!(summary.records, 3);
    }

    #[test]
    fn test_empty_input() {
        let (records, summary) = DailyTransformer::transform_with_summary(vec![]);
        assert!(records.is_empty());
        assert_eq!(summary, TransformSummary::default());
    }
}
