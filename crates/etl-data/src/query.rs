//! Read-only aggregate views over the stored relation.
//!
//! Every caller-supplied value travels as a bound parameter. Country and date
//! inputs are validated against what the store actually holds before the data
//! query runs.

use chrono::NaiveDate;
use etl_core::error::{QueryInputError, Result};
use etl_core::models::{CountrySeriesPoint, CountryTotal, DateBounds, DateRange, GlobalDailyTotal};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::store::{table_exists, Store, TABLE_NAME};

/// Date format accepted for query bounds.
pub const QUERY_DATE_FORMAT: &str = "%Y-%m-%d";

/// Default number of rows for [`QueryService::top_countries`].
pub const DEFAULT_TOP_LIMIT: usize = 10;

// ── Input parsing ─────────────────────────────────────────────────────────────

/// Parse a `YYYY-MM-DD` query date.
pub fn parse_query_date(value: &str) -> std::result::Result<NaiveDate, QueryInputError> {
    NaiveDate::parse_from_str(value.trim(), QUERY_DATE_FORMAT)
        .map_err(|_| QueryInputError::MalformedDate(value.to_string()))
}

/// Build an inclusive range, rejecting `from > to`.
pub fn date_range(from: NaiveDate, to: NaiveDate) -> std::result::Result<DateRange, QueryInputError> {
    if from > to {
        return Err(QueryInputError::InvertedRange { from, to });
    }
    Ok(DateRange { from, to })
}

/// Parse both ends of a range from text.
pub fn parse_date_range(from: &str, to: &str) -> std::result::Result<DateRange, QueryInputError> {
    date_range(parse_query_date(from)?, parse_query_date(to)?)
}

// ── QueryService ──────────────────────────────────────────────────────────────

/// Answers the aggregate queries against the stored relation.
#[derive(Debug, Clone)]
pub struct QueryService {
    store: Store,
}

impl QueryService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// All stored country names, ascending. Empty when nothing is loaded.
    pub fn distinct_countries(&self) -> Result<Vec<String>> {
        let conn = self.store.lock();
        if !table_exists(&conn)? {
            return Ok(Vec::new());
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT country FROM {TABLE_NAME} ORDER BY country"
        ))?;
        let countries = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(countries)
    }

    /// Earliest and latest stored dates, `None` when nothing is loaded.
    pub fn date_bounds(&self) -> Result<Option<DateBounds>> {
        bounds(&self.store.lock())
    }

    /// Turn optional textual bounds into a validated range, filling missing
    /// ends from [`QueryService::date_bounds`].
    pub fn resolve_range(&self, from: Option<&str>, to: Option<&str>) -> Result<DateRange> {
        let full = DateRange::from(require_bounds(&self.store.lock())?);
        let from = from.map(parse_query_date).transpose()?.unwrap_or(full.from);
        let to = to.map(parse_query_date).transpose()?.unwrap_or(full.to);
        Ok(date_range(from, to)?)
    }

    /// Smoothed new cases and growth rate for `country`, date ascending.
    ///
    /// Validation and the data query read one snapshot, so a concurrent
    /// reload cannot slip in between them.
    pub fn country_series(&self, country: &str, range: DateRange) -> Result<Vec<CountrySeriesPoint>> {
        let conn = self.store.lock();
        let snapshot = conn.unchecked_transaction()?;
        validate_range(&snapshot, range)?;
        validate_country(&snapshot, country)?;

        let mut stmt = snapshot.prepare(&format!(
            "SELECT date, new_cases_7day, growth_rate_pct
             FROM {TABLE_NAME}
             WHERE country = ?1 AND date BETWEEN ?2 AND ?3
             ORDER BY date"
        ))?;
        let points = stmt
            .query_map(params![country, range.from, range.to], |row| {
                Ok(CountrySeriesPoint {
                    date: row.get(0)?,
                    new_cases_7day: row.get(1)?,
                    growth_rate_pct: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        debug!("country_series({}) -> {} points", country, points.len());
        Ok(points)
    }

    /// Sum of cumulative cases across reporting countries per date.
    pub fn global_daily_total(&self, range: DateRange) -> Result<Vec<GlobalDailyTotal>> {
        let conn = self.store.lock();
        let snapshot = conn.unchecked_transaction()?;
        validate_range(&snapshot, range)?;

        let mut stmt = snapshot.prepare(&format!(
            "SELECT date, SUM(cases) AS total_cases
             FROM {TABLE_NAME}
             WHERE date BETWEEN ?1 AND ?2
             GROUP BY date
             ORDER BY date"
        ))?;
        let totals = stmt
            .query_map(params![range.from, range.to], |row| {
                Ok(GlobalDailyTotal {
                    date: row.get(0)?,
                    total_cases: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        debug!("global_daily_total -> {} days", totals.len());
        Ok(totals)
    }

    /// Up to `limit` countries ordered by cumulative cases at their own
    /// latest date, descending; ties go to the alphabetically first country.
    ///
    /// Both `latest_date` and `total_cases` are read from the same row: the
    /// one holding the country's maximum date.
    pub fn top_countries(&self, limit: usize) -> Result<Vec<CountryTotal>> {
        if limit == 0 {
            return Err(QueryInputError::InvalidLimit(limit).into());
        }
        let conn = self.store.lock();
        let snapshot = conn.unchecked_transaction()?;
        require_bounds(&snapshot)?;

        let mut stmt = snapshot.prepare(&format!(
            "SELECT c.country, c.date, c.cases
             FROM {TABLE_NAME} AS c
             JOIN (
                 SELECT country, MAX(date) AS latest
                 FROM {TABLE_NAME}
                 GROUP BY country
             ) AS m ON c.country = m.country AND c.date = m.latest
             ORDER BY c.cases DESC, c.country ASC
             LIMIT ?1"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let top = stmt
            .query_map(params![limit], |row| {
                Ok(CountryTotal {
                    country: row.get(0)?,
                    latest_date: row.get(1)?,
                    total_cases: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(top)
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

fn bounds(conn: &Connection) -> Result<Option<DateBounds>> {
    if !table_exists(conn)? {
        return Ok(None);
    }
    let (min, max): (Option<NaiveDate>, Option<NaiveDate>) = conn.query_row(
        &format!("SELECT MIN(date), MAX(date) FROM {TABLE_NAME}"),
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(min.zip(max).map(|(min, max)| DateBounds { min, max }))
}

fn require_bounds(conn: &Connection) -> Result<DateBounds> {
    Ok(bounds(conn)?.ok_or(QueryInputError::EmptyStore)?)
}

fn validate_range(conn: &Connection, range: DateRange) -> Result<()> {
    let DateRange { from, to } = date_range(range.from, range.to)?;
    let bounds = require_bounds(conn)?;
    if !bounds.contains(from) || !bounds.contains(to) {
        return Err(QueryInputError::OutOfBounds {
            from,
            to,
            min: bounds.min,
            max: bounds.max,
        }
        .into());
    }
    Ok(())
}

fn validate_country(conn: &Connection, country: &str) -> Result<()> {
    let known: Option<i64> = conn
        .query_row(
            &format!("SELECT 1 FROM {TABLE_NAME} WHERE country = ?1 LIMIT 1"),
            params![country],
            |row| row.get(0),
        )
        .optional()?;
    if known.is_none() {
        return Err(QueryInputError::UnknownCountry(country.to_string()).into());
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::Loader;
    use crate::transformer::DailyTransformer;
    use etl_core::error::EtlError;
    use etl_core::models::RawDailyPoint;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn point(country: &str, d: &str, cases: u64) -> RawDailyPoint {
        RawDailyPoint {
            country: country.to_string(),
            date: date(d),
            cumulative_cases: cases,
            cumulative_deaths: 0,
            cumulative_recovered: 0,
        }
    }

    /// X: 10, 15, 27 on d1..d3; Y: 4, 6 on d1..d2; Z: 100 on d1 only.
    fn loaded_service() -> QueryService {
        let points = vec![
            point("X", "2020-01-22", 10),
            point("X", "2020-01-23", 15),
            point("X", "2020-01-24", 27),
            point("Y", "2020-01-22", 4),
            point("Y", "2020-01-23", 6),
            point("Z", "2020-01-22", 100),
        ];
        let store = Store::open_memory().unwrap();
        Loader::new(store.clone())
            .load(&DailyTransformer::transform(points))
            .unwrap();
        QueryService::new(store)
    }

    fn range(from: &str, to: &str) -> DateRange {
        parse_date_range(from, to).unwrap()
    }

    // ── input parsing ─────────────────────────────────────────────────────────

    #[test]
    fn test_parse_query_date_rejects_malformed() {
        assert_eq!(
            parse_query_date("1/22/20"),
            Err(QueryInputError::MalformedDate("1/22/20".to_string()))
        );
        assert!(parse_query_date("2020-02-30").is_err());
        assert!(parse_query_date("2020-01-01' OR '1'='1").is_err());
    }

    #[test]
    fn test_parse_date_range_inverted() {
        let err = parse_date_range("2020-02-01", "2020-01-01").unwrap_err();
        assert!(matches!(err, QueryInputError::InvertedRange { .. }));
    }

    #[test]
    fn test_parse_date_range_single_day() {
        let r = range("2020-01-22", "2020-01-22");
        assert_eq!(r.from, r.to);
    }

    // ── auxiliary queries ─────────────────────────────────────────────────────

    #[test]
    fn test_distinct_countries_sorted() {
        let service = loaded_service();
        assert_eq!(service.distinct_countries().unwrap(), vec!["X", "Y", "Z"]);
    }

    #[test]
    fn test_date_bounds() {
        let bounds = loaded_service().date_bounds().unwrap().unwrap();
        assert_eq!(bounds.min, date("2020-01-22"));
        assert_eq!(bounds.max, date("2020-01-24"));
    }

    #[test]
    fn test_empty_store_auxiliary_queries() {
        let service = QueryService::new(Store::open_memory().unwrap());
        assert!(service.distinct_countries().unwrap().is_empty());
        assert!(service.date_bounds().unwrap().is_none());
    }

    #[test]
    fn test_resolve_range_defaults_to_bounds() {
        let service = loaded_service();
        let r = service.resolve_range(None, Some("2020-01-23")).unwrap();
        assert_eq!(r.from, date("2020-01-22"));
        assert_eq!(r.to, date("2020-01-23"));
    }

    // ── country_series ────────────────────────────────────────────────────────

    #[test]
    fn test_country_series_inclusive_range() {
        let service = loaded_service();
        let series = service
            .country_series("X", range("2020-01-22", "2020-01-23"))
            .unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].date, date("2020-01-22"));
        assert_eq!(series[1].date, date("2020-01-23"));
        assert_eq!(series[1].growth_rate_pct, 50.0);
        assert_eq!(series[1].new_cases_7day, 2);
    }

    #[test]
    fn test_country_series_full_range_ordered() {
        let service = loaded_service();
        let series = service
            .country_series("X", range("2020-01-22", "2020-01-24"))
            .unwrap();
        let growth: Vec<f64> = series.iter().map(|p| p.growth_rate_pct).collect();
        assert_eq!(growth, vec![0.0, 50.0, 80.0]);
        assert!(series.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn test_country_series_unknown_country() {
        let err = loaded_service()
            .country_series("Atlantis", range("2020-01-22", "2020-01-24"))
            .unwrap_err();
        assert!(matches!(
            err,
            EtlError::QueryInput(QueryInputError::UnknownCountry(ref c)) if c == "Atlantis"
        ));
    }

    #[test]
    fn test_country_series_injection_attempt_is_just_unknown() {
        let service = loaded_service();
        let err = service
            .country_series("X' OR '1'='1", range("2020-01-22", "2020-01-24"))
            .unwrap_err();
        assert!(matches!(
            err,
            EtlError::QueryInput(QueryInputError::UnknownCountry(_))
        ));
        // The relation is untouched.
        assert_eq!(service.distinct_countries().unwrap().len(), 3);
    }

    #[test]
    fn test_country_series_out_of_bounds() {
        let err = loaded_service()
            .country_series("X", range("2019-12-31", "2020-01-23"))
            .unwrap_err();
        assert!(matches!(
            err,
            EtlError::QueryInput(QueryInputError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_country_series_inverted_range_struct() {
        let inverted = DateRange {
            from: date("2020-01-24"),
            to: date("2020-01-22"),
        };
        let err = loaded_service().country_series("X", inverted).unwrap_err();
        assert!(matches!(
            err,
            EtlError::QueryInput(QueryInputError::InvertedRange { .. })
        ));
    }

    #[test]
    fn test_country_series_empty_store() {
        let service = QueryService::new(Store::open_memory().unwrap());
        let err = service
            .country_series("X", range("2020-01-22", "2020-01-23"))
            .unwrap_err();
        assert!(matches!(err, EtlError::QueryInput(QueryInputError::EmptyStore)));
    }

    // ── global_daily_total ────────────────────────────────────────────────────

    #[test]
    fn test_global_daily_total_sums_reporting_countries() {
        let totals = loaded_service()
            .global_daily_total(range("2020-01-22", "2020-01-24"))
            .unwrap();

        assert_eq!(
            totals,
            vec![
                GlobalDailyTotal { date: date("2020-01-22"), total_cases: 114 },
                GlobalDailyTotal { date: date("2020-01-23"), total_cases: 21 },
                GlobalDailyTotal { date: date("2020-01-24"), total_cases: 27 },
            ]
        );
    }

    #[test]
    fn test_global_daily_total_restricted_range() {
        let totals = loaded_service()
            .global_daily_total(range("2020-01-23", "2020-01-23"))
            .unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].total_cases, 21);
    }

    // ── top_countries ─────────────────────────────────────────────────────────

    #[test]
    fn test_top_countries_uses_latest_row() {
        let top = loaded_service().top_countries(DEFAULT_TOP_LIMIT).unwrap();

        assert_eq!(
            top,
            vec![
                CountryTotal {
                    country: "Z".to_string(),
                    latest_date: date("2020-01-22"),
                    total_cases: 100,
                },
                CountryTotal {
                    country: "X".to_string(),
                    latest_date: date("2020-01-24"),
                    total_cases: 27,
                },
                CountryTotal {
                    country: "Y".to_string(),
                    latest_date: date("2020-01-23"),
                    total_cases: 6,
                },
            ]
        );
    }

    #[test]
    fn test_top_countries_pairs_cases_with_max_date_after_revision() {
        // W's cumulative drops on its last day; the latest row must still win.
        let points = vec![
            point("W", "2020-01-22", 50),
            point("W", "2020-01-23", 40),
            point("V", "2020-01-22", 45),
        ];
        let store = Store::open_memory().unwrap();
        Loader::new(store.clone())
            .load(&DailyTransformer::transform(points))
            .unwrap();
        let top = QueryService::new(store).top_countries(10).unwrap();

        assert_eq!(top[0].country, "V");
        assert_eq!(top[1].country, "W");
        assert_eq!(top[1].latest_date, date("2020-01-23"));
        assert_eq!(top[1].total_cases, 40);
    }

    #[test]
    fn test_top_countries_limit_and_ties() {
        let points = vec![
            point("B", "2020-01-22", 10),
            point("A", "2020-01-22", 10),
            point("C", "2020-01-22", 5),
        ];
        let store = Store::open_memory().unwrap();
        Loader::new(store.clone())
            .load(&DailyTransformer::transform(points))
            .unwrap();
        let top = QueryService::new(store).top_countries(2).unwrap();

        let names: Vec<&str> = top.iter().map(|t| t.country.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_top_countries_zero_limit_rejected() {
        let err = loaded_service().top_countries(0).unwrap_err();
        assert!(matches!(
            err,
            EtlError::QueryInput(QueryInputError::InvalidLimit(0))
        ));
    }

    #[test]
    fn test_top_countries_huge_limit_returns_all() {
        let top = loaded_service().top_countries(usize::MAX).unwrap();
        assert_eq!(top.len(), 3);
    }

    // ── concurrent reloads ────────────────────────────────────────────────────

    #[test]
    fn test_country_series_consistent_under_concurrent_reload() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("covid.db");
        let busy = std::time::Duration::from_secs(10);
        let series = |country: &str| {
            DailyTransformer::transform(vec![
                point(country, "2020-01-22", 1),
                point(country, "2020-01-23", 2),
                point(country, "2020-01-24", 3),
            ])
        };
        let with_x = series("X");
        let with_y = series("Y");

        let reader = Store::open(&path, busy).unwrap();
        Loader::new(reader.clone()).load(&with_x).unwrap();
        let writer = Store::open(&path, busy).unwrap();

        let reloads = std::thread::spawn(move || {
            let loader = Loader::new(writer);
            for i in 0..40 {
                let records = if i % 2 == 0 { &with_y } else { &with_x };
                loader.load(records).unwrap();
            }
        });

        let service = QueryService::new(reader);
        let full = range("2020-01-22", "2020-01-24");
        for _ in 0..200 {
            match service.country_series("X", full) {
                Ok(points) => assert_eq!(points.len(), 3, "validated country had no rows"),
                Err(EtlError::QueryInput(QueryInputError::UnknownCountry(_))) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        reloads.join().unwrap();
    }
}
