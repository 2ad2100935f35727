//! Flattening of the nested per-country timeline payload.
//!
//! The upstream answers with an array of
//! `{country, timeline: {cases: {date: n}, deaths: {date: n}, recovered?: {date: n}}}`
//! and this module turns it into one [`RawDailyPoint`] per `(country, date)`.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use etl_core::error::{EtlError, Result};
use etl_core::models::RawDailyPoint;
use serde::Deserialize;
use tracing::{debug, info};

/// Date key format used by the upstream (`1/22/20`).
const UPSTREAM_DATE_FORMAT: &str = "%m/%d/%y";

/// ISO date keys are accepted too.
const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

// ── Payload shape ─────────────────────────────────────────────────────────────

/// One element of the upstream array.
#[derive(Debug, Clone, Deserialize)]
pub struct CountryTimeline {
    pub country: String,
    pub timeline: Timeline,
}

/// Cumulative series keyed by the upstream's date strings.
#[derive(Debug, Clone, Deserialize)]
pub struct Timeline {
    pub cases: BTreeMap<String, u64>,
    #[serde(default)]
    pub deaths: BTreeMap<String, u64>,
    #[serde(default)]
    pub recovered: BTreeMap<String, u64>,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Parse the raw payload text and flatten it.
///
/// Fails with [`EtlError::Parse`] when the text is not a JSON array of
/// timelines, or when a required field (`country`, `timeline.cases`) is
/// missing.
pub fn extract_from_str(payload: &str) -> Result<Vec<RawDailyPoint>> {
    let timelines: Vec<CountryTimeline> =
        serde_json::from_str(payload).map_err(|e| EtlError::Parse(e.to_string()))?;
    extract(&timelines)
}

/// Largest count accepted; the store keeps counts as signed 64-bit integers.
pub const MAX_COUNT: u64 = i64::MAX as u64;

/// Flatten already-decoded timelines into daily points.
///
/// One point is produced for every date in `cases`; missing `deaths` or
/// `recovered` entries for that date count as 0. Separate entries for the
/// same country (one per province upstream) are merged by summing their
/// counts. Two keys of one entry naming the same date (`1/22/20` and
/// `2020-01-22`) are a parse error, as is any count above [`MAX_COUNT`].
pub fn extract(timelines: &[CountryTimeline]) -> Result<Vec<RawDailyPoint>> {
    let mut points: Vec<RawDailyPoint> = Vec::new();
    let mut index: HashMap<(String, NaiveDate), usize> = HashMap::new();
    let mut merged = 0usize;

    for entry in timelines {
        let timeline = &entry.timeline;
        let mut seen: HashSet<NaiveDate> = HashSet::with_capacity(timeline.cases.len());
        for (key, &cases) in &timeline.cases {
            let date = parse_date_key(key).ok_or_else(|| {
                EtlError::Parse(format!(
                    "unrecognised date key {:?} for country {:?}",
                    key, entry.country
                ))
            })?;
            if !seen.insert(date) {
                return Err(EtlError::Parse(format!(
                    "date {} appears twice in one timeline for country {:?}",
                    date, entry.country
                )));
            }
            let deaths = timeline.deaths.get(key).copied().unwrap_or(0);
            let recovered = timeline.recovered.get(key).copied().unwrap_or(0);
            let counts = [cases, deaths, recovered];
            check_counts(&entry.country, date, counts)?;

            match index.get(&(entry.country.clone(), date)) {
                Some(&slot) => {
                    let point = &mut points[slot];
                    let summed = [
                        point.cumulative_cases.saturating_add(cases),
                        point.cumulative_deaths.saturating_add(deaths),
                        point.cumulative_recovered.saturating_add(recovered),
                    ];
                    check_counts(&entry.country, date, summed)?;
                    point.cumulative_cases = summed[0];
                    point.cumulative_deaths = summed[1];
                    point.cumulative_recovered = summed[2];
                    merged += 1;
                }
                None => {
                    index.insert((entry.country.clone(), date), points.len());
                    points.push(RawDailyPoint {
                        country: entry.country.clone(),
                        date,
                        cumulative_cases: cases,
                        cumulative_deaths: deaths,
                        cumulative_recovered: recovered,
                    });
                }
            }
        }
    }

    if merged > 0 {
        debug!("Merged {} duplicate (country, date) points", merged);
    }
    info!(
        "Extracted {} daily points from {} timelines",
        points.len(),
        timelines.len()
    );

    Ok(points)
}

/// Reject `[cases, deaths, recovered]` when any exceeds [`MAX_COUNT`].
fn check_counts(country: &str, date: NaiveDate, counts: [u64; 3]) -> Result<()> {
    if let Some(&count) = counts.iter().find(|&&c| c > MAX_COUNT) {
        return Err(EtlError::Parse(format!(
            "count {} for country {:?} on {} is out of range",
            count, country, date
        )));
    }
    Ok(())
}

/// Parse an upstream date key (`M/D/YY`) or an ISO `YYYY-MM-DD` key.
pub fn parse_date_key(key: &str) -> Option<NaiveDate> {
    let key = key.trim();
    NaiveDate::parse_from_str(key, UPSTREAM_DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(key, ISO_DATE_FORMAT))
        .ok()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
