//! Text and JSON rendering of command results.

use etl_core::formatting::{format_count, format_pct, render_table};
use etl_core::models::{CountrySeriesPoint, CountryTotal, DateBounds, GlobalDailyTotal};
use etl_runtime::orchestrator::RunReport;
use serde::Serialize;

/// Pretty JSON for any serialisable result.
pub fn json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn load_report(report: &RunReport) -> String {
    let mut out = format!(
        "Loaded {} rows for {} countries from {} raw points\n",
        format_count(report.load.rows as i64),
        format_count(report.load.countries as i64),
        format_count(report.extracted_points as i64),
    );
    if report.transform.duplicates_dropped > 0 || report.transform.coerced_growth > 0 {
        out.push_str(&format!(
            "Dropped {} duplicate points, coerced {} growth rates to 0\n",
            report.transform.duplicates_dropped, report.transform.coerced_growth
        ));
    }
    out.push_str(&format!(
        "Fetch {:.2}s, transform {:.2}s, load {:.2}s",
        report.fetch_seconds, report.transform_seconds, report.load_seconds
    ));
    out
}

pub fn load_report_json(report: &RunReport) -> anyhow::Result<String> {
    json(&serde_json::json!({
        "extracted_points": report.extracted_points,
        "rows": report.load.rows,
        "countries": report.load.countries,
        "duplicates_dropped": report.transform.duplicates_dropped,
        "coerced_growth": report.transform.coerced_growth,
        "fetch_seconds": report.fetch_seconds,
        "transform_seconds": report.transform_seconds,
        "load_seconds": report.load_seconds,
    }))
}

pub fn countries(names: &[String]) -> String {
    names.join("\n")
}

pub fn bounds(bounds: Option<DateBounds>) -> String {
    match bounds {
        Some(b) => format!("Earliest: {}\nLatest:   {}", b.min, b.max),
        None => "The store holds no data".to_string(),
    }
}

pub fn series(country: &str, points: &[CountrySeriesPoint]) -> String {
    let rows: Vec<Vec<String>> = points
        .iter()
        .map(|p| {
            vec![
                p.date.to_string(),
                format_count(p.new_cases_7day),
                format_pct(p.growth_rate_pct),
            ]
        })
        .collect();
    format!(
        "{}\n{}",
        country,
        render_table(&["Date", "New cases (7d)", "Growth"], &rows, &[false, true, true])
    )
}

pub fn global(totals: &[GlobalDailyTotal]) -> String {
    let rows: Vec<Vec<String>> = totals
        .iter()
        .map(|t| vec![t.date.to_string(), format_count(t.total_cases)])
        .collect();
    render_table(&["Date", "Total cases"], &rows, &[false, true])
}

pub fn top(totals: &[CountryTotal]) -> String {
    let rows: Vec<Vec<String>> = totals
        .iter()
        .enumerate()
        .map(|(i, t)| {
            vec![
                (i + 1).to_string(),
                t.country.clone(),
                t.latest_date.to_string(),
                format_count(t.total_cases),
            ]
        })
        .collect();
    render_table(
        &["#", "Country", "As of", "Total cases"],
        &rows,
        &[true, false, false, true],
    )
}

// ── Tests ──────────────────────────────────────────────────────────────────────
