//! Full-refresh load of the derived table.
//!
//! Rows are written into a staging relation and swapped into place inside a
//! single transaction, so readers see either the previous table or the new
//! one and never an empty or half-written relation.

use std::collections::BTreeSet;
use std::time::Instant;

use etl_core::error::{EtlError, Result};
use etl_core::models::DerivedDailyRecord;
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use tracing::{debug, info};

use crate::store::{create_table_sql, table_populated, Store, STAGING_TABLE_NAME, TABLE_NAME};

/// Outcome of one load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub rows: usize,
    pub countries: usize,
}

/// Writes derived records into the store, replacing prior contents.
pub struct Loader {
    store: Store,
}

impl Loader {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Replace the stored relation with `records`.
    ///
    /// Rows are inserted in `(country, date)` order so identical input always
    /// produces an identical relation. On failure the transaction is rolled
    /// back and the previous table stays in place.
    pub fn load(&self, records: &[DerivedDailyRecord]) -> Result<LoadSummary> {
        let started = Instant::now();
        let mut conn = self.store.lock();
        let tx = begin_write(&mut conn)?;
        let summary = write_relation(&tx, records)?;
        tx.commit().map_err(load_error)?;
        log_loaded(&summary, started);
        Ok(summary)
    }

    /// Load `records` only if no populated relation exists yet.
    ///
    /// The check runs under the database write lock, so of several handles
    /// (possibly in different processes) racing on a fresh file exactly one
    /// writes and the rest return `None`.
    pub fn load_if_empty(&self, records: &[DerivedDailyRecord]) -> Result<Option<LoadSummary>> {
        let started = Instant::now();
        let mut conn = self.store.lock();
        let tx = begin_write(&mut conn)?;
        if table_populated(&tx)? {
            debug!("{} was populated by another writer; skipping load", TABLE_NAME);
            return Ok(None);
        }
        let summary = write_relation(&tx, records)?;
        tx.commit().map_err(load_error)?;
        log_loaded(&summary, started);
        Ok(Some(summary))
    }
}

/// Start a transaction that takes the write lock up front, waiting out the
/// busy timeout instead of failing on a later lock upgrade.
fn begin_write(conn: &mut Connection) -> Result<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(load_error)
}

/// Fill the staging relation and swap it in place of the current one.
fn write_relation(tx: &Transaction<'_>, records: &[DerivedDailyRecord]) -> Result<LoadSummary> {
    let mut ordered: Vec<&DerivedDailyRecord> = records.iter().collect();
    ordered.sort_by(|a, b| a.country.cmp(&b.country).then(a.date.cmp(&b.date)));

    let countries: BTreeSet<&str> = ordered.iter().map(|r| r.country.as_str()).collect();

    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {STAGING_TABLE_NAME};\n{};",
        create_table_sql(STAGING_TABLE_NAME)
    ))
    .map_err(load_error)?;

    {
        let mut stmt = tx
            .prepare(&format!(
                "INSERT INTO {STAGING_TABLE_NAME} (
                    country, date, cases, deaths, recovered,
                    new_cases, new_deaths, new_recovered,
                    growth_rate_pct, new_cases_7day, new_deaths_7day
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ))
            .map_err(load_error)?;

        for record in &ordered {
            stmt.execute(params![
                record.country,
                record.date,
                stored_count(record.cumulative_cases)?,
                stored_count(record.cumulative_deaths)?,
                stored_count(record.cumulative_recovered)?,
                record.new_cases,
                record.new_deaths,
                record.new_recovered,
                record.growth_rate_pct,
                record.new_cases_7day,
                record.new_deaths_7day,
            ])
            .map_err(load_error)?;
        }
    }

    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {TABLE_NAME};
         ALTER TABLE {STAGING_TABLE_NAME} RENAME TO {TABLE_NAME};
         CREATE INDEX idx_{TABLE_NAME}_date ON {TABLE_NAME} (date);"
    ))
    .map_err(load_error)?;

    Ok(LoadSummary {
        rows: ordered.len(),
        countries: countries.len(),
    })
}

/// SQLite integers are signed; a count past `i64::MAX` cannot be stored.
fn stored_count(value: u64) -> Result<i64> {
    i64::try_from(value)
        .map_err(|e| load_error(rusqlite::Error::ToSqlConversionFailure(Box::new(e))))
}

fn log_loaded(summary: &LoadSummary, started: Instant) {
    info!(
        rows = summary.rows,
        countries = summary.countries,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Loaded {}",
        TABLE_NAME
    );
}

fn load_error(source: rusqlite::Error) -> EtlError {
    EtlError::Load {
        table: TABLE_NAME.to_string(),
        source,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
