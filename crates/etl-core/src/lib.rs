//! Shared building blocks for the COVID-19 ETL pipeline.
//!
//! Holds the record types that flow between pipeline stages, the error
//! taxonomy, the per-day metric arithmetic, command-line settings, and the
//! number formatting used when rendering query results.

pub mod calculations;
pub mod error;
pub mod formatting;
pub mod models;
pub mod settings;
