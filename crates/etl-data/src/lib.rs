//! Extract, transform, load and query stages of the COVID-19 pipeline.
//!
//! Data flows strictly [`extractor`] → [`transformer`] → [`loader`] → the
//! SQLite [`store`] → [`query`].

pub mod extractor;
pub mod loader;
pub mod query;
pub mod store;
pub mod transformer;

pub use etl_core as core;
