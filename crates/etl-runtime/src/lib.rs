//! Runtime layer for the COVID-19 ETL pipeline.
//!
//! Provides the transport that fetches the raw timeline payload and the
//! orchestrator that builds the store on first use.

pub mod orchestrator;
pub mod source;

pub use etl_core as core;
pub use etl_data as data;
