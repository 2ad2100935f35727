use chrono::NaiveDate;
use thiserror::Error;

/// All errors produced by the ETL pipeline and the query layer.
#[derive(Error, Debug)]
pub enum EtlError {
    /// The upstream source could not be reached.
    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    /// The upstream source answered with a non-success status.
    #[error("Upstream {url} returned HTTP status {status}")]
    UpstreamStatus { url: String, status: u16 },

    /// The payload did not match the expected nested timeline shape.
    #[error("Failed to parse timeline payload: {0}")]
    Parse(String),

    /// Writing the derived table into the store failed.
    #[error("Failed to load table {table}: {source}")]
    Load {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A read against the store failed.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A caller-supplied query parameter was rejected.
    #[error(transparent)]
    QueryInput(#[from] QueryInputError),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EtlError {
    /// `true` for the transport-level failures (FetchError).
    pub fn is_fetch_error(&self) -> bool {
        matches!(self, EtlError::Fetch { .. } | EtlError::UpstreamStatus { .. })
    }
}

/// Validation failures for query parameters.
///
/// These are raised before the data query runs; the offending value is only
/// ever echoed back to the caller, never placed into SQL text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryInputError {
    /// The country is not among the stored countries.
    #[error("Unknown country: {0}")]
    UnknownCountry(String),

    /// A date string is not a `YYYY-MM-DD` calendar date.
    #[error("Malformed date (expected YYYY-MM-DD): {0}")]
    MalformedDate(String),

    /// `from` is later than `to`.
    #[error("Date range is inverted: {from} is after {to}")]
    InvertedRange { from: NaiveDate, to: NaiveDate },

    /// The range reaches outside the stored dates.
    #[error("Date range {from}..{to} is outside stored data {min}..{max}")]
    OutOfBounds {
        from: NaiveDate,
        to: NaiveDate,
        min: NaiveDate,
        max: NaiveDate,
    },

    /// The store holds no rows yet.
    #[error("No data has been loaded")]
    EmptyStore,

    /// A result limit of zero was requested.
    #[error("Limit must be at least 1, got {0}")]
    InvalidLimit(usize),
}

/// Convenience alias used throughout the ETL crates.
pub type Result<T> = std::result::Result<T, EtlError>;
