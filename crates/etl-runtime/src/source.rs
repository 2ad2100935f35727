//! Transport for the raw timeline payload.
//!
//! [`TimelineSource`] is the seam between the pipeline and wherever the JSON
//! comes from. [`HttpSource`] is the production implementation: one HTTP GET
//! with a bounded timeout, retried with linear back-off on transient
//! failures. The extractor never retries; that policy lives here.

use std::thread;
use std::time::Duration;

use etl_core::error::{EtlError, Result};

/// Default number of attempts before the last error is returned.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Back-off step: attempt `n` (0-based) sleeps `n * step` first.
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_millis(500);

/// Something that yields the raw nested timeline JSON or fails.
pub trait TimelineSource {
    /// Human-readable origin, used in logs.
    fn describe(&self) -> String;

    /// Fetch the full payload text.
    fn fetch_raw(&self) -> Result<String>;
}

impl<T: TimelineSource + ?Sized> TimelineSource for Box<T> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn fetch_raw(&self) -> Result<String> {
        (**self).fetch_raw()
    }
}

// ── HttpSource ────────────────────────────────────────────────────────────────

/// Blocking HTTP source for the historical timeline endpoint.
pub struct HttpSource {
    url: String,
    client: reqwest::blocking::Client,
    max_attempts: u32,
    backoff_step: Duration,
}

impl HttpSource {
    /// Build a source for `url` whose every request is bounded by `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration, max_attempts: u32) -> Result<Self> {
        let url = url.into();
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("covid-etl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EtlError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            url,
            client,
            max_attempts: max_attempts.max(1),
            backoff_step: DEFAULT_BACKOFF_STEP,
        })
    }

    /// Override the back-off step (tests use a zero step).
    pub fn with_backoff_step(mut self, step: Duration) -> Self {
        self.backoff_step = step;
        self
    }

    /// A single GET without retries.
    fn fetch_once(&self) -> Result<String> {
        let response = self.client.get(&self.url).send().map_err(|e| EtlError::Fetch {
            url: self.url.clone(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EtlError::UpstreamStatus {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        response.text().map_err(|e| EtlError::Fetch {
            url: self.url.clone(),
            message: e.to_string(),
        })
    }
}

impl TimelineSource for HttpSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    /// Attempt up to `max_attempts` fetches with linear back-off.
    ///
    /// Client errors (4xx other than 429) are returned immediately; retrying
    /// would get the same answer.
    fn fetch_raw(&self) -> Result<String> {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let sleep = self.backoff_step * attempt;
                tracing::debug!(attempt, sleep_ms = sleep.as_millis() as u64, "retrying fetch after back-off");
                thread::sleep(sleep);
            }

            match self.fetch_once() {
                Ok(body) => {
                    tracing::info!(bytes = body.len(), url = %self.url, "fetched timeline payload");
                    return Ok(body);
                }
                Err(e) => {
                    attempt += 1;
                    if !is_retryable(&e) || attempt >= self.max_attempts {
                        return Err(e);
                    }
                    tracing::warn!(attempt, error = %e, "fetch attempt failed");
                }
            }
        }
    }
}

/// Transport failures and 5xx / 429 answers are worth another attempt.
fn is_retryable(err: &EtlError) -> bool {
    match err {
        EtlError::Fetch { .. } => true,
        EtlError::UpstreamStatus { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

// ── StaticSource ──────────────────────────────────────────────────────────────

/// Source that always yields the same payload, for offline runs and tests.
#[derive(Debug, Clone)]
pub struct StaticSource {
    payload: String,
}

impl StaticSource {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Read the payload from a file saved from the upstream endpoint.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        Ok(Self::new(std::fs::read_to_string(path)?))
    }
}

impl TimelineSource for StaticSource {
    fn describe(&self) -> String {
        format!("static payload ({} bytes)", self.payload.len())
    }

    fn fetch_raw(&self) -> Result<String> {
        Ok(self.payload.clone())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
