use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Historical timeline endpoint used when no source URL is configured.
pub const DEFAULT_SOURCE_URL: &str = "https://disease.sh/v3/covid-19/historical?lastdays=all";

/// File name of the SQLite store inside the application directory.
pub const DEFAULT_DB_FILE: &str = "covid.db";

/// Name of the per-user application directory under `$HOME`.
pub const APP_DIR_NAME: &str = ".covid-etl";

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// COVID-19 timeline ETL and query tool
#[derive(Parser, Debug, Clone)]
#[command(
    name = "covid-etl",
    about = "Load COVID-19 timelines into SQLite and query derived metrics",
    version
)]
pub struct Settings {
    /// SQLite database file (defaults to ~/.covid-etl/covid.db)
    #[arg(long, env = "COVID_ETL_DB", global = true)]
    pub db_path: Option<PathBuf>,

    /// Historical timeline endpoint
    #[arg(long, env = "COVID_ETL_SOURCE_URL", default_value = DEFAULT_SOURCE_URL, global = true)]
    pub source_url: String,

    /// Read the timeline JSON from a saved file instead of fetching it
    #[arg(long, env = "COVID_ETL_SOURCE_FILE", global = true)]
    pub source_file: Option<PathBuf>,

    /// Fetch timeout in seconds (1-600)
    #[arg(long, default_value = "60", value_parser = clap::value_parser!(u64).range(1..=600), global = true)]
    pub fetch_timeout_secs: u64,

    /// Fetch attempts before giving up (1-10)
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..=10), global = true)]
    pub fetch_retries: u32,

    /// How long a store operation waits on a locked database, in milliseconds
    #[arg(long, default_value = "5000", global = true)]
    pub busy_timeout_ms: u64,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"], global = true)]
    pub log_level: String,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Operations exposed on the command line.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run extract, transform and load, replacing the stored table
    Load,
    /// List the countries present in the store
    Countries,
    /// Show the earliest and latest stored dates
    Bounds,
    /// Smoothed new cases and growth rate for one country
    Series {
        /// Country name, exactly as listed by `countries`
        #[arg(long)]
        country: String,
        /// First date (YYYY-MM-DD), defaults to the earliest stored date
        #[arg(long)]
        from: Option<String>,
        /// Last date (YYYY-MM-DD), defaults to the latest stored date
        #[arg(long)]
        to: Option<String>,
    },
    /// Global cumulative cases per day
    Global {
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },
    /// Countries with the most cumulative cases at their latest date
    Top {
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments and apply the `--debug` override.
    pub fn load() -> Self {
        Self::load_from_args(std::env::args_os())
    }

    /// Same as [`Settings::load`] but accepts an explicit argument list.
    pub fn load_from_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut settings = Settings::parse_from(args);
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }

    /// Database path: the explicit `--db-path`, else `~/.covid-etl/covid.db`.
    pub fn resolved_db_path(&self) -> PathBuf {
        match &self.db_path {
            Some(path) => path.clone(),
            None => app_dir().join(DEFAULT_DB_FILE),
        }
    }

    pub fn fetch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn busy_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.busy_timeout_ms)
    }
}

/// `~/.covid-etl`, falling back to the working directory without a home.
pub fn app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
