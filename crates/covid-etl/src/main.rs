mod bootstrap;
mod render;

use anyhow::{Context, Result};
use etl_core::settings::{Command, Settings};
use etl_data::store::Store;
use etl_runtime::orchestrator::{Orchestrator, PipelineOutcome};
use etl_runtime::source::{HttpSource, StaticSource, TimelineSource};

fn main() -> Result<()> {
    let settings = Settings::load();
    let db_path = settings.resolved_db_path();

    bootstrap::ensure_directories(&db_path)?;
    bootstrap::setup_logging(&settings.log_level)?;

    tracing::info!("covid-etl v{} starting", env!("CARGO_PKG_VERSION"));

    let store = Store::open(&db_path, settings.busy_timeout())
        .with_context(|| format!("cannot open database {}", db_path.display()))?;
    if let Some(location) = store.location() {
        tracing::debug!("Database: {}", location.display());
    }
    let orchestrator = Orchestrator::new(store, build_source(&settings)?);

    let output = run(&settings, &orchestrator)?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

/// A saved payload file when one is configured, the HTTP endpoint otherwise.
fn build_source(settings: &Settings) -> Result<Box<dyn TimelineSource>> {
    match &settings.source_file {
        Some(path) => {
            let source = StaticSource::from_file(path)
                .with_context(|| format!("cannot read source file {}", path.display()))?;
            Ok(Box::new(source))
        }
        None => Ok(Box::new(HttpSource::new(
            settings.source_url.clone(),
            settings.fetch_timeout(),
            settings.fetch_retries,
        )?)),
    }
}

/// Execute the selected command and return what should be printed.
fn run<S: TimelineSource>(settings: &Settings, orchestrator: &Orchestrator<S>) -> Result<String> {
    match &settings.command {
        Command::Load => {
            let report = orchestrator.refresh()?;
            if settings.json {
                render::load_report_json(&report)
            } else {
                Ok(render::load_report(&report))
            }
        }
        query => {
            if let PipelineOutcome::Loaded(report) = orchestrator.ensure_loaded()? {
                tracing::info!("Built store on first use: {} rows", report.load.rows);
            }
            run_query(query, settings.json, orchestrator)
        }
    }
}

fn run_query<S: TimelineSource>(
    command: &Command,
    json: bool,
    orchestrator: &Orchestrator<S>,
) -> Result<String> {
    let service = orchestrator.query_service();
    match command {
        Command::Load => anyhow::bail!("load is not a query command"),
        Command::Countries => {
            let names = service.distinct_countries()?;
            if json {
                render::json(&names)
            } else {
                Ok(render::countries(&names))
            }
        }
        Command::Bounds => {
            let bounds = service.date_bounds()?;
            if json {
                render::json(&bounds)
            } else {
                Ok(render::bounds(bounds))
            }
        }
        Command::Series { country, from, to } => {
            let range = service.resolve_range(from.as_deref(), to.as_deref())?;
            let points = service.country_series(country, range)?;
            if json {
                render::json(&points)
            } else {
                Ok(render::series(country, &points))
            }
        }
        Command::Global { from, to } => {
            let range = service.resolve_range(from.as_deref(), to.as_deref())?;
            let totals = service.global_daily_total(range)?;
            if json {
                render::json(&totals)
            } else {
                Ok(render::global(&totals))
            }
        }
        Command::Top { limit } => {
            let totals = service.top_countries(*limit)?;
            if json {
                render::json(&totals)
            } else {
                Ok(render::top(&totals))
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
