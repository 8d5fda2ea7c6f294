//! devpulse - CLI for the developer activity log
//!
//! Polls GitHub and GitLab for recent activity, replays webhook payloads
//! into the event store and prints weekly metrics.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/devpulse/events.db (~/.local/share/devpulse/events.db)
//! - Logs: $XDG_STATE_HOME/devpulse/ (~/.local/state/devpulse/)
//! - Config: $XDG_CONFIG_HOME/devpulse/config.toml (~/.config/devpulse/config.toml)

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Datelike, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use devpulse_core::format::format_relative_time;
use devpulse_core::metrics::{
    commit_frequency, hourly_pattern, project_activity, weekly_productivity,
};
use devpulse_core::{
    compute_weekly_metrics, Config, CycleOutcome, CycleReport, Database, Ingestor, PollScheduler,
    Source,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "devpulse")]
#[command(about = "Track commits, merged requests and deployments across GitHub and GitLab")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll configured providers for recent activity
    Poll {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Backfill history: fetch every commit and merged request since a date
    Seed {
        /// First day to import (YYYY-MM-DD, UTC); defaults to January 1st of this year
        #[arg(long)]
        since: Option<NaiveDate>,
    },

    /// Replay a webhook payload from a JSON file through the ingestion pipeline
    Ingest {
        /// Platform the payload came from (github, gitlab, manual)
        #[arg(long)]
        source: Source,

        /// Event type header value (e.g. push, "Merge Request Hook", deployment)
        #[arg(long = "event")]
        event_type: String,

        /// Path to the JSON payload
        file: PathBuf,
    },

    /// Print the weekly metrics summary
    Summary {
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },

    /// Print activity breakdowns as JSON
    Activity {
        #[command(subcommand)]
        view: ActivityView,
    },

    /// Show database, provider and polling status
    Status,
}

#[derive(Subcommand)]
enum ActivityView {
    /// Commits per day
    Frequency {
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
    /// Most active projects over the last 30 days
    Projects {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Commits per ISO week
    Weekly {
        #[arg(long, default_value_t = 12)]
        weeks: u32,
    },
    /// Share of all commits per hour of day (UTC)
    Patterns,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Markdown,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        devpulse_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("devpulse starting");

    let db_path = config.resolved_database_path();
    tracing::info!(path = %db_path.display(), "Opening database");

    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;
    let db = Arc::new(db);

    match cli.command {
        Command::Poll { once } => run_poll(&config, db, once),
        Command::Seed { since } => run_seed(&config, db, since),
        Command::Ingest {
            source,
            event_type,
            file,
        } => run_ingest(db, source, &event_type, &file),
        Command::Summary { format } => {
            let metrics =
                compute_weekly_metrics(&db, Utc::now()).context("failed to compute metrics")?;
            match format {
                OutputFormat::Json => print_json(&metrics),
                OutputFormat::Markdown => {
                    println!("{}", metrics.to_markdown());
                    Ok(())
                }
            }
        }
        Command::Activity { view } => {
            let now = Utc::now();
            match view {
                ActivityView::Frequency { days } => print_json(
                    &commit_frequency(&db, now, days).context("failed to compute frequency")?,
                ),
                ActivityView::Projects { limit } => print_json(
                    &project_activity(&db, now, limit)
                        .context("failed to compute project activity")?,
                ),
                ActivityView::Weekly { weeks } => print_json(
                    &weekly_productivity(&db, now, weeks)
                        .context("failed to compute weekly productivity")?,
                ),
                ActivityView::Patterns => print_json(
                    &hourly_pattern(&db).context("failed to compute commit patterns")?,
                ),
            }
        }
        Command::Status => run_status(&config, &db_path, &db),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

fn run_poll(config: &Config, db: Arc<Database>, once: bool) -> Result<()> {
    let ingestor = Arc::new(Ingestor::new(db));
    let scheduler = Arc::new(
        PollScheduler::from_config(config, ingestor).context("failed to create providers")?,
    );

    if !scheduler.has_configured_provider() {
        println!("No GitHub or GitLab token configured; nothing to poll.");
        println!("Set github.token / gitlab.token in the config or GITHUB_PAT / GITLAB_PAT.");
        tracing::info!("Polling not started: no provider tokens configured");
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    if once {
        return match runtime.block_on(scheduler.run_cycle()) {
            CycleOutcome::Completed(report) => print_cycle(&report),
            CycleOutcome::Skipped => {
                println!("A poll cycle is already running");
                Ok(())
            }
        };
    }

    let interval = config.polling.interval().ok_or_else(|| {
        anyhow!("polling is disabled; set polling.interval_minutes or pass --once")
    })?;

    println!(
        "Polling every {} minute(s), looking back {} hour(s). Press Ctrl-C to stop.",
        interval.as_secs() / 60,
        config.polling.lookback_hours
    );

    runtime.block_on(scheduler.run(interval, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    }));

    println!("Polling stopped");
    Ok(())
}

fn run_seed(config: &Config, db: Arc<Database>, since: Option<NaiveDate>) -> Result<()> {
    let since = match since {
        Some(date) => date,
        None => NaiveDate::from_ymd_opt(Utc::now().year(), 1, 1)
            .ok_or_else(|| anyhow!("invalid start of year"))?,
    };
    let since_utc = since
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("invalid start date {}", since))?
        .and_utc();

    let ingestor = Arc::new(Ingestor::new(db));
    let scheduler =
        PollScheduler::from_config(config, ingestor).context("failed to create providers")?;

    if !scheduler.has_configured_provider() {
        println!("No GitHub or GitLab token configured; nothing to seed.");
        return Ok(());
    }

    println!("Seeding history since {}", since);
    tracing::info!(since = %since_utc, "Seeding historical data");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    match runtime.block_on(scheduler.backfill(since_utc)) {
        CycleOutcome::Completed(report) => print_cycle(&report),
        CycleOutcome::Skipped => {
            println!("A poll cycle is already running");
            Ok(())
        }
    }
}

fn print_cycle(report: &CycleReport) -> Result<()> {
    for scan in &report.scans {
        println!(
            "{} ({}): {} project(s), {} new, {} duplicate(s)",
            scan.source,
            scan.identity,
            scan.projects_scanned,
            scan.inserted,
            scan.skipped
        );
        for failure in &scan.project_failures {
            println!("  ! {}: {}", failure.project, failure.message);
        }
    }
    for source in &report.unconfigured {
        println!("{}: skipped (no token)", source);
    }
    for failure in &report.failures {
        println!("{}", failure);
    }

    println!(
        "Poll complete in {:.1}s: {} new event(s)",
        report.duration.as_secs_f64(),
        report.inserted()
    );

    if !report.failures.is_empty() && report.scans.is_empty() {
        bail!("all configured providers failed");
    }
    Ok(())
}

fn run_ingest(
    db: Arc<Database>,
    source: Source,
    event_type: &str,
    file: &std::path::Path,
) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let payload: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;

    let ingestor = Ingestor::new(db);
    let result = ingestor
        .ingest_delivery(source, event_type, &payload)
        .context("failed to ingest payload")?;

    println!(
        "Ingested {} event(s), skipped {} duplicate(s)",
        result.inserted, result.skipped
    );

    if !result.is_clean() {
        for error in &result.errors {
            eprintln!("  ! {}", error);
        }
        bail!("{} event(s) failed to ingest", result.errors.len());
    }
    Ok(())
}

fn run_status(config: &Config, db_path: &std::path::Path, db: &Database) -> Result<()> {
    let now = Utc::now();

    println!("Database: {}", db_path.display());
    println!(
        "Events:   {}",
        db.event_count().context("failed to count events")?
    );
    println!("Logs:     {}", devpulse_core::logging::log_dir().display());

    println!("\nSources:");
    for source in [Source::Github, Source::Gitlab, Source::Manual] {
        let latest = db
            .latest_event_time(source)
            .context("failed to read latest event")?
            .map(|ts| format_relative_time(ts, now))
            .unwrap_or_else(|| "never".to_string());

        let credential = match config.provider(source) {
            Some(provider) if provider.is_configured() => "token configured",
            Some(_) => "no token",
            None => "webhook/manual only",
        };

        println!("  {:<7} last event {:<10} ({})", source.display_name(), latest, credential);
    }

    println!("\nPolling:");
    match config.polling.interval_minutes {
        Some(minutes) => println!("  every {} minute(s)", minutes),
        None => println!("  disabled"),
    }
    println!("  lookback {} hour(s)", config.polling.lookback_hours);
    println!("  scan timeout {}s", config.polling.scan_timeout_secs);

    Ok(())
}
