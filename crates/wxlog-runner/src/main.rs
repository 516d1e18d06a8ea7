//! wxlog - fetch weather and solar observations and merge them into
//! timestamp-keyed tables
//!
//! One invocation runs each selected source once:
//! - resolve its fetch window (previous day, current day or trailing span)
//! - fetch and decode its records
//! - upsert the batch with the table's merge policies

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

use wxlog_config::AppConfig;
use wxlog_core::ObservationStore;
use wxlog_merge::MergeWriter;
use wxlog_runner::{DatabaseTarget, RunOutcome, SourceJob};
use wxlog_sinks::sqlite::SqliteStore;
use wxlog_sinks::MemoryStore;

#[derive(Debug, Parser)]
#[command(name = "wxlog", version, about = "Merge weather and solar observations into PostgreSQL")]
struct Args {
    /// Config file (default: $WXLOG_CONFIG, then ./wxlog.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fetch this local day instead of the configured window (YYYY-MM-DD)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Create missing tables before writing
    #[arg(long)]
    init_schema: bool,

    /// Write into memory and log the merged rows instead of touching a database
    #[arg(long, conflicts_with = "sqlite")]
    dry_run: bool,

    /// Write into this SQLite file instead of PostgreSQL
    #[arg(long)]
    sqlite: Option<PathBuf>,

    /// Sources to run (default: all configured sources)
    sources: Vec<String>,
}

enum Backend {
    Memory(Arc<MemoryStore>),
    Sqlite,
    Postgres(wxlog_db::DbClient),
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    wxlog_obs::init("wxlog");
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AppConfig::from_path(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => AppConfig::load().context("Failed to load configuration")?,
    };
    config.validate().context("Invalid configuration")?;

    let sources: Vec<String> = if args.sources.is_empty() {
        config.sources.keys().cloned().collect()
    } else {
        args.sources.clone()
    };
    if sources.is_empty() {
        bail!("no sources configured");
    }

    let (backend, store): (Backend, Arc<dyn ObservationStore>) = if args.dry_run {
        let memory = Arc::new(MemoryStore::new());
        (Backend::Memory(memory.clone()), memory)
    } else if let Some(path) = &args.sqlite {
        let sqlite = SqliteStore::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        (Backend::Sqlite, Arc::new(sqlite))
    } else {
        let db = DatabaseTarget::from_env()?.connect().await?;
        db.ping().await.context("Database ping failed")?;
        info!("Database connection verified");
        (Backend::Postgres(db.clone()), Arc::new(db))
    };
    let create_tables = args.init_schema || !matches!(backend, Backend::Postgres(_));
    let writer = MergeWriter::new(store);

    let now = Utc::now();
    let mut failures = 0;
    let mut tables = BTreeSet::new();

    for name in &sources {
        let job = match SourceJob::from_config(&config, name, now, args.date) {
            Ok(job) => job,
            Err(e) => {
                error!(source = %name, "Skipping source: {:#}", e);
                failures += 1;
                continue;
            }
        };
        tables.insert(job.plan().table().to_string());

        if create_tables {
            if let Err(e) = writer.ensure_table(job.plan()).await {
                error!(source = %name, "Cannot create table {}: {}", job.plan().table(), e);
                failures += 1;
                continue;
            }
        }

        let outcome = job.run(&writer).await;
        let report = outcome.report();
        match &outcome {
            RunOutcome::Written(_) => info!(
                source = %name,
                records = report.batch.records,
                written = report.written,
                dropped = report.dropped + report.batch.format_errors + report.batch.malformed,
                "Source done"
            ),
            RunOutcome::NoData(_) => warn!(
                source = %name,
                records = report.batch.records,
                fetch_failed = report.fetch_failed,
                "Source produced no data"
            ),
            RunOutcome::Failed { .. } => failures += 1,
        }
    }

    match backend {
        Backend::Memory(memory) => {
            for table in &tables {
                for row in memory.rows(table) {
                    info!(table = %table, row = %serde_json::to_string(&row)?, "Merged row");
                }
            }
        }
        Backend::Postgres(db) => db.close().await,
        Backend::Sqlite => {}
    }

    if failures > 0 {
        error!("{} of {} sources failed", failures, sources.len());
        return Ok(ExitCode::FAILURE);
    }
    info!("All {} sources finished", sources.len());
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let args = Args::parse_from([
            "wxlog",
            "--date",
            "2024-03-10",
            "--dry-run",
            "lville",
            "openweather",
        ]);
        assert_eq!(args.date, NaiveDate::from_ymd_opt(2024, 3, 10));
        assert!(args.dry_run);
        assert!(!args.init_schema);
        assert_eq!(args.sources, vec!["lville", "openweather"]);

        assert!(Args::try_parse_from(["wxlog", "--date", "yesterday"]).is_err());
        assert!(Args::try_parse_from(["wxlog", "--dry-run", "--sqlite", "x.db"]).is_err());
    }
}
