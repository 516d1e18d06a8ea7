//! One fetch -> decode -> write pass for a single source

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use wxlog_config::{AppConfig, SourceConfig};
use wxlog_core::{
    FetchOutcome, FetchWindow, MergePlan, ObservationDecoder, SourceFetcher, TableSchema,
};
use wxlog_ingest::{build_fetcher, resolve_window};
use wxlog_merge::{BatchStats, MergeWriter, ObservationBatch, WriterError};

/// Counters for one job run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub source: String,
    pub table: String,
    pub fetch_failed: bool,
    pub batch: BatchStats,
    pub dropped: usize,
    pub written: usize,
}

/// How a job run ended
#[derive(Debug)]
pub enum RunOutcome {
    Written(RunReport),
    /// Nothing to write; a failed fetch lands here too
    NoData(RunReport),
    /// The store rejected the batch; nothing was applied
    Failed { report: RunReport, error: WriterError },
}

impl RunOutcome {
    pub fn report(&self) -> &RunReport {
        match self {
            RunOutcome::Written(report) | RunOutcome::NoData(report) => report,
            RunOutcome::Failed { report, .. } => report,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Failed { .. })
    }
}

/// Everything needed to run one source once
pub struct SourceJob {
    name: String,
    fetcher: Arc<dyn SourceFetcher>,
    decoder: ObservationDecoder,
    plan: MergePlan,
    window: FetchWindow,
}

impl SourceJob {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        decoder: ObservationDecoder,
        plan: MergePlan,
        window: FetchWindow,
    ) -> Self {
        Self {
            name: fetcher.name().to_string(),
            fetcher,
            decoder,
            plan,
            window,
        }
    }

    /// Build a job from configuration
    pub fn from_config(
        config: &AppConfig,
        name: &str,
        now: DateTime<Utc>,
        date: Option<NaiveDate>,
    ) -> Result<Self> {
        let source = config
            .sources
            .get(name)
            .ok_or_else(|| anyhow!("unknown source {:?}", name))?;
        let plan = resolve_table(config, &source.table)?
            .plan(&source.merge)
            .with_context(|| format!("source {} cannot write to {}", name, source.table))?;
        let mapping = source.mapping();
        let unknown: Vec<&str> = mapping
            .canonical_fields()
            .filter(|field| !plan.contains(field))
            .collect();
        if !unknown.is_empty() {
            bail!(
                "source {} maps fields {:?} that {} does not have",
                name,
                unknown,
                plan.table()
            );
        }
        let window = resolve_window(source.window, source.window_timezone()?, now, date)?;
        let fetcher = build_fetcher(name, source)
            .with_context(|| format!("cannot set up fetcher for {}", name))?;
        Ok(Self::new(fetcher, decoder(name, source)?, plan, window))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plan(&self) -> &MergePlan {
        &self.plan
    }

    pub fn window(&self) -> &FetchWindow {
        &self.window
    }

    pub async fn run(&self, writer: &MergeWriter) -> RunOutcome {
        let span = info_span!("job", source = %self.name, table = self.plan.table());
        self.run_inner(writer).instrument(span).await
    }

    async fn run_inner(&self, writer: &MergeWriter) -> RunOutcome {
        let mut report = RunReport {
            source: self.name.clone(),
            table: self.plan.table().to_string(),
            ..Default::default()
        };
        info!(
            "Fetching {} from {} to {}",
            self.name, self.window.start, self.window.end
        );

        let records = match FetchOutcome::from_result(self.fetcher.fetch(&self.window).await) {
            FetchOutcome::Records(records) => records,
            FetchOutcome::Empty => {
                info!("Source returned no records");
                return RunOutcome::NoData(report);
            }
            FetchOutcome::Failed(e) => {
                error!("Fetch failed: {}", e);
                report.fetch_failed = true;
                return RunOutcome::NoData(report);
            }
        };

        let (observations, stats) = ObservationBatch::decode(&self.decoder, &records).into_parts();
        report.batch = stats;
        if observations.is_empty() {
            warn!("{} records yielded no observations", stats.records);
            return RunOutcome::NoData(report);
        }

        match writer.write(&self.plan, observations).await {
            Ok(write) => {
                report.dropped = write.dropped;
                report.written = write.written;
                if write.written == 0 {
                    RunOutcome::NoData(report)
                } else {
                    RunOutcome::Written(report)
                }
            }
            Err(error) => {
                error!("Batch not written: {}", error);
                RunOutcome::Failed { report, error }
            }
        }
    }
}

/// Table layout from the config file, else the built-in one
pub fn resolve_table(config: &AppConfig, table: &str) -> Result<TableSchema> {
    match config.tables.get(table) {
        Some(t) => Ok(t.schema(table)),
        None => wxlog_db::builtin(table).ok_or_else(|| anyhow!("unknown table {:?}", table)),
    }
}

fn decoder(name: &str, source: &SourceConfig) -> Result<ObservationDecoder> {
    source
        .decoder(name)
        .with_context(|| format!("invalid record settings for {}", name))
}
