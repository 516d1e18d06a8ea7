//! Batch writes through an [`ObservationStore`]

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use wxlog_core::{validate, MergePlan, Observation, ObservationStore};

use crate::WriterResult;

/// What one write did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Observations the store accepted
    pub written: usize,
    /// Observations dropped before the write as malformed
    pub dropped: usize,
}

/// Writes observation batches to one store
#[derive(Clone)]
pub struct MergeWriter {
    store: Arc<dyn ObservationStore>,
}

impl MergeWriter {
    pub fn new(store: Arc<dyn ObservationStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ObservationStore> {
        &self.store
    }

    pub async fn ensure_table(&self, plan: &MergePlan) -> WriterResult<()> {
        self.store.ensure_table(plan).await?;
        Ok(())
    }

    /// Write a batch under `plan`.
    ///
    /// Pairs the plan cannot take (no fields, unknown columns) are dropped
    /// with a warning. The rest go to the store as one transaction; a store
    /// failure means none of them were applied.
    #[instrument(skip(self, plan, observations), fields(table = plan.table()))]
    pub async fn write(
        &self,
        plan: &MergePlan,
        observations: Vec<Observation>,
    ) -> WriterResult<WriteReport> {
        let mut report = WriteReport::default();
        let mut accepted = Vec::with_capacity(observations.len());
        for observation in observations {
            match validate(plan, &observation) {
                Ok(()) => accepted.push(observation),
                Err(e) => {
                    warn!(
                        source = observation.source.as_deref().unwrap_or("-"),
                        "dropping observation: {}", e
                    );
                    report.dropped += 1;
                }
            }
        }

        if accepted.is_empty() {
            debug!("Nothing to write to {}", plan.table());
            return Ok(report);
        }

        report.written = self.store.upsert_batch(plan, &accepted).await?;
        info!("Wrote {} observations to {}", report.written, plan.table());
        Ok(report)
    }
}
