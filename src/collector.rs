// =============================================================================
// Tick Collector: fetch, normalize, record
// =============================================================================
//
// One call = one upstream request. Every record in the batch is normalized on
// its own: a bad record is counted and skipped, the rest still land in the
// store. Transport and decode failures bubble up as errors for the scheduler
// to log.
// =============================================================================

use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info};

use crate::market_data::{Insert, TickStore};
use crate::upstream::{RecordNormalizer, RecordSource};

/// Counters for a single fetch-and-record pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordSummary {
    /// Records found in the upstream response.
    pub fetched: usize,
    /// Ticks newly appended to the store.
    pub recorded: usize,
    /// Ticks whose (expiry, time) was already stored.
    pub duplicates: usize,
    /// Records that could not be normalized.
    pub rejected: usize,
}

pub struct TickCollector {
    source: Arc<dyn RecordSource>,
    normalizer: RecordNormalizer,
    store: Arc<TickStore>,
}

impl TickCollector {
    pub fn new(
        source: Arc<dyn RecordSource>,
        normalizer: RecordNormalizer,
        store: Arc<TickStore>,
    ) -> Self {
        Self {
            source,
            normalizer,
            store,
        }
    }

    /// Fetch the current upstream batch and append every new tick.
    ///
    /// `fetched_at` is the wall-clock time of this pass, used as the time
    /// label for records that carry none.
    pub async fn fetch_and_record(&self, fetched_at: NaiveDateTime) -> Result<RecordSummary> {
        let body = self.source.fetch().await?;
        let records = self.normalizer.extract_records(&body);

        let mut summary = RecordSummary {
            fetched: records.len(),
            ..RecordSummary::default()
        };

        if records.is_empty() {
            info!("upstream returned no records");
            return Ok(summary);
        }
        debug!(count = records.len(), records = ?records, "fetched upstream records");

        for record in &records {
            let group = record.group.as_deref();
            let tick = match self.normalizer.normalize(&record.body, group, fetched_at) {
                Ok(tick) => tick,
                Err(e) => {
                    debug!(error = %e, record = %record.body, "skipping upstream record");
                    summary.rejected += 1;
                    continue;
                }
            };

            let logged = tick.clone();
            match self.store.record(tick) {
                Insert::Appended => {
                    summary.recorded += 1;
                    info!(
                        expiry = %logged.expiry,
                        time = %logged.time,
                        ltp = logged.ltp,
                        prev_close = logged.prev_close,
                        "logged tick"
                    );
                }
                Insert::Duplicate => summary.duplicates += 1,
            }
        }

        Ok(summary)
    }
}

// =============================================================================
// Tests
// =============================================================================
