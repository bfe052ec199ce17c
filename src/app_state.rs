// =============================================================================
// Central Application State: Sensex tick relay
// =============================================================================
//
// Owned once in `main` and shared via `Arc` between the scheduler (the only
// writer of the tick store) and the HTTP handlers (readers only).
//
// Thread safety:
//   - parking_lot::RwLock for every mutable collection.
//   - Atomics for flags and counters.
// =============================================================================

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::market_data::TickStore;
use crate::runtime_config::RuntimeConfig;
use crate::scheduler::{CycleOutcome, SessionWindow};

// =============================================================================
// Records
// =============================================================================

/// A recorded error event for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    /// Human-readable error message.
    pub message: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// The most recent scheduler cycle that ran inside the session window.
#[derive(Debug, Clone, Serialize)]
pub struct CycleRecord {
    /// Wall-clock time the cycle ran at.
    pub at: NaiveDateTime,
    pub outcome: CycleOutcome,
}

/// Payload of `GET /api/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub uptime_secs: u64,
    pub server_time: i64,
    pub upstream_url: String,
    pub poll_interval_secs: u64,
    pub session: SessionWindow,
    pub session_active: bool,
    pub cycles_run: u64,
    pub buckets: usize,
    pub ticks: usize,
    pub last_cycle: Option<CycleRecord>,
    pub recent_errors: Vec<ErrorRecord>,
}

// =============================================================================
// AppState
// =============================================================================

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

pub struct AppState {
    // ── Configuration ───────────────────────────────────────────────────
    pub config: RuntimeConfig,

    // ── Market Data ─────────────────────────────────────────────────────
    pub tick_store: Arc<TickStore>,

    // ── Scheduler status ────────────────────────────────────────────────
    /// Whether the last cycle found the wall clock inside the session.
    pub session_active: AtomicBool,
    /// Cycles that ran inside the session window.
    pub cycles_run: AtomicU64,
    pub last_cycle: RwLock<Option<CycleRecord>>,

    // ── Error Log ───────────────────────────────────────────────────────
    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    // ── Timing ──────────────────────────────────────────────────────────
    /// Instant when the service was started. Used for uptime calculations.
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Construct a new `AppState` with an empty tick store.
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            tick_store: Arc::new(TickStore::new()),
            session_active: AtomicBool::new(false),
            cycles_run: AtomicU64::new(0),
            last_cycle: RwLock::new(None),
            recent_errors: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Error Logging ───────────────────────────────────────────────────

    /// Record an error message. The ring buffer is capped at
    /// [`MAX_RECENT_ERRORS`]; oldest entries are evicted when the limit is
    /// reached.
    pub fn push_error(&self, msg: String) {
        let record = ErrorRecord {
            message: msg,
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
    }

    // ── Cycle tracking ──────────────────────────────────────────────────

    pub fn record_cycle(&self, at: NaiveDateTime, outcome: CycleOutcome) {
        self.cycles_run.fetch_add(1, Ordering::Relaxed);
        *self.last_cycle.write() = Some(CycleRecord { at, outcome });
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    pub fn build_status(&self) -> StatusSnapshot {
        StatusSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            server_time: Utc::now().timestamp_millis(),
            upstream_url: self.config.upstream_url.clone(),
            poll_interval_secs: self.config.poll_interval_secs,
            session: self.config.session,
            session_active: self.session_active.load(Ordering::SeqCst),
            cycles_run: self.cycles_run.load(Ordering::Relaxed),
            buckets: self.tick_store.bucket_count(),
            ticks: self.tick_store.tick_count(),
            last_cycle: self.last_cycle.read().clone(),
            recent_errors: self.recent_errors.read().clone(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::RecordSummary;
    use chrono::NaiveDate;

    #[test]
    fn error_ring_is_bounded() {
        let state = AppState::new(RuntimeConfig::default());
        for i in 0..(MAX_RECENT_ERRORS + 7) {
            state.push_error(format!("error {i}"));
        }

        let errors = state.recent_errors.read();
        assert_eq!(errors.len(), MAX_RECENT_ERRORS);
        assert_eq!(errors[0].message, "error 7");
        assert_eq!(
            errors.last().unwrap().message,
            format!("error {}", MAX_RECENT_ERRORS + 6)
        );
    }

    #[test]
    fn status_reflects_last_cycle() {
        let state = AppState::new(RuntimeConfig::default());
        let at = NaiveDate::from_ymd_opt(2024, 6, 27)
            .unwrap()
            .and_hms_opt(9, 16, 0)
            .unwrap();
        state.record_cycle(
            at,
            CycleOutcome::Completed {
                reset: false,
                summary: RecordSummary::default(),
            },
        );

        let status = state.build_status();
        assert_eq!(status.cycles_run, 1);
        assert_eq!(status.ticks, 0);
        assert!(status.last_cycle.is_some());

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["last_cycle"]["outcome"]["status"], "completed");
        assert_eq!(json["session"]["reset_at"], "09:15");
    }
}
