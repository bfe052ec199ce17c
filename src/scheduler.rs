// =============================================================================
// Session Scheduler: polls upstream during the trading session
// =============================================================================
//
// Every period the scheduler reads the wall clock and, only while inside the
// session window:
//
//   1. clears the tick store on the first cycle at or after the session-open
//      minute (at most once per calendar day, so a cadence that steps over
//      the exact minute still clears),
//   2. runs one fetch-and-record pass.
//
// A failed pass is logged and recorded in `AppState`; the next period runs as
// usual. Nothing here ever returns an error to the loop.
// =============================================================================

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::app_state::AppState;
use crate::clock::{Clock, ClockTime};
use crate::collector::{RecordSummary, TickCollector};
use crate::upstream::{RecordNormalizer, RecordSource};

// =============================================================================
// Session window
// =============================================================================

fn default_start() -> ClockTime {
    ClockTime::new(9, 0)
}

fn default_close() -> ClockTime {
    ClockTime::new(15, 30)
}

fn default_reset_at() -> ClockTime {
    ClockTime::new(9, 15)
}

/// Daily polling window, compared at minute granularity with both ends
/// inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    /// First polled minute.
    #[serde(default = "default_start")]
    pub start: ClockTime,

    /// Last polled minute.
    #[serde(default = "default_close")]
    pub close: ClockTime,

    /// Session-open minute from which the tick store is cleared.
    #[serde(default = "default_reset_at")]
    pub reset_at: ClockTime,
}

impl Default for SessionWindow {
    fn default() -> Self {
        Self {
            start: default_start(),
            close: default_close(),
            reset_at: default_reset_at(),
        }
    }
}

impl SessionWindow {
    pub fn contains(&self, t: ClockTime) -> bool {
        t >= self.start && t <= self.close
    }

    /// Whether the daily reset is due by `t`.
    pub fn reset_due(&self, t: ClockTime) -> bool {
        t >= self.reset_at
    }
}

// =============================================================================
// Cycle outcome
// =============================================================================

/// What a single scheduler cycle did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Wall clock was outside the session window; nothing happened.
    OutsideSession,
    /// The fetch pass completed.
    Completed { reset: bool, summary: RecordSummary },
    /// The fetch pass failed; the store keeps its previous contents.
    Failed { reset: bool, error: String },
}

impl CycleOutcome {
    pub fn did_fetch(&self) -> bool {
        !matches!(self, Self::OutsideSession)
    }

    pub fn did_reset(&self) -> bool {
        match self {
            Self::OutsideSession => false,
            Self::Completed { reset, .. } | Self::Failed { reset, .. } => *reset,
        }
    }
}

// =============================================================================
// Scheduler
// =============================================================================

pub struct Scheduler {
    state: Arc<AppState>,
    collector: TickCollector,
    clock: Arc<dyn Clock>,
    window: SessionWindow,
    last_reset: Mutex<Option<NaiveDate>>,
}

impl Scheduler {
    pub fn new(
        state: Arc<AppState>,
        source: Arc<dyn RecordSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let normalizer = RecordNormalizer::new(state.config.normalizer.clone(), clock.zone());
        let collector = TickCollector::new(source, normalizer, state.tick_store.clone());
        let window = state.config.session;

        Self {
            state,
            collector,
            clock,
            window,
            last_reset: Mutex::new(None),
        }
    }

    /// Run one scheduler cycle against the current wall clock.
    pub async fn tick(&self) -> CycleOutcome {
        let now = self.clock.now();
        let minute = ClockTime::of(&now);

        let inside = self.window.contains(minute);
        let was_inside = self.state.session_active.swap(inside, Ordering::SeqCst);
        if inside != was_inside {
            info!(at = %minute, active = inside, "session window changed");
        }

        if !inside {
            debug!(at = %minute, "outside session window, skipping cycle");
            return CycleOutcome::OutsideSession;
        }

        let reset = self.reset_if_session_open(now);

        let outcome = match self.collector.fetch_and_record(now).await {
            Ok(summary) => {
                debug!(
                    at = %minute,
                    fetched = summary.fetched,
                    recorded = summary.recorded,
                    duplicates = summary.duplicates,
                    rejected = summary.rejected,
                    "cycle complete"
                );
                CycleOutcome::Completed { reset, summary }
            }
            Err(e) => {
                let error = format!("{e:#}");
                warn!(at = %minute, error = %error, "fetch cycle failed");
                self.state.push_error(format!("fetch cycle failed: {error}"));
                CycleOutcome::Failed { reset, error }
            }
        };

        self.state.record_cycle(now, outcome.clone());
        outcome
    }

    /// Clear the store on the first cycle at or after the session-open
    /// minute, once per calendar day.
    fn reset_if_session_open(&self, now: NaiveDateTime) -> bool {
        if !self.window.reset_due(ClockTime::of(&now)) {
            return false;
        }

        let today = now.date();
        let mut last = self.last_reset.lock();
        if last.is_some_and(|day| day >= today) {
            return false;
        }

        self.state.tick_store.reset();
        *last = Some(today);
        info!(date = %today, "reset ticks at market open");
        true
    }

    /// Drive [`Scheduler::tick`] every `period` until the task is dropped.
    pub async fn run(self, period: Duration) {
        info!(
            period_secs = period.as_secs(),
            start = %self.window.start,
            close = %self.window.close,
            reset_at = %self.window.reset_at,
            zone = %self.clock.zone(),
            "scheduler starting"
        );

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let outcome = self.tick().await;
            debug!(
                fetched = outcome.did_fetch(),
                reset = outcome.did_reset(),
                "scheduler cycle finished"
            );
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
