// =============================================================================
// Runtime Configuration: JSON file + environment overrides
// =============================================================================
//
// Every field carries a serde default so a partial (or absent) config file is
// always usable. Environment variables are applied on top of whatever was
// loaded; an override that fails to parse is logged and ignored.
// =============================================================================

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::parse_utc_offset;
use crate::scheduler::SessionWindow;
use crate::upstream::NormalizerConfig;

/// Default config file looked up when `SENSEX_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "sensex_config.json";

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_upstream_url() -> String {
    "http://localhost:5000/api/futures?symbol=sensex".to_string()
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    10
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration for the tick relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- HTTP API ------------------------------------------------------------

    /// Interface the HTTP API binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Port the HTTP API listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    // --- Upstream ------------------------------------------------------------

    /// Futures quote endpoint polled each cycle.
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,

    /// Seconds between scheduler cycles.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Upper bound on a single upstream request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    // --- Session -------------------------------------------------------------

    /// Fixed UTC offset of the exchange wall clock (e.g. `"+05:30"`). When
    /// unset the host's local time zone is used.
    #[serde(default)]
    pub utc_offset: Option<String>,

    #[serde(default)]
    pub session: SessionWindow,

    // --- Upstream record layout ----------------------------------------------

    #[serde(default)]
    pub normalizer: NormalizerConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            upstream_url: default_upstream_url(),
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            utc_offset: None,
            session: SessionWindow::default(),
            normalizer: NormalizerConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            upstream_url = %config.upstream_url,
            port = config.port,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Apply process environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("SENSEX_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(url) = lookup("SENSEX_UPSTREAM_URL") {
            self.upstream_url = url;
        }
        if let Some(offset) = lookup("SENSEX_UTC_OFFSET") {
            self.utc_offset = Some(offset);
        }

        override_parsed(&lookup, "PORT", &mut self.port);
        override_parsed(&lookup, "SENSEX_POLL_SECS", &mut self.poll_interval_secs);
        override_parsed(
            &lookup,
            "SENSEX_REQUEST_TIMEOUT_SECS",
            &mut self.request_timeout_secs,
        );
    }

    /// Reject configurations the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than zero");
        }
        if self.session.start > self.session.close {
            bail!(
                "session start {} is after session close {}",
                self.session.start,
                self.session.close
            );
        }
        if !self.session.contains(self.session.reset_at) {
            warn!(
                reset_at = %self.session.reset_at,
                "reset minute lies outside the session window; the store will never reset"
            );
        }
        if let Some(offset) = &self.utc_offset {
            parse_utc_offset(offset)?;
        }
        if self.normalizer.price_fields.is_empty() {
            bail!("normalizer.price_fields must name at least one field");
        }
        Ok(())
    }
}

fn override_parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T)
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(e) => warn!(key, value = %raw, error = %e, "ignoring invalid environment override"),
    }
}
