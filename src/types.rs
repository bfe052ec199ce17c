// =============================================================================
// Shared types used across the Sensex tick relay
// =============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One observed price sample for a contract expiry at a time label.
///
/// Field names on the wire follow the chart front-end contract
/// (`time`, `ltp`, `prevClose`, `expiry`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tick {
    /// Wall-clock-of-day label (e.g. `"09:16:00"`) or upstream timestamp.
    pub time: String,
    /// Last traded price.
    pub ltp: f64,
    /// Previous session close; 0.0 when upstream omits it.
    #[serde(default)]
    pub prev_close: f64,
    /// Canonical expiry key, `DD-MM-YYYY`.
    pub expiry: String,
}

/// Read-only snapshot of the tick store: expiry key -> ticks in arrival order.
pub type TickBook = BTreeMap<String, Vec<Tick>>;

/// Envelope used by every JSON response the chart consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope<T> {
    pub result: u8,
    pub result_message: String,
    pub result_data: T,
}

impl<T> ApiEnvelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            result: 1,
            result_message: "Success".to_string(),
            result_data: data,
        }
    }
}
