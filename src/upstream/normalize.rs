// =============================================================================
// Record Normalizer: upstream JSON record -> Tick
// =============================================================================
//
// The upstream schema is not stable: price may arrive as `ltp`, `last_price`,
// `lastPrice` or `close`, numbers may be JSON numbers or numeric strings, and
// expiry dates come in several layouts. Every field is looked up through a
// configurable priority list; the first usable candidate wins.
// =============================================================================

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::clock::WallZone;
use crate::types::Tick;

/// Canonical expiry key layout.
pub const EXPIRY_FORMAT: &str = "%d-%m-%Y";

/// Layout of time labels derived locally.
pub const TIME_LABEL_FORMAT: &str = "%H:%M:%S";

/// Date layouts accepted for expiry fields, tried in order.
const EXPIRY_LAYOUTS: &[&str] = &[
    "%d-%m-%Y", "%d-%b-%Y", "%d/%m/%Y", "%Y/%m/%d", "%d %b %Y", "%d%b%Y", "%d-%m-%y",
];

/// `%Y` happily reads `24` as year 24; anything earlier is a truncated year.
const MIN_EXPIRY_YEAR: i32 = 1000;

/// Epoch values above this are read as milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

// =============================================================================
// Default-value helpers
// =============================================================================

fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn default_record_fields() -> Vec<String> {
    strings(&["resultData", "data", "records"])
}

fn default_expiry_fields() -> Vec<String> {
    strings(&["expiry_date", "expiryDate", "expiry"])
}

fn default_price_fields() -> Vec<String> {
    strings(&["ltp", "last_price", "lastPrice", "close"])
}

fn default_prev_close_fields() -> Vec<String> {
    strings(&["prev_close", "prevClose", "previous_close"])
}

fn default_time_fields() -> Vec<String> {
    strings(&["time", "timestamp"])
}

// =============================================================================
// NormalizerConfig
// =============================================================================

/// Field-name priority lists used to read upstream records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Top-level response fields that may hold the record batch.
    #[serde(default = "default_record_fields")]
    pub record_fields: Vec<String>,

    #[serde(default = "default_expiry_fields")]
    pub expiry_fields: Vec<String>,

    #[serde(default = "default_price_fields")]
    pub price_fields: Vec<String>,

    #[serde(default = "default_prev_close_fields")]
    pub prev_close_fields: Vec<String>,

    #[serde(default = "default_time_fields")]
    pub time_fields: Vec<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            record_fields: default_record_fields(),
            expiry_fields: default_expiry_fields(),
            price_fields: default_price_fields(),
            prev_close_fields: default_prev_close_fields(),
            time_fields: default_time_fields(),
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Why a single record could not become a tick.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("no expiry field present")]
    MissingExpiry,
    #[error("unrecognised expiry date '{0}'")]
    BadExpiry(String),
    #[error("no numeric price in any of {0:?}")]
    MissingPrice(Vec<String>),
}

// =============================================================================
// RecordNormalizer
// =============================================================================

/// One record of an upstream batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRecord {
    /// Key of the per-expiry group the record was listed under, if any.
    pub group: Option<String>,
    pub body: Value,
}

impl BatchRecord {
    fn ungrouped(body: Value) -> Self {
        Self { group: None, body }
    }
}

#[derive(Debug, Clone)]
pub struct RecordNormalizer {
    config: NormalizerConfig,
    zone: WallZone,
}

impl RecordNormalizer {
    pub fn new(config: NormalizerConfig, zone: WallZone) -> Self {
        Self { config, zone }
    }

    /// Locate the record batch in an upstream response body.
    ///
    /// The batch field may hold an array of records, an object of per-expiry
    /// arrays (flattened in key order, each record tagged with its group key),
    /// or a single record object. Returns an empty batch when no configured
    /// field is present.
    pub fn extract_records(&self, body: &Value) -> Vec<BatchRecord> {
        let Some(batch) = self
            .config
            .record_fields
            .iter()
            .find_map(|name| body.get(name).filter(|v| !v.is_null()))
        else {
            return Vec::new();
        };

        match batch {
            Value::Array(items) => items.iter().cloned().map(BatchRecord::ungrouped).collect(),
            Value::Object(map) if map.values().all(Value::is_array) && !map.is_empty() => map
                .iter()
                .filter_map(|(key, items)| Some((key, items.as_array()?)))
                .flat_map(|(key, items)| {
                    items.iter().map(move |item| BatchRecord {
                        group: Some(key.clone()),
                        body: item.clone(),
                    })
                })
                .collect(),
            Value::Object(_) => vec![BatchRecord::ungrouped(batch.clone())],
            _ => Vec::new(),
        }
    }

    /// Turn one upstream record into a tick. `group` is the per-expiry key
    /// the record was listed under and is used when the record names no
    /// expiry itself. `fetched_at` labels records that carry no time of
    /// their own.
    pub fn normalize(
        &self,
        record: &Value,
        group: Option<&str>,
        fetched_at: NaiveDateTime,
    ) -> Result<Tick, NormalizeError> {
        if !record.is_object() {
            return Err(NormalizeError::NotAnObject);
        }

        let raw_expiry = self
            .config
            .expiry_fields
            .iter()
            .find_map(|name| record.get(name).and_then(value_as_text))
            .or_else(|| group.map(str::to_string))
            .ok_or(NormalizeError::MissingExpiry)?;
        let expiry = normalize_expiry(&raw_expiry)
            .ok_or_else(|| NormalizeError::BadExpiry(raw_expiry.clone()))?;

        let ltp = first_number(record, &self.config.price_fields)
            .ok_or_else(|| NormalizeError::MissingPrice(self.config.price_fields.clone()))?;

        let prev_close = first_number(record, &self.config.prev_close_fields).unwrap_or(0.0);

        let time = self
            .config
            .time_fields
            .iter()
            .find_map(|name| record.get(name).and_then(|v| self.time_label(v)))
            .unwrap_or_else(|| fetched_at.format(TIME_LABEL_FORMAT).to_string());

        Ok(Tick {
            time,
            ltp,
            prev_close,
            expiry,
        })
    }

    fn time_label(&self, value: &Value) -> Option<String> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => {
                let raw = n.as_i64()?;
                let instant = if raw > EPOCH_MILLIS_THRESHOLD {
                    DateTime::from_timestamp_millis(raw)?
                } else {
                    DateTime::from_timestamp(raw, 0)?
                };
                Some(self.zone.wall(instant).format(TIME_LABEL_FORMAT).to_string())
            }
            _ => None,
        }
    }
}

/// Canonicalise an upstream expiry value to `DD-MM-YYYY`.
///
/// ISO dates and datetimes are read from their first ten characters; other
/// layouts are tried from [`EXPIRY_LAYOUTS`]. Feeding the output back in
/// returns it unchanged.
pub fn normalize_expiry(raw: &str) -> Option<String> {
    let s = raw.trim();

    let plausible = |date: NaiveDate| (date.year() >= MIN_EXPIRY_YEAR).then_some(date);

    let iso = s
        .get(..10)
        .and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
        .and_then(plausible);

    iso.or_else(|| {
        EXPIRY_LAYOUTS.iter().find_map(|layout| {
            NaiveDate::parse_from_str(s, layout).ok().and_then(plausible)
        })
    })
    .map(|date| date.format(EXPIRY_FORMAT).to_string())
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// First field in `names` holding a finite number or numeric string.
fn first_number(record: &Value, names: &[String]) -> Option<f64> {
    names.iter().find_map(|name| {
        let parsed = match record.get(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
            _ => None,
        }?;
        parsed.is_finite().then_some(parsed)
    })
}

// =============================================================================
// Tests
// =============================================================================
