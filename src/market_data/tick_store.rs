use std::collections::HashMap;

use parking_lot::RwLock;

use crate::types::{Tick, TickBook};

// ---------------------------------------------------------------------------
// TickStore -- per-expiry tick sequences with time-label dedup
// ---------------------------------------------------------------------------

/// Result of offering a tick to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    /// The tick was appended to its expiry bucket.
    Appended,
    /// A tick with the same time label already exists in that bucket.
    Duplicate,
}

/// Thread-safe in-memory tick buffer keyed by expiry.
///
/// Ticks are only ever appended; the sole removal is [`TickStore::reset`],
/// which swaps in a fresh map under a single write lock so readers observe
/// either the full pre-reset book or the empty one.
pub struct TickStore {
    buckets: RwLock<HashMap<String, Vec<Tick>>>,
}

impl TickStore {
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Append `tick` to its expiry bucket unless a tick with the same `time`
    /// is already there.
    pub fn record(&self, tick: Tick) -> Insert {
        let mut map = self.buckets.write();
        let bucket = map.entry(tick.expiry.clone()).or_default();

        if bucket.iter().any(|t| t.time == tick.time) {
            return Insert::Duplicate;
        }
        bucket.push(tick);
        Insert::Appended
    }

    /// Drop every bucket.
    pub fn reset(&self) {
        *self.buckets.write() = HashMap::new();
    }

    /// Owned copy of the current book.
    pub fn snapshot(&self) -> TickBook {
        self.buckets
            .read()
            .iter()
            .map(|(expiry, ticks)| (expiry.clone(), ticks.clone()))
            .collect()
    }

    /// Ticks stored for one expiry, in arrival order.
    #[cfg(test)]
    pub fn bucket(&self, expiry: &str) -> Vec<Tick> {
        self.buckets
            .read()
            .get(expiry)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of expiry buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }

    /// Total number of ticks across all buckets.
    pub fn tick_count(&self) -> usize {
        self.buckets.read().values().map(Vec::len).sum()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.tick_count() == 0
    }
}

impl Default for TickStore {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(time: &str, ltp: f64, expiry: &str) -> Tick {
        Tick {
            time: time.to_string(),
            ltp,
            prev_close: 0.0,
            expiry: expiry.to_string(),
        }
    }

    #[test]
    fn identical_tick_twice_is_stored_once() {
        let store = TickStore::new();
        let t = tick("09:16:00", 81000.5, "27-06-2024");

        assert_eq!(store.record(t.clone()), Insert::Appended);
        assert_eq!(store.record(t), Insert::Duplicate);
        assert_eq!(store.bucket("27-06-2024").len(), 1);
    }

    #[test]
    fn same_time_different_price_is_still_duplicate() {
        let store = TickStore::new();
        store.record(tick("09:16:00", 81000.5, "27-06-2024"));
        assert_eq!(
            store.record(tick("09:16:00", 81010.0, "27-06-2024")),
            Insert::Duplicate
        );

        let bucket = store.bucket("27-06-2024");
        assert_eq!(bucket.len(), 1);
        assert!((bucket[0].ltp - 81000.5).abs() < f64::EPSILON);
    }

    #[test]
    fn same_time_in_other_expiry_is_not_duplicate() {
        let store = TickStore::new();
        store.record(tick("09:16:00", 81000.5, "27-06-2024"));
        assert_eq!(
            store.record(tick("09:16:00", 81400.0, "25-07-2024")),
            Insert::Appended
        );
        assert_eq!(store.bucket_count(), 2);
        assert_eq!(store.tick_count(), 2);
    }

    #[test]
    fn bucket_preserves_arrival_order() {
        let store = TickStore::new();
        // Deliberately out of chronological and price order.
        for (time, ltp) in [("09:18:00", 3.0), ("09:16:00", 1.0), ("09:17:00", 2.0)] {
            store.record(tick(time, ltp, "27-06-2024"));
        }
        let times: Vec<String> = store
            .bucket("27-06-2024")
            .into_iter()
            .map(|t| t.time)
            .collect();
        assert_eq!(times, vec!["09:18:00", "09:16:00", "09:17:00"]);
    }

    #[test]
    fn no_two_ticks_share_a_time_label() {
        let store = TickStore::new();
        let labels = ["09:16", "09:17", "09:16", "09:18", "09:17", "09:16"];
        for (i, label) in labels.iter().enumerate() {
            store.record(tick(label, i as f64, "27-06-2024"));
        }

        let bucket = store.bucket("27-06-2024");
        assert_eq!(bucket.len(), 3);
        for (i, a) in bucket.iter().enumerate() {
            for b in &bucket[i + 1..] {
                assert_ne!(a.time, b.time);
            }
        }
    }

    #[test]
    fn reset_removes_every_bucket() {
        let store = TickStore::new();
        store.record(tick("09:16:00", 1.0, "27-06-2024"));
        store.record(tick("09:16:00", 2.0, "25-07-2024"));

        store.reset();
        assert!(store.is_empty());
        assert_eq!(store.bucket_count(), 0);
        assert!(store.snapshot().is_empty());

        // Resetting an empty store is harmless.
        store.reset();
        assert!(store.is_empty());
    }

    #[test]
    fn snapshot_is_detached_from_later_writes() {
        let store = TickStore::new();
        store.record(tick("09:16:00", 1.0, "27-06-2024"));
        let snap = store.snapshot();

        store.record(tick("09:17:00", 2.0, "27-06-2024"));
        store.reset();

        assert_eq!(snap["27-06-2024"].len(), 1);
    }

    #[test]
    fn bucket_unknown_expiry_is_empty() {
        let store = TickStore::new();
        assert!(store.bucket("01-01-2030").is_empty());
    }
}
