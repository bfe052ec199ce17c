pub mod tick_store;

// Re-export for convenient access (e.g. `use crate::market_data::TickStore`).
pub use tick_store::{Insert, TickStore};
