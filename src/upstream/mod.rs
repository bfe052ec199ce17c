// =============================================================================
// Upstream Market Data
// =============================================================================
//
// `client` talks HTTP to the futures quote API; `normalize` turns whatever
// record shape it returns into `Tick`s.

pub mod client;
pub mod normalize;

pub use client::{RecordSource, UpstreamClient};
#[cfg(test)]
pub use client::StubSource;
pub use normalize::{NormalizerConfig, RecordNormalizer};
