//! Two-stage market-data pipeline: a synthetic tick exchange fanning signed
//! frames out to subscribers, and an aggregating gateway folding them into
//! per-second bars for storage and browser push.

pub mod exchange;
pub mod gateway;
pub mod models;
pub mod ring;
pub mod sig;
pub mod wire;

/// Default shared secret for frame signatures; both binaries take an
/// override via `--secret` / `FEED_SECRET`.
pub const DEFAULT_SECRET: &str = "exchange-a-secret";
