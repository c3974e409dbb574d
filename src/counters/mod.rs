//! Pluggable counter storage for frequency caps, pacing and CTR stats.
//!
//! The filter cascade's frequency stage and the pacing controllers both need
//! fast, mutable counters keyed by (line-item, user) or (line-item, day) —
//! a different access pattern from the read-mostly catalogue, so it gets its
//! own store behind a small async trait. The default backend keeps counters
//! in memory with a sliding window; a Redis-backed implementation is
//! available behind the `counter-redis` feature for sharing counts across
//! replicas.

mod memory;
#[cfg(feature = "counter-redis")]
mod redis_store;

pub use memory::InMemoryCounterStore;
#[cfg(feature = "counter-redis")]
pub use redis_store::RedisCounterStore;

use async_trait::async_trait;

/// Storage for everything the filter cascade and pacing controllers count.
///
/// All counters are scoped by an opaque `subject` key, built by callers as
/// `"{line_item_id}:{user_key}"` for frequency caps or `"{line_item_id}"` for
/// line-item-level impression/click totals. Window boundaries are caller
/// supplied (epoch seconds) so the store itself stays backend-agnostic.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increments `subject`'s count within the window starting at
    /// `window_start_secs` and returns the new count.
    async fn increment(&self, subject: &str, window_start_secs: i64, window_len_secs: u64) -> anyhow::Result<u64>;

    /// Reads `subject`'s current count for the window starting at
    /// `window_start_secs` without mutating it.
    async fn get(&self, subject: &str, window_start_secs: i64, window_len_secs: u64) -> anyhow::Result<u64>;

    /// Adds `clicks`/`impressions` to the running CTR totals for `line_item_id`.
    async fn record_ctr_event(&self, line_item_id: &str, clicks: u64, impressions: u64) -> anyhow::Result<()>;

    /// Reads the running `(clicks, impressions)` totals for `line_item_id`.
    async fn get_ctr_counts(&self, line_item_id: &str) -> anyhow::Result<(u64, u64)>;

    /// Drops windows older than `older_than_secs`. Called periodically from a
    /// background task; backends that expire keys natively (Redis TTLs) can
    /// make this a no-op.
    async fn sweep(&self, older_than_secs: i64) -> anyhow::Result<()>;
}
