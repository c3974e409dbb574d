//! Redis-backed counter store, for sharing frequency/pacing counts across
//! replicas. Gated behind the `counter-redis` feature; not part of the
//! teacher's stack, added here because `InMemoryCounterStore` is correct
//! only for a single process.

use async_trait::async_trait;
use redis::AsyncCommands;

use super::CounterStore;

pub struct RedisCounterStore {
    client: redis::Client,
}

impl RedisCounterStore {
    pub fn new(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    fn window_field(window_start_secs: i64, window_len_secs: u64) -> i64 {
        if window_len_secs == 0 {
            window_start_secs
        } else {
            window_start_secs - window_start_secs.rem_euclid(window_len_secs as i64)
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, subject: &str, window_start_secs: i64, window_len_secs: u64) -> anyhow::Result<u64> {
        let bucket = Self::window_field(window_start_secs, window_len_secs);
        let key = format!("cnt:{subject}:{bucket}");
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let count: u64 = conn.incr(&key, 1u64).await?;
        if count == 1 && window_len_secs > 0 {
            let _: () = conn.expire(&key, window_len_secs as i64 * 2).await?;
        }
        Ok(count)
    }

    async fn get(&self, subject: &str, window_start_secs: i64, window_len_secs: u64) -> anyhow::Result<u64> {
        let bucket = Self::window_field(window_start_secs, window_len_secs);
        let key = format!("cnt:{subject}:{bucket}");
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let count: Option<u64> = conn.get(&key).await?;
        Ok(count.unwrap_or(0))
    }

    async fn record_ctr_event(&self, line_item_id: &str, clicks: u64, impressions: u64) -> anyhow::Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        if clicks > 0 {
            let _: u64 = conn.incr(format!("ctr:{line_item_id}:clicks"), clicks).await?;
        }
        if impressions > 0 {
            let _: u64 = conn.incr(format!("ctr:{line_item_id}:impressions"), impressions).await?;
        }
        Ok(())
    }

    async fn get_ctr_counts(&self, line_item_id: &str) -> anyhow::Result<(u64, u64)> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let clicks: Option<u64> = conn.get(format!("ctr:{line_item_id}:clicks")).await?;
        let impressions: Option<u64> = conn.get(format!("ctr:{line_item_id}:impressions")).await?;
        Ok((clicks.unwrap_or(0), impressions.unwrap_or(0)))
    }

    /// Windows carry a TTL set on first increment, so expiry is Redis's job.
    async fn sweep(&self, _older_than_secs: i64) -> anyhow::Result<()> {
        Ok(())
    }
}
