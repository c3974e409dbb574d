//! In-process counter store.
//!
//! A `parking_lot::Mutex` guarding a `HashMap`, windows keyed by their start
//! timestamp so a sweep is just a retain-by-age pass. Fine for a
//! single-process deployment or tests; swap in `RedisCounterStore` once
//! counts need to be shared across replicas.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::CounterStore;

#[derive(Default)]
pub struct InMemoryCounterStore {
    windows: Mutex<HashMap<(String, i64), u64>>,
    ctr: Mutex<HashMap<String, (u64, u64)>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn window_key(subject: &str, window_start_secs: i64, window_len_secs: u64) -> (String, i64) {
    let bucket = if window_len_secs == 0 {
        window_start_secs
    } else {
        window_start_secs - window_start_secs.rem_euclid(window_len_secs as i64)
    };
    (subject.to_string(), bucket)
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(&self, subject: &str, window_start_secs: i64, window_len_secs: u64) -> anyhow::Result<u64> {
        let key = window_key(subject, window_start_secs, window_len_secs);
        let mut windows = self.windows.lock();
        let count = windows.entry(key).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn get(&self, subject: &str, window_start_secs: i64, window_len_secs: u64) -> anyhow::Result<u64> {
        let key = window_key(subject, window_start_secs, window_len_secs);
        Ok(self.windows.lock().get(&key).copied().unwrap_or(0))
    }

    async fn record_ctr_event(&self, line_item_id: &str, clicks: u64, impressions: u64) -> anyhow::Result<()> {
        let mut ctr = self.ctr.lock();
        let entry = ctr.entry(line_item_id.to_string()).or_insert((0, 0));
        entry.0 += clicks;
        entry.1 += impressions;
        Ok(())
    }

    async fn get_ctr_counts(&self, line_item_id: &str) -> anyhow::Result<(u64, u64)> {
        Ok(self.ctr.lock().get(line_item_id).copied().unwrap_or((0, 0)))
    }

    async fn sweep(&self, older_than_secs: i64) -> anyhow::Result<()> {
        let mut windows = self.windows.lock();
        windows.retain(|(_, bucket), _| *bucket >= older_than_secs);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn windows_bucket_by_window_length() {
        let store = InMemoryCounterStore::new();
        store.increment("li1:u1", 100, 3600).await.unwrap();
        store.increment("li1:u1", 200, 3600).await.unwrap();
        // Both timestamps fall in the same 3600s bucket starting at 0.
        assert_eq!(store.get("li1:u1", 150, 3600).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn distinct_windows_do_not_share_counts() {
        let store = InMemoryCounterStore::new();
        store.increment("li1:u1", 0, 3600).await.unwrap();
        store.increment("li1:u1", 3600, 3600).await.unwrap();
        assert_eq!(store.get("li1:u1", 0, 3600).await.unwrap(), 1);
        assert_eq!(store.get("li1:u1", 3600, 3600).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sweep_drops_old_windows_only() {
        let store = InMemoryCounterStore::new();
        store.increment("li1:u1", 0, 3600).await.unwrap();
        store.increment("li1:u1", 7200, 3600).await.unwrap();
        store.sweep(3600).await.unwrap();
        assert_eq!(store.get("li1:u1", 0, 3600).await.unwrap(), 0);
        assert_eq!(store.get("li1:u1", 7200, 3600).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ctr_counts_accumulate() {
        let store = InMemoryCounterStore::new();
        store.record_ctr_event("li1", 0, 1).await.unwrap();
        store.record_ctr_event("li1", 1, 1).await.unwrap();
        assert_eq!(store.get_ctr_counts("li1").await.unwrap(), (1, 2));
    }
}
