//! Pacing controllers: ASAP, EVEN, and PID, sharing the `allow` interface
//! consulted by the filter cascade's pacing stage.
//!
//! Actual-delivered-count state lives in the counter store so every server
//! instance reads a consistent view; controllers are otherwise stateless.
//! The PID controller's integral/derivative terms are the one exception —
//! the counter store's interface is plain integer counters, with no slot for
//! a running error term, so they're kept in a local `parking_lot::Mutex` per
//! line-item. This means PID anti-windup state does not survive a process
//! restart or replicate across instances; recorded as an open-question
//! resolution in the design notes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::counters::CounterStore;
use crate::models::{LineItem, PacingStrategy};

const SECONDS_IN_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub integral_limit: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.1,
            kd: 0.05,
            integral_limit: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PidState {
    integral: f64,
    prev_error: f64,
    last_sample_secs: i64,
}

pub struct PacingRegistry {
    counters: Option<Arc<dyn CounterStore>>,
    gains: PidGains,
    burst_allowance: f64,
    pid_state: Mutex<HashMap<String, PidState>>,
    rng_seed: std::sync::atomic::AtomicU64,
}

impl PacingRegistry {
    pub fn new() -> Self {
        Self {
            counters: None,
            gains: PidGains::default(),
            burst_allowance: 0.0,
            pid_state: Mutex::new(HashMap::new()),
            rng_seed: std::sync::atomic::AtomicU64::new(0x9E3779B97F4A7C15),
        }
    }

    pub fn with_counters(counters: Arc<dyn CounterStore>) -> Self {
        Self {
            counters: Some(counters),
            ..Self::new()
        }
    }

    pub fn with_gains(mut self, gains: PidGains) -> Self {
        self.gains = gains;
        self
    }

    pub fn with_burst_allowance(mut self, burst: f64) -> Self {
        self.burst_allowance = burst;
        self
    }

    async fn delivered_today(&self, line_item_id: &str, now_secs: i64) -> u64 {
        let day_start = now_secs - now_secs.rem_euclid(SECONDS_IN_DAY as i64);
        match &self.counters {
            Some(counters) => counters
                .get(&format!("{line_item_id}:impressions"), day_start, SECONDS_IN_DAY as u64)
                .await
                .unwrap_or(0),
            None => 0,
        }
    }

    /// Gates delivery for `line_item` at `now_secs`. Fails open (allows)
    /// when the underlying counter lookup errors, consistent with the
    /// filtering-path fail-open policy used elsewhere in the cascade.
    pub async fn allow(&self, line_item: &LineItem, now_secs: i64) -> bool {
        if line_item.daily_impression_cap == 0 {
            return false;
        }
        let delivered = self.delivered_today(line_item.id.as_str(), now_secs).await as f64;
        let cap = line_item.daily_impression_cap as f64;

        match line_item.pacing_strategy {
            PacingStrategy::Asap => delivered < cap,
            PacingStrategy::Even => {
                let day_start = now_secs - now_secs.rem_euclid(SECONDS_IN_DAY as i64);
                let elapsed = (now_secs - day_start).max(0) as f64;
                let target_rate = cap / SECONDS_IN_DAY;
                let expected = elapsed * target_rate;
                delivered < expected + self.burst_allowance
            }
            PacingStrategy::Pid => self.allow_pid(line_item, delivered, cap, now_secs),
        }
    }

    fn allow_pid(&self, line_item: &LineItem, delivered: f64, cap: f64, now_secs: i64) -> bool {
        let day_start = now_secs - now_secs.rem_euclid(SECONDS_IN_DAY as i64);
        let elapsed = (now_secs - day_start).max(1) as f64;
        let target_rate = cap / SECONDS_IN_DAY;
        let expected = elapsed * target_rate;
        let error = expected - delivered;

        let mut states = self.pid_state.lock();
        let state = states.entry(line_item.id.clone()).or_default();

        let dt = (now_secs - state.last_sample_secs).max(1) as f64;
        let mut integral = state.integral + error * dt;
        integral = integral.clamp(-self.gains.integral_limit, self.gains.integral_limit);
        let derivative = (error - state.prev_error) / dt;

        let output = self.gains.kp * error + self.gains.ki * integral + self.gains.kd * derivative;
        let gate_probability = output.clamp(0.0, 1.0);

        state.integral = integral;
        state.prev_error = error;
        state.last_sample_secs = now_secs;
        drop(states);

        self.sample(gate_probability)
    }

    fn sample(&self, probability: f64) -> bool {
        if probability >= 1.0 {
            return true;
        }
        if probability <= 0.0 {
            return false;
        }
        // xorshift64*, deterministic and allocation-free; good enough for a
        // gate that only needs to hit a target rate in aggregate.
        let mut x = self.rng_seed.load(std::sync::atomic::Ordering::Relaxed);
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_seed.store(x, std::sync::atomic::Ordering::Relaxed);
        let draw = (x >> 11) as f64 / (1u64 << 53) as f64;
        draw < probability
    }
}

impl Default for PacingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::InMemoryCounterStore;
    use crate::models::*;

    fn line_item(strategy: PacingStrategy, cap: u64) -> LineItem {
        LineItem {
            id: "li1".into(),
            campaign_id: "c1".into(),
            publisher_id: "pub1".into(),
            budget_type: BudgetType::Cpm,
            bid: 1.0,
            daily_impression_cap: cap,
            pacing_strategy: strategy,
            frequency_cap: None,
            frequency_window_secs: 86400,
            targeting: TargetingPredicate::default(),
            click_url: String::new(),
            state: LineItemState::Active,
        }
    }

    #[tokio::test]
    async fn asap_allows_until_cap_then_blocks() {
        let counters: Arc<dyn CounterStore> = Arc::new(InMemoryCounterStore::new());
        let registry = PacingRegistry::with_counters(counters.clone());
        let li = line_item(PacingStrategy::Asap, 2);

        assert!(registry.allow(&li, 0).await);
        counters.increment("li1:impressions", 0, 86400).await.unwrap();
        assert!(registry.allow(&li, 0).await);
        counters.increment("li1:impressions", 0, 86400).await.unwrap();
        assert!(!registry.allow(&li, 0).await);
    }

    #[tokio::test]
    async fn even_blocks_delivery_ahead_of_the_expected_curve() {
        let counters: Arc<dyn CounterStore> = Arc::new(InMemoryCounterStore::new());
        let registry = PacingRegistry::with_counters(counters.clone());
        let li = line_item(PacingStrategy::Even, 86_400);

        // One second into the day, expected ~= 1 impression. Delivering 5
        // already should exceed expected + burst and block.
        for _ in 0..5 {
            counters.increment("li1:impressions", 0, 86400).await.unwrap();
        }
        assert!(!registry.allow(&li, 1).await);
    }

    #[tokio::test]
    async fn zero_cap_never_allows() {
        let counters: Arc<dyn CounterStore> = Arc::new(InMemoryCounterStore::new());
        let registry = PacingRegistry::with_counters(counters);
        let li = line_item(PacingStrategy::Asap, 0);
        assert!(!registry.allow(&li, 0).await);
    }
}
