//! CTR predictor client: cached remote-call boost multiplier guarded by a
//! circuit breaker.
//!
//! Wraps a flaky external call behind a timeout and falls back to a safe
//! default rather than propagating the failure: the fixed
//! `{ctr=0.01, confidence=0.5, boost=1.0}` triple. A run of consecutive
//! transport failures trips the breaker open, so a predictor that is down
//! stops taking a network round trip on every cache miss; after a cooldown
//! one request is let through as a half-open probe, and its outcome decides
//! whether the breaker closes or stays open for another cooldown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

const DEFAULT_CTR: f64 = 0.01;
const DEFAULT_CONFIDENCE: f64 = 0.5;
const DEFAULT_BOOST: f64 = 1.0;

const FAILURE_THRESHOLD: u64 = 5;
const COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize)]
pub struct PredictionRequest<'a> {
    pub line_item_id: &'a str,
    pub device_type: &'a str,
    pub country: &'a str,
    pub hour_of_day: u8,
    pub day_of_week: u8,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Prediction {
    pub ctr_score: f64,
    pub confidence: f64,
    pub boost_multiplier: f64,
}

impl Prediction {
    pub fn fallback() -> Self {
        Self {
            ctr_score: DEFAULT_CTR,
            confidence: DEFAULT_CONFIDENCE,
            boost_multiplier: DEFAULT_BOOST,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    prediction: Prediction,
    inserted_at: Instant,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PredictorStats {
    pub total: u64,
    pub active: u64,
    pub expired: u64,
    pub circuit_open: bool,
}

/// Consecutive-failure circuit breaker guarding the network call.
///
/// `open` and `consecutive_failures` are plain atomics since every caller
/// only ever needs the current value, never a snapshot consistent with
/// `opened_at`; `probing` gates the half-open state to a single in-flight
/// caller so a storm of requests after cooldown doesn't all hit the network
/// at once.
struct CircuitBreaker {
    consecutive_failures: AtomicU64,
    open: AtomicBool,
    opened_at: RwLock<Instant>,
    probing: AtomicBool,
}

impl CircuitBreaker {
    fn new() -> Self {
        Self {
            consecutive_failures: AtomicU64::new(0),
            open: AtomicBool::new(false),
            opened_at: RwLock::new(Instant::now()),
            probing: AtomicBool::new(false),
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// `true` means skip the network call and go straight to the fallback.
    fn should_short_circuit(&self) -> bool {
        if !self.is_open() {
            return false;
        }
        if self.opened_at.read().elapsed() < COOLDOWN {
            return true;
        }
        self.probing.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err()
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.probing.store(false, Ordering::Release);
        if self.open.swap(false, Ordering::AcqRel) {
            tracing::info!("predictor circuit closed after a successful probe");
        }
    }

    fn record_failure(&self) {
        self.probing.store(false, Ordering::Release);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= FAILURE_THRESHOLD {
            let was_open = self.open.swap(true, Ordering::AcqRel);
            *self.opened_at.write() = Instant::now();
            if !was_open {
                tracing::warn!(consecutive_failures = failures, "predictor circuit opened");
            }
        }
    }
}

pub struct CtrPredictorClient {
    http: reqwest::Client,
    url: Option<String>,
    timeout: Duration,
    cache_ttl: Duration,
    cache: RwLock<HashMap<String, CacheEntry>>,
    breaker: CircuitBreaker,
}

fn cache_key(req: &PredictionRequest<'_>) -> String {
    format!(
        "{}|{}|{}|{}|{}",
        req.line_item_id, req.device_type, req.country, req.hour_of_day, req.day_of_week
    )
}

impl CtrPredictorClient {
    pub fn new(url: Option<String>, timeout: Duration, cache_ttl: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
            timeout,
            cache_ttl,
            cache: RwLock::new(HashMap::new()),
            breaker: CircuitBreaker::new(),
        }
    }

    /// Returns the cached or freshly-fetched prediction, never failing the
    /// caller: transport errors, timeouts, non-2xx, and an open circuit all
    /// degrade to the fixed fallback triple.
    pub async fn get_prediction(&self, req: &PredictionRequest<'_>) -> Prediction {
        let key = cache_key(req);

        if let Some(entry) = self.cache.read().get(&key) {
            if entry.inserted_at.elapsed() < self.cache_ttl {
                metrics::counter!("ctr_prediction", 1, "outcome" => "cache_hit");
                return entry.prediction;
            }
        }

        let Some(url) = &self.url else {
            metrics::counter!("ctr_prediction", 1, "outcome" => "default");
            return Prediction::fallback();
        };

        if self.breaker.should_short_circuit() {
            metrics::counter!("ctr_prediction", 1, "outcome" => "circuit_open");
            return Prediction::fallback();
        }

        let outcome = tokio::time::timeout(self.timeout, self.http.post(url).json(req).send()).await;
        let prediction = match outcome {
            Ok(Ok(resp)) if resp.status().is_success() => match resp.json::<Prediction>().await {
                Ok(prediction) => {
                    self.breaker.record_success();
                    metrics::counter!("ctr_prediction", 1, "outcome" => "miss");
                    prediction
                }
                Err(err) => {
                    self.breaker.record_failure();
                    tracing::warn!(error = %err, "predictor response decode failed");
                    metrics::counter!("ctr_prediction", 1, "outcome" => "error");
                    Prediction::fallback()
                }
            },
            Ok(Ok(resp)) => {
                self.breaker.record_failure();
                tracing::debug!(status = %resp.status(), "predictor returned non-2xx");
                metrics::counter!("ctr_prediction", 1, "outcome" => "error");
                Prediction::fallback()
            }
            Ok(Err(err)) => {
                self.breaker.record_failure();
                tracing::warn!(error = %err, "predictor transport error");
                metrics::counter!("ctr_prediction", 1, "outcome" => "error");
                Prediction::fallback()
            }
            Err(_) => {
                self.breaker.record_failure();
                tracing::debug!(timeout_ms = self.timeout.as_millis(), "predictor call timed out");
                metrics::counter!("ctr_prediction", 1, "outcome" => "error");
                Prediction::fallback()
            }
        };

        self.cache.write().insert(
            key,
            CacheEntry {
                prediction,
                inserted_at: Instant::now(),
            },
        );
        prediction
    }

    /// Drops entries older than the cache TTL. Run from a background task.
    pub fn sweep_expired(&self) {
        let ttl = self.cache_ttl;
        self.cache.write().retain(|_, entry| entry.inserted_at.elapsed() < ttl);
    }

    pub fn stats(&self) -> PredictorStats {
        let cache = self.cache.read();
        let total = cache.len() as u64;
        let expired = cache
            .values()
            .filter(|entry| entry.inserted_at.elapsed() >= self.cache_ttl)
            .count() as u64;
        PredictorStats {
            total,
            active: total - expired,
            expired,
            circuit_open: self.breaker.is_open(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_configured_url_always_returns_the_fallback() {
        let client = CtrPredictorClient::new(None, Duration::from_millis(200), Duration::from_secs(300));
        let req = PredictionRequest {
            line_item_id: "li1",
            device_type: "desktop",
            country: "US",
            hour_of_day: 12,
            day_of_week: 2,
        };
        let prediction = client.get_prediction(&req).await;
        assert_eq!(prediction.boost_multiplier, DEFAULT_BOOST);
        assert_eq!(prediction.ctr_score, DEFAULT_CTR);
    }

    #[tokio::test]
    async fn stats_report_zero_on_an_empty_cache() {
        let client = CtrPredictorClient::new(None, Duration::from_millis(200), Duration::from_secs(300));
        let stats = client.stats();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.expired, 0);
        assert!(!stats.circuit_open);
    }

    #[tokio::test]
    async fn circuit_opens_after_repeated_transport_failures_and_then_short_circuits() {
        // Nothing listens on this port, so every call is a fast connection
        // refusal rather than a real timeout.
        let client = CtrPredictorClient::new(
            Some("http://127.0.0.1:1".to_string()),
            Duration::from_millis(100),
            Duration::from_secs(300),
        );

        // Vary the cache key per attempt so each one actually reaches the
        // breaker instead of being absorbed by the prediction cache.
        for i in 0..FAILURE_THRESHOLD {
            let line_item_id = format!("li{i}");
            let req = PredictionRequest {
                line_item_id: &line_item_id,
                device_type: "desktop",
                country: "US",
                hour_of_day: 12,
                day_of_week: 2,
            };
            let prediction = client.get_prediction(&req).await;
            assert_eq!(prediction.boost_multiplier, DEFAULT_BOOST);
        }

        assert!(client.stats().circuit_open);

        let req = PredictionRequest {
            line_item_id: "unseen",
            device_type: "desktop",
            country: "US",
            hour_of_day: 12,
            day_of_week: 2,
        };
        let prediction = client.get_prediction(&req).await;
        assert_eq!(prediction.boost_multiplier, DEFAULT_BOOST);
        assert!(client.stats().circuit_open);
    }
}
