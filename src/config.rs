//! Server configuration.
//!
//! Mission: read every tunable from the environment once at startup so the
//! rest of the server never touches `std::env` again.

use std::time::Duration;

/// Which backend the counter store talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub api_key: Option<String>,

    pub counter_backend: CounterBackend,
    pub redis_url: String,

    pub token_secret: Vec<u8>,
    pub token_ttl: Duration,

    pub predictor_url: Option<String>,
    pub predictor_timeout: Duration,
    pub predictor_cache_ttl: Duration,

    pub default_ctr: f64,
    pub ctr_weight: f64,

    pub event_log_sample_rate: f64,
}

impl Config {
    /// Load configuration from the environment, falling back to sane
    /// defaults for every field so the server boots with zero
    /// configuration for local development and tests.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let bind_addr =
            std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let api_key = std::env::var("API_KEY").ok().filter(|s| !s.is_empty());

        let counter_backend = match std::env::var("COUNTER_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "redis" => CounterBackend::Redis,
            _ => CounterBackend::Memory,
        };
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());

        let token_secret = std::env::var("TOKEN_SECRET")
            .unwrap_or_else(|_| "dev-insecure-token-secret-change-me".to_string())
            .into_bytes();

        let token_ttl_secs = env_parse("TOKEN_TTL_SECS", 90);
        let token_ttl = Duration::from_secs(token_ttl_secs);

        let predictor_url = std::env::var("PREDICTOR_URL").ok().filter(|s| !s.is_empty());
        let predictor_timeout_ms = env_parse("PREDICTOR_TIMEOUT_MS", 200);
        let predictor_cache_ttl_secs = env_parse("PREDICTOR_CACHE_TTL_SECS", 300);

        let default_ctr = env_parse_f64("DEFAULT_CTR", 0.5);
        let ctr_weight = env_parse_f64("CTR_WEIGHT", 2.0);

        let event_log_sample_rate = env_parse_f64("EVENT_LOG_SAMPLE_RATE", 1.0).clamp(0.0, 1.0);

        Ok(Self {
            bind_addr,
            api_key,
            counter_backend,
            redis_url,
            token_secret,
            token_ttl,
            predictor_url,
            predictor_timeout: Duration::from_millis(predictor_timeout_ms),
            predictor_cache_ttl: Duration::from_secs(predictor_cache_ttl_secs),
            default_ctr,
            ctr_weight,
            event_log_sample_rate,
        })
    }
}

fn env_parse(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_parse_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default)
}
