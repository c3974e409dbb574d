//! Analytics sink: where impression/click events go once recorded.
//!
//! Minimal interface — the real sink (Kafka, a warehouse loader, whatever)
//! is out of scope. `ChannelAnalyticsSink` hands events off to an unbounded
//! `tokio::mpsc` channel so the event endpoints never block on downstream
//! I/O.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize)]
pub enum AnalyticsEventKind {
    Impression,
    Click,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsEvent {
    pub kind: AnalyticsEventKind,
    pub request_id: String,
    pub creative_id: String,
    pub line_item_id: String,
    pub campaign_id: String,
    pub publisher_id: String,
    pub placement_id: String,
    pub user_id: String,
    pub price: f64,
    pub timestamp: i64,
}

#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record(&self, event: AnalyticsEvent) -> anyhow::Result<()>;
}

/// Emits events as structured `tracing` records, sampled at a configurable
/// rate to bound log volume. Always a safe default: no external dependency,
/// never errors.
pub struct LoggingAnalyticsSink {
    sample_rate: f64,
    counter: std::sync::atomic::AtomicU64,
}

impl LoggingAnalyticsSink {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate: sample_rate.clamp(0.0, 1.0),
            counter: std::sync::atomic::AtomicU64::new(0),
        }
    }

    fn should_sample(&self) -> bool {
        if self.sample_rate >= 1.0 {
            return true;
        }
        if self.sample_rate <= 0.0 {
            return false;
        }
        let n = self.counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        ((n as f64 * self.sample_rate) as u64) != (((n + 1) as f64 * self.sample_rate) as u64)
    }
}

#[async_trait]
impl AnalyticsSink for LoggingAnalyticsSink {
    async fn record(&self, event: AnalyticsEvent) -> anyhow::Result<()> {
        if self.should_sample() {
            tracing::info!(
                kind = ?event.kind,
                creative_id = %event.creative_id,
                line_item_id = %event.line_item_id,
                price = event.price,
                "ad event"
            );
        }
        Ok(())
    }
}

/// Hands events off to an in-process channel; a background task drains it
/// toward whatever real sink the deployment wires up.
pub struct ChannelAnalyticsSink {
    tx: mpsc::UnboundedSender<AnalyticsEvent>,
}

impl ChannelAnalyticsSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AnalyticsEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl AnalyticsSink for ChannelAnalyticsSink {
    async fn record(&self, event: AnalyticsEvent) -> anyhow::Result<()> {
        self.tx
            .send(event)
            .map_err(|_| anyhow::anyhow!("analytics channel receiver dropped"))
    }
}
