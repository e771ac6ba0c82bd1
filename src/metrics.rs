//! Prometheus metrics for the watcher
//!
//! Metrics live in an owned registry handed around through `AppState`.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::error::Result;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub frames_received: IntCounter,
    /// Dropped messages, labelled by reason
    pub messages_dropped: IntCounterVec,
    pub trades_applied: IntCounter,
    pub notable_trades: IntCounter,
    pub quotes_surfaced: IntCounter,
    pub liquidations_surfaced: IntCounter,
    pub snapshots_published: IntCounter,
    pub subscribers_active: IntGauge,
    pub subscribers_pruned: IntCounter,
    pub upstream_reconnects: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("trade_watcher".to_string()), None)?;

        let frames_received = IntCounter::new("frames_received_total", "Upstream text frames received")?;
        let messages_dropped = IntCounterVec::new(
            Opts::new("messages_dropped_total", "Upstream messages dropped without processing"),
            &["reason"],
        )?;
        let trades_applied = IntCounter::new("trades_applied_total", "Trades folded into the statistics")?;
        let notable_trades = IntCounter::new("notable_trades_total", "Runs that crossed the notable size")?;
        let quotes_surfaced = IntCounter::new("quotes_surfaced_total", "Book ticker events surfaced")?;
        let liquidations_surfaced =
            IntCounter::new("liquidations_surfaced_total", "Force order events surfaced")?;
        let snapshots_published = IntCounter::new("snapshots_published_total", "Snapshot ticks broadcast")?;
        let subscribers_active = IntGauge::new("subscribers_active", "Connected snapshot subscribers")?;
        let subscribers_pruned =
            IntCounter::new("subscribers_pruned_total", "Subscribers removed after a failed delivery")?;
        let upstream_reconnects = IntCounter::new("upstream_reconnects_total", "Upstream reconnect attempts")?;

        registry.register(Box::new(frames_received.clone()))?;
        registry.register(Box::new(messages_dropped.clone()))?;
        registry.register(Box::new(trades_applied.clone()))?;
        registry.register(Box::new(notable_trades.clone()))?;
        registry.register(Box::new(quotes_surfaced.clone()))?;
        registry.register(Box::new(liquidations_surfaced.clone()))?;
        registry.register(Box::new(snapshots_published.clone()))?;
        registry.register(Box::new(subscribers_active.clone()))?;
        registry.register(Box::new(subscribers_pruned.clone()))?;
        registry.register(Box::new(upstream_reconnects.clone()))?;

        Ok(Self {
            registry,
            frames_received,
            messages_dropped,
            trades_applied,
            notable_trades,
            quotes_surfaced,
            liquidations_surfaced,
            snapshots_published,
            subscribers_active,
            subscribers_pruned,
            upstream_reconnects,
        })
    }

    /// Render the registry in the Prometheus text format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
