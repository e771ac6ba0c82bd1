//! Snapshot publisher
//!
//! Once per tick: copy the aggregator state under its lock, serialize it
//! once, then queue it for every registered subscriber.

mod registry;

pub use registry::{BroadcastReport, Payload, SubscriberId, SubscriberRegistry};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::aggregator::TradeAggregator;
use crate::error::{Result, WatcherError};
use crate::metrics::Metrics;

pub struct SnapshotPublisher {
    aggregator: Arc<RwLock<TradeAggregator>>,
    registry: Arc<SubscriberRegistry>,
    metrics: Metrics,
    period: Duration,
}

impl SnapshotPublisher {
    pub fn new(
        aggregator: Arc<RwLock<TradeAggregator>>,
        registry: Arc<SubscriberRegistry>,
        metrics: Metrics,
        period: Duration,
    ) -> Self {
        Self {
            aggregator,
            registry,
            metrics,
            period,
        }
    }

    /// Publish a single snapshot
    pub async fn publish_once(&self) -> Result<BroadcastReport> {
        let snapshot = {
            let aggregator = self.aggregator.read().await;
            aggregator.snapshot()
        };

        let payload: Payload = snapshot
            .to_payload()
            .map_err(|e| WatcherError::SerializationError(format!("Failed to serialize snapshot: {}", e)))?
            .into();

        let report = self.registry.broadcast(payload).await;
        self.metrics.snapshots_published.inc();

        debug!(
            total_count = snapshot.total_count,
            delivered = report.delivered,
            pruned = report.pruned,
            "Published snapshot"
        );
        Ok(report)
    }

    /// Publish every period until shutdown is signalled
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(period_ms = self.period.as_millis() as u64, "Starting snapshot publisher");

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.publish_once().await {
                        error!(error = %e, "Snapshot publish failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("Snapshot publisher stopping");
                    return;
                }
            }
        }
    }
}
