//! Trade Watcher Library
//!
//! Consumes the Binance futures combined stream for one symbol, keeps rolling
//! trade-flow statistics, and republishes a snapshot of them to local
//! WebSocket subscribers once per tick.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

pub mod aggregator;
pub mod config;
pub mod error;
pub mod feed;
pub mod metrics;
pub mod parser;
pub mod publisher;
pub mod server;
pub mod surfacer;

pub use aggregator::{NotableTrade, RunTargeting, TradeAggregator, TradeSnapshot};
pub use config::Config;
pub use error::{Result, WatcherError};
pub use feed::{Dispatcher, FeedClient, FeedManager};
pub use metrics::Metrics;
pub use parser::{FeedEvent, StreamKind, TradeEvent, TradeSide};
pub use publisher::{SnapshotPublisher, SubscriberRegistry};
pub use surfacer::PassiveSurfacer;

/// Application state shared across components
pub struct AppState {
    pub config: Arc<Config>,
    pub aggregator: Arc<RwLock<TradeAggregator>>,
    pub registry: Arc<SubscriberRegistry>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let metrics = Metrics::new()?;
        let aggregator = TradeAggregator::new(&config.symbol, config.stream_names(), config.aggregator_settings());

        Ok(Self {
            aggregator: Arc::new(RwLock::new(aggregator)),
            registry: Arc::new(SubscriberRegistry::new(metrics.clone())),
            config: Arc::new(config),
            metrics,
        })
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            &self.config.symbol,
            self.aggregator.clone(),
            self.metrics.clone(),
            self.config.verbose,
        )
    }

    pub fn publisher(&self) -> SnapshotPublisher {
        SnapshotPublisher::new(
            self.aggregator.clone(),
            self.registry.clone(),
            self.metrics.clone(),
            Duration::from_millis(self.config.publish_interval_ms.max(1)),
        )
    }

    pub fn feed_manager(&self) -> FeedManager {
        FeedManager::new(
            FeedClient::new(&self.config.ws_endpoint, self.config.stream_names()),
            self.dispatcher(),
            self.metrics.clone(),
            self.config.reconnect_delay_ms,
            Duration::from_millis(self.config.shutdown_grace_ms),
        )
    }
}
