//! Configuration module for the trade watcher

use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use tracing::warn;

use crate::aggregator::{AggregatorSettings, RunTargeting};
use crate::error::{Result, WatcherError};
use crate::parser::StreamKind;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Instrument symbol, lower case as used in stream names (e.g. "btcusdt")
    pub symbol: String,

    /// Sub-streams selected after enables and excludes are applied
    pub streams: Vec<StreamKind>,

    /// WebSocket endpoint for Binance futures
    pub ws_endpoint: String,

    /// Address of the local publish endpoint
    pub listen_addr: String,

    /// Verbose per-message logging
    pub verbose: bool,

    /// Minimum quantity for a notable trade
    pub min_trade_size: Decimal,

    pub run_targeting: RunTargeting,

    /// Snapshot publish interval
    pub publish_interval_ms: u64,

    /// Outbound queue depth per subscriber
    pub subscriber_queue_capacity: usize,

    /// Rolling buffer sizes
    pub trade_log_capacity: usize,
    pub run_history_capacity: usize,
    pub rate_window_capacity: usize,

    /// Reconnection settings
    pub reconnect_delay_ms: u64,

    /// Delay between the upstream close frame and exit
    pub shutdown_grace_ms: u64,
}

/// Stream enables as read from the process environment
#[derive(Debug, Clone, Default)]
pub struct StreamSelection {
    pub trade: bool,
    pub book_ticker: bool,
    pub force_order: bool,
    /// Comma separated stream names that override the enables
    pub exclude: String,
}

impl StreamSelection {
    /// Resolve the final stream list.
    ///
    /// With no enable set every stream is on; once any enable is set only the
    /// enabled ones are kept. Excludes win over enables; unknown exclude
    /// names are skipped with a warning.
    pub fn resolve(&self) -> Result<Vec<StreamKind>> {
        let any_enabled = self.trade || self.book_ticker || self.force_order;
        let mut active: HashMap<StreamKind, bool> = HashMap::from([
            (StreamKind::Trade, !any_enabled || self.trade),
            (StreamKind::BookTicker, !any_enabled || self.book_ticker),
            (StreamKind::ForceOrder, !any_enabled || self.force_order),
        ]);

        for name in self.exclude.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match StreamKind::from_config_name(name) {
                Some(kind) => {
                    active.insert(kind, false);
                }
                None => warn!(stream = %name, "Ignoring unknown stream in exclude list"),
            }
        }

        let streams: Vec<StreamKind> = StreamKind::ALL
            .into_iter()
            .filter(|kind| active.get(kind).copied().unwrap_or(false))
            .collect();

        if streams.is_empty() {
            return Err(WatcherError::ConfigError("No stream enabled".to_string()));
        }

        Ok(streams)
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let selection = StreamSelection {
            trade: env_flag("ENABLE_TRADE"),
            book_ticker: env_flag("ENABLE_BOOK_TICKER"),
            force_order: env_flag("ENABLE_FORCE_ORDER"),
            exclude: env::var("EXCLUDE_STREAMS").unwrap_or_default(),
        };

        let defaults = Self::default();

        let min_trade_size = match env::var("MIN_TRADE_SIZE") {
            Ok(raw) => Decimal::from_str(raw.trim())
                .map_err(|e| WatcherError::ConfigError(format!("MIN_TRADE_SIZE: {}", e)))?,
            Err(_) => defaults.min_trade_size,
        };

        let run_targeting = match env::var("RUN_TARGETING") {
            Ok(raw) => raw.parse::<RunTargeting>()?,
            Err(_) => defaults.run_targeting,
        };

        Ok(Self {
            symbol: env::var("SYMBOL")
                .unwrap_or_else(|_| defaults.symbol.clone())
                .trim()
                .to_lowercase(),
            streams: selection.resolve()?,
            ws_endpoint: env::var("WS_ENDPOINT").unwrap_or(defaults.ws_endpoint),
            listen_addr: env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            verbose: env_flag("VERBOSE"),
            min_trade_size,
            run_targeting,
            publish_interval_ms: env_parse("PUBLISH_INTERVAL_MS", defaults.publish_interval_ms),
            subscriber_queue_capacity: env_parse("SUBSCRIBER_QUEUE_CAPACITY", defaults.subscriber_queue_capacity)
                .max(1),
            trade_log_capacity: env_parse("TRADE_LOG_CAPACITY", defaults.trade_log_capacity),
            run_history_capacity: env_parse("RUN_HISTORY_CAPACITY", defaults.run_history_capacity),
            rate_window_capacity: env_parse("RATE_WINDOW_CAPACITY", defaults.rate_window_capacity),
            reconnect_delay_ms: env_parse("RECONNECT_DELAY_MS", defaults.reconnect_delay_ms),
            shutdown_grace_ms: env_parse("SHUTDOWN_GRACE_MS", defaults.shutdown_grace_ms),
        })
    }

    /// Stream names for the upstream query, e.g. `btcusdt@trade`
    pub fn stream_names(&self) -> Vec<String> {
        self.streams.iter().map(|kind| kind.stream_name(&self.symbol)).collect()
    }

    pub fn aggregator_settings(&self) -> AggregatorSettings {
        AggregatorSettings {
            min_trade_size: self.min_trade_size,
            run_targeting: self.run_targeting,
            trade_log_capacity: self.trade_log_capacity,
            run_history_capacity: self.run_history_capacity,
            rate_window_capacity: self.rate_window_capacity,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let aggregator = AggregatorSettings::default();
        Self {
            symbol: "btcusdt".to_string(),
            streams: StreamKind::ALL.to_vec(),
            ws_endpoint: "wss://fstream.binance.com".to_string(),
            listen_addr: "0.0.0.0:8081".to_string(),
            verbose: false,
            min_trade_size: aggregator.min_trade_size,
            run_targeting: aggregator.run_targeting,
            publish_interval_ms: 1000,
            subscriber_queue_capacity: 16,
            trade_log_capacity: aggregator.trade_log_capacity,
            run_history_capacity: aggregator.run_history_capacity,
            rate_window_capacity: aggregator.rate_window_capacity,
            reconnect_delay_ms: 1000,
            shutdown_grace_ms: 1000,
        }
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
