//! Trade aggregator
//!
//! Maintains the rolling trade statistics and the same-side run lists from
//! the trade sub-stream. Callers share one aggregator behind a single lock;
//! every `apply` is one short critical section.

mod runs;
mod snapshot;
mod window;

pub use runs::{AggregatedRun, RunList};
pub use snapshot::TradeSnapshot;
pub use window::RateWindow;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::WatcherError;
use crate::parser::{TradeEvent, TradeSide};

/// Fixed normalisation used for the per-minute frequencies
const FREQUENCY_DIVISOR: i64 = 60;
/// Minimum spacing between `last_update` refreshes
const LAST_UPDATE_THROTTLE_SECS: i64 = 5;
const RATE_WINDOW_MS: i64 = 60_000;

/// Which run list an incoming trade extends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunTargeting {
    /// A sell-initiated trade extends the buy-side list and vice versa
    #[default]
    Opposite,
    /// A trade extends the list of its own side
    Same,
}

impl RunTargeting {
    pub fn target(self, side: TradeSide) -> TradeSide {
        match self {
            RunTargeting::Opposite => side.opposite(),
            RunTargeting::Same => side,
        }
    }
}

impl FromStr for RunTargeting {
    type Err = WatcherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "opposite" => Ok(RunTargeting::Opposite),
            "same" => Ok(RunTargeting::Same),
            other => Err(WatcherError::ConfigError(format!("Unknown run targeting: {}", other))),
        }
    }
}

/// Aggregator tuning
#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub min_trade_size: Decimal,
    pub run_targeting: RunTargeting,
    pub trade_log_capacity: usize,
    pub run_history_capacity: usize,
    /// Upper bound on `TradesLastMinute`
    pub rate_window_capacity: usize,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            min_trade_size: Decimal::new(11, 2),
            run_targeting: RunTargeting::Opposite,
            trade_log_capacity: 10_000,
            run_history_capacity: 1_000,
            rate_window_capacity: 200_000,
        }
    }
}

/// A run that crossed the notable-size threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotableTrade {
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: String,
    /// `quantity * last_trade_price`, saturated at `Decimal::MAX`
    pub quote_value: Decimal,
    pub trade_time: i64,
}

/// `a / b`, or zero when `b` is zero
pub fn ratio(a: Decimal, b: Decimal) -> Decimal {
    a.checked_div(b).unwrap_or(Decimal::ZERO)
}

/// `count / (volume + 1)`, zero when the sum leaves the decimal range
fn activity(count: Decimal, volume: Decimal) -> Decimal {
    volume
        .checked_add(Decimal::ONE)
        .and_then(|denominator| count.checked_div(denominator))
        .unwrap_or(Decimal::ZERO)
}

/// Rolling trade statistics for one symbol
#[derive(Debug, Clone)]
pub struct TradeAggregator {
    symbol: String,
    streams: Vec<String>,
    settings: AggregatorSettings,

    last_trade_price: Decimal,

    buy_count: u64,
    sell_count: u64,
    total_count: u64,

    buy_volume: Decimal,
    sell_volume: Decimal,

    total_freq: Decimal,
    buy_freq: Decimal,
    sell_freq: Decimal,

    buy_activity: Decimal,
    sell_activity: Decimal,

    kd_buy: Decimal,
    kd_sell: Decimal,

    last_update: Option<DateTime<Utc>>,

    buy_trades: VecDeque<TradeEvent>,
    sell_trades: VecDeque<TradeEvent>,

    buy_runs: RunList,
    sell_runs: RunList,

    rate_window: RateWindow,
}

impl TradeAggregator {
    pub fn new(symbol: &str, streams: Vec<String>, settings: AggregatorSettings) -> Self {
        let run_capacity = settings.run_history_capacity;
        let window_capacity = settings.rate_window_capacity;
        Self {
            symbol: symbol.to_string(),
            streams,
            settings,
            last_trade_price: Decimal::ZERO,
            buy_count: 0,
            sell_count: 0,
            total_count: 0,
            buy_volume: Decimal::ZERO,
            sell_volume: Decimal::ZERO,
            total_freq: Decimal::ZERO,
            buy_freq: Decimal::ZERO,
            sell_freq: Decimal::ZERO,
            buy_activity: Decimal::ZERO,
            sell_activity: Decimal::ZERO,
            kd_buy: Decimal::ZERO,
            kd_sell: Decimal::ZERO,
            last_update: None,
            buy_trades: VecDeque::new(),
            sell_trades: VecDeque::new(),
            buy_runs: RunList::new(run_capacity),
            sell_runs: RunList::new(run_capacity),
            rate_window: RateWindow::new(RATE_WINDOW_MS, window_capacity),
        }
    }

    /// Apply a trade using the wall clock
    pub fn apply(&mut self, trade: &TradeEvent) -> Option<NotableTrade> {
        self.apply_at(trade, Utc::now())
    }

    /// Apply a trade as of `now`.
    ///
    /// Never fails: a quantity that does not parse, is negative, or would
    /// overflow the side volume drops the trade before any counter moves. A
    /// bad price only skips the last-price update.
    pub fn apply_at(&mut self, trade: &TradeEvent, now: DateTime<Utc>) -> Option<NotableTrade> {
        let quantity = match Decimal::from_str(&trade.quantity) {
            Ok(q) if q >= Decimal::ZERO => q,
            Ok(_) => {
                warn!(trade_id = trade.trade_id, quantity = %trade.quantity, "Negative trade quantity, dropping trade");
                return None;
            }
            Err(e) => {
                warn!(trade_id = trade.trade_id, quantity = %trade.quantity, error = %e, "Invalid trade quantity, dropping trade");
                return None;
            }
        };

        let side = trade.side();
        let volume = match side {
            TradeSide::Buy => self.buy_volume,
            TradeSide::Sell => self.sell_volume,
        };
        let Some(volume) = volume.checked_add(quantity) else {
            warn!(trade_id = trade.trade_id, side = %side, quantity = %trade.quantity, "Side volume overflow, dropping trade");
            return None;
        };

        match Decimal::from_str(&trade.price) {
            Ok(price) if price >= Decimal::ZERO => self.last_trade_price = price,
            Ok(_) => {
                warn!(trade_id = trade.trade_id, price = %trade.price, "Negative trade price");
            }
            Err(e) => {
                warn!(trade_id = trade.trade_id, price = %trade.price, error = %e, "Invalid trade price");
            }
        }

        self.total_count += 1;
        match side {
            TradeSide::Buy => {
                self.buy_count += 1;
                self.buy_volume = volume;
                push_bounded(&mut self.buy_trades, trade.clone(), self.settings.trade_log_capacity);
            }
            TradeSide::Sell => {
                self.sell_count += 1;
                self.sell_volume = volume;
                push_bounded(&mut self.sell_trades, trade.clone(), self.settings.trade_log_capacity);
            }
        }
        self.rate_window.record(trade.trade_time);

        self.recompute_stats();

        let throttle = Duration::seconds(LAST_UPDATE_THROTTLE_SECS);
        if self.last_update.map_or(true, |last| now - last > throttle) {
            self.last_update = Some(now);
        }

        debug!(
            total = self.total_count,
            buy_count = self.buy_count,
            buy_volume = %self.buy_volume,
            sell_count = self.sell_count,
            sell_volume = %self.sell_volume,
            kd_buy = %self.kd_buy,
            kd_sell = %self.kd_sell,
            "Trade applied"
        );

        let min_size = self.settings.min_trade_size;
        let runs = match self.settings.run_targeting.target(side) {
            TradeSide::Buy => &mut self.buy_runs,
            TradeSide::Sell => &mut self.sell_runs,
        };
        let run = runs.absorb(side, quantity, &trade.price, trade.trade_time, min_size)?;

        let quote_value = run.quantity.checked_mul(self.last_trade_price).unwrap_or_else(|| {
            warn!(quantity = %run.quantity, price = %self.last_trade_price, "Quote value out of range, saturating");
            Decimal::MAX
        });

        Some(NotableTrade {
            side: run.side,
            quote_value,
            quantity: run.quantity,
            price: run.price,
            trade_time: run.trade_time,
        })
    }

    fn recompute_stats(&mut self) {
        let divisor = Decimal::from(FREQUENCY_DIVISOR);
        let buy_count = Decimal::from(self.buy_count);
        let sell_count = Decimal::from(self.sell_count);

        self.total_freq = Decimal::from(self.total_count) / divisor;
        self.buy_freq = buy_count / divisor;
        self.sell_freq = sell_count / divisor;

        self.buy_activity = activity(buy_count, self.buy_volume);
        self.sell_activity = activity(sell_count, self.sell_volume);

        self.kd_buy = ratio(buy_count, sell_count);
        self.kd_sell = ratio(sell_count, buy_count);
    }

    /// Copy every published field
    pub fn snapshot(&self) -> TradeSnapshot {
        TradeSnapshot {
            symbol: self.symbol.clone(),
            streams: self.streams.clone(),
            min_trade_size: self.settings.min_trade_size,
            last_trade_price: self.last_trade_price,
            buy_count: self.buy_count,
            sell_count: self.sell_count,
            total_count: self.total_count,
            buy_volume: self.buy_volume,
            sell_volume: self.sell_volume,
            total_freq: self.total_freq,
            buy_freq: self.buy_freq,
            sell_freq: self.sell_freq,
            buy_activity: self.buy_activity,
            sell_activity: self.sell_activity,
            kd_buy: self.kd_buy,
            kd_sell: self.kd_sell,
            last_update: self.last_update,
            trades_last_minute: self.rate_window.count() as u64,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn runs(&self, side: TradeSide) -> &RunList {
        match side {
            TradeSide::Buy => &self.buy_runs,
            TradeSide::Sell => &self.sell_runs,
        }
    }

    /// Raw trades classified on `side`, oldest first
    pub fn trades(&self, side: TradeSide) -> &VecDeque<TradeEvent> {
        match side {
            TradeSide::Buy => &self.buy_trades,
            TradeSide::Sell => &self.sell_trades,
        }
    }
}

fn push_bounded<T>(buf: &mut VecDeque<T>, item: T, capacity: usize) {
    if capacity == 0 {
        return;
    }
    while buf.len() >= capacity {
        buf.pop_front();
    }
    buf.push_back(item);
}
