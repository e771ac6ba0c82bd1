//! Point-in-time copy of the rolling statistics
//!
//! Key casing matches what existing dashboards already consume.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Snapshot published to subscribers once per tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TradeSnapshot {
    pub symbol: String,
    pub streams: Vec<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub min_trade_size: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub last_trade_price: Decimal,

    pub buy_count: u64,
    pub sell_count: u64,
    pub total_count: u64,

    #[serde(with = "rust_decimal::serde::float")]
    pub buy_volume: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub sell_volume: Decimal,

    #[serde(with = "rust_decimal::serde::float")]
    pub total_freq: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub buy_freq: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub sell_freq: Decimal,

    #[serde(with = "rust_decimal::serde::float")]
    pub buy_activity: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub sell_activity: Decimal,

    #[serde(with = "rust_decimal::serde::float")]
    pub kd_buy: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub kd_sell: Decimal,

    pub last_update: Option<DateTime<Utc>>,

    /// Trades within the last minute of venue trade time, capped at the
    /// configured rate window capacity
    pub trades_last_minute: u64,
}

impl TradeSnapshot {
    /// Serialize once for every subscriber of a tick
    pub fn to_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_payload_keys_and_number_encoding() {
        let snapshot = TradeSnapshot {
            symbol: "btcusdt".to_string(),
            streams: vec!["btcusdt@trade".to_string()],
            min_trade_size: dec!(0.11),
            last_trade_price: dec!(50000.5),
            buy_count: 1,
            sell_count: 2,
            total_count: 3,
            buy_volume: dec!(0.2),
            sell_volume: dec!(0.13),
            total_freq: dec!(0.05),
            buy_freq: dec!(0),
            sell_freq: dec!(0),
            buy_activity: dec!(0),
            sell_activity: dec!(0),
            kd_buy: dec!(0.5),
            kd_sell: dec!(2),
            last_update: None,
            trades_last_minute: 3,
        };

        let value: serde_json::Value = serde_json::from_str(&snapshot.to_payload().unwrap()).unwrap();
        assert_eq!(value["Symbol"], "btcusdt");
        assert_eq!(value["TotalCount"], 3);
        assert_eq!(value["MinTradeSize"].as_f64(), Some(0.11));
        assert_eq!(value["KdSell"].as_f64(), Some(2.0));
        assert!(value["LastUpdate"].is_null());
        assert_eq!(value["TradesLastMinute"], 3);
    }
}
