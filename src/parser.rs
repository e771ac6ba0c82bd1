//! Parser module for Binance combined-stream messages
//!
//! Decodes the `{stream, data}` envelope and the three payload kinds the
//! watcher subscribes to: trades, book tickers and forced liquidations.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::fmt;

use crate::error::{Result, WatcherError};

/// Sub-streams that can be requested for a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    Trade,
    BookTicker,
    ForceOrder,
}

impl StreamKind {
    pub const ALL: [StreamKind; 3] = [StreamKind::Trade, StreamKind::BookTicker, StreamKind::ForceOrder];

    /// Wire suffix used after `<symbol>@`
    pub fn suffix(self) -> &'static str {
        match self {
            StreamKind::Trade => "trade",
            StreamKind::BookTicker => "bookTicker",
            StreamKind::ForceOrder => "forceOrder",
        }
    }

    /// Full stream name, e.g. `btcusdt@trade`
    pub fn stream_name(self, symbol: &str) -> String {
        format!("{}@{}", symbol, self.suffix())
    }

    /// Resolve a stream tag for the given symbol.
    ///
    /// Tags for any other symbol resolve to `None`.
    pub fn from_stream(tag: &str, symbol: &str) -> Option<Self> {
        let suffix = tag.strip_prefix(symbol)?.strip_prefix('@')?;
        Self::ALL.into_iter().find(|kind| kind.suffix() == suffix)
    }

    /// Parse the short names accepted by the configuration surface
    pub fn from_config_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "trade" => Some(StreamKind::Trade),
            "orderbook" | "bookticker" => Some(StreamKind::BookTicker),
            "forceorder" | "liquidation" => Some(StreamKind::ForceOrder),
            _ => None,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Combined stream message wrapper
#[derive(Debug, Deserialize)]
pub struct StreamEnvelope {
    /// Stream name
    pub stream: String,

    /// Undecoded payload
    pub data: Box<RawValue>,
}

/// Binance futures trade message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Event type
    #[serde(rename = "e")]
    pub event_type: String,

    /// Event time
    #[serde(rename = "E")]
    pub event_time: i64,

    /// Trade time
    #[serde(rename = "T")]
    pub trade_time: i64,

    /// Trade ID
    #[serde(rename = "t")]
    pub trade_id: i64,

    /// Symbol
    #[serde(rename = "s")]
    pub symbol: String,

    /// Price as sent by the venue
    #[serde(rename = "p")]
    pub price: String,

    /// Quantity as sent by the venue
    #[serde(rename = "q")]
    pub quantity: String,

    /// Is buyer maker
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
}

impl TradeEvent {
    pub fn side(&self) -> TradeSide {
        TradeSide::from_buyer_maker(self.is_buyer_maker)
    }
}

/// Top-of-book quote
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteEvent {
    #[serde(rename = "e")]
    pub event_type: String,

    #[serde(rename = "E")]
    pub event_time: i64,

    /// Transaction time
    #[serde(rename = "T")]
    pub transaction_time: i64,

    #[serde(rename = "u")]
    pub update_id: i64,

    #[serde(rename = "s")]
    pub symbol: String,

    #[serde(rename = "b")]
    pub bid_price: String,

    #[serde(rename = "B")]
    pub bid_qty: String,

    #[serde(rename = "a")]
    pub ask_price: String,

    #[serde(rename = "A")]
    pub ask_qty: String,
}

/// Forced liquidation order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationEvent {
    #[serde(rename = "e")]
    pub event_type: String,

    #[serde(rename = "E")]
    pub event_time: i64,

    #[serde(rename = "o")]
    pub order: LiquidationOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationOrder {
    #[serde(rename = "p")]
    pub price: String,

    #[serde(rename = "q")]
    pub quantity: String,

    /// `BUY` or `SELL`
    #[serde(rename = "S")]
    pub side: String,
}

/// Aggressor side of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// A maker buyer means the seller crossed the spread.
    pub fn from_buyer_maker(is_buyer_maker: bool) -> Self {
        if is_buyer_maker {
            TradeSide::Sell
        } else {
            TradeSide::Buy
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            TradeSide::Buy => TradeSide::Sell,
            TradeSide::Sell => TradeSide::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded feed message, one variant per subscribed stream kind
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Trade(TradeEvent),
    Quote(QuoteEvent),
    Liquidation(LiquidationEvent),
}

impl FeedEvent {
    /// Parse a raw combined-stream frame for `symbol`
    pub fn parse(raw: &str, symbol: &str) -> Result<Self> {
        let envelope: StreamEnvelope = serde_json::from_str(raw)
            .map_err(|e| WatcherError::MalformedEnvelope(e.to_string()))?;

        let kind = StreamKind::from_stream(&envelope.stream, symbol)
            .ok_or_else(|| WatcherError::UnknownStream(envelope.stream.clone()))?;

        Self::decode(kind, &envelope)
    }

    fn decode(kind: StreamKind, envelope: &StreamEnvelope) -> Result<Self> {
        let payload = envelope.data.get();
        let malformed = |e: serde_json::Error| WatcherError::MalformedPayload {
            stream: envelope.stream.clone(),
            reason: e.to_string(),
        };

        match kind {
            StreamKind::Trade => serde_json::from_str(payload).map(FeedEvent::Trade).map_err(malformed),
            StreamKind::BookTicker => serde_json::from_str(payload).map(FeedEvent::Quote).map_err(malformed),
            StreamKind::ForceOrder => serde_json::from_str(payload)
                .map(FeedEvent::Liquidation)
                .map_err(malformed),
        }
    }

    pub fn kind(&self) -> StreamKind {
        match self {
            FeedEvent::Trade(_) => StreamKind::Trade,
            FeedEvent::Quote(_) => StreamKind::BookTicker,
            FeedEvent::Liquidation(_) => StreamKind::ForceOrder,
        }
    }
}
