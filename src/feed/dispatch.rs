//! Routes decoded feed events to the aggregator or the surfacer

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::aggregator::{NotableTrade, TradeAggregator};
use crate::error::WatcherError;
use crate::metrics::Metrics;
use crate::parser::FeedEvent;
use crate::surfacer::PassiveSurfacer;

#[derive(Clone)]
pub struct Dispatcher {
    symbol: String,
    aggregator: Arc<RwLock<TradeAggregator>>,
    surfacer: PassiveSurfacer,
    metrics: Metrics,
    verbose: bool,
}

impl Dispatcher {
    pub fn new(
        symbol: &str,
        aggregator: Arc<RwLock<TradeAggregator>>,
        metrics: Metrics,
        verbose: bool,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            aggregator,
            surfacer: PassiveSurfacer::new(metrics.clone()),
            metrics,
            verbose,
        }
    }

    /// Handle one raw frame. Bad frames are logged and dropped.
    pub async fn dispatch(&self, raw: &str) -> Option<NotableTrade> {
        self.metrics.frames_received.inc();
        if self.verbose {
            debug!(size = raw.len(), content = %raw, "Message received");
        }

        let event = match FeedEvent::parse(raw, &self.symbol) {
            Ok(event) => event,
            Err(e) => {
                self.record_drop(&e);
                return None;
            }
        };
        if self.verbose {
            debug!(kind = %event.kind(), "Event decoded");
        }

        match event {
            FeedEvent::Trade(trade) => {
                let notable = {
                    let mut aggregator = self.aggregator.write().await;
                    aggregator.apply(&trade)
                };
                self.metrics.trades_applied.inc();

                if let Some(notable) = &notable {
                    self.metrics.notable_trades.inc();
                    info!(
                        side = %notable.side,
                        quantity = %notable.quantity,
                        quote_value = %notable.quote_value.round_dp(2),
                        "Beep: new aggregated trade"
                    );
                }
                notable
            }
            FeedEvent::Quote(quote) => {
                self.surfacer.surface_quote(&quote);
                None
            }
            FeedEvent::Liquidation(liquidation) => {
                self.surfacer.surface_liquidation(&liquidation);
                None
            }
        }
    }

    fn record_drop(&self, err: &WatcherError) {
        let reason = match err {
            WatcherError::UnknownStream(stream) => {
                info!(stream = %stream, "Unhandled stream");
                "unknown_stream"
            }
            WatcherError::MalformedEnvelope(_) => {
                warn!(error = %err, "Error decoding combined message");
                "malformed_envelope"
            }
            _ => {
                warn!(error = %err, "Error decoding payload");
                "malformed_payload"
            }
        };
        self.metrics.messages_dropped.with_label_values(&[reason]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregatorSettings;
    use crate::parser::TradeSide;

    fn dispatcher() -> (Dispatcher, Arc<RwLock<TradeAggregator>>, Metrics) {
        let metrics = Metrics::new().unwrap();
        let aggregator = Arc::new(RwLock::new(TradeAggregator::new(
            "btcusdt",
            vec![],
            AggregatorSettings::default(),
        )));
        (
            Dispatcher::new("btcusdt", aggregator.clone(), metrics.clone(), false),
            aggregator,
            metrics,
        )
    }

    fn trade_frame(stream: &str, quantity: &str, buyer_maker: bool) -> String {
        format!(
            r#"{{"stream":"{}","data":{{"e":"trade","E":2,"T":1,"t":9,"s":"BTCUSDT","p":"30000","q":"{}","m":{}}}}}"#,
            stream, quantity, buyer_maker
        )
    }

    #[tokio::test]
    async fn test_trade_reaches_aggregator() {
        let (dispatcher, aggregator, metrics) = dispatcher();
        let notable = dispatcher.dispatch(&trade_frame("btcusdt@trade", "1.5", false)).await;

        let notable = notable.expect("1.5 is above the notable size");
        assert_eq!(notable.side, TradeSide::Buy);
        assert_eq!(aggregator.read().await.snapshot().buy_count, 1);
        assert_eq!(metrics.trades_applied.get(), 1);
        assert_eq!(metrics.notable_trades.get(), 1);
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_frames_leave_state_untouched() {
        let (dispatcher, aggregator, metrics) = dispatcher();
        dispatcher.dispatch(&trade_frame("ethusdt@trade", "1.0", false)).await;
        dispatcher.dispatch("not json").await;
        dispatcher.dispatch(r#"{"stream":"btcusdt@trade","data":{"p":"1"}}"#).await;

        assert_eq!(aggregator.read().await.snapshot().total_count, 0);
        assert_eq!(metrics.frames_received.get(), 3);
        assert_eq!(metrics.messages_dropped.with_label_values(&["unknown_stream"]).get(), 1);
        assert_eq!(metrics.messages_dropped.with_label_values(&["malformed_envelope"]).get(), 1);
        assert_eq!(metrics.messages_dropped.with_label_values(&["malformed_payload"]).get(), 1);
    }

    #[test]
    fn test_unusable_quantities_are_dropped() {
        let (dispatcher, aggregator, _) = dispatcher();
        tokio_test::block_on(async {
            for quantity in ["-1", "", "79228162514264337593543950336"] {
                assert!(dispatcher.dispatch(&trade_frame("btcusdt@trade", quantity, true)).await.is_none());
            }
            let snap = aggregator.read().await.snapshot();
            assert_eq!(snap.total_count, 0);
            assert_eq!(snap.sell_volume, rust_decimal::Decimal::ZERO);
        });
    }

    #[tokio::test]
    async fn test_passive_events_are_surfaced_only() {
        let (dispatcher, aggregator, metrics) = dispatcher();
        let quote = r#"{"stream":"btcusdt@bookTicker","data":{"e":"bookTicker","u":1,"E":2,"T":3,"s":"BTCUSDT","b":"1","B":"2","a":"3","A":"4"}}"#;
        let liquidation = r#"{"stream":"btcusdt@forceOrder","data":{"e":"forceOrder","E":2,"o":{"p":"9910","q":"0.014","S":"SELL"}}}"#;

        assert!(dispatcher.dispatch(quote).await.is_none());
        assert!(dispatcher.dispatch(liquidation).await.is_none());

        assert_eq!(metrics.quotes_surfaced.get(), 1);
        assert_eq!(metrics.liquidations_surfaced.get(), 1);
        assert_eq!(aggregator.read().await.snapshot().total_count, 0);
    }
}
