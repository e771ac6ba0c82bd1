//! Passive event surfacer
//!
//! Book tickers and liquidations are shown, never aggregated.

use tracing::info;

use crate::metrics::Metrics;
use crate::parser::{LiquidationEvent, QuoteEvent};

#[derive(Clone)]
pub struct PassiveSurfacer {
    metrics: Metrics,
}

impl PassiveSurfacer {
    pub fn new(metrics: Metrics) -> Self {
        Self { metrics }
    }

    pub fn surface_quote(&self, quote: &QuoteEvent) {
        self.metrics.quotes_surfaced.inc();
        info!(
            symbol = %quote.symbol,
            bid = %quote.bid_price,
            bid_qty = %quote.bid_qty,
            ask = %quote.ask_price,
            ask_qty = %quote.ask_qty,
            "[OrderBook]"
        );
    }

    pub fn surface_liquidation(&self, liquidation: &LiquidationEvent) {
        self.metrics.liquidations_surfaced.inc();
        info!(
            price = %liquidation.order.price,
            quantity = %liquidation.order.quantity,
            side = %liquidation.order.side,
            event_time = liquidation.event_time,
            "[Liquidation]"
        );
    }
}
