//! Same-side run merging
//!
//! A run collects consecutive trades that share a trade time and aggressor
//! side. Only the head of a list is ever extended.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::VecDeque;

use crate::parser::TradeSide;

/// A merged run of same-time, same-side trades
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedRun {
    pub side: TradeSide,
    pub quantity: Decimal,
    /// Price of the latest trade merged into the run
    pub price: String,
    pub trade_time: i64,
}

impl AggregatedRun {
    fn continues(&self, side: TradeSide, trade_time: i64) -> bool {
        self.side == side && self.trade_time == trade_time
    }

    fn extend(&mut self, quantity: Decimal, price: &str) {
        self.quantity = self.quantity.saturating_add(quantity);
        self.price = price.to_string();
    }
}

/// Runs for one target side, newest first
#[derive(Debug, Clone)]
pub struct RunList {
    runs: VecDeque<AggregatedRun>,
    /// Sub-threshold run waiting for more same-time volume
    pending: Option<AggregatedRun>,
    capacity: usize,
}

impl RunList {
    pub fn new(capacity: usize) -> Self {
        Self {
            runs: VecDeque::new(),
            pending: None,
            capacity: capacity.max(1),
        }
    }

    /// Fold one trade into the list.
    ///
    /// Returns the run that just became the new head, if any. Extending an
    /// existing head never returns a run.
    pub fn absorb(
        &mut self,
        side: TradeSide,
        quantity: Decimal,
        price: &str,
        trade_time: i64,
        min_size: Decimal,
    ) -> Option<AggregatedRun> {
        if let Some(head) = self.runs.front_mut() {
            if head.continues(side, trade_time) {
                head.extend(quantity, price);
                return None;
            }
        }

        let candidate = match self.pending.take() {
            Some(mut pending) if pending.continues(side, trade_time) => {
                pending.extend(quantity, price);
                pending
            }
            _ => AggregatedRun {
                side,
                quantity,
                price: price.to_string(),
                trade_time,
            },
        };

        if candidate.quantity >= min_size {
            self.push_head(candidate.clone());
            Some(candidate)
        } else {
            self.pending = Some(candidate);
            None
        }
    }

    fn push_head(&mut self, run: AggregatedRun) {
        self.runs.push_front(run);
        self.runs.truncate(self.capacity);
    }

    pub fn head(&self) -> Option<&AggregatedRun> {
        self.runs.front()
    }

    pub fn pending(&self) -> Option<&AggregatedRun> {
        self.pending.as_ref()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AggregatedRun> {
        self.runs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn min() -> Decimal {
        dec!(0.11)
    }

    #[test]
    fn test_notable_trade_starts_run() {
        let mut list = RunList::new(10);
        let run = list.absorb(TradeSide::Buy, dec!(0.5), "100", 1, min()).unwrap();
        assert_eq!(run.quantity, dec!(0.5));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_small_trade_is_not_listed() {
        let mut list = RunList::new(10);
        assert!(list.absorb(TradeSide::Buy, dec!(0.1), "100", 1, min()).is_none());
        assert!(list.is_empty());
        assert_eq!(list.pending().map(|p| p.quantity), Some(dec!(0.1)));
    }

    #[test]
    fn test_head_extends_in_place() {
        let mut list = RunList::new(10);
        list.absorb(TradeSide::Sell, dec!(0.2), "100", 7, min());
        assert!(list.absorb(TradeSide::Sell, dec!(0.01), "101", 7, min()).is_none());

        assert_eq!(list.len(), 1);
        let head = list.head().unwrap();
        assert_eq!(head.quantity, dec!(0.21));
        assert_eq!(head.price, "101");
    }

    #[test]
    fn test_pending_promoted_once_threshold_reached() {
        let mut list = RunList::new(10);
        assert!(list.absorb(TradeSide::Sell, dec!(0.05), "100", 3, min()).is_none());
        let run = list.absorb(TradeSide::Sell, dec!(0.08), "99", 3, min()).unwrap();

        assert_eq!(run.quantity, dec!(0.13));
        assert_eq!(list.len(), 1);
        assert!(list.pending().is_none());
    }

    #[test]
    fn test_pending_discarded_on_break() {
        let mut list = RunList::new(10);
        list.absorb(TradeSide::Sell, dec!(0.05), "100", 3, min());
        assert!(list.absorb(TradeSide::Sell, dec!(0.08), "100", 4, min()).is_none());
        assert_eq!(list.pending().map(|p| p.quantity), Some(dec!(0.08)));
    }

    #[test]
    fn test_side_change_breaks_run() {
        let mut list = RunList::new(10);
        list.absorb(TradeSide::Buy, dec!(0.2), "100", 5, min());
        assert!(list.absorb(TradeSide::Sell, dec!(0.3), "100", 5, min()).is_some());
        assert_eq!(list.len(), 2);
        assert_eq!(list.head().unwrap().side, TradeSide::Sell);
    }

    #[test]
    fn test_merge_saturates_at_decimal_max() {
        let mut list = RunList::new(10);
        list.absorb(TradeSide::Buy, Decimal::MAX, "100", 1, min());
        assert!(list.absorb(TradeSide::Buy, dec!(1), "100", 1, min()).is_none());
        assert_eq!(list.head().unwrap().quantity, Decimal::MAX);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut list = RunList::new(2);
        for t in 0..3 {
            list.absorb(TradeSide::Buy, dec!(1), "100", t, min());
        }
        let times: Vec<i64> = list.iter().map(|r| r.trade_time).collect();
        assert_eq!(times, vec![2, 1]);
    }
}
