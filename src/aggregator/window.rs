//! Rolling trade-rate window keyed on venue trade time

use std::collections::VecDeque;

/// Trade timestamps seen within the last `duration_ms`
#[derive(Debug, Clone)]
pub struct RateWindow {
    duration_ms: i64,
    max_capacity: usize,
    times: VecDeque<i64>,
    newest: i64,
}

impl RateWindow {
    pub fn new(duration_ms: i64, max_capacity: usize) -> Self {
        Self {
            duration_ms,
            max_capacity: max_capacity.max(1),
            times: VecDeque::new(),
            newest: i64::MIN,
        }
    }

    /// Record a trade time and drop everything older than the window
    pub fn record(&mut self, trade_time: i64) {
        if self.times.len() >= self.max_capacity {
            self.times.pop_front();
        }
        self.times.push_back(trade_time);
        self.newest = self.newest.max(trade_time);

        let cutoff = self.newest.saturating_sub(self.duration_ms);
        while let Some(ts) = self.times.front() {
            if *ts < cutoff {
                self.times.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn count(&self) -> usize {
        self.times.len()
    }
}
