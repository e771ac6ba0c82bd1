//! Upstream connection manager
//!
//! Handles reconnection with backoff, the reader loop and graceful close.

use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use super::{Dispatcher, FeedClient};
use crate::error::{Result, WatcherError};
use crate::metrics::Metrics;

/// Maximum backoff delay in milliseconds (60 seconds)
const MAX_BACKOFF_MS: u64 = 60_000;
/// Silence after which a keepalive ping is sent
const KEEPALIVE_AFTER: Duration = Duration::from_secs(30);
/// Receive timeout used to detect stale connections
const RECV_TIMEOUT: Duration = Duration::from_secs(45);

/// Backoff delay before reconnect attempt `attempt` (1-based)
pub fn backoff_delay(base_delay_ms: u64, attempt: u32) -> Duration {
    let delay = base_delay_ms.saturating_mul(2u64.pow(attempt.min(6)));
    Duration::from_millis(delay.min(MAX_BACKOFF_MS))
}

/// Keeps the feed connected and pumps frames into the dispatcher
pub struct FeedManager {
    client: FeedClient,
    dispatcher: Dispatcher,
    metrics: Metrics,
    reconnect_delay_ms: u64,
    shutdown_grace: Duration,
    reconnect_attempts: u32,
}

impl FeedManager {
    pub fn new(
        client: FeedClient,
        dispatcher: Dispatcher,
        metrics: Metrics,
        reconnect_delay_ms: u64,
        shutdown_grace: Duration,
    ) -> Self {
        Self {
            client,
            dispatcher,
            metrics,
            reconnect_delay_ms,
            shutdown_grace,
            reconnect_attempts: 0,
        }
    }

    /// Run until shutdown, reconnecting on every transport failure
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("Starting feed manager");

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            match self.connect_and_process(&mut shutdown).await {
                Ok(()) => {
                    info!("Interrupting connection...");
                    self.client.close().await;
                    sleep(self.shutdown_grace).await;
                    return Ok(());
                }
                Err(e) => {
                    error!(error = %e, "Feed connection error");
                    self.reconnect_attempts += 1;
                    self.metrics.upstream_reconnects.inc();

                    let delay = backoff_delay(self.reconnect_delay_ms, self.reconnect_attempts);
                    warn!(
                        attempt = self.reconnect_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Reconnecting after error..."
                    );

                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = shutdown.changed() => return Ok(()),
                    }
                }
            }
        }
    }

    /// Returns `Ok` only once shutdown has been signalled
    async fn connect_and_process(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<()> {
        tokio::select! {
            connected = self.client.connect() => connected?,
            _ = shutdown.changed() => return Ok(()),
        }

        self.reconnect_attempts = 0;

        let mut last_message = Instant::now();

        loop {
            let received = tokio::select! {
                received = timeout(RECV_TIMEOUT, self.client.recv()) => received,
                _ = shutdown.changed() => return Ok(()),
            };

            match received {
                Ok(Ok(Some(text))) => {
                    last_message = Instant::now();
                    self.dispatcher.dispatch(&text).await;
                }
                Ok(Ok(None)) => {
                    if last_message.elapsed() > KEEPALIVE_AFTER {
                        if let Err(e) = self.client.ping().await {
                            warn!(error = %e, "Failed to send keepalive ping");
                        }
                    }
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    warn!(
                        last_message_secs = last_message.elapsed().as_secs(),
                        "No message received within timeout, sending keepalive"
                    );
                    if let Err(e) = self.client.ping().await {
                        warn!(error = %e, "Failed to send keepalive ping, reconnecting");
                        return Err(WatcherError::ConnectionTimeout);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        assert_eq!(backoff_delay(1000, 1), Duration::from_millis(2000));
        assert_eq!(backoff_delay(1000, 3), Duration::from_millis(8000));
        assert_eq!(backoff_delay(1000, 6), Duration::from_millis(60_000));
        assert_eq!(backoff_delay(1000, 40), Duration::from_millis(60_000));
        assert_eq!(backoff_delay(100, 2), Duration::from_millis(400));
    }
}
