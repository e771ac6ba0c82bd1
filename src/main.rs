//! Trade Watcher
//!
//! Connects to the Binance futures combined stream, aggregates the trade
//! flow, and pushes a snapshot of it to local WebSocket subscribers.

use std::env;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trade_watcher::{server, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    init_tracing(config.verbose);

    info!("Starting Trade Watcher");
    info!(
        symbol = %config.symbol,
        streams = ?config.stream_names(),
        listen_addr = %config.listen_addr,
        "Configuration loaded"
    );

    let state = Arc::new(AppState::new(config)?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server_state = state.clone();
    let server_shutdown = shutdown_rx.clone();
    let server_task = tokio::spawn(async move { server::serve(server_state, server_shutdown).await });

    let publisher = state.publisher();
    let publisher_shutdown = shutdown_rx.clone();
    tokio::spawn(async move { publisher.run(publisher_shutdown).await });

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, shutting down"),
            Err(e) => warn!(error = %e, "Failed to listen for interrupt, shutting down"),
        }
        let _ = shutdown_tx.send(true);
    });

    let mut feed = state.feed_manager();
    tokio::select! {
        result = feed.run(shutdown_rx) => result?,
        served = server_task => {
            // The endpoint only stops early when it could not listen
            match served {
                Ok(Err(e)) => {
                    error!(error = %e, "Publish endpoint failed");
                    return Err(e.into());
                }
                Ok(Ok(())) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    info!("Trade Watcher stopped");
    Ok(())
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` when verbose.
/// `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let json = env::var("LOG_FORMAT").map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false);
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
