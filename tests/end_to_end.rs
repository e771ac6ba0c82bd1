//! Feed-to-subscriber flow tests

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rust_decimal_macros::dec;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use trade_watcher::{server, AppState, Config, RunTargeting, TradeSide};

fn trade_frame(quantity: &str, trade_time: i64, is_buyer_maker: bool) -> String {
    format!(
        r#"{{"stream":"btcusdt@trade","data":{{"e":"trade","E":{},"T":{},"t":{},"s":"BTCUSDT","p":"30000","q":"{}","m":{}}}}}"#,
        trade_time + 1,
        trade_time,
        trade_time,
        quantity,
        is_buyer_maker
    )
}

/// (sell 0.05 @100), (sell 0.08 @100), (buy 0.20 @105)
fn scenario() -> Vec<String> {
    vec![
        trade_frame("0.05", 100, true),
        trade_frame("0.08", 100, true),
        trade_frame("0.20", 105, false),
    ]
}

fn state(run_targeting: RunTargeting) -> AppState {
    AppState::new(Config {
        run_targeting,
        ..Default::default()
    })
    .unwrap()
}

async fn wait_for<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn scenario_with_opposite_side_targeting() {
    let state = state(RunTargeting::Opposite);
    let dispatcher = state.dispatcher();

    let mut notable = Vec::new();
    for frame in scenario() {
        notable.push(dispatcher.dispatch(&frame).await);
    }

    // the second sell completes the merged run, the buy starts its own
    assert!(notable[0].is_none());
    assert_eq!(notable[1].as_ref().map(|n| n.quantity), Some(dec!(0.13)));
    assert_eq!(notable[2].as_ref().map(|n| n.side), Some(TradeSide::Buy));

    let aggregator = state.aggregator.read().await;
    let snap = aggregator.snapshot();
    assert_eq!(snap.total_count, 3);
    assert_eq!(snap.sell_count, 2);
    assert_eq!(snap.sell_volume, dec!(0.13));
    assert_eq!(snap.buy_count, 1);
    assert_eq!(snap.buy_volume, dec!(0.20));

    let buy_runs = aggregator.runs(TradeSide::Buy);
    assert_eq!(buy_runs.len(), 1);
    assert_eq!(buy_runs.head().unwrap().quantity, dec!(0.13));
    assert_eq!(buy_runs.head().unwrap().side, TradeSide::Sell);

    let sell_runs = aggregator.runs(TradeSide::Sell);
    assert_eq!(sell_runs.len(), 1);
    assert_eq!(sell_runs.head().unwrap().quantity, dec!(0.20));
    assert_eq!(state.metrics.notable_trades.get(), 2);
}

#[tokio::test]
async fn scenario_with_same_side_targeting() {
    let state = state(RunTargeting::Same);
    let dispatcher = state.dispatcher();

    let mut fired = 0;
    for frame in scenario() {
        if dispatcher.dispatch(&frame).await.is_some() {
            fired += 1;
        }
    }
    assert_eq!(fired, 2);

    let aggregator = state.aggregator.read().await;
    assert_eq!(aggregator.runs(TradeSide::Sell).head().unwrap().quantity, dec!(0.13));
    assert_eq!(aggregator.runs(TradeSide::Buy).head().unwrap().quantity, dec!(0.20));
    assert_eq!(aggregator.snapshot().total_count, 3);
}

#[tokio::test]
async fn subscriber_receives_snapshots_and_is_pruned_on_disconnect() {
    let state = Arc::new(state(RunTargeting::Opposite));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_state = state.clone();
    let server = tokio::spawn(async move { server::serve_listener(listener, server_state, shutdown_rx).await });

    let (mut client, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    let registry = state.registry.clone();
    wait_for(|| {
        let registry = registry.clone();
        async move { registry.len().await == 1 }
    })
    .await;

    let dispatcher = state.dispatcher();
    for frame in scenario() {
        dispatcher.dispatch(&frame).await;
    }

    let publisher = state.publisher();
    let report = publisher.publish_once().await.unwrap();
    assert_eq!(report.delivered, 1);

    let text = match client.next().await {
        Some(Ok(Message::Text(text))) => text,
        other => panic!("expected a text snapshot, got {:?}", other),
    };
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["Symbol"], "btcusdt");
    assert_eq!(value["TotalCount"], 3);
    assert_eq!(value["SellCount"], 2);
    assert_eq!(value["MinTradeSize"].as_f64(), Some(0.11));

    client.close(None).await.unwrap();
    wait_for(|| {
        let registry = registry.clone();
        async move { registry.is_empty().await }
    })
    .await;

    let report = publisher.publish_once().await.unwrap();
    assert_eq!(report.delivered, 0);

    shutdown_tx.send(true).unwrap();
    drop(server);
}

#[tokio::test]
async fn health_reports_subscribers() {
    let state = Arc::new(state(RunTargeting::Opposite));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(server::serve_listener(listener, state.clone(), shutdown_rx));

    let (mut client, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    let registry = state.registry.clone();
    wait_for(|| {
        let registry = registry.clone();
        async move { registry.len().await == 1 }
    })
    .await;

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let request = format!("GET /health HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n", addr);
    tokio::io::AsyncWriteExt::write_all(&mut stream, request.as_bytes()).await.unwrap();
    let mut response = String::new();
    tokio::io::AsyncReadExt::read_to_string(&mut stream, &mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("\"subscribers\":1"));

    client.send(Message::Close(None)).await.unwrap();
    shutdown_tx.send(true).unwrap();
    drop(server);
}
