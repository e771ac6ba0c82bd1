//! WebSocket client for the Binance combined stream
//!
//! Handles connection, message reception and the closing handshake.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::error::{Result, WatcherError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client for a single upstream connection
pub struct FeedClient {
    stream: Option<WsStream>,
    endpoint: String,
    streams: Vec<String>,
}

impl FeedClient {
    /// Create a new client for the given stream names
    pub fn new(endpoint: &str, streams: Vec<String>) -> Self {
        Self {
            stream: None,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            streams,
        }
    }

    /// Combined-stream URL, e.g. `wss://host/stream?streams=a@trade/a@bookTicker`
    pub fn url(&self) -> String {
        format!("{}/stream?streams={}", self.endpoint, self.streams.join("/"))
    }

    /// Connect to the WebSocket endpoint
    pub async fn connect(&mut self) -> Result<()> {
        let url = self.url();
        info!(url = %url, "Connecting to Binance WebSocket");

        let (ws_stream, response) = connect_async(&url).await.map_err(|e| {
            WatcherError::WebSocketConnection(format!("Failed to connect: {}", e))
        })?;

        info!(status = ?response.status(), "Connection successfully established");
        self.stream = Some(ws_stream);

        Ok(())
    }

    /// Receive the next data frame; `None` for control frames
    pub async fn recv(&mut self) -> Result<Option<String>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| WatcherError::WebSocketConnection("Not connected".to_string()))?;

        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                debug!(len = text.len(), "Received text message");
                Ok(Some(text))
            }
            Some(Ok(Message::Binary(data))) => {
                debug!(len = data.len(), "Received binary message");
                Ok(Some(String::from_utf8_lossy(&data).into_owned()))
            }
            Some(Ok(Message::Ping(data))) => {
                debug!("Received ping, sending pong");
                if let Err(e) = stream.send(Message::Pong(data)).await {
                    warn!(error = %e, "Failed to answer ping");
                }
                Ok(None)
            }
            Some(Ok(Message::Pong(_))) => {
                debug!("Received pong");
                Ok(None)
            }
            Some(Ok(Message::Close(frame))) => {
                warn!(frame = ?frame, "Received close frame");
                self.stream = None;
                Err(WatcherError::WebSocketConnection("Connection closed".to_string()))
            }
            Some(Ok(Message::Frame(_))) => Ok(None),
            Some(Err(e)) => {
                error!(error = %e, "Read error");
                self.stream = None;
                Err(WatcherError::WebSocketMessage(e.to_string()))
            }
            None => {
                warn!("WebSocket stream ended");
                self.stream = None;
                Err(WatcherError::WebSocketConnection("Stream ended".to_string()))
            }
        }
    }

    /// Send a ping to keep the connection alive
    pub async fn ping(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.as_mut() {
            stream
                .send(Message::Ping(vec![]))
                .await
                .map_err(|e| WatcherError::WebSocketMessage(e.to_string()))?;
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Start the closing handshake with a normal-closure frame
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: "".into(),
            };
            if let Err(e) = stream.close(Some(frame)).await {
                debug!(error = %e, "Close handshake failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_stream_url() {
        let client = FeedClient::new(
            "wss://fstream.binance.com/",
            vec!["btcusdt@trade".to_string(), "btcusdt@forceOrder".to_string()],
        );
        assert_eq!(
            client.url(),
            "wss://fstream.binance.com/stream?streams=btcusdt@trade/btcusdt@forceOrder"
        );
        assert!(!client.is_connected());
    }
}
