//! Error types for the trade watcher

use thiserror::Error;

/// Trade watcher errors
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("WebSocket message error: {0}")]
    WebSocketMessage(String),

    #[error("Malformed stream envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Unhandled stream: {0}")]
    UnknownStream(String),

    #[error("Malformed {stream} payload: {reason}")]
    MalformedPayload { stream: String, reason: String },

    #[error("Publish endpoint error: {0}")]
    EndpointError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("Connection timeout")]
    ConnectionTimeout,
}

impl From<tokio_tungstenite::tungstenite::Error> for WatcherError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        WatcherError::WebSocketConnection(err.to_string())
    }
}

impl From<serde_json::Error> for WatcherError {
    fn from(err: serde_json::Error) -> Self {
        WatcherError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for WatcherError {
    fn from(err: std::io::Error) -> Self {
        WatcherError::EndpointError(err.to_string())
    }
}

impl From<prometheus::Error> for WatcherError {
    fn from(err: prometheus::Error) -> Self {
        WatcherError::MetricsError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WatcherError>;
