//! Upstream feed: connection management and message dispatch

mod client;
mod dispatch;
mod manager;

pub use client::FeedClient;
pub use dispatch::Dispatcher;
pub use manager::{backoff_delay, FeedManager};
