//! Resilient event channel over WebSocket
//!
//! This crate keeps one logical channel to a message-socket server alive
//! across transport failures. Consumers send named events (optionally
//! expecting a reply) and listen for named events without managing the raw
//! connection.
//!
//! # Core Features
//!
//! - **Event Registry**: named listeners, an `"all"` wildcard, precise removal
//! - **Request-Reply**: correlation ids pair each reply with its callback
//! - **Reconnection**: single-flight sequences with capped exponential backoff
//! - **Pluggable Transport**: WebSocket by default, any [`Connector`] otherwise
//! - **Observability**: `tracing` logs and OpenTelemetry metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use resock_client::{Channel, Listener};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let channel = Channel::connect("ws://localhost:8080")?;
//!
//!     channel.on("chat", Listener::new(|_ctx, args| println!("chat: {:?}", args)), None)?;
//!     channel.on("disconnect", {
//!         let channel = channel.clone();
//!         Listener::new(move |_, _| {
//!             let _ = channel.reconnect();
//!         })
//!     }, None)?;
//!
//!     channel.emit("join", json!({"room": "lobby"}))?;
//!
//!     let members: Vec<String> = channel.request("members", json!({"room": "lobby"})).await?;
//!     println!("members: {:?}", members);
//!
//!     channel.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # With Automatic Reconnection
//!
//! ```rust,no_run
//! use resock_client::{ChannelBuilder, ExponentialBackoff};
//! use std::time::Duration;
//!
//! # async fn example() -> resock_core::Result<()> {
//! let channel = ChannelBuilder::new("ws://localhost:8080")
//!     .with_reconnect(Box::new(
//!         ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(30))
//!             .unlimited()
//!             .with_jitter(),
//!     ))
//!     .auto_reconnect(true)
//!     .connect()?;
//! # Ok(())
//! # }
//! ```

mod channel;
mod channel_builder;
mod connection_state;
mod events;
mod metrics;
mod reconnect;
mod request;
mod transport;

pub use channel::Channel;
pub use channel_builder::ChannelBuilder;
pub use connection_state::ConnectionState;
pub use events::{Context, EventRegistry, Listener, WILDCARD};
pub use metrics::ChannelMetrics;
pub use reconnect::{
    ExponentialBackoff, ReconnectionStrategy, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DELAY,
};
pub use request::ReplyCallback;
pub use transport::{
    Connector, ReadyState, Transport, TransportEvent, TransportEvents, WebSocketConnector,
};
