//! resock - Resilient event channel over WebSocket
//!
//! This is the convenience crate that re-exports the resock sub-crates.
//! Depend on it if you want a single import for the channel and its wire
//! types.
//!
//! # Architecture
//!
//! - **resock-core**: wire payload, codec, error handling, observability
//! - **resock-client**: event registry, request correlation, reconnection,
//!   transports and the channel itself
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use resock::{Channel, Listener};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let channel = Channel::builder("ws://localhost:8080")
//!         .auto_reconnect(true)
//!         .on("reconnect_failed", Listener::new(|_, _| eprintln!("server is gone")))
//!         .connect()?;
//!
//!     let sum: i64 = channel.request("add", json!({"a": 5, "b": 3})).await?;
//!     println!("Result: {}", sum);
//!
//!     Ok(())
//! }
//! ```

pub use resock_client as client;
pub use resock_core as core;

pub use resock_client::{
    Channel, ChannelBuilder, ConnectionState, Context, EventRegistry, ExponentialBackoff, Listener,
    ReconnectionStrategy,
};
pub use resock_core::{Error, Payload, Result};
