//! Core types for resock
//!
//! This crate holds the pieces of the resilient channel that are independent
//! of any transport:
//!
//! - **Types**: the wire [`Payload`] (`{e, d, c}`)
//! - **Codec**: encoding and decoding payloads to JSON text
//! - **Error handling**: the [`Error`] enum and [`Result`] alias
//! - **Observability**: `tracing` subscriber and OpenTelemetry bootstrap
//!
//! # Example
//!
//! ```rust
//! use resock_core::{codec, Payload};
//! use serde_json::json;
//!
//! let text = codec::encode(&Payload::event("join", json!({"room": "lobby"}))).unwrap();
//! let payload = codec::decode(&text).unwrap();
//! assert_eq!(payload.event_name(), Some("join"));
//! ```

pub mod codec;
pub mod error;
pub mod observability;
pub mod types;

pub use error::{Error, Result};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use types::{CorrelationId, Payload};
