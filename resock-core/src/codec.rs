//! Codec for wire payloads
//!
//! `encode` and `decode` are the serialization seam the channel talks to.
//! Encoding a well-formed [`Payload`] cannot fail in practice; decoding
//! returns [`Error::Decode`] for anything that is not a JSON object with the
//! expected field types.
//!
//! # Examples
//!
//! ```rust
//! use resock_core::{codec, Payload};
//! use serde_json::json;
//!
//! let payload = Payload::event("ping", json!({"n": 1})).with_correlation(1);
//! let text = codec::encode(&payload).unwrap();
//!
//! let decoded = codec::decode(&text).unwrap();
//! assert_eq!(decoded.event_name(), Some("ping"));
//! assert_eq!(decoded.correlation, Some(1));
//! ```

use crate::error::{Error, Result};
use crate::types::Payload;
use serde::Serialize;
use serde_json::Value;

/// Encode a payload to its JSON text form
pub fn encode(payload: &Payload) -> Result<String> {
    serde_json::to_string(payload).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode JSON text into a payload
///
/// The text is parsed into a generic value first so that non-object
/// messages (arrays, scalars) are rejected explicitly instead of being
/// coerced by serde's sequence form of struct deserialization.
pub fn decode(data: &str) -> Result<Payload> {
    let value: Value = serde_json::from_str(data).map_err(|e| Error::Decode(e.to_string()))?;

    if !value.is_object() {
        return Err(Error::Decode("payload must be a JSON object".to_string()));
    }

    serde_json::from_value(value).map_err(|e| Error::Decode(e.to_string()))
}

/// Convert any serializable value into the JSON value carried in `d`
pub fn to_data<T: Serialize>(data: T) -> Result<Value> {
    serde_json::to_value(data).map_err(|e| Error::Serialization(e.to_string()))
}
