//! Wire payload exchanged over the channel
//!
//! Every message is a single JSON object with up to three short keys:
//!
//! | key | meaning | presence |
//! |-----|---------|----------|
//! | `e` | event name | when a named event is carried |
//! | `d` | event data (any JSON value) | optional, `{}` when absent on receive |
//! | `c` | correlation id | only on correlated requests and their replies |
//!
//! A reply to a correlated request is just a payload that carries the same
//! `c` back; it may additionally carry an `e`, in which case the reply
//! callback runs first and the event is published afterwards.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Integer tag linking an outbound request to its inbound reply
///
/// Ids are allocated from 1 upwards; 0 is never issued.
pub type CorrelationId = u64;

/// One message on the wire
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Event name
    #[serde(rename = "e", default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,

    /// Event data. `null` on the wire decodes to `None`.
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Correlation id of a request expecting a reply, or of the reply itself
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<CorrelationId>,
}

impl Payload {
    /// Create a named event payload
    pub fn event(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: Some(event.into()),
            data: Some(data),
            correlation: None,
        }
    }

    /// Create a bare reply carrying only data and the correlation id
    pub fn reply(correlation: CorrelationId, data: Value) -> Self {
        Self {
            event: None,
            data: Some(data),
            correlation: Some(correlation),
        }
    }

    /// Attach a correlation id
    pub fn with_correlation(mut self, correlation: CorrelationId) -> Self {
        self.correlation = Some(correlation);
        self
    }

    /// The event name, if present and non-empty
    pub fn event_name(&self) -> Option<&str> {
        self.event.as_deref().filter(|name| !name.is_empty())
    }

    /// Take the data, substituting an empty object when absent
    pub fn take_data(&mut self) -> Value {
        self.data
            .take()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()))
    }
}
