//! Correlation of outgoing requests with their replies
//!
//! # Request Lifecycle
//!
//! 1. **Register**: `emit_with_reply` hands a reply callback to the driver
//! 2. **Allocate**: the next correlation id is assigned (1, 2, 3, ...)
//! 3. **Send**: the payload goes out with `c` set to that id
//! 4. **Complete**: an inbound payload carrying the same `c` removes the
//!    entry and the callback runs once with the reply data
//!
//! Replies bearing an id that is not pending (already answered, or never
//! issued) are ignored. Ids come from a monotonic `u64` counter and are
//! never reused within a channel's lifetime.
//!
//! The manager lives inside the channel's driver task, so it is a plain
//! struct without interior locking.

use resock_core::CorrelationId;
use serde_json::Value;
use std::collections::HashMap;

/// Callback invoked with the data of a reply
pub type ReplyCallback = Box<dyn FnOnce(Value) + Send>;

/// Table of pending reply callbacks
pub(crate) struct RequestManager {
    pending: HashMap<CorrelationId, ReplyCallback>,
    last_id: CorrelationId,
}

impl RequestManager {
    pub(crate) fn new() -> Self {
        Self {
            pending: HashMap::new(),
            last_id: 0,
        }
    }

    /// Allocate the next id and park `callback` under it
    pub(crate) fn register(&mut self, callback: ReplyCallback) -> CorrelationId {
        self.last_id += 1;
        let id = self.last_id;
        self.pending.insert(id, callback);
        id
    }

    /// Remove and return the callback waiting on `id`
    pub(crate) fn complete(&mut self, id: CorrelationId) -> Option<ReplyCallback> {
        self.pending.remove(&id)
    }

    /// Drop every pending callback without invoking it
    ///
    /// Awaiting `request` futures observe their oneshot sender being dropped.
    pub(crate) fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Default for RequestManager {
    fn default() -> Self {
        Self::new()
    }
}
