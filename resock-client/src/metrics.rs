//! Channel metrics definitions
//!
//! OpenTelemetry instruments recorded by the channel driver. They are
//! exported through whatever meter provider `init_observability` installed;
//! without one, recording is a no-op.
//!
//! # Metrics Collected
//!
//! - **connection.state**: current [`ConnectionState`](crate::ConnectionState) code (gauge)
//! - **events.sent**: events emitted (counter, by `event`)
//! - **events.received**: named events received (counter, by `event`)
//! - **replies.received**: replies matched to a pending callback (counter)
//! - **errors**: errors encountered (counter, by `error_type`)
//! - **reconnection.attempts**: transports opened by a reconnect sequence (counter)
//! - **reconnection.success**: sequences that ended connected (counter)
//! - **reconnection.failed**: sequences that spent their budget (counter)
//!
//! # Examples
//!
//! ```rust,no_run
//! use resock_client::ChannelMetrics;
//!
//! let metrics = ChannelMetrics::new("my-app");
//! metrics.record_event_sent("chat");
//! ```

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Meter},
    KeyValue,
};

/// Channel metrics for monitoring
pub struct ChannelMetrics {
    /// Connection state (0=idle, 1=connected, 2=reconnecting, 3=failed, 4=closed)
    pub connection_state: Gauge<i64>,
    /// Total number of events emitted
    pub events_sent: Counter<u64>,
    /// Total number of named events received
    pub events_received: Counter<u64>,
    /// Total number of replies matched to a callback
    pub replies_received: Counter<u64>,
    /// Total number of errors
    pub errors_total: Counter<u64>,
    /// Total number of reconnection attempts
    pub reconnection_attempts: Counter<u64>,
    /// Total number of successful reconnections
    pub reconnection_success: Counter<u64>,
    /// Total number of exhausted reconnect sequences
    pub reconnection_failed: Counter<u64>,
}

impl ChannelMetrics {
    /// Create metrics on the global meter named `service_name`
    pub fn new(service_name: impl Into<String>) -> Self {
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        let meter = global::meter(name);
        Self::new_with_meter(&meter)
    }

    /// Create metrics on a caller-supplied meter
    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            connection_state: meter
                .i64_gauge("resock.channel.connection.state")
                .with_description(
                    "Connection state (0=idle, 1=connected, 2=reconnecting, 3=failed, 4=closed)",
                )
                .build(),
            events_sent: meter
                .u64_counter("resock.channel.events.sent")
                .with_description("Total number of events emitted")
                .build(),
            events_received: meter
                .u64_counter("resock.channel.events.received")
                .with_description("Total number of named events received")
                .build(),
            replies_received: meter
                .u64_counter("resock.channel.replies.received")
                .with_description("Total number of replies matched to a pending callback")
                .build(),
            errors_total: meter
                .u64_counter("resock.channel.errors.total")
                .with_description("Total number of errors encountered")
                .build(),
            reconnection_attempts: meter
                .u64_counter("resock.channel.reconnection.attempts")
                .with_description("Total number of reconnection attempts")
                .build(),
            reconnection_success: meter
                .u64_counter("resock.channel.reconnection.success")
                .with_description("Total number of successful reconnections")
                .build(),
            reconnection_failed: meter
                .u64_counter("resock.channel.reconnection.failed")
                .with_description("Total number of reconnect sequences that gave up")
                .build(),
        }
    }

    /// Update connection state
    pub fn update_connection_state(&self, state: i64) {
        self.connection_state.record(state, &[]);
    }

    /// Record an emitted event
    pub fn record_event_sent(&self, event: &str) {
        self.events_sent
            .add(1, &[KeyValue::new("event", event.to_string())]);
    }

    /// Record a received named event
    pub fn record_event_received(&self, event: &str) {
        self.events_received
            .add(1, &[KeyValue::new("event", event.to_string())]);
    }

    /// Record a reply delivered to its callback
    pub fn record_reply(&self) {
        self.replies_received.add(1, &[]);
    }

    /// Record an error
    pub fn record_error(&self, error_type: &str) {
        let attributes = &[KeyValue::new("error_type", error_type.to_string())];
        self.errors_total.add(1, attributes);
    }

    /// Record a reconnection attempt
    pub fn record_reconnection_attempt(&self) {
        self.reconnection_attempts.add(1, &[]);
    }

    /// Record a successful reconnection
    pub fn record_reconnection_success(&self) {
        self.reconnection_success.add(1, &[]);
    }

    /// Record an exhausted reconnect sequence
    pub fn record_reconnection_failed(&self) {
        self.reconnection_failed.add(1, &[]);
    }
}

impl std::fmt::Debug for ChannelMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = ChannelMetrics::new("test-channel");

        metrics.update_connection_state(1);
        metrics.record_event_sent("chat");
        metrics.record_event_received("chat");
        metrics.record_reply();
        metrics.record_error("decode");
        metrics.record_reconnection_attempt();
        metrics.record_reconnection_success();
        metrics.record_reconnection_failed();
    }

    #[test]
    fn test_connection_state_codes() {
        use crate::ConnectionState;

        let metrics = ChannelMetrics::new("test-channel-state");
        for state in [
            ConnectionState::Idle,
            ConnectionState::Connected,
            ConnectionState::Reconnecting { attempt: 1 },
            ConnectionState::Failed,
            ConnectionState::Closed,
        ] {
            metrics.update_connection_state(state.code());
        }
    }

    #[test]
    fn test_with_custom_meter() {
        let meter = global::meter("test-channel-meter");
        let metrics = ChannelMetrics::new_with_meter(&meter);

        metrics.record_reconnection_attempt();
        metrics.record_reconnection_attempt();
        metrics.record_reconnection_failed();
    }
}
