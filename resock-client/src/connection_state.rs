//! Connection state machine
//!
//! Every decision about the connection lifecycle goes through
//! [`ConnectionManager::handle`]: the driver feeds it an [`Input`] (a
//! transport notification, a command, or a due reconnect check) and acts on
//! the returned [`Step`]. No other code inspects or mutates the state.
//!
//! # Connection States
//!
//! - **Idle**: not connected and not reconnecting (initial state, and after
//!   a disconnect or a cancelled sequence)
//! - **Connected**: the current transport reported open
//! - **Reconnecting**: a reconnect sequence is running
//! - **Failed**: the last reconnect sequence spent its budget
//! - **Closed**: the channel was shut down
//!
//! # State Transitions
//!
//! ```text
//!            opened                       close
//!   Idle ───────────► Connected ───────────────────► Idle
//!    │                   ▲                            │
//!    │ reconnect         │ opened                     │ reconnect
//!    ▼                   │                            ▼
//!   Reconnecting { attempt } ◄────────────────── Failed
//!    │          ▲  check: not open, budget left       ▲
//!    │          └──────────────────┘                  │
//!    └──────────── check: not open, budget spent ─────┘
//! ```
//!
//! `Connected` and `Failed` accept a new `reconnect`, so a sequence that
//! exhausted its budget can be retried by the caller.

use crate::reconnect::ReconnectionStrategy;
use std::time::Duration;

/// Observable state of a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected, not reconnecting
    Idle,
    /// The current transport is open
    Connected,
    /// A reconnect sequence is running; `attempt` transports opened so far
    Reconnecting { attempt: u32 },
    /// The last reconnect sequence gave up
    Failed,
    /// The channel was closed and no longer reconnects
    Closed,
}

impl ConnectionState {
    /// Whether a reconnect sequence is in progress
    pub fn is_reconnecting(&self) -> bool {
        matches!(self, ConnectionState::Reconnecting { .. })
    }

    /// Numeric code used by the connection state gauge
    pub fn code(&self) -> i64 {
        match self {
            ConnectionState::Idle => 0,
            ConnectionState::Connected => 1,
            ConnectionState::Reconnecting { .. } => 2,
            ConnectionState::Failed => 3,
            ConnectionState::Closed => 4,
        }
    }
}

/// Something that happened to the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Input {
    /// The current transport reported open
    Opened,
    /// The current transport reported close
    Closed,
    /// `reconnect()` was called, or the auto-reconnect policy fired
    Reconnect,
    /// The scheduled reconnect check fired
    CheckDue { open: bool },
    /// `cancel_reconnect()` was called
    Cancel,
    /// `close()` was called
    Shutdown,
}

/// What the driver must do in response to an [`Input`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Publish `connect`
    Opened,
    /// Publish `connect`, then `reconnect`; drop the pending check
    Reconnected,
    /// Publish `disconnect`
    Disconnected,
    /// A close arrived that must not be published
    Suppressed,
    /// Open a fresh transport and check it after the delay
    Attempt(Duration),
    /// A sequence is already running
    AlreadyRunning,
    /// The transport is open; success arrives with its open notification
    AwaitingOpen,
    /// Publish `reconnect_failed`
    Exhausted,
    /// The sequence is no longer running; drop the pending check
    Cancelled,
    /// Nothing to do
    Ignored,
}

/// Owner of the connection state and the reconnect schedule
pub(crate) struct ConnectionManager {
    state: ConnectionState,
    strategy: Box<dyn ReconnectionStrategy>,
}

impl ConnectionManager {
    pub(crate) fn new(strategy: Box<dyn ReconnectionStrategy>) -> Self {
        Self {
            state: ConnectionState::Idle,
            strategy,
        }
    }

    pub(crate) fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Apply `input` and report what the driver must do
    pub(crate) fn handle(&mut self, input: Input) -> Step {
        use ConnectionState as S;

        match (input, &self.state) {
            (_, S::Closed) => Step::Ignored,

            (Input::Opened, S::Reconnecting { .. }) => {
                self.state = S::Connected;
                Step::Reconnected
            }
            (Input::Opened, _) => {
                self.state = S::Connected;
                Step::Opened
            }

            // A sequence reports its own outcome; a spent sequence already did.
            (Input::Closed, S::Reconnecting { .. } | S::Failed) => Step::Suppressed,
            (Input::Closed, S::Idle | S::Connected) => {
                self.state = S::Idle;
                Step::Disconnected
            }

            (Input::Reconnect, S::Reconnecting { .. }) => Step::AlreadyRunning,
            (Input::Reconnect, _) => {
                self.strategy.reset();
                self.schedule(0)
            }

            (Input::CheckDue { open }, S::Reconnecting { attempt }) => {
                if open {
                    Step::AwaitingOpen
                } else {
                    let attempt = *attempt;
                    self.schedule(attempt)
                }
            }
            (Input::CheckDue { .. }, _) => Step::Cancelled,

            (Input::Cancel, S::Reconnecting { .. }) => {
                self.state = S::Idle;
                Step::Cancelled
            }
            (Input::Cancel, _) => Step::Ignored,

            (Input::Shutdown, previous) => {
                let step = if *previous == S::Connected {
                    Step::Disconnected
                } else {
                    Step::Ignored
                };
                self.state = S::Closed;
                step
            }
        }
    }

    /// Ask the strategy for the wait after `attempts_made` attempts
    fn schedule(&mut self, attempts_made: u32) -> Step {
        match self.strategy.next_delay(attempts_made) {
            Some(delay) => {
                self.state = ConnectionState::Reconnecting {
                    attempt: attempts_made + 1,
                };
                Step::Attempt(delay)
            }
            None => {
                self.state = ConnectionState::Failed;
                Step::Exhausted
            }
        }
    }
}
