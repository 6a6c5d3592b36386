//! Resilient event channel
//!
//! This module provides the [`Channel`] handle and the driver task behind it.
//!
//! # Channel Lifecycle
//!
//! 1. **Connect**: building a channel spawns its driver, which immediately
//!    opens a transport to the address
//! 2. **Use**: emit events, await replies, listen for events
//! 3. **Reconnect**: on `reconnect()` (or on `disconnect` when
//!    auto-reconnect is enabled) the driver replaces the transport with
//!    growing delays until one opens or the budget runs out
//! 4. **Close**: `close()`, or dropping every handle, stops the driver
//!
//! # Events
//!
//! Besides the named events the server sends, the channel publishes its
//! own lifecycle through the same registry:
//!
//! | event | arguments | when |
//! |-------|-----------|------|
//! | `connect` | none | the current transport opened |
//! | `disconnect` | none | the transport closed outside a reconnect sequence |
//! | `error` | error message | the transport failed |
//! | `reconnect` | none | a reconnect sequence succeeded (after `connect`) |
//! | `reconnect_failed` | none | a reconnect sequence spent its budget |
//!
//! # Cloning
//!
//! `Channel` is a cheap handle: clones talk to the same driver. All state
//! (listeners, pending replies, the transport) lives in the driver task and
//! is touched one command or one notification at a time. Listeners and reply
//! callbacks run on the driver; channel calls made from inside them are
//! queued and take effect once the current dispatch is done.

use crate::connection_state::{ConnectionManager, ConnectionState, Input, Step};
use crate::events::{Context, EventRegistry, Listener};
use crate::metrics::ChannelMetrics;
use crate::reconnect::ReconnectionStrategy;
use crate::request::{ReplyCallback, RequestManager};
use crate::transport::{Connector, ReadyState, Transport, TransportEvent, TransportEvents};
use crate::ChannelBuilder;
use resock_core::{codec, Error, Payload, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::Instrument;

enum Command {
    Emit {
        event: String,
        data: Value,
        reply: Option<ReplyCallback>,
    },
    On {
        name: String,
        listener: Option<Listener>,
        context: Option<Context>,
    },
    Off {
        name: Option<String>,
        listener: Option<Listener>,
        context: Option<Context>,
    },
    Trigger {
        name: String,
        args: Vec<Value>,
    },
    Reconnect,
    CancelReconnect,
    ListenerCount {
        name: String,
        reply: oneshot::Sender<usize>,
    },
    PendingRequests {
        reply: oneshot::Sender<usize>,
    },
    Close {
        done: oneshot::Sender<()>,
    },
}

/// Everything a driver needs, assembled by [`ChannelBuilder`]
pub(crate) struct Settings {
    pub(crate) address: String,
    pub(crate) registry: EventRegistry,
    pub(crate) strategy: Box<dyn ReconnectionStrategy>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) auto_reconnect: bool,
    pub(crate) metrics: Option<Arc<ChannelMetrics>>,
}

struct Inner {
    address: String,
    context: Context,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
}

/// Durable logical channel to a message-socket server
#[derive(Clone)]
pub struct Channel {
    inner: Arc<Inner>,
}

impl Channel {
    /// Connect to `address` with the default configuration
    ///
    /// Returns as soon as the driver is running; the outcome of the first
    /// open arrives as a `connect` (or `error` and `disconnect`) event.
    /// Must be called from within a tokio runtime.
    pub fn connect(address: impl Into<String>) -> Result<Self> {
        ChannelBuilder::new(address).connect()
    }

    /// Start configuring a channel to `address`
    pub fn builder(address: impl Into<String>) -> ChannelBuilder {
        ChannelBuilder::new(address)
    }

    pub(crate) fn start(runtime: &Handle, settings: Settings) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);

        let context = settings.registry.context().clone();
        let address = settings.address.clone();
        let span = tracing::info_span!("channel", address = %address);

        let driver = Driver {
            address: settings.address,
            registry: settings.registry,
            requests: RequestManager::new(),
            connection: ConnectionManager::new(settings.strategy),
            connector: settings.connector,
            transport: None,
            generation: 0,
            events_tx,
            check_at: None,
            auto_reconnect: settings.auto_reconnect,
            state_tx,
            metrics: settings.metrics,
        };

        runtime.spawn(driver.run(commands_rx, events_rx).instrument(span));

        Self {
            inner: Arc::new(Inner {
                address,
                context,
                commands: commands_tx,
                state: state_rx,
            }),
        }
    }

    /// Address this channel connects to
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// Default receiver bound to listeners registered without a context
    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    /// Whether a reconnect sequence is running
    pub fn is_reconnecting(&self) -> bool {
        self.inner.state.borrow().is_reconnecting()
    }

    /// Receiver that observes every state change
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.clone()
    }

    /// Send a named event
    ///
    /// Fire-and-forget: delivery failures on the wire are not reported.
    pub fn emit<T: Serialize>(&self, event: impl Into<String>, data: T) -> Result<()> {
        let data = codec::to_data(data)?;
        self.send(Command::Emit {
            event: event.into(),
            data,
            reply: None,
        })
    }

    /// Send a named event and run `callback` with the data of its reply
    ///
    /// The callback runs at most once, on the driver. It never runs if no
    /// reply arrives, and it is dropped unregistered when the channel has no
    /// transport to send through.
    pub fn emit_with_reply<T, F>(&self, event: impl Into<String>, data: T, callback: F) -> Result<()>
    where
        T: Serialize,
        F: FnOnce(Value) + Send + 'static,
    {
        let data = codec::to_data(data)?;
        self.send(Command::Emit {
            event: event.into(),
            data,
            reply: Some(Box::new(callback)),
        })
    }

    /// Send a named event and wait for its reply
    ///
    /// There is no built-in timeout; wrap the call in
    /// `tokio::time::timeout` if the server may never answer. Fails with
    /// [`Error::ConnectionClosed`] if the channel closes first, or if there
    /// is no transport to send through (after `cancel_reconnect`).
    #[tracing::instrument(skip(self, event, data), fields(event = %event.as_ref()))]
    pub async fn request<T, R>(&self, event: impl Into<String> + AsRef<str>, data: T) -> Result<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let (tx, rx) = oneshot::channel();
        self.emit_with_reply(event, data, move |reply| {
            let _ = tx.send(reply);
        })?;

        let reply = rx.await.map_err(|_| Error::ConnectionClosed)?;
        tracing::debug!("Reply received");

        serde_json::from_value(reply).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Register `listener` for `name`; `None` is ignored
    ///
    /// The listener is called with `context`, or with [`Channel::context`]
    /// when none is given. Use [`crate::WILDCARD`] to receive every event.
    pub fn on(
        &self,
        name: impl Into<String>,
        listener: impl Into<Option<Listener>>,
        context: impl Into<Option<Context>>,
    ) -> Result<()> {
        self.send(Command::On {
            name: name.into(),
            listener: listener.into(),
            context: context.into(),
        })
    }

    /// Remove listeners; see [`EventRegistry::off`] for the matching rules
    pub fn off<'a>(
        &self,
        name: impl Into<Option<&'a str>>,
        listener: impl Into<Option<&'a Listener>>,
        context: impl Into<Option<&'a Context>>,
    ) -> Result<()> {
        self.send(Command::Off {
            name: name.into().map(str::to_string),
            listener: listener.into().cloned(),
            context: context.into().cloned(),
        })
    }

    /// Publish `name` locally, without touching the wire
    pub fn trigger(&self, name: impl Into<String>, args: &[Value]) -> Result<()> {
        self.send(Command::Trigger {
            name: name.into(),
            args: args.to_vec(),
        })
    }

    /// Start a reconnect sequence; a no-op while one is running
    pub fn reconnect(&self) -> Result<()> {
        self.send(Command::Reconnect)
    }

    /// Abort the running reconnect sequence, if any
    ///
    /// The transport of the aborted attempt is closed and the channel goes
    /// back to idle without publishing anything.
    pub fn cancel_reconnect(&self) -> Result<()> {
        self.send(Command::CancelReconnect)
    }

    /// Close the channel
    ///
    /// Publishes `disconnect` if the channel was connected, drops pending
    /// reply callbacks and stops the driver. Later calls fail with
    /// [`Error::ConnectionClosed`].
    pub async fn close(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.send(Command::Close { done })?;
        rx.await.map_err(|_| Error::ConnectionClosed)
    }

    /// Number of listeners registered for `name`
    pub async fn listener_count(&self, name: impl Into<String>) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ListenerCount {
            name: name.into(),
            reply,
        })?;
        rx.await.map_err(|_| Error::ConnectionClosed)
    }

    /// Number of emitted requests still waiting for a reply
    pub async fn pending_requests(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::PendingRequests { reply })?;
        rx.await.map_err(|_| Error::ConnectionClosed)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.inner
            .commands
            .send(command)
            .map_err(|_| Error::ConnectionClosed)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("address", &self.inner.address)
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

struct Driver {
    address: String,
    registry: EventRegistry,
    requests: RequestManager,
    connection: ConnectionManager,
    connector: Arc<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
    /// Bumped on every open; notifications carrying an older value are stale
    generation: u64,
    events_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
    /// Deadline of the pending reconnect check
    check_at: Option<Instant>,
    auto_reconnect: bool,
    state_tx: watch::Sender<ConnectionState>,
    metrics: Option<Arc<ChannelMetrics>>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
    ) {
        tracing::info!("Connecting");
        self.sync_state();
        self.connect();

        loop {
            let check_at = self.check_at;

            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::Close { done }) => {
                        self.shutdown();
                        let _ = done.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        tracing::debug!("All channel handles dropped");
                        self.shutdown();
                        break;
                    }
                },
                Some((generation, event)) = events.recv() => {
                    self.handle_transport(generation, event);
                }
                _ = tokio::time::sleep_until(check_at.unwrap_or_else(Instant::now)), if check_at.is_some() => {
                    self.check();
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Emit { event, data, reply } => self.emit(event, data, reply),
            Command::On {
                name,
                listener,
                context,
            } => {
                self.registry.on(name, listener, context);
            }
            Command::Off {
                name,
                listener,
                context,
            } => {
                self.registry
                    .off(name.as_deref(), listener.as_ref(), context.as_ref());
            }
            Command::Trigger { name, args } => self.publish(&name, &args),
            Command::Reconnect => self.reconnect(),
            Command::CancelReconnect => self.cancel_reconnect(),
            Command::ListenerCount { name, reply } => {
                let _ = reply.send(self.registry.listener_count(&name));
            }
            Command::PendingRequests { reply } => {
                let _ = reply.send(self.requests.pending_count());
            }
            // Close stops the loop and is handled there
            Command::Close { done } => {
                let _ = done.send(());
            }
        }
    }

    fn handle_transport(&mut self, generation: u64, event: TransportEvent) {
        if generation != self.generation {
            tracing::trace!(generation, current = self.generation, "Dropping stale transport event");
            return;
        }

        match event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Close => self.on_close(),
            TransportEvent::Error(error) => {
                tracing::warn!(error = %error, "Transport error");
                if let Some(ref m) = self.metrics {
                    m.record_error("transport");
                }
                self.publish("error", &[Value::String(error)]);
            }
            TransportEvent::Message(raw) => self.on_message(&raw),
        }
    }

    /// Replace the transport with a freshly opened one
    fn connect(&mut self) {
        if let Some(mut previous) = self.transport.take() {
            previous.close();
        }

        self.generation += 1;
        let events = TransportEvents::new(self.generation, self.events_tx.clone());

        tracing::debug!(generation = self.generation, "Opening transport");
        self.transport = Some(self.connector.open(&self.address, events));
    }

    fn emit(&mut self, event: String, data: Value, reply: Option<ReplyCallback>) {
        // Dropping the reply callback here resolves an awaiting `request`
        let Some(transport) = self.transport.as_mut() else {
            tracing::debug!(event = %event, "No transport, dropping outbound message");
            return;
        };

        let mut payload = Payload::event(event, data);
        let correlation = reply.map(|callback| self.requests.register(callback));
        if let Some(id) = correlation {
            payload = payload.with_correlation(id);
        }

        let raw = match codec::encode(&payload) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode payload");
                if let Some(id) = correlation {
                    self.requests.complete(id);
                }
                return;
            }
        };

        tracing::debug!(event = ?payload.event, correlation = ?payload.correlation, "Sending event");
        transport.send(raw);

        if let (Some(m), Some(event)) = (&self.metrics, payload.event.as_deref()) {
            m.record_event_sent(event);
        }
    }

    fn on_message(&mut self, raw: &str) {
        let mut payload = match codec::decode(raw) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, raw = %raw, "Message parsing failed");
                if let Some(ref m) = self.metrics {
                    m.record_error(e.kind());
                }
                return;
            }
        };

        let data = payload.take_data();

        if let Some(id) = payload.correlation {
            match self.requests.complete(id) {
                Some(callback) => {
                    if let Some(ref m) = self.metrics {
                        m.record_reply();
                    }
                    callback(data.clone());
                }
                None => tracing::debug!(correlation = id, "Ignoring reply without a pending request"),
            }
        }

        if let Some(event) = payload.event_name() {
            if let Some(ref m) = self.metrics {
                m.record_event_received(event);
            }
            self.publish(event, &[data]);
        }
    }

    fn on_open(&mut self) {
        match self.transition(Input::Opened) {
            Step::Reconnected => {
                self.check_at = None;
                tracing::info!("Reconnected");
                if let Some(ref m) = self.metrics {
                    m.record_reconnection_success();
                }
                self.publish("connect", &[]);
                self.publish("reconnect", &[]);
            }
            Step::Opened => {
                tracing::info!("Connected");
                self.publish("connect", &[]);
            }
            _ => {}
        }
    }

    fn on_close(&mut self) {
        match self.transition(Input::Closed) {
            Step::Disconnected => {
                tracing::info!("Disconnected");
                self.publish("disconnect", &[]);
                if self.auto_reconnect {
                    self.reconnect();
                }
            }
            Step::Suppressed => tracing::debug!("Close during reconnect, not publishing"),
            _ => {}
        }
    }

    fn reconnect(&mut self) {
        match self.transition(Input::Reconnect) {
            Step::Attempt(delay) => self.attempt(delay),
            Step::Exhausted => self.give_up(),
            Step::AlreadyRunning => tracing::debug!("Reconnect already in progress"),
            _ => {}
        }
    }

    fn cancel_reconnect(&mut self) {
        if self.transition(Input::Cancel) == Step::Cancelled {
            tracing::info!("Reconnect cancelled");
            self.check_at = None;
            if let Some(mut transport) = self.transport.take() {
                transport.close();
            }
            // Anything the aborted transport still reports is now stale
            self.generation += 1;
        }
    }

    fn attempt(&mut self, delay: std::time::Duration) {
        if let ConnectionState::Reconnecting { attempt } = self.connection.state() {
            tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");
        }
        if let Some(ref m) = self.metrics {
            m.record_reconnection_attempt();
        }

        self.connect();
        self.check_at = Some(Instant::now() + delay);
    }

    fn check(&mut self) {
        self.check_at = None;

        let open = self
            .transport
            .as_ref()
            .is_some_and(|transport| transport.ready_state() == ReadyState::Open);

        match self.transition(Input::CheckDue { open }) {
            Step::Attempt(delay) => self.attempt(delay),
            Step::Exhausted => self.give_up(),
            _ => {}
        }
    }

    fn give_up(&mut self) {
        tracing::warn!("Reconnect attempts exhausted");
        if let Some(ref m) = self.metrics {
            m.record_reconnection_failed();
        }
        self.publish("reconnect_failed", &[]);
    }

    fn shutdown(&mut self) {
        let step = self.transition(Input::Shutdown);
        self.check_at = None;

        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }

        let dropped = self.requests.clear();
        if step == Step::Disconnected {
            self.publish("disconnect", &[]);
        }

        tracing::info!(dropped_replies = dropped, "Channel closed");
    }

    fn transition(&mut self, input: Input) -> Step {
        let step = self.connection.handle(input);
        self.sync_state();
        step
    }

    fn sync_state(&self) {
        let current = self.connection.state().clone();
        if let Some(ref m) = self.metrics {
            m.update_connection_state(current.code());
        }
        self.state_tx.send_if_modified(|state| {
            if *state == current {
                false
            } else {
                *state = current;
                true
            }
        });
    }

    fn publish(&self, name: &str, args: &[Value]) {
        tracing::trace!(event = name, listeners = self.registry.listener_count(name), "Publishing");
        self.registry.trigger(name, args);
    }
}
