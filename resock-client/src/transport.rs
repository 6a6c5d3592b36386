//! Transport seam
//!
//! The channel does not talk to sockets directly. It asks a [`Connector`]
//! to open a [`Transport`] for its address and receives the transport's
//! lifecycle through a [`TransportEvents`] handle:
//!
//! - `opened()` once the connection is usable
//! - `message(raw)` for every inbound text frame, in arrival order
//! - `error(e)` for transport failures
//! - `closed()` once the connection is gone (also after a failed open)
//!
//! Opening never blocks: [`Connector::open`] returns immediately with a
//! handle in [`ReadyState::Connecting`], and the outcome arrives as events.
//!
//! Each handle is tagged with a generation number. Once the channel moves
//! on to a newer transport, anything the old one still reports is dropped.
//!
//! [`WebSocketConnector`] is the default implementation, built on
//! `tokio-tungstenite`.

use futures::{SinkExt, StreamExt};
use resock_core::Error;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};

/// Connection state of a transport, mirroring the WebSocket `readyState`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    /// Open in progress
    Connecting = 0,
    /// Usable
    Open = 1,
    /// Close in progress
    Closing = 2,
    /// Gone
    Closed = 3,
}

impl ReadyState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

/// Notification from a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is usable
    Open,
    /// The connection is gone
    Close,
    /// The transport failed
    Error(String),
    /// A raw inbound message
    Message(String),
}

/// Sending half a transport uses to report its lifecycle
#[derive(Debug, Clone)]
pub struct TransportEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
}

impl TransportEvents {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<(u64, TransportEvent)>) -> Self {
        Self { generation, tx }
    }

    /// Generation of the transport this handle belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report that the connection is usable
    pub fn opened(&self) {
        self.send(TransportEvent::Open);
    }

    /// Report that the connection is gone
    pub fn closed(&self) {
        self.send(TransportEvent::Close);
    }

    /// Report a transport failure
    pub fn error(&self, error: impl Into<String>) {
        self.send(TransportEvent::Error(error.into()));
    }

    /// Deliver an inbound message
    pub fn message(&self, raw: impl Into<String>) {
        self.send(TransportEvent::Message(raw.into()));
    }

    fn send(&self, event: TransportEvent) {
        // The channel has shut down; nobody is listening any more.
        let _ = self.tx.send((self.generation, event));
    }
}

/// A live connection handle, exclusively owned by one channel
pub trait Transport: Send {
    /// Queue a raw message for sending
    ///
    /// Fire-and-forget: failures surface as `error`/`closed` events.
    fn send(&mut self, raw: String);

    /// Start closing the connection
    fn close(&mut self);

    /// Current connection state
    fn ready_state(&self) -> ReadyState;
}

/// Factory for transports
pub trait Connector: Send + Sync + 'static {
    /// Begin opening a connection to `address`
    fn open(&self, address: &str, events: TransportEvents) -> Box<dyn Transport>;
}

enum Outbound {
    Text(String),
    Close,
}

/// Opens WebSocket connections with `tokio-tungstenite`
///
/// Requires a running tokio runtime: each transport is driven by a spawned
/// task that owns the socket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn open(&self, address: &str, events: TransportEvents) -> Box<dyn Transport> {
        let state = Arc::new(AtomicU8::new(ReadyState::Connecting as u8));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_socket(
            address.to_string(),
            events,
            Arc::clone(&state),
            outbound_rx,
        ));

        Box::new(WebSocketTransport {
            state,
            outbound: outbound_tx,
        })
    }
}

struct WebSocketTransport {
    state: Arc<AtomicU8>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Transport for WebSocketTransport {
    fn send(&mut self, raw: String) {
        if self.outbound.send(Outbound::Text(raw)).is_err() {
            tracing::debug!("Dropping message for a finished socket task");
        }
    }

    fn close(&mut self) {
        let current = ReadyState::from_u8(self.state.load(Ordering::SeqCst));
        if matches!(current, ReadyState::Connecting | ReadyState::Open) {
            self.state.store(ReadyState::Closing as u8, Ordering::SeqCst);
        }
        let _ = self.outbound.send(Outbound::Close);
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::SeqCst))
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

async fn run_socket(
    address: String,
    events: TransportEvents,
    state: Arc<AtomicU8>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let mut queued = Vec::new();
    let connected = tokio::select! {
        result = connect_async(address.as_str()) => result,
        _ = wait_for_close(&mut outbound, &mut queued) => {
            state.store(ReadyState::Closed as u8, Ordering::SeqCst);
            events.closed();
            return;
        }
    };

    let ws_stream = match connected {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            tracing::warn!(address = %address, error = %e, "WebSocket connect failed");
            state.store(ReadyState::Closed as u8, Ordering::SeqCst);
            report_failure(&events, e);
            events.closed();
            return;
        }
    };

    // close() may have been requested while the handshake was in flight
    if state
        .compare_exchange(
            ReadyState::Connecting as u8,
            ReadyState::Open as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        )
        .is_err()
    {
        let (mut sink, _) = ws_stream.split();
        let _ = sink.close().await;
        state.store(ReadyState::Closed as u8, Ordering::SeqCst);
        events.closed();
        return;
    }

    tracing::debug!(address = %address, generation = events.generation(), "WebSocket open");
    events.opened();

    let (mut sink, mut stream) = ws_stream.split();

    for text in queued {
        if let Err(e) = sink.send(Message::Text(text)).await {
            report_failure(&events, e);
            state.store(ReadyState::Closed as u8, Ordering::SeqCst);
            events.closed();
            return;
        }
    }

    loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        report_failure(&events, e);
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    state.store(ReadyState::Closing as u8, Ordering::SeqCst);
                    let _ = sink.close().await;
                    break;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => events.message(text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => events.message(text),
                    Err(_) => tracing::warn!("Dropping non UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!(address = %address, "Connection closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::error!(error = %e, "WebSocket error");
                    report_failure(&events, e);
                    break;
                }
            },
        }
    }

    state.store(ReadyState::Closed as u8, Ordering::SeqCst);
    events.closed();
}

fn report_failure(events: &TransportEvents, e: tungstenite::Error) {
    events.error(Error::WebSocket(e.to_string()).to_string());
}

/// Hold back text sent during the handshake until a close request arrives
async fn wait_for_close(
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
    queued: &mut Vec<String>,
) {
    loop {
        match outbound.recv().await {
            Some(Outbound::Close) | None => return,
            Some(Outbound::Text(text)) => queued.push(text),
        }
    }
}
