//! Common test utilities for resock-client integration tests
//!
//! Provides a scripted in-memory connector for driving the channel through
//! exact transport sequences, a mock WebSocket server for end-to-end runs,
//! and listeners that record what they receive.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use resock_client::{Channel, ChannelBuilder, Connector, Listener, ReadyState, Transport, TransportEvents};
use resock_core::{codec, Payload};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Let the driver work through everything queued so far
///
/// Tests run on the current-thread runtime, so yielding hands control to
/// the driver task without advancing the clock.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// One transport opened by [`MockConnector`]
#[derive(Clone)]
pub struct MockSocket {
    events: TransportEvents,
    state: Arc<Mutex<ReadyState>>,
    sent: Arc<Mutex<Vec<String>>>,
    opened_at: Instant,
}

impl MockSocket {
    /// Simulate the connection becoming usable
    pub fn open(&self) {
        *self.state.lock().unwrap() = ReadyState::Open;
        self.events.opened();
    }

    /// Simulate the connection going away
    pub fn close(&self) {
        *self.state.lock().unwrap() = ReadyState::Closed;
        self.events.closed();
    }

    /// Simulate a transport failure
    pub fn error(&self, error: &str) {
        self.events.error(error);
    }

    /// Deliver a raw inbound message
    pub fn message(&self, raw: impl Into<String>) {
        self.events.message(raw);
    }

    /// Deliver an inbound payload
    pub fn receive(&self, payload: Value) {
        self.events.message(payload.to_string());
    }

    /// Raw messages the channel sent through this socket
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Sent messages, parsed
    pub fn sent_payloads(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .map(|raw| serde_json::from_str(raw).unwrap())
            .collect()
    }

    pub fn ready_state(&self) -> ReadyState {
        *self.state.lock().unwrap()
    }

    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }
}

struct MockTransport {
    socket: MockSocket,
}

impl Transport for MockTransport {
    fn send(&mut self, raw: String) {
        self.socket.sent.lock().unwrap().push(raw);
    }

    fn close(&mut self) {
        let mut state = self.socket.state.lock().unwrap();
        if *state != ReadyState::Closed {
            *state = ReadyState::Closed;
            drop(state);
            self.socket.events.closed();
        }
    }

    fn ready_state(&self) -> ReadyState {
        *self.socket.state.lock().unwrap()
    }
}

/// Connector whose transports only change state when the test says so
#[derive(Clone, Default)]
pub struct MockConnector {
    sockets: Arc<Mutex<Vec<MockSocket>>>,
    auto_open: bool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every transport reports open as soon as it is created
    pub fn auto_open() -> Self {
        Self {
            auto_open: true,
            ..Self::default()
        }
    }

    pub fn open_count(&self) -> usize {
        self.sockets.lock().unwrap().len()
    }

    /// The most recently opened socket
    pub fn last(&self) -> MockSocket {
        self.sockets.lock().unwrap().last().cloned().unwrap()
    }

    pub fn socket(&self, index: usize) -> MockSocket {
        self.sockets.lock().unwrap()[index].clone()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.sockets
            .lock()
            .unwrap()
            .iter()
            .map(MockSocket::opened_at)
            .collect()
    }
}

impl Connector for MockConnector {
    fn open(&self, _address: &str, events: TransportEvents) -> Box<dyn Transport> {
        let socket = MockSocket {
            events,
            state: Arc::new(Mutex::new(ReadyState::Connecting)),
            sent: Arc::new(Mutex::new(Vec::new())),
            opened_at: Instant::now(),
        };
        self.sockets.lock().unwrap().push(socket.clone());

        if self.auto_open {
            socket.open();
        }

        Box::new(MockTransport { socket })
    }
}

/// Builder preconfigured with a mock connector
pub fn mock_channel(connector: &MockConnector) -> ChannelBuilder {
    Channel::builder("ws://mock").with_connector(connector.clone())
}

/// Listener that records the arguments of every call
#[derive(Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<Vec<Value>>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listener(&self) -> Listener {
        let calls = Arc::clone(&self.calls);
        Listener::new(move |_ctx, args| calls.lock().unwrap().push(args.to_vec()))
    }

    pub fn calls(&self) -> Vec<Vec<Value>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// First argument of each call; for a wildcard listener, the event names
    pub fn names(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|args| args.first().and_then(Value::as_str).map(str::to_string))
            .collect()
    }
}

/// Mock WebSocket server for end-to-end channel tests
///
/// Accepts connections, forwards every text message to the test and
/// answers with whatever the handler returns.
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    message_rx: mpsc::Receiver<String>,
}

impl MockWsServer {
    /// Start a server that answers nothing
    pub async fn new() -> Self {
        Self::with_handler(|_| None).await
    }

    /// Start a server that answers each message with `handler(message)`
    pub async fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(String) -> Option<String> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (msg_tx, msg_rx) = mpsc::channel::<String>(100);
        let handler = Arc::new(handler);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { continue };
                        let msg_tx = msg_tx.clone();
                        let handler = Arc::clone(&handler);

                        tokio::spawn(async move {
                            let Ok(ws_stream) = accept_async(stream).await else { return };
                            let (mut write, mut read) = ws_stream.split();

                            while let Some(Ok(msg)) = read.next().await {
                                if let Message::Text(text) = msg {
                                    let _ = msg_tx.send(text.clone()).await;
                                    if let Some(response) = (*handler)(text) {
                                        let _ = write.send(Message::Text(response)).await;
                                    }
                                }
                            }
                        });
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            message_rx: msg_rx,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Next message the server received, or `None` after five seconds
    pub async fn wait_for_message(&mut self) -> Option<String> {
        tokio::time::timeout(std::time::Duration::from_secs(5), self.message_rx.recv())
            .await
            .ok()
            .flatten()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Echo the correlation id back with `data`
pub fn reply_to(raw: &str, data: Value) -> Option<String> {
    let request = codec::decode(raw).ok()?;
    codec::encode(&Payload::reply(request.correlation?, data)).ok()
}
