//! Request/reply integration tests
//!
//! Correlation ids on the wire, reply delivery, stale and malformed inbound
//! payloads, and typed requests against a real WebSocket server.

mod common;

use common::{mock_channel, reply_to, settle, MockConnector, MockWsServer, Recorder};
use resock_client::{Channel, ConnectionState};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Sum {
    total: i64,
}

fn capture(into: &Arc<Mutex<Vec<Value>>>) -> impl FnOnce(Value) + Send + 'static {
    let into = Arc::clone(into);
    move |data| into.lock().unwrap().push(data)
}

#[tokio::test]
async fn test_correlation_ids_are_sequential() {
    let connector = MockConnector::auto_open();
    let channel = mock_channel(&connector).connect().unwrap();

    for _ in 0..3 {
        channel.emit_with_reply("ask", json!({}), |_| {}).unwrap();
    }
    channel.emit("tell", json!({})).unwrap();
    settle().await;

    let ids: Vec<Option<u64>> = connector
        .last()
        .sent_payloads()
        .iter()
        .map(|payload| payload.get("c").and_then(Value::as_u64))
        .collect();
    assert_eq!(ids, vec![Some(1), Some(2), Some(3), None]);
    assert_eq!(channel.pending_requests().await.unwrap(), 3);
}

#[tokio::test]
async fn test_reply_runs_callback_once() {
    let connector = MockConnector::auto_open();
    let channel = mock_channel(&connector).connect().unwrap();
    let replies = Arc::new(Mutex::new(Vec::new()));

    channel
        .emit_with_reply("ask", json!({"q": 1}), capture(&replies))
        .unwrap();
    settle().await;

    let socket = connector.last();
    socket.receive(json!({"c": 1, "d": {"answer": 42}}));
    socket.receive(json!({"c": 1, "d": {"answer": 43}}));
    settle().await;

    assert_eq!(*replies.lock().unwrap(), vec![json!({"answer": 42})]);
    assert_eq!(channel.pending_requests().await.unwrap(), 0);
}

#[tokio::test]
async fn test_reply_without_data_gets_empty_object() {
    let connector = MockConnector::auto_open();
    let channel = mock_channel(&connector).connect().unwrap();
    let replies = Arc::new(Mutex::new(Vec::new()));

    channel
        .emit_with_reply("ask", json!(null), capture(&replies))
        .unwrap();
    channel
        .emit_with_reply("ask", json!(null), capture(&replies))
        .unwrap();
    settle().await;

    connector.last().receive(json!({"c": 1}));
    connector.last().receive(json!({"c": 2, "d": null}));
    settle().await;

    assert_eq!(*replies.lock().unwrap(), vec![json!({}), json!({})]);
}

#[tokio::test]
async fn test_falsy_data_is_preserved() {
    let connector = MockConnector::auto_open();
    let events = Recorder::new();
    let channel = mock_channel(&connector)
        .on("count", events.listener())
        .connect()
        .unwrap();
    settle().await;

    connector.last().receive(json!({"e": "count", "d": 0}));
    connector.last().receive(json!({"e": "count", "d": false}));
    connector.last().receive(json!({"e": "count", "d": ""}));
    settle().await;

    assert_eq!(
        events.calls(),
        vec![vec![json!(0)], vec![json!(false)], vec![json!("")]]
    );
    drop(channel);
}

#[tokio::test]
async fn test_unknown_correlation_id_is_ignored() {
    let connector = MockConnector::auto_open();
    let events = Recorder::new();
    let channel = mock_channel(&connector)
        .on("all", events.listener())
        .connect()
        .unwrap();
    let replies = Arc::new(Mutex::new(Vec::new()));

    channel
        .emit_with_reply("ask", json!({}), capture(&replies))
        .unwrap();
    settle().await;

    connector.last().receive(json!({"c": 99, "d": "nobody asked"}));
    settle().await;

    assert!(replies.lock().unwrap().is_empty());
    assert_eq!(channel.pending_requests().await.unwrap(), 1);
    assert_eq!(events.names(), vec!["connect"]);
}

#[tokio::test]
async fn test_reply_with_event_runs_callback_then_publishes() {
    let connector = MockConnector::auto_open();
    let order = Arc::new(Mutex::new(Vec::new()));

    let channel = mock_channel(&connector).connect().unwrap();
    {
        let order = Arc::clone(&order);
        channel
            .on(
                "joined",
                resock_client::Listener::new(move |_, _| order.lock().unwrap().push("event")),
                None,
            )
            .unwrap();
    }
    {
        let order = Arc::clone(&order);
        channel
            .emit_with_reply("join", json!({}), move |_| {
                order.lock().unwrap().push("reply")
            })
            .unwrap();
    }
    settle().await;

    connector.last().receive(json!({"e": "joined", "d": {}, "c": 1}));
    settle().await;

    assert_eq!(*order.lock().unwrap(), vec!["reply", "event"]);
}

#[tokio::test]
async fn test_malformed_payloads_publish_nothing() {
    let connector = MockConnector::auto_open();
    let events = Recorder::new();
    let channel = mock_channel(&connector)
        .on("all", events.listener())
        .connect()
        .unwrap();
    settle().await;

    let socket = connector.last();
    socket.message("not json");
    socket.message("[1, 2, 3]");
    socket.message("\"just a string\"");
    socket.message("{\"e\": ");
    socket.message("");
    settle().await;

    // Still alive and dispatching
    socket.receive(json!({"e": "ping"}));
    settle().await;

    assert_eq!(events.names(), vec!["connect", "ping"]);
    assert_eq!(channel.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_empty_event_name_is_not_published() {
    let connector = MockConnector::auto_open();
    let events = Recorder::new();
    let channel = mock_channel(&connector)
        .on("all", events.listener())
        .connect()
        .unwrap();
    settle().await;

    connector.last().receive(json!({"e": "", "d": {"x": 1}}));
    settle().await;

    assert_eq!(events.names(), vec!["connect"]);
    drop(channel);
}

#[tokio::test]
async fn test_request_resolves_typed_reply() {
    let connector = MockConnector::auto_open();
    let channel = mock_channel(&connector).connect().unwrap();

    let pending = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.request::<_, Sum>("sum", json!([1, 2, 3])).await })
    };
    settle().await;

    let sent = connector.last().sent_payloads();
    assert_eq!(sent[0], json!({"e": "sum", "d": [1, 2, 3], "c": 1}));

    connector.last().receive(json!({"c": 1, "d": {"total": 6}}));
    let sum = pending.await.unwrap().unwrap();
    assert_eq!(sum, Sum { total: 6 });
}

#[tokio::test]
async fn test_request_with_mismatched_reply_fails() {
    let connector = MockConnector::auto_open();
    let channel = mock_channel(&connector).connect().unwrap();

    let pending = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.request::<_, Sum>("sum", json!([])).await })
    };
    settle().await;

    connector.last().receive(json!({"c": 1, "d": "six"}));
    let result = pending.await.unwrap();
    assert!(matches!(result, Err(resock_core::Error::Serialization(_))));
}

#[tokio::test]
async fn test_request_over_websocket() {
    let mut server = MockWsServer::with_handler(|raw| reply_to(&raw, json!({"total": 10}))).await;
    let channel = Channel::connect(server.url()).unwrap();

    let sum: Sum = tokio::time::timeout(
        Duration::from_secs(5),
        channel.request("sum", json!([4, 6])),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(sum, Sum { total: 10 });

    let received: Value = serde_json::from_str(&server.wait_for_message().await.unwrap()).unwrap();
    assert_eq!(received, json!({"e": "sum", "d": [4, 6], "c": 1}));

    channel.close().await.unwrap();
    server.shutdown().await;
}
