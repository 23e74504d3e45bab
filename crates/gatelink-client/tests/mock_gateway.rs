//! Full-stack tests against an in-process gateway speaking the wire protocol.
//!
//! The mock accepts WebSocket connections, validates the `connect` handshake
//! (token `"secret"`), then serves a handful of probe methods:
//!
//! - `echo` — responds with its own params
//! - `echo-delayed` — responds after a delay (out-of-order correlation)
//! - `fail` — responds `ok:false` with code `NOT_FOUND`
//! - `emit` — sends a session-addressed event frame, then responds
//! - `slow` — never responds
//! - `bye` — drops the connection without responding

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use gatelink_client::{ConnectionState, GatewayClient, SessionEvent};
use gatelink_core::config::GatewayConfig;
use gatelink_core::error::GatewayError;

struct MockGateway {
    addr: SocketAddr,
    handshakes: Arc<AtomicUsize>,
}

async fn spawn_gateway() -> MockGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handshakes = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&handshakes);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(serve_connection(stream, Arc::clone(&counter)));
        }
    });

    MockGateway { addr, handshakes }
}

async fn serve_connection(stream: tokio::net::TcpStream, handshakes: Arc<AtomicUsize>) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    let (mut sink, mut stream) = ws.split();

    // Writer task so delayed responders can interleave with the reader.
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut connected = false;
    while let Some(Ok(msg)) = stream.next().await {
        let Message::Text(text) = msg else { continue };
        let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        if frame["type"] != "req" {
            continue;
        }
        let id = frame["id"].as_str().unwrap_or_default().to_string();
        let method = frame["method"].as_str().unwrap_or_default().to_string();
        let params = frame["params"].clone();

        if !connected {
            if method != "connect" {
                break;
            }
            handshakes.fetch_add(1, Ordering::SeqCst);
            assert_eq!(params["minProtocol"], 3);
            if params["auth"]["token"] != "secret" {
                let _ = tx.send(
                    json!({
                        "type": "res", "id": id, "ok": false,
                        "error": {"code": "AUTH", "message": "invalid credentials"}
                    })
                    .to_string(),
                );
                break;
            }
            let _ = tx.send(
                json!({
                    "type": "res", "id": id, "ok": true,
                    "payload": {
                        "type": "hello-ok",
                        "protocol": 3,
                        "server": {"version": "0.0-test", "host": "mock", "connId": "c-1"}
                    }
                })
                .to_string(),
            );
            connected = true;
            continue;
        }

        match method.as_str() {
            "echo" => {
                let _ = tx.send(
                    json!({"type": "res", "id": id, "ok": true, "payload": params}).to_string(),
                );
            }
            "echo-delayed" => {
                let tx = tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    let _ = tx.send(
                        json!({"type": "res", "id": id, "ok": true, "payload": params})
                            .to_string(),
                    );
                });
            }
            "fail" => {
                let _ = tx.send(
                    json!({
                        "type": "res", "id": id, "ok": false,
                        "error": {"code": "NOT_FOUND", "message": "no such thing"}
                    })
                    .to_string(),
                );
            }
            "emit" => {
                // Event first, response second: subscribers must see the
                // event by the time the call settles.
                let _ = tx.send(
                    json!({"type": "event", "event": "chat", "payload": params, "seq": 1})
                        .to_string(),
                );
                let _ = tx
                    .send(json!({"type": "res", "id": id, "ok": true, "payload": {}}).to_string());
            }
            "slow" => {}
            "bye" => break,
            other => {
                let _ = tx.send(
                    json!({
                        "type": "res", "id": id, "ok": false,
                        "error": {"code": "INVALID_REQUEST", "message": format!("unknown method {other}")}
                    })
                    .to_string(),
                );
            }
        }
    }

    drop(tx);
    let _ = writer.await;
}

fn client_for(gateway: &MockGateway, token: &str) -> GatewayClient {
    let vars: HashMap<String, String> = [
        ("GATEWAY_URL".to_string(), format!("ws://{}", gateway.addr)),
        ("GATEWAY_TOKEN".to_string(), token.to_string()),
    ]
    .into();
    GatewayClient::new(GatewayConfig::from_map(&vars))
}

#[tokio::test]
async fn calls_correlate_regardless_of_response_order() {
    let gateway = spawn_gateway().await;
    let client = client_for(&gateway, "secret");

    let (delayed, quick) = tokio::join!(
        client.call_value("echo-delayed", Some(json!({"tag": "slowpoke"})), None),
        client.call_value("echo", Some(json!({"tag": "speedy"})), None),
    );
    assert_eq!(delayed.unwrap()["tag"], "slowpoke");
    assert_eq!(quick.unwrap()["tag"], "speedy");
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn remote_error_passes_through() {
    let gateway = spawn_gateway().await;
    let client = client_for(&gateway, "secret");

    let err = client.call_value("fail", None, None).await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn call_timeout_leaves_connection_usable() {
    let gateway = spawn_gateway().await;
    let client = client_for(&gateway, "secret");

    let err = client
        .call_value("slow", None, Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    // A late response for the timed-out id must not disturb later calls.
    let pong = client
        .call_value("echo", Some(json!("still-alive")), None)
        .await
        .unwrap();
    assert_eq!(pong, json!("still-alive"));
}

#[tokio::test]
async fn events_fan_out_to_session_listeners() {
    let gateway = spawn_gateway().await;
    let client = client_for(&gateway, "secret");

    let mut a1 = client.acquire("session-a").await.unwrap();
    let mut a2 = client.acquire("session-a").await.unwrap();
    let mut b = client.acquire("session-b").await.unwrap();

    client
        .call_value(
            "emit",
            Some(json!({"sessionKey": "session-a", "text": "hello"})),
            None,
        )
        .await
        .unwrap();

    for handle in [&mut a1, &mut a2] {
        let Some(SessionEvent::Event(ev)) = handle.next_event().await else {
            panic!("session-a listener missed the event");
        };
        assert_eq!(ev.event, "chat");
        assert_eq!(ev.payload["text"], "hello");
        assert!(handle.try_next().is_none(), "event delivered twice");
    }
    assert!(b.try_next().is_none(), "session-b must not see session-a events");
}

#[tokio::test]
async fn disconnect_sweeps_pending_and_reconnects_lazily() {
    let gateway = spawn_gateway().await;
    let client = client_for(&gateway, "secret");

    let mut listener = client.acquire("session-a").await.unwrap();

    // One request parked on the socket, then the server drops us.
    let parked = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .call_value("slow", None, Some(Duration::from_secs(5)))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let bye = client.call_value("bye", None, None).await;

    assert!(matches!(bye.unwrap_err(), GatewayError::Closed(_)));
    assert!(matches!(
        parked.await.unwrap().unwrap_err(),
        GatewayError::Closed(_)
    ));
    assert!(matches!(
        listener.next_event().await,
        Some(SessionEvent::Closed { .. })
    ));

    // Next caller pays a fresh handshake and gets a working socket.
    let pong = client
        .call_value("echo", Some(json!("after-reconnect")), None)
        .await
        .unwrap();
    assert_eq!(pong, json!("after-reconnect"));
    assert_eq!(gateway.handshakes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn concurrent_cold_start_shares_one_handshake() {
    let gateway = spawn_gateway().await;
    let client = client_for(&gateway, "secret");

    let checks: Vec<_> = (0..5)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.connect_check().await })
        })
        .collect();
    for check in checks {
        check.await.unwrap().unwrap();
    }
    assert_eq!(
        gateway.handshakes.load(Ordering::SeqCst),
        1,
        "cold-start callers must share a single connection attempt"
    );
}

#[tokio::test]
async fn handshake_rejection_surfaces_remote_error() {
    let gateway = spawn_gateway().await;
    let client = client_for(&gateway, "wrong-token");

    let err = client.connect_check().await.unwrap_err();
    assert_eq!(err.code(), "AUTH");
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn server_info_exposes_handshake_snapshot() {
    let gateway = spawn_gateway().await;
    let client = client_for(&gateway, "secret");

    let hello = client.server_info().await.unwrap();
    assert_eq!(hello.protocol, 3);
    assert_eq!(hello.server.host, "mock");

    // Coalesced shared calls still resolve through the same socket.
    let shared = client
        .call_shared("session-a", "echo", json!({"shared": true}), None)
        .await
        .unwrap();
    assert_eq!(shared["shared"], true);
}
