//! End-to-end gateway tests over real sockets: WebSocket auth and
//! subscriptions, event delivery, REST last-value reads, and the
//! unauthenticated grace period.

#![allow(clippy::panic)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use telebridge::app_state::AppState;
use telebridge::config::{SettingsSnapshot, settings_channel};
use telebridge::domain::{ConnectionRegistry, EventBus};
use telebridge::lifecycle::Lifecycle;
use telebridge::service::SessionService;
use telebridge::signaling::SignalingBroker;

async fn start_gateway(key: &str) -> (Arc<Lifecycle>, AppState, SocketAddr, SocketAddr) {
    let snapshot = SettingsSnapshot {
        api_port: 0,
        ws_port: 0,
        api_key: Some(key.to_string()),
        launch_on_startup: false,
        event_bus_capacity: 256,
        auth_grace: Duration::from_millis(300),
        signal_idle_timeout: Duration::from_secs(5),
        shutdown_grace: Duration::from_millis(500),
    };
    let (tx, rx) = settings_channel(snapshot);
    let registry = Arc::new(ConnectionRegistry::new(rx.clone()));
    let broker = Arc::new(SignalingBroker::new(Arc::clone(&registry)));
    let service = Arc::new(SessionService::new(registry, EventBus::new(256), broker));
    let lifecycle = Arc::new(Lifecycle::new(tx, Arc::clone(&service), None));
    let state = AppState {
        service,
        lifecycle: Arc::clone(&lifecycle),
        settings: rx,
        instance_id: "e2e-instance".to_string(),
    };
    let Ok(()) = lifecycle.start(state.clone()).await else {
        panic!("gateway failed to start");
    };
    let Some((api_addr, ws_addr)) = lifecycle.bound_addrs().await else {
        panic!("gateway reported no bound addresses");
    };
    (lifecycle, state, api_addr, ws_addr)
}

type WsClient = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn ws_connect(ws_addr: SocketAddr) -> WsClient {
    let url = format!("ws://127.0.0.1:{}/ws", ws_addr.port());
    let Ok((socket, _)) = tokio_tungstenite::connect_async(url.as_str()).await else {
        panic!("websocket connect failed");
    };
    socket
}

async fn send_json(socket: &mut WsClient, value: serde_json::Value) {
    let Ok(()) = socket.send(Message::Text(value.to_string().into())).await else {
        panic!("websocket send failed");
    };
}

async fn recv_json(socket: &mut WsClient) -> serde_json::Value {
    let deadline = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    let Ok(value) = serde_json::from_str(text.as_str()) else {
                        panic!("server sent invalid JSON: {text}");
                    };
                    return value;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                other => panic!("expected text frame, got {other:?}"),
            }
        }
    });
    let Ok(value) = deadline.await else {
        panic!("timed out waiting for a frame");
    };
    value
}

async fn recv_close_code(socket: &mut WsClient) -> u16 {
    let deadline = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Close(Some(frame)))) => return u16::from(frame.code),
                Some(Ok(_)) => {}
                other => panic!("expected close frame, got {other:?}"),
            }
        }
    });
    let Ok(code) = deadline.await else {
        panic!("timed out waiting for close");
    };
    code
}

async fn authenticate(socket: &mut WsClient, key: &str) {
    send_json(socket, serde_json::json!({"type": "auth", "key": key})).await;
    let ack = recv_json(socket).await;
    assert_eq!(ack.get("type"), Some(&serde_json::json!("auth-ok")));
    assert!(ack.get("connectionId").is_some());
}

#[tokio::test]
async fn subscribe_publish_and_read_last_value() {
    let (lifecycle, state, api_addr, ws_addr) = start_gateway("secret").await;

    let mut client = ws_connect(ws_addr).await;
    authenticate(&mut client, "secret").await;

    send_json(
        &mut client,
        serde_json::json!({"type": "subscribe", "pattern": "cpu.load"}),
    )
    .await;
    let ack = recv_json(&mut client).await;
    assert_eq!(ack.get("type"), Some(&serde_json::json!("subscribed")));

    // Producer publishes; the subscriber's next frame is exactly that event.
    state
        .service
        .broadcast("cpu.load", serde_json::json!(42), "cpu", None)
        .await;
    let frame = recv_json(&mut client).await;
    assert_eq!(frame.get("type"), Some(&serde_json::json!("event")));
    assert_eq!(frame.get("name"), Some(&serde_json::json!("cpu.load")));
    assert_eq!(frame.get("payload"), Some(&serde_json::json!(42)));

    // A late client reads the same value from the last-value cache
    // without a second publish.
    let http = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/api/v1/state?events=cpu.load", api_addr.port());
    let Ok(response) = http.get(&url).header("x-api-key", "secret").send().await else {
        panic!("state request failed");
    };
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let Ok(values) = response.json::<HashMap<String, serde_json::Value>>().await else {
        panic!("state response was not a JSON map");
    };
    assert_eq!(values.get("cpu.load"), Some(&serde_json::json!(42)));

    lifecycle.stop().await;
}

#[tokio::test]
async fn state_endpoint_rejects_missing_key() {
    let (lifecycle, _state, api_addr, _ws_addr) = start_gateway("secret").await;

    let http = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/api/v1/state", api_addr.port());

    let Ok(response) = http.get(&url).send().await else {
        panic!("state request failed");
    };
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);

    let Ok(response) = http.get(&url).header("x-api-key", "wrong").send().await else {
        panic!("state request failed");
    };
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);

    lifecycle.stop().await;
}

#[tokio::test]
async fn discovery_and_health_are_unauthenticated() {
    let (lifecycle, _state, api_addr, ws_addr) = start_gateway("secret").await;
    let http = reqwest::Client::new();

    let url = format!("http://127.0.0.1:{}/discovery", api_addr.port());
    let Ok(response) = http.get(&url).send().await else {
        panic!("discovery request failed");
    };
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let Ok(record) = response.json::<serde_json::Value>().await else {
        panic!("discovery response was not JSON");
    };
    assert_eq!(
        record.get("instanceId"),
        Some(&serde_json::json!("e2e-instance"))
    );
    assert_eq!(
        record.get("apiPort"),
        Some(&serde_json::json!(api_addr.port()))
    );
    assert_eq!(
        record.get("wsPort"),
        Some(&serde_json::json!(ws_addr.port()))
    );

    let url = format!("http://127.0.0.1:{}/health", api_addr.port());
    let Ok(response) = http.get(&url).send().await else {
        panic!("health request failed");
    };
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    lifecycle.stop().await;
}

#[tokio::test]
async fn silent_websocket_is_closed_unauthorized_within_grace() {
    let (lifecycle, state, _api_addr, ws_addr) = start_gateway("secret").await;

    let mut client = ws_connect(ws_addr).await;
    // Send nothing: the grace period (300 ms here) must expire.
    let code = recv_close_code(&mut client).await;
    assert_eq!(code, 4001);

    // Stream end means the server side has fully torn down.
    while let Some(Ok(_)) = client.next().await {}
    assert_eq!(state.service.registry().len().await, 0);
    lifecycle.stop().await;
}

#[tokio::test]
async fn wrong_key_closes_with_unauthorized_code() {
    let (lifecycle, _state, _api_addr, ws_addr) = start_gateway("secret").await;

    let mut client = ws_connect(ws_addr).await;
    send_json(&mut client, serde_json::json!({"type": "auth", "key": "wrong"})).await;
    let code = recv_close_code(&mut client).await;
    assert_eq!(code, 4001);

    lifecycle.stop().await;
}

#[tokio::test]
async fn malformed_frame_closes_only_that_connection() {
    let (lifecycle, state, _api_addr, ws_addr) = start_gateway("secret").await;

    let mut healthy = ws_connect(ws_addr).await;
    authenticate(&mut healthy, "secret").await;
    send_json(
        &mut healthy,
        serde_json::json!({"type": "subscribe", "pattern": "*"}),
    )
    .await;
    let _ = recv_json(&mut healthy).await;

    let mut broken = ws_connect(ws_addr).await;
    authenticate(&mut broken, "secret").await;
    let Ok(()) = broken.send(Message::Text("not json".into())).await else {
        panic!("send failed");
    };
    let code = recv_close_code(&mut broken).await;
    assert_eq!(code, 4002);

    // The healthy connection still receives events.
    state
        .service
        .broadcast("memory.used", serde_json::json!(7), "memory", None)
        .await;
    let frame = recv_json(&mut healthy).await;
    assert_eq!(frame.get("name"), Some(&serde_json::json!("memory.used")));

    lifecycle.stop().await;
}

#[tokio::test]
async fn peer_signaling_relays_between_two_clients() {
    let (lifecycle, _state, _api_addr, ws_addr) = start_gateway("secret").await;

    let mut alice = ws_connect(ws_addr).await;
    send_json(&mut alice, serde_json::json!({"type": "auth", "key": "secret"})).await;
    let ack = recv_json(&mut alice).await;
    let Some(_alice_id) = ack.get("connectionId").cloned() else {
        panic!("no connection id for alice");
    };

    let mut bob = ws_connect(ws_addr).await;
    send_json(&mut bob, serde_json::json!({"type": "auth", "key": "secret"})).await;
    let ack = recv_json(&mut bob).await;
    let Some(bob_id) = ack.get("connectionId").cloned() else {
        panic!("no connection id for bob");
    };

    // Alice offers to Bob.
    send_json(
        &mut alice,
        serde_json::json!({"type": "offer", "toConnectionId": bob_id, "sdu": {"sdp": "offer"}}),
    )
    .await;
    let offered = recv_json(&mut alice).await;
    assert_eq!(offered.get("type"), Some(&serde_json::json!("offered")));
    let Some(session_id) = offered.get("sessionId").cloned() else {
        panic!("no session id in offer ack");
    };

    let relayed = recv_json(&mut bob).await;
    assert_eq!(relayed.get("type"), Some(&serde_json::json!("offer")));
    assert_eq!(relayed.get("sessionId"), Some(&session_id));
    assert_eq!(
        relayed.get("sdu"),
        Some(&serde_json::json!({"sdp": "offer"}))
    );

    // Bob answers; Alice receives it.
    send_json(
        &mut bob,
        serde_json::json!({"type": "answer", "sessionId": session_id, "sdu": {"sdp": "answer"}}),
    )
    .await;
    let answer = recv_json(&mut alice).await;
    assert_eq!(answer.get("type"), Some(&serde_json::json!("answer")));
    assert_eq!(answer.get("sessionId"), Some(&session_id));

    lifecycle.stop().await;
}
