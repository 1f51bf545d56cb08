//! Integration tests for WebSocket session events.
//!
//! These tests validate the WebSocket endpoint: the initial snapshot, live
//! events for messages and resets, and concurrent clients.

use std::time::Duration;

use bex_tutor::{
    create_router, AppState, Config, PipelineStatus, SessionEvent, TutorPipeline,
    DEFAULT_GREETING, OFFLINE_REPLY,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Helper type for WebSocket client
type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Spawns an offline test server and returns its base address.
async fn spawn_test_server() -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");

    let pipeline = TutorPipeline::from_config(Config::default()).expect("pipeline");
    let router = create_router(AppState::new(pipeline));

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    (addr.to_string(), handle)
}

/// Connects a WebSocket client to the server.
async fn connect_client(addr: &str) -> WsClient {
    let (ws_stream, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Receives the next text message from the WebSocket and parses it as a `SessionEvent`.
/// Automatically handles ping frames by responding with pong.
async fn receive_event(client: &mut WsClient) -> SessionEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            Message::Pong(_) => {}
            other => panic!("Expected text message, got: {other:?}"),
        }
    }
}

/// Posts a student message through the HTTP API.
async fn post_message(addr: &str, text: &str) -> reqwest::StatusCode {
    reqwest::Client::new()
        .post(format!("http://{addr}/api/messages"))
        .json(&json!({ "text": text }))
        .send()
        .await
        .expect("Failed to post message")
        .status()
}

// ============================================================================
// Connection Tests
// ============================================================================

/// Tests that a client receives the current session on connect.
#[tokio::test]
async fn test_client_receives_connected_event_on_connect() {
    let (addr, _handle) = spawn_test_server().await;

    let mut client = connect_client(&addr).await;
    let event = receive_event(&mut client).await;

    match event {
        SessionEvent::Connected(payload) => {
            assert_eq!(payload.session.status, PipelineStatus::Idle);
            assert!(payload.session.onboarding_open);
            assert_eq!(payload.session.messages.len(), 1);
            assert_eq!(payload.session.messages[0].text(), DEFAULT_GREETING);
        }
        other => panic!("Expected Connected event, got: {other:?}"),
    }
}

// ============================================================================
// Event Broadcasting Tests
// ============================================================================

/// Tests that a submitted message produces events in pipeline order.
#[tokio::test]
async fn test_submit_streams_events_in_order() {
    let (addr, _handle) = spawn_test_server().await;
    let mut client = connect_client(&addr).await;
    let _ = receive_event(&mut client).await;

    assert_eq!(post_message(&addr, "hello").await, reqwest::StatusCode::OK);

    match receive_event(&mut client).await {
        SessionEvent::MessageAppended(payload) => assert_eq!(payload.message.text(), "hello"),
        other => panic!("Expected MessageAppended, got: {other:?}"),
    }
    match receive_event(&mut client).await {
        SessionEvent::PendingChanged(payload) => assert!(payload.pending),
        other => panic!("Expected PendingChanged, got: {other:?}"),
    }
    match receive_event(&mut client).await {
        SessionEvent::MessageAppended(payload) => {
            assert_eq!(payload.message.text(), OFFLINE_REPLY);
        }
        other => panic!("Expected MessageAppended, got: {other:?}"),
    }
    match receive_event(&mut client).await {
        SessionEvent::PendingChanged(payload) => assert!(!payload.pending),
        other => panic!("Expected PendingChanged, got: {other:?}"),
    }
}

/// Tests that onboarding and reset are broadcast.
#[tokio::test]
async fn test_onboarding_and_reset_are_broadcast() {
    let (addr, _handle) = spawn_test_server().await;
    let mut client = connect_client(&addr).await;
    let _ = receive_event(&mut client).await;
    let http = reqwest::Client::new();

    http.post(format!("http://{addr}/api/onboarding"))
        .json(&json!({"name": "Sam", "age": "9"}))
        .send()
        .await
        .expect("Failed to post onboarding");

    match receive_event(&mut client).await {
        SessionEvent::OnboardingUpdated(payload) => {
            assert_eq!(payload.profile.name, "Sam");
            assert_eq!(payload.profile.age, Some(9));
        }
        other => panic!("Expected OnboardingUpdated, got: {other:?}"),
    }

    http.post(format!("http://{addr}/api/reset"))
        .json(&json!({"confirmed": true}))
        .send()
        .await
        .expect("Failed to post reset");

    match receive_event(&mut client).await {
        SessionEvent::SessionReset(payload) => {
            assert!(payload.session.onboarding_open);
            assert!(payload.session.profile.is_empty());
            assert_eq!(payload.session.messages.len(), 1);
        }
        other => panic!("Expected SessionReset, got: {other:?}"),
    }
}

/// Tests that every connected client receives the same events.
#[tokio::test]
async fn test_multiple_clients_receive_events() {
    let (addr, _handle) = spawn_test_server().await;
    let mut first = connect_client(&addr).await;
    let mut second = connect_client(&addr).await;
    let _ = receive_event(&mut first).await;
    let _ = receive_event(&mut second).await;

    post_message(&addr, "hi everyone").await;

    for client in [&mut first, &mut second] {
        match receive_event(client).await {
            SessionEvent::MessageAppended(payload) => {
                assert_eq!(payload.message.text(), "hi everyone");
            }
            other => panic!("Expected MessageAppended, got: {other:?}"),
        }
    }
}

/// Tests that a late client sees earlier messages in its snapshot.
#[tokio::test]
async fn test_late_client_receives_transcript_snapshot() {
    let (addr, _handle) = spawn_test_server().await;
    post_message(&addr, "early bird").await;

    let mut client = connect_client(&addr).await;
    match receive_event(&mut client).await {
        SessionEvent::Connected(payload) => {
            let texts: Vec<&str> = payload.session.messages.iter().map(|m| m.text()).collect();
            assert_eq!(texts, vec![DEFAULT_GREETING, "early bird", OFFLINE_REPLY]);
        }
        other => panic!("Expected Connected event, got: {other:?}"),
    }
}

/// Tests that the server answers client pings.
#[tokio::test]
async fn test_server_answers_ping() {
    let (addr, _handle) = spawn_test_server().await;
    let mut client = connect_client(&addr).await;
    let _ = receive_event(&mut client).await;

    client
        .send(Message::Ping(b"are you there".to_vec()))
        .await
        .expect("Failed to send ping");

    let reply = timeout(Duration::from_secs(5), client.next())
        .await
        .expect("Timeout waiting for pong")
        .expect("Stream ended")
        .expect("WebSocket error");
    assert_eq!(reply, Message::Pong(b"are you there".to_vec()));
}
