// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests against a real bound socket: broadcast fan-out, direct
//! routing, unauthorized publish, and frame-size enforcement (spec
//! scenarios S1, S2, S3, S6).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use messaging_core::bridge::WsBridge;
use messaging_core::bus::{Bus, Message as BusMessage};
use messaging_core::client::EndpointKind;
use messaging_core::config::MessagingConfig;
use messaging_core::metrics::Metrics;
use messaging_core::registry::TopicRegistry;
use messaging_core::transport::{build_router, AppState};

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

fn test_config() -> MessagingConfig {
    MessagingConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        max_frame_bytes: 64,
        outbound_queue: 16,
        pong_wait_ms: 60_000,
        write_wait_ms: 10_000,
        presence_debounce_ms: 0,
        presence_stale_threshold_ms: 180_000,
        presence_cleanup_interval_ms: 120_000,
        presence_rate_limit_ms: 0,
        presence_publish_channel_capacity: 16,
        presence_adaptive_debounce: false,
        tracing_enabled: false,
        tracing_service_name: "test".to_owned(),
        tracing_zipkin_url: None,
    }
}

struct Harness {
    base_url: String,
    bus: Arc<Bus>,
}

async fn spawn_server(config: MessagingConfig) -> Harness {
    let config = Arc::new(config);
    let shutdown = CancellationToken::new();
    let registry = Arc::new(TopicRegistry::with_framework_topics());
    let metrics = Arc::new(Metrics::new());
    let bus = Arc::new(Bus::new(Arc::clone(&config)));

    let html_bridge = WsBridge::new(
        EndpointKind::Html,
        Arc::clone(&config),
        Arc::clone(&bus),
        Arc::clone(&registry),
        Arc::clone(&metrics),
        &shutdown,
    );
    html_bridge.start().await;
    let data_bridge = WsBridge::new(
        EndpointKind::Data,
        Arc::clone(&config),
        Arc::clone(&bus),
        Arc::clone(&registry),
        Arc::clone(&metrics),
        &shutdown,
    );
    data_bridge.start().await;

    let router = build_router(AppState { html_bridge, data_bridge });
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    Harness { base_url: format!("ws://{addr}"), bus }
}

async fn connect(base_url: &str, path: &str, user_id: &str) -> WsStream {
    let url = format!("{base_url}{path}?user_id={user_id}");
    let (ws, _) = tokio::time::timeout(TIMEOUT, tokio_tungstenite::connect_async(url))
        .await
        .expect("connect timed out")
        .expect("connect failed");
    ws
}

async fn subscribe(ws: &mut WsStream, topic: &str) {
    let frame = serde_json::json!({"action": "subscribe", "topic": topic}).to_string();
    ws.send(Message::Text(frame.into())).await.expect("send subscribe frame");
}

async fn recv_text(ws: &mut WsStream) -> String {
    let msg = tokio::time::timeout(TIMEOUT, ws.next())
        .await
        .expect("recv timed out")
        .expect("stream ended")
        .expect("ws error");
    match msg {
        Message::Text(text) => text.to_string(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

/// No message arrives within a short window.
async fn assert_silent(ws: &mut WsStream) {
    let result = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(result.is_err(), "expected no frame, but received one");
}

#[tokio::test]
async fn s1_broadcast_fan_out_reaches_every_client() {
    let harness = spawn_server(test_config()).await;

    let mut a = connect(&harness.base_url, "/ws/html", "u1").await;
    let mut b = connect(&harness.base_url, "/ws/html", "u2").await;
    // Give the bridge a moment to register both clients before publishing.
    tokio::time::sleep(Duration::from_millis(50)).await;

    harness
        .bus
        .publish(BusMessage::new("ws.html.broadcast", "system", "<p>hi</p>"))
        .await
        .expect("publish broadcast");

    assert_eq!(recv_text(&mut a).await, "<p>hi</p>");
    assert_eq!(recv_text(&mut b).await, "<p>hi</p>");
}

#[tokio::test]
async fn s2_direct_message_reaches_only_the_addressed_user() {
    let harness = spawn_server(test_config()).await;

    let mut a = connect(&harness.base_url, "/ws/html", "u1").await;
    let mut b = connect(&harness.base_url, "/ws/html", "u2").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let message =
        BusMessage::new("ws.html.direct", "system", "<p>psst</p>").with_metadata("recipient_id", "u2");
    harness.bus.publish(message).await.expect("publish direct");

    assert_eq!(recv_text(&mut b).await, "<p>psst</p>");
    assert_silent(&mut a).await;
}

#[tokio::test]
async fn s3_unsubscribed_action_never_reaches_the_bus() {
    let harness = spawn_server(test_config()).await;
    let mut a = connect(&harness.base_url, "/ws/data", "u1").await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut secret_rx = {
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        harness
            .bus
            .subscribe("secret.topic", move |message| {
                let tx = tx.clone();
                Box::pin(async move {
                    let _ = tx.send(message).await;
                    Ok(())
                }) as Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
            })
            .await
            .expect("subscribe");
        rx
    };

    let frame = serde_json::json!({"action": "secret.topic", "payload": {}}).to_string();
    a.send(Message::Text(frame.into())).await.expect("send");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(secret_rx.try_recv().is_err(), "unsubscribed client must not reach an unwhitelisted topic");

    // Connection stays open: a ping still round-trips through the socket.
    assert!(a.send(Message::Ping(Vec::new().into())).await.is_ok());
}

#[tokio::test]
async fn s6_oversized_frame_closes_the_connection_without_publishing() {
    let harness = spawn_server(test_config()).await;
    let mut ws = connect(&harness.base_url, "/ws/data", "u1").await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut whitelisted_rx = {
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        harness
            .bus
            .subscribe("room.1", move |message| {
                let tx = tx.clone();
                Box::pin(async move {
                    let _ = tx.send(message).await;
                    Ok(())
                }) as Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
            })
            .await
            .expect("subscribe");
        rx
    };

    let oversized = "x".repeat(1024);
    ws.send(Message::Text(oversized.into())).await.expect("send oversized frame");

    let outcome = tokio::time::timeout(TIMEOUT, ws.next()).await.expect("no timeout");
    match outcome {
        Some(Ok(Message::Close(_))) | None => {}
        other => panic!("expected the connection to close on an oversized frame, got {other:?}"),
    }
    assert!(whitelisted_rx.try_recv().is_err());
}

#[tokio::test]
async fn unauthorized_upgrade_without_user_id_is_rejected() {
    let harness = spawn_server(test_config()).await;
    let url = format!("{}/ws/data", harness.base_url);
    let result = tokio::time::timeout(TIMEOUT, tokio_tungstenite::connect_async(url)).await.expect("no timeout");
    assert!(result.is_err(), "upgrade without user_id should fail");
}
