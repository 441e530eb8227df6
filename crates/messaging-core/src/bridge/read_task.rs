// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-client read task (§4.4.2).

use std::sync::Arc;

use axum::extract::ws::Message as WsMessage;
use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use serde::Deserialize;

use super::WsBridge;
use crate::bus::Message;
use crate::client::Client;

/// Subscription control frame: `{"action":"subscribe"|"unsubscribe","topic":"...","payload":{"channel":"..."}}`.
#[derive(Debug, Deserialize)]
struct SubscriptionControl {
    action: String,
    topic: String,
    #[serde(default)]
    payload: Option<SubscriptionPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct SubscriptionPayload {
    channel: Option<String>,
}

/// Application frame: `{"action":"...","topic":"...","payload":{...}}`.
#[derive(Debug, Deserialize)]
struct ApplicationFrame {
    action: String,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    payload: serde_json::Value,
}

/// Drive one client's inbound frames until the socket closes or errors.
///
/// Malformed JSON, an unknown action, or an unsubscribed topic are logged
/// and the loop continues — the connection stays open. The bridge's
/// teardown (remove from Manager, publish `ws.client.disconnected`) always
/// runs on exit, regardless of why the loop ended.
pub async fn run_read_task(
    bridge: Arc<WsBridge>,
    client: Arc<Client>,
    mut stream: SplitStream<axum::extract::ws::WebSocket>,
) {
    let reason = loop {
        let cancel = bridge.cancel_token();
        let frame = tokio::select! {
            _ = cancel.cancelled() => break "shutdown",
            frame = stream.next() => frame,
        };

        let Some(frame) = frame else { break "read closed" };
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break "client closed",
            Ok(_) => continue, // ping/pong/binary ignored
            Err(e) => {
                tracing::debug!(client_id = %client.id, err = %e, "websocket read error");
                break "read error";
            }
        };

        if text.len() > bridge.config.max_frame_bytes {
            tracing::warn!(client_id = %client.id, len = text.len(), "message too large, closing connection");
            break "frame too large";
        }

        if let Ok(control) = serde_json::from_str::<SubscriptionControl>(&text) {
            if matches!(control.action.as_str(), "subscribe" | "unsubscribe") {
                handle_subscription(&bridge, client.id, control);
                continue;
            }
        }

        match serde_json::from_str::<ApplicationFrame>(&text) {
            Ok(frame) => handle_application_frame(&bridge, &client, frame).await,
            Err(e) => {
                tracing::warn!(client_id = %client.id, err = %e, "malformed client frame, dropping");
            }
        }
    };

    bridge.teardown(&client, reason).await;
}

fn handle_subscription(bridge: &WsBridge, client_id: crate::client::ClientId, control: SubscriptionControl) {
    let topic = match control.payload.and_then(|p| p.channel) {
        Some(channel) if !channel.is_empty() => format!("{}.{}", control.topic, channel),
        _ => control.topic,
    };

    match control.action.as_str() {
        "subscribe" => bridge.subscriptions.subscribe(client_id, topic),
        "unsubscribe" => bridge.subscriptions.unsubscribe(client_id, &topic),
        _ => {}
    }
}

async fn handle_application_frame(bridge: &WsBridge, client: &Client, frame: ApplicationFrame) {
    if frame.action.is_empty() || !bridge.whitelist.is_allowed(&frame.action) {
        tracing::warn!(client_id = %client.id, action = %frame.action, "action not whitelisted, dropping frame");
        return;
    }

    let topic = frame.topic.unwrap_or_else(|| frame.action.clone());
    if !bridge.subscriptions.is_subscribed(client.id, &topic) {
        tracing::warn!(client_id = %client.id, %topic, "client not subscribed to topic, dropping frame");
        return;
    }

    let payload = serde_json::to_vec(&frame.payload).unwrap_or_default();
    let message = Message::new(topic, client.user_id.clone(), payload);
    if let Err(e) = bridge.bus.publish(message).await {
        tracing::warn!(client_id = %client.id, err = %e, "failed to publish client message");
    }
}
