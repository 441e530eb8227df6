// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-client write task (§4.4.3).

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message as WsMessage};
use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::sync::mpsc;

use super::WsBridge;
use crate::client::ClientId;

/// Drive one client's outbound queue: forward enqueued frames as text, send
/// a close frame when the queue is closed, and ping on a `ping_period`
/// ticker. Exits on any write error or once the queue closes.
pub async fn run_write_task(
    bridge: Arc<WsBridge>,
    client_id: ClientId,
    mut outbound_rx: mpsc::Receiver<Bytes>,
    mut sink: SplitSink<axum::extract::ws::WebSocket, WsMessage>,
) {
    let write_wait = bridge.config.write_wait();
    let mut ping_ticker = tokio::time::interval(bridge.config.ping_period());
    ping_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // Consume the immediate first tick so a ping isn't sent at time zero.
    ping_ticker.tick().await;

    loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                match frame {
                    Some(payload) => {
                        let text = String::from_utf8_lossy(&payload).into_owned();
                        let result = tokio::time::timeout(write_wait, sink.send(WsMessage::Text(text.into()))).await;
                        if !matches!(result, Ok(Ok(()))) {
                            break;
                        }
                    }
                    None => {
                        let _ = tokio::time::timeout(
                            write_wait,
                            sink.send(WsMessage::Close(Some(CloseFrame {
                                code: axum::extract::ws::close_code::NORMAL,
                                reason: "shutdown".into(),
                            }))),
                        )
                        .await;
                        break;
                    }
                }
            }
            _ = ping_ticker.tick() => {
                let result = tokio::time::timeout(write_wait, sink.send(WsMessage::Ping(Bytes::new()))).await;
                if !matches!(result, Ok(Ok(()))) {
                    tracing::debug!(client_id = %client_id, "ping write failed or timed out, closing");
                    break;
                }
            }
        }
    }
}
