// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket client state (C3).

pub mod manager;

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;

/// Which bridge/socket a client is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    Html,
    Data,
}

impl EndpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Data => "data",
        }
    }

    pub fn broadcast_topic(&self) -> String {
        format!("ws.{}.broadcast", self.as_str())
    }

    pub fn direct_topic(&self) -> String {
        format!("ws.{}.direct", self.as_str())
    }
}

pub type ClientId = uuid::Uuid;

/// One connection's state: identity and outbound queue.
pub struct Client {
    pub id: ClientId,
    pub user_id: String,
    pub endpoint: EndpointKind,
    outbound_tx: mpsc::Sender<Bytes>,
    closed: AtomicBool,
}

impl Client {
    pub fn new(
        user_id: impl Into<String>,
        endpoint: EndpointKind,
        outbound_queue: usize,
    ) -> (std::sync::Arc<Self>, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(outbound_queue);
        let client = std::sync::Arc::new(Self {
            id: uuid::Uuid::new_v4(),
            user_id: user_id.into(),
            endpoint,
            outbound_tx: tx,
            closed: AtomicBool::new(false),
        });
        (client, rx)
    }

    /// Non-blocking enqueue. Drops and returns `false` if the queue is full
    /// or the client is already closed.
    pub fn send_message(&self, payload: Bytes) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        match self.outbound_tx.try_send(payload) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => false,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Idempotent. Subsequent `send_message` calls become no-ops once closed.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
