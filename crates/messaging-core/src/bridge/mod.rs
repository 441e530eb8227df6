// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket bridge (C5): one per endpoint kind, translating frames to/from
//! bus messages.

mod read_task;
mod write_task;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::RwLock as StdRwLock;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::bus::{Bus, Message};
use crate::client::manager::ClientManager;
use crate::client::{Client, ClientId, EndpointKind};
use crate::config::MessagingConfig;
use crate::metrics::Metrics;
use crate::registry::TopicRegistry;

pub use read_task::run_read_task;
pub use write_task::run_write_task;

/// Append-only, thread-safe set of action names a bridge is prepared to
/// receive from clients. Idempotent: registering an already-present name,
/// or an empty name, does not change membership — but an empty name is
/// rejected as an error so callers notice the mistake.
#[derive(Default)]
pub struct ActionWhitelist {
    actions: StdRwLock<HashSet<String>>,
}

impl ActionWhitelist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_action(&self, name: &str) -> Result<(), &'static str> {
        if name.is_empty() {
            return Err("action name must not be empty");
        }
        self.actions.write().unwrap_or_else(|e| e.into_inner()).insert(name.to_owned());
        Ok(())
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        self.actions.read().unwrap_or_else(|e| e.into_inner()).contains(name)
    }
}

/// Per-bridge `topic -> set<client_id>` table gating which client may
/// *publish* to which topic via its WebSocket frame. Independent of the
/// bus's own subscriptions, which are used for fan-out, not publish gating.
#[derive(Default)]
pub struct SubscriptionTable {
    table: StdRwLock<HashMap<String, HashSet<ClientId>>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, client_id: ClientId, topic: impl Into<String>) {
        self.table.write().unwrap_or_else(|e| e.into_inner()).entry(topic.into()).or_default().insert(client_id);
    }

    pub fn unsubscribe(&self, client_id: ClientId, topic: &str) {
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        if let Some(set) = table.get_mut(topic) {
            set.remove(&client_id);
            if set.is_empty() {
                table.remove(topic);
            }
        }
    }

    pub fn is_subscribed(&self, client_id: ClientId, topic: &str) -> bool {
        self.table
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(topic)
            .is_some_and(|set| set.contains(&client_id))
    }

    /// Remove every subscription belonging to `client_id`, across all topics.
    /// Called from read-task teardown.
    pub fn remove_client(&self, client_id: ClientId) {
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        table.retain(|_, set| {
            set.remove(&client_id);
            !set.is_empty()
        });
    }
}

/// A bridge for one endpoint kind: owns the Client Manager, the action
/// whitelist, the publish-gating subscription table, and the two bus
/// subscriptions (broadcast, direct) that fan bus messages back out to
/// sockets.
pub struct WsBridge {
    pub endpoint: EndpointKind,
    pub config: Arc<MessagingConfig>,
    pub bus: Arc<Bus>,
    pub registry: Arc<TopicRegistry>,
    pub manager: Arc<ClientManager>,
    pub whitelist: Arc<ActionWhitelist>,
    pub subscriptions: Arc<SubscriptionTable>,
    pub metrics: Arc<Metrics>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl WsBridge {
    pub fn new(
        endpoint: EndpointKind,
        config: Arc<MessagingConfig>,
        bus: Arc<Bus>,
        registry: Arc<TopicRegistry>,
        metrics: Arc<Metrics>,
        parent_cancel: &CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            endpoint,
            config,
            bus,
            registry,
            manager: Arc::new(ClientManager::new()),
            whitelist: Arc::new(ActionWhitelist::new()),
            subscriptions: Arc::new(SubscriptionTable::new()),
            metrics,
            cancel: parent_cancel.child_token(),
            tasks: TaskTracker::new(),
        })
    }

    /// Spawn a task tracked by this bridge's shutdown barrier (the read and
    /// write tasks per client).
    pub fn spawn_tracked<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(future);
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Subscribe to the bridge's broadcast and direct topics on the bus.
    /// Both subscriptions share the bridge's internal cancellation token.
    pub async fn start(self: &Arc<Self>) {
        let broadcast_topic = self.endpoint.broadcast_topic();
        let direct_topic = self.endpoint.direct_topic();

        let broadcast_bridge = Arc::clone(self);
        let _ = self
            .bus
            .subscribe_with_cancel(broadcast_topic, self.cancel.clone(), move |message| {
                let bridge = Arc::clone(&broadcast_bridge);
                Box::pin(async move { bridge.handle_broadcast(message).await })
            })
            .await;

        let direct_bridge = Arc::clone(self);
        let _ = self
            .bus
            .subscribe_with_cancel(direct_topic, self.cancel.clone(), move |message| {
                let bridge = Arc::clone(&direct_bridge);
                Box::pin(async move { bridge.handle_direct(message).await })
            })
            .await;
    }

    async fn handle_broadcast(&self, message: Message) -> anyhow::Result<()> {
        for client in self.manager.get_all().await {
            if !client.send_message(message.payload.clone()) {
                self.metrics.record_dropped_frame();
                tracing::warn!(client_id = %client.id, "client send queue full, dropping frame");
            }
        }
        Ok(())
    }

    async fn handle_direct(&self, message: Message) -> anyhow::Result<()> {
        let Some(recipient_id) = message.recipient_id().filter(|s| !s.is_empty()) else {
            tracing::warn!(topic = %message.topic, "direct message missing recipient_id, dropping");
            return Ok(());
        };

        for client in self.manager.get_by_user(recipient_id).await {
            if client.endpoint != self.endpoint {
                continue;
            }
            if !client.send_message(message.payload.clone()) {
                self.metrics.record_dropped_frame();
                tracing::warn!(client_id = %client.id, "client send queue full, dropping frame");
            }
        }
        Ok(())
    }

    /// Register a client and publish `ws.client.ready`.
    pub async fn accept(self: &Arc<Self>, user_id: impl Into<String>) -> (Arc<Client>, tokio::sync::mpsc::Receiver<Bytes>) {
        let (client, rx) = Client::new(user_id, self.endpoint, self.config.outbound_queue);
        self.manager.add(Arc::clone(&client)).await;

        let payload = serde_json::json!({
            "userID": client.user_id,
            "clientID": client.id.to_string(),
            "clientType": self.endpoint.as_str(),
            "endpoint": self.endpoint.as_str(),
        });
        let message = Message::new(
            "ws.client.ready",
            client.user_id.clone(),
            serde_json::to_vec(&payload).unwrap_or_default(),
        );
        if let Err(e) = self.bus.publish(message).await {
            tracing::warn!(err = %e, "failed to publish ws.client.ready");
        }

        (client, rx)
    }

    /// Remove a client from the manager and publish `ws.client.disconnected`.
    pub async fn teardown(&self, client: &Client, reason: &str) {
        self.manager.remove(client.id).await;
        self.subscriptions.remove_client(client.id);

        let payload = serde_json::json!({
            "userID": client.user_id,
            "clientID": client.id.to_string(),
            "clientType": self.endpoint.as_str(),
            "endpoint": self.endpoint.as_str(),
            "reason": reason,
        });
        let message = Message::new(
            "ws.client.disconnected",
            client.user_id.clone(),
            serde_json::to_vec(&payload).unwrap_or_default(),
        );
        if let Err(e) = self.bus.publish(message).await {
            tracing::warn!(err = %e, "failed to publish ws.client.disconnected");
        }
    }

    /// Cancel the bridge's bus subscriptions and close every client's
    /// outbound queue, triggering write-task termination. Waits up to
    /// `deadline` for the Manager to drain; logs on timeout.
    pub async fn shutdown(&self, deadline: std::time::Duration) {
        self.cancel.cancel();
        self.manager.close_all().await;
        self.tasks.close();

        if tokio::time::timeout(deadline, self.tasks.wait()).await.is_err() {
            tracing::warn!(endpoint = self.endpoint.as_str(), "shutdown grace period exceeded");
        }
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
