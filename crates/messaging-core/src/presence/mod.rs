// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Presence service (C6): tracks which users have at least one live
//! connection, with debounced offline transitions, a rate-limited
//! publishing path, and periodic stale-connection reaping.

pub mod stats;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::bus::{Bus, Message};
use crate::config::MessagingConfig;
use crate::metrics::Metrics;
use crate::registry::TopicRegistry;
use stats::UserActivityPattern;

/// One (user, client) presence entry. The non-empty set of a user's entries
/// implies the user is online.
#[derive(Debug, Clone)]
pub struct Presence {
    pub user_id: String,
    pub client_id: String,
    pub client_type: String,
    pub last_seen: Instant,
    pub user_agent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientLifecycleEvent {
    #[serde(rename = "userID")]
    user_id: String,
    #[serde(rename = "clientID")]
    client_id: String,
    #[serde(default, rename = "clientType")]
    client_type: String,
}

#[derive(Debug, Deserialize)]
struct HeartbeatEvent {
    #[serde(rename = "userID")]
    user_id: String,
    #[serde(rename = "clientID")]
    client_id: String,
}

#[derive(Debug, Serialize)]
struct PresenceUpdatePayload {
    #[serde(rename = "type")]
    kind: &'static str,
    users: Vec<String>,
}

struct PublishRequest {
    users: Vec<String>,
}

struct DebounceHandle {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct MainState {
    presences: HashMap<String, HashMap<String, Presence>>,
    clients: HashMap<String, String>,
    rate_limiter: HashMap<String, Instant>,
    stats: HashMap<String, UserActivityPattern>,
    /// Users whose last connection closed but whose offline transition is
    /// still debouncing. Counted as online until `finalize_offline` removes
    /// the entry, so a draining user is never dropped from a published
    /// snapshot mid-debounce.
    pending_offline: HashMap<String, DebounceHandle>,
}

impl MainState {
    fn is_online(&self, user_id: &str) -> bool {
        self.presences.get(user_id).is_some_and(|entries| !entries.is_empty())
            || self.pending_offline.contains_key(user_id)
    }

    fn online_users(&self) -> Vec<String> {
        let mut users: HashSet<String> = self
            .presences
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(u, _)| u.clone())
            .collect();
        users.extend(self.pending_offline.keys().cloned());

        let mut users: Vec<String> = users.into_iter().collect();
        users.sort();
        users
    }
}

/// Tracks connection-derived presence and publishes debounced,
/// rate-limited `presence.user.status` updates.
pub struct PresenceService {
    config: Arc<MessagingConfig>,
    bus: Arc<Bus>,
    metrics: Arc<Metrics>,
    state: RwLock<MainState>,
    publish_tx: mpsc::Sender<PublishRequest>,
    publish_rx: Mutex<Option<mpsc::Receiver<PublishRequest>>>,
    cancel: CancellationToken,
    self_weak: OnceLock<Weak<Self>>,
}

impl PresenceService {
    pub fn new(
        config: Arc<MessagingConfig>,
        bus: Arc<Bus>,
        registry: &TopicRegistry,
        metrics: Arc<Metrics>,
        parent_cancel: &CancellationToken,
    ) -> Arc<Self> {
        let _ = registry; // framework presence topics are registered by `TopicRegistry::with_framework_topics`.
        let (publish_tx, publish_rx) = mpsc::channel(config.presence_publish_channel_capacity);
        let service = Arc::new(Self {
            config,
            bus,
            metrics,
            state: RwLock::new(MainState::default()),
            publish_tx,
            publish_rx: Mutex::new(Some(publish_rx)),
            cancel: parent_cancel.child_token(),
            self_weak: OnceLock::new(),
        });
        let _ = service.self_weak.set(Arc::downgrade(&service));
        service
    }

    /// `PresenceService` is only ever constructed via `new`, which seeds
    /// `self_weak` before handing out the `Arc`, so this upgrade cannot fail.
    #[allow(clippy::expect_used)]
    fn arc_self(&self) -> Arc<Self> {
        self.self_weak.get().and_then(Weak::upgrade).expect("PresenceService outlived its own Arc")
    }

    /// Subscribe to connection lifecycle events and start the cleanup
    /// ticker and publishing task.
    pub async fn start(self: &Arc<Self>) {
        let connect_service = Arc::clone(self);
        let _ = self
            .bus
            .subscribe_with_cancel("ws.client.ready", self.cancel.clone(), move |message| {
                let service = Arc::clone(&connect_service);
                Box::pin(async move { service.on_client_ready(message).await })
            })
            .await;

        let disconnect_service = Arc::clone(self);
        let _ = self
            .bus
            .subscribe_with_cancel("ws.client.disconnected", self.cancel.clone(), move |message| {
                let service = Arc::clone(&disconnect_service);
                Box::pin(async move { service.on_client_disconnected(message).await })
            })
            .await;

        let heartbeat_service = Arc::clone(self);
        let _ = self
            .bus
            .subscribe_with_cancel("presence.heartbeat", self.cancel.clone(), move |message| {
                let service = Arc::clone(&heartbeat_service);
                Box::pin(async move { service.on_heartbeat(message).await })
            })
            .await;

        let query_service = Arc::clone(self);
        let _ = self
            .bus
            .subscribe_with_cancel("presence.query", self.cancel.clone(), move |message| {
                let service = Arc::clone(&query_service);
                Box::pin(async move { service.on_query(message).await })
            })
            .await;

        if let Some(rx) = self.publish_rx.lock().await.take() {
            let publisher = Arc::clone(self);
            tokio::spawn(async move { publisher.run_publishing_task(rx).await });
        }

        let cleanup_service = Arc::clone(self);
        tokio::spawn(async move { cleanup_service.run_cleanup_ticker().await });
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    // -- Connect / disconnect ------------------------------------------------

    async fn on_client_ready(&self, message: Message) -> anyhow::Result<()> {
        let event: ClientLifecycleEvent = match serde_json::from_slice(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(err = %e, "malformed ws.client.ready payload");
                return Ok(());
            }
        };

        let now = Instant::now();
        let mut generation_cancelled = false;
        let mut first_connection = false;
        {
            let mut state = self.state.write().await;
            if let Some(handle) = state.pending_offline.remove(&event.user_id) {
                handle.cancel.cancel();
                generation_cancelled = true;
            }

            let entries = state.presences.entry(event.user_id.clone()).or_default();
            if entries.is_empty() {
                first_connection = true;
            }
            entries.insert(
                event.client_id.clone(),
                Presence {
                    user_id: event.user_id.clone(),
                    client_id: event.client_id.clone(),
                    client_type: event.client_type.clone(),
                    last_seen: now,
                    user_agent: None,
                },
            );
            state.clients.insert(event.client_id.clone(), event.user_id.clone());
            state.stats.entry(event.user_id.clone()).or_default().on_connect(now, generation_cancelled);
        }

        if first_connection {
            tracing::info!(user_id = %event.user_id, "user came online");
        }

        self.maybe_enqueue_publish(&event.user_id).await;
        Ok(())
    }

    async fn on_client_disconnected(&self, message: Message) -> anyhow::Result<()> {
        let event: ClientLifecycleEvent = match serde_json::from_slice(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(err = %e, "malformed ws.client.disconnected payload");
                return Ok(());
            }
        };

        let remaining = self.remove_entry(&event.user_id, &event.client_id).await;

        if remaining > 0 {
            self.maybe_enqueue_publish(&event.user_id).await;
            return Ok(());
        }

        {
            let mut state = self.state.write().await;
            state.stats.entry(event.user_id.clone()).or_default().on_disconnect(Instant::now());
        }

        self.schedule_offline_transition(event.user_id).await;
        Ok(())
    }

    async fn on_heartbeat(&self, message: Message) -> anyhow::Result<()> {
        let event: HeartbeatEvent = match serde_json::from_slice(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(err = %e, "malformed presence.heartbeat payload");
                return Ok(());
            }
        };

        let now = Instant::now();
        let mut state = self.state.write().await;
        if let Some(entries) = state.presences.get_mut(&event.user_id) {
            if let Some(presence) = entries.get_mut(&event.client_id) {
                presence.last_seen = now;
            }
        }
        if let Some(pattern) = state.stats.get_mut(&event.user_id) {
            pattern.on_activity(now);
        }
        Ok(())
    }

    async fn on_query(&self, message: Message) -> anyhow::Result<()> {
        #[derive(Deserialize)]
        struct Payload {
            target_user_id: String,
        }
        let payload: Payload = match serde_json::from_slice(&message.payload) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(err = %e, "malformed presence.query payload");
                return Ok(());
            }
        };

        let online = self.is_online(&payload.target_user_id).await;
        let probability = self.presence_probability(&payload.target_user_id).await;

        #[derive(Serialize)]
        struct Response {
            user_id: String,
            online: bool,
            probability: f64,
        }
        let response_payload = Response { user_id: payload.target_user_id, online, probability };
        let response = Message::new(
            "presence.response",
            message.user_id.clone(),
            serde_json::to_vec(&response_payload).unwrap_or_default(),
        )
        .with_metadata("recipient_id", message.user_id.clone());
        let _ = self.bus.publish(response).await;
        Ok(())
    }

    /// Remove one `(user_id, client_id)` entry; returns the user's
    /// remaining connection count.
    async fn remove_entry(&self, user_id: &str, client_id: &str) -> usize {
        let mut state = self.state.write().await;
        state.clients.remove(client_id);
        let remaining = if let Some(entries) = state.presences.get_mut(user_id) {
            entries.remove(client_id);
            entries.len()
        } else {
            0
        };
        remaining
    }

    async fn schedule_offline_transition(&self, user_id: String) {
        let delay = self.effective_debounce_delay(&user_id).await;
        if delay.is_zero() {
            self.finalize_offline(&user_id).await;
            return;
        }

        let generation = {
            let mut state = self.state.write().await;
            let generation = state.pending_offline.get(&user_id).map(|h| h.generation + 1).unwrap_or(0);
            let cancel = self.cancel.child_token();
            state.pending_offline.insert(user_id.clone(), DebounceHandle { generation, cancel: cancel.clone() });
            generation
        };

        let service = self.arc_self();
        tokio::spawn(async move {
            let cancel = {
                let state = service.state.read().await;
                state.pending_offline.get(&user_id).map(|h| h.cancel.clone())
            };
            let Some(cancel) = cancel else { return };

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let still_current = {
                        let mut state = service.state.write().await;
                        match state.pending_offline.get(&user_id) {
                            Some(handle) if handle.generation == generation => {
                                state.pending_offline.remove(&user_id);
                                true
                            }
                            _ => false,
                        }
                    };
                    if still_current {
                        service.finalize_offline(&user_id).await;
                    }
                }
            }
        });
    }

    async fn finalize_offline(&self, user_id: &str) {
        let now = Instant::now();
        let is_empty = {
            let mut state = self.state.write().await;
            let is_empty = state.presences.get(user_id).is_none_or(HashMap::is_empty);
            if is_empty {
                state.presences.remove(user_id);
                state.rate_limiter.remove(user_id);
                if let Some(pattern) = state.stats.get_mut(user_id) {
                    pattern.on_session_end(now);
                }
            }
            is_empty
        };

        if is_empty {
            self.maybe_enqueue_publish(user_id).await;
        }
    }

    async fn effective_debounce_delay(&self, user_id: &str) -> Duration {
        let configured = self.config.presence_debounce();
        if !self.config.presence_adaptive_debounce {
            return configured;
        }
        let state = self.state.read().await;
        match state.stats.get(user_id).and_then(UserActivityPattern::average_reconnect_gap) {
            Some(avg) if avg >= Duration::from_secs(1) && avg < configured => avg,
            _ => configured,
        }
    }

    // -- Stale reaping ---------------------------------------------------------

    async fn run_cleanup_ticker(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.presence_cleanup_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => self.reap_stale().await,
            }
        }
    }

    async fn reap_stale(&self) {
        let threshold = self.config.presence_stale_threshold() + Duration::from_secs(30);
        let now = Instant::now();

        let stale: Vec<(String, String)> = {
            let state = self.state.read().await;
            state
                .presences
                .iter()
                .flat_map(|(user_id, entries)| {
                    entries.values().filter_map(move |presence| {
                        (now.saturating_duration_since(presence.last_seen) > threshold)
                            .then(|| (user_id.clone(), presence.client_id.clone()))
                    })
                })
                .collect()
        };

        if stale.is_empty() {
            return;
        }
        self.metrics.record_stale_reap(stale.len() as u64);

        let mut emptied_users = Vec::new();
        for (user_id, client_id) in &stale {
            let remaining = self.remove_entry(user_id, client_id).await;
            if remaining == 0 {
                emptied_users.push(user_id.clone());
            }
        }

        for user_id in emptied_users {
            {
                let mut state = self.state.write().await;
                if let Some(handle) = state.pending_offline.remove(&user_id) {
                    handle.cancel.cancel();
                }
                state.rate_limiter.remove(&user_id);
            }
            self.maybe_enqueue_publish(&user_id).await;
        }
    }

    // -- Publishing --------------------------------------------------------

    /// Rate-limit-gated enqueue: at most one publish per user per
    /// `presence_rate_limit` window.
    async fn maybe_enqueue_publish(&self, user_id: &str) {
        let now = Instant::now();
        let should_publish = {
            let mut state = self.state.write().await;
            match state.rate_limiter.get(user_id) {
                Some(last) if now.saturating_duration_since(*last) < self.config.presence_rate_limit() => false,
                _ => {
                    state.rate_limiter.insert(user_id.to_owned(), now);
                    true
                }
            }
        };

        if !should_publish {
            return;
        }

        let users = self.state.read().await.online_users();
        if self.publish_tx.send(PublishRequest { users }).await.is_err() {
            self.metrics.record_presence_publish_error();
        }
    }

    async fn run_publishing_task(self: Arc<Self>, mut rx: mpsc::Receiver<PublishRequest>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                request = rx.recv() => {
                    match request {
                        Some(request) => self.publish_status(request).await,
                        None => break,
                    }
                }
            }
        }
    }

    async fn publish_status(&self, request: PublishRequest) {
        let payload = PresenceUpdatePayload { kind: "presence_update", users: request.users };
        let bytes = match serde_json::to_vec(&payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(err = %e, "failed to serialize presence update");
                self.metrics.record_presence_publish_error();
                return;
            }
        };

        let message = Message::new("presence.user.status", "presence-service", bytes);
        if let Err(e) = self.bus.publish(message).await {
            tracing::warn!(err = %e, "failed to publish presence.user.status");
            self.metrics.record_presence_publish_error();
        }
    }

    // -- Queries -------------------------------------------------------------

    pub async fn get_online_users(&self) -> Vec<String> {
        self.state.read().await.online_users()
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.state.read().await.is_online(user_id)
    }

    pub async fn get_presence_probability(&self, user_id: &str) -> f64 {
        self.presence_probability(user_id).await
    }

    async fn presence_probability(&self, user_id: &str) -> f64 {
        let state = self.state.read().await;
        if !state.is_online(user_id) {
            return 0.0;
        }
        match state.stats.get(user_id) {
            Some(pattern) => pattern.presence_probability(Instant::now()),
            None => 0.8,
        }
    }
}

#[cfg(test)]
#[path = "presence_tests.rs"]
mod tests;
