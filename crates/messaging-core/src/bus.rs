// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process publish/subscribe bus.
//!
//! Each `subscribe` call gets its own bounded `mpsc` channel and a dedicated
//! dispatch task. Publishing to a topic enqueues onto every current
//! subscription's channel; a full channel makes `publish` wait (strict
//! back-pressure) until space frees up or the subscriber's cancellation
//! token fires. This gives per-subscription FIFO and independent fan-out
//! without holding any lock across an `await`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::MessagingConfig;
use crate::error::CoreError;
use crate::telemetry;

/// A message flowing through the bus. Payload is opaque bytes; conventionally
/// JSON or rendered HTML.
#[derive(Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub user_id: String,
    pub payload: bytes::Bytes,
    pub metadata: HashMap<String, String>,
    /// Assigned by `Bus::publish` from its monotonic counter; zero until then.
    pub message_id: u64,
}

impl Message {
    pub fn new(topic: impl Into<String>, user_id: impl Into<String>, payload: impl Into<bytes::Bytes>) -> Self {
        Self { topic: topic.into(), user_id: user_id.into(), payload: payload.into(), metadata: HashMap::new(), message_id: 0 }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The `metadata.recipient_id` carried by direct messages, if present.
    pub fn recipient_id(&self) -> Option<&str> {
        self.metadata.get("recipient_id").map(String::as_str)
    }
}

/// A typed wrapper pairing a topic with a payload schema.
///
/// Publishing serializes `T` to JSON; subscribing deserializes and skips
/// (logs a warning for) malformed payloads rather than failing the whole
/// subscription.
pub struct TypedEvent<T> {
    pub topic: String,
    _marker: std::marker::PhantomData<T>,
}

impl<T> TypedEvent<T>
where
    T: Serialize + for<'de> Deserialize<'de> + Send + Sync + 'static,
{
    pub fn new(topic: impl Into<String>) -> Self {
        Self { topic: topic.into(), _marker: std::marker::PhantomData }
    }

    pub async fn publish(&self, bus: &Bus, user_id: &str, payload: &T) -> Result<(), CoreError> {
        let bytes = serde_json::to_vec(payload).unwrap_or_default();
        bus.publish(Message::new(self.topic.clone(), user_id, bytes)).await
    }

    /// Subscribe with a handler that receives the deserialized payload.
    /// Malformed payloads are logged and skipped; the subscription stays alive.
    pub async fn subscribe<F, Fut>(&self, bus: &Bus, handler: F) -> Result<(), CoreError>
    where
        F: Fn(Message, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        bus.subscribe(self.topic.clone(), move |message| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                match serde_json::from_slice::<T>(&message.payload) {
                    Ok(payload) => handler(message.clone(), payload).await,
                    Err(e) => {
                        tracing::warn!(topic = %message.topic, err = %e, "malformed typed event payload");
                        Ok(())
                    }
                }
            }) as BoxFuture
        })
        .await
    }
}

type BoxFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
type Handler = Arc<dyn Fn(Message) -> BoxFuture + Send + Sync>;

struct Subscription {
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
}

/// In-process pub/sub broker.
pub struct Bus {
    subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,
    closed: AtomicBool,
    subscription_queue_capacity: usize,
    next_message_id: AtomicU64,
    config: Arc<MessagingConfig>,
}

impl Bus {
    pub fn new(config: Arc<MessagingConfig>) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            subscription_queue_capacity: 64,
            next_message_id: AtomicU64::new(1),
            config,
        }
    }

    /// Enqueue `message` on every current subscription of `message.topic`,
    /// in fan-out order. Blocks on a full subscription queue until space
    /// frees up or that subscription is cancelled (strict back-pressure).
    /// Fails only if the bus is closed.
    pub async fn publish(&self, mut message: Message) -> Result<(), CoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoreError::BusClosed);
        }

        message.message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        let span = telemetry::publish_span(&self.config, &message);

        async move {
            let senders: Vec<(mpsc::Sender<Message>, CancellationToken)> = {
                let subs = self.subscriptions.read().await;
                match subs.get(&message.topic) {
                    Some(list) => list.iter().map(|s| (s.tx.clone(), s.cancel.clone())).collect(),
                    None => Vec::new(),
                }
            };

            for (tx, cancel) in senders {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    result = tx.send(message.clone()) => {
                        if result.is_err() {
                            tracing::debug!(topic = %message.topic, "subscriber channel closed during publish");
                        }
                    }
                }
            }

            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Register `handler` on `topic`. Returns immediately; delivery happens
    /// on a dedicated dispatch task. If `handler` returns an error the bus
    /// logs it and continues — delivery is not retried.
    pub async fn subscribe<F>(&self, topic: impl Into<String>, handler: F) -> Result<(), CoreError>
    where
        F: Fn(Message) -> BoxFuture + Send + Sync + 'static,
    {
        self.subscribe_with_cancel(topic, CancellationToken::new(), handler).await
    }

    /// Like [`subscribe`](Self::subscribe) but ties the subscription's
    /// lifetime to a caller-supplied cancellation token: when it fires, the
    /// dispatch task exits and the bus releases the handler.
    pub async fn subscribe_with_cancel<F>(
        &self,
        topic: impl Into<String>,
        cancel: CancellationToken,
        handler: F,
    ) -> Result<(), CoreError>
    where
        F: Fn(Message) -> BoxFuture + Send + Sync + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoreError::BusClosed);
        }

        let topic = topic.into();
        let (tx, mut rx) = mpsc::channel::<Message>(self.subscription_queue_capacity);
        let handler: Handler = Arc::new(handler);

        {
            let mut subs = self.subscriptions.write().await;
            subs.entry(topic.clone()).or_default().push(Subscription { tx, cancel: cancel.clone() });
        }

        let config = Arc::clone(&self.config);
        let dispatch_topic = topic;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    message = rx.recv() => {
                        match message {
                            Some(message) => {
                                let span = telemetry::delivery_span(&config, &message);
                                async {
                                    if let Err(e) = handler(message).await {
                                        tracing::warn!(topic = %dispatch_topic, err = %e, "subscriber handler failed");
                                    }
                                }
                                .instrument(span)
                                .await;
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        Ok(())
    }

    /// Stop all subscription dispatch tasks; further `publish` calls fail.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let mut subs = self.subscriptions.write().await;
        for list in subs.values() {
            for sub in list {
                sub.cancel.cancel();
            }
        }
        subs.clear();
    }

    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.subscriptions.read().await.get(topic).map(Vec::len).unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
