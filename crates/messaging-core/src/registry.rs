// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Topic registry: the authoritative catalog of valid topic names.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Scope a topic is declared under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicScope {
    Framework,
    Module,
}

/// An immutable, registered topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub scope: TopicScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Topic {
    /// Build a framework-scoped topic with no module.
    pub fn framework(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: TopicScope::Framework,
            module: None,
            description: description.into(),
            pattern: None,
            example: None,
            metadata: HashMap::new(),
        }
    }

    /// Build a module-scoped topic. `module` must equal the first dot-segment of `name`.
    pub fn module(
        name: impl Into<String>,
        module: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            scope: TopicScope::Module,
            module: Some(module.into()),
            description: description.into(),
            pattern: None,
            example: None,
            metadata: HashMap::new(),
        }
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.name.is_empty()
            || !self.name.split('.').all(|seg| !seg.is_empty() && valid_segment(seg))
        {
            return Err(CoreError::InvalidTopicName);
        }

        match (self.scope, &self.module) {
            (TopicScope::Framework, Some(_)) => Err(CoreError::InvalidTopicName),
            (TopicScope::Module, None) => Err(CoreError::InvalidTopicName),
            (TopicScope::Module, Some(module)) => {
                let first_segment = self.name.split('.').next().unwrap_or_default();
                if first_segment != module {
                    return Err(CoreError::InvalidTopicName);
                }
                Ok(())
            }
            (TopicScope::Framework, None) => Ok(()),
        }
    }
}

fn valid_segment(segment: &str) -> bool {
    segment.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

/// The authoritative catalog of registered topics.
///
/// Thread-safe; registration is idempotent for identical re-registration and
/// fails on a conflicting redefinition of an existing name.
#[derive(Default)]
pub struct TopicRegistry {
    topics: RwLock<HashMap<String, Topic>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self { topics: RwLock::new(HashMap::new()) }
    }

    /// Register a topic. No-op if an identical topic with the same name is
    /// already registered; errors if a *different* topic shares the name.
    pub fn register(&self, topic: Topic) -> Result<(), CoreError> {
        topic.validate()?;
        let mut topics = self.topics.write().unwrap_or_else(|e| e.into_inner());
        match topics.get(&topic.name) {
            Some(existing) if existing == &topic => Ok(()),
            Some(_) => Err(CoreError::TopicConflict),
            None => {
                topics.insert(topic.name.clone(), topic);
                Ok(())
            }
        }
    }

    /// Register a topic, panicking on conflict. Intended for start-up wiring
    /// where a conflict indicates a programming error, not a runtime fault.
    #[allow(clippy::panic)]
    pub fn must_register(&self, topic: Topic) {
        if let Err(e) = self.register(topic.clone()) {
            panic!("conflicting topic registration for {:?}: {e}", topic.name);
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.topics.read().unwrap_or_else(|e| e.into_inner()).contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Topic> {
        self.topics.read().unwrap_or_else(|e| e.into_inner()).get(name).cloned()
    }

    pub fn list(&self) -> Vec<Topic> {
        self.topics.read().unwrap_or_else(|e| e.into_inner()).values().cloned().collect()
    }

    /// Build a registry pre-populated with the twelve framework topics the
    /// core always registers.
    pub fn with_framework_topics() -> Self {
        let registry = Self::new();
        for name in FRAMEWORK_TOPICS {
            registry.must_register(Topic::framework(*name, framework_topic_description(name)));
        }
        registry
    }
}

/// Framework topics the core always registers at start-up.
pub const FRAMEWORK_TOPICS: &[&str] = &[
    "ws.html.broadcast",
    "ws.html.direct",
    "ws.data.broadcast",
    "ws.data.direct",
    "ws.client.ready",
    "ws.client.disconnected",
    "presence.user.online",
    "presence.user.offline",
    "presence.user.status",
    "presence.heartbeat",
    "presence.query",
    "presence.response",
];

fn framework_topic_description(name: &str) -> &'static str {
    match name {
        "ws.html.broadcast" => "Fan out an HTML fragment to every client on the html endpoint.",
        "ws.html.direct" => "Deliver an HTML fragment to one user's html-endpoint clients.",
        "ws.data.broadcast" => "Fan out a structured payload to every client on the data endpoint.",
        "ws.data.direct" => "Deliver a structured payload to one user's data-endpoint clients.",
        "ws.client.ready" => "A client finished its WebSocket upgrade and was registered.",
        "ws.client.disconnected" => "A client's read/write tasks finished and it was removed.",
        "presence.user.online" => "A user transitioned from offline to online.",
        "presence.user.offline" => "A user transitioned from online to offline.",
        "presence.user.status" => "The current snapshot of online users.",
        "presence.heartbeat" => "A liveness ping for a connection, refreshing its last-seen time.",
        "presence.query" => "A request for a user's current online status.",
        "presence.response" => "The response to a presence.query request.",
        _ => "",
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
