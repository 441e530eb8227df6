// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-endpoint client indices (C4): client-id → client, user-id → set<client-id>.
//!
//! A single reader/writer lock guards both indices so they never drift out
//! of sync. Reads copy into a `Vec` before returning so callers never hold
//! the lock across a broadcast fan-out.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

use super::{Client, ClientId};

#[derive(Default)]
struct Indices {
    by_id: HashMap<ClientId, Arc<Client>>,
    by_user: HashMap<String, HashSet<ClientId>>,
}

/// Tracks every live client on one bridge.
#[derive(Default)]
pub struct ClientManager {
    indices: RwLock<Indices>,
}

impl ClientManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, client: Arc<Client>) {
        let mut indices = self.indices.write().await;
        indices.by_user.entry(client.user_id.clone()).or_default().insert(client.id);
        indices.by_id.insert(client.id, client);
    }

    /// Remove the client and close its outbound queue exactly once.
    pub async fn remove(&self, id: ClientId) {
        let mut indices = self.indices.write().await;
        if let Some(client) = indices.by_id.remove(&id) {
            if let Some(set) = indices.by_user.get_mut(&client.user_id) {
                set.remove(&id);
                if set.is_empty() {
                    indices.by_user.remove(&client.user_id);
                }
            }
            client.close();
        }
    }

    /// Point-in-time snapshot of every client.
    pub async fn get_all(&self) -> Vec<Arc<Client>> {
        self.indices.read().await.by_id.values().cloned().collect()
    }

    /// Point-in-time snapshot of a user's clients.
    pub async fn get_by_user(&self, user_id: &str) -> Vec<Arc<Client>> {
        let indices = self.indices.read().await;
        match indices.by_user.get(user_id) {
            Some(ids) => ids.iter().filter_map(|id| indices.by_id.get(id).cloned()).collect(),
            None => Vec::new(),
        }
    }

    pub async fn len(&self) -> usize {
        self.indices.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Close every client and clear both indices. Used during bridge shutdown.
    pub async fn close_all(&self) {
        let mut indices = self.indices.write().await;
        for client in indices.by_id.values() {
            client.close();
        }
        indices.by_id.clear();
        indices.by_user.clear();
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
