// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::client::EndpointKind;

#[tokio::test]
async fn add_and_get_all_round_trips() {
    let manager = ClientManager::new();
    let (client, _rx) = Client::new("u1", EndpointKind::Html, 4);
    let id = client.id;
    manager.add(client).await;

    let all = manager.get_all().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, id);
}

#[tokio::test]
async fn get_by_user_returns_only_that_users_clients() {
    let manager = ClientManager::new();
    let (a, _rx_a) = Client::new("u1", EndpointKind::Html, 4);
    let (b, _rx_b) = Client::new("u2", EndpointKind::Html, 4);
    manager.add(a).await;
    manager.add(b).await;

    let u1_clients = manager.get_by_user("u1").await;
    assert_eq!(u1_clients.len(), 1);
    assert_eq!(u1_clients[0].user_id, "u1");

    assert!(manager.get_by_user("u3").await.is_empty());
}

#[tokio::test]
async fn remove_closes_client_exactly_once_and_updates_both_indices() {
    let manager = ClientManager::new();
    let (client, _rx) = Client::new("u1", EndpointKind::Data, 4);
    let id = client.id;
    manager.add(client).await;

    manager.remove(id).await;
    assert_eq!(manager.len().await, 0);
    assert!(manager.get_by_user("u1").await.is_empty());

    // Removing again is a no-op, not a double-close panic.
    manager.remove(id).await;
}

#[tokio::test]
async fn close_all_closes_every_client_and_clears_indices() {
    let manager = ClientManager::new();
    let (a, _rx_a) = Client::new("u1", EndpointKind::Html, 4);
    let (b, _rx_b) = Client::new("u1", EndpointKind::Html, 4);
    let a_ref = Arc::clone(&a);
    let b_ref = Arc::clone(&b);
    manager.add(a).await;
    manager.add(b).await;

    manager.close_all().await;

    assert!(manager.is_empty().await);
    assert!(a_ref.is_closed());
    assert!(b_ref.is_closed());
}

#[tokio::test]
async fn multiple_clients_same_user_are_independent_entries() {
    let manager = ClientManager::new();
    let (a, _rx_a) = Client::new("u1", EndpointKind::Html, 4);
    let (b, _rx_b) = Client::new("u1", EndpointKind::Html, 4);
    manager.add(a).await;
    manager.add(b).await;

    assert_eq!(manager.get_by_user("u1").await.len(), 2);
    assert_eq!(manager.len().await, 2);
}
