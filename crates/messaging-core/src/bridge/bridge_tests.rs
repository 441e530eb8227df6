// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use uuid::Uuid;

use super::*;

#[test]
fn allow_action_rejects_empty_name() {
    let whitelist = ActionWhitelist::new();
    assert!(whitelist.allow_action("").is_err());
}

#[test]
fn allow_action_is_idempotent() {
    let whitelist = ActionWhitelist::new();
    assert!(whitelist.allow_action("chat.message").is_ok());
    assert!(whitelist.allow_action("chat.message").is_ok());
    assert!(whitelist.is_allowed("chat.message"));
}

#[test]
fn unregistered_action_is_not_allowed() {
    let whitelist = ActionWhitelist::new();
    assert!(!whitelist.is_allowed("unknown.action"));
}

#[test]
fn subscribe_then_unsubscribe_is_a_noop() {
    let table = SubscriptionTable::new();
    let client_id = Uuid::new_v4();
    assert!(!table.is_subscribed(client_id, "room.1"));

    table.subscribe(client_id, "room.1");
    assert!(table.is_subscribed(client_id, "room.1"));

    table.unsubscribe(client_id, "room.1");
    assert!(!table.is_subscribed(client_id, "room.1"));
}

#[test]
fn subscriptions_are_per_client() {
    let table = SubscriptionTable::new();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    table.subscribe(a, "room.1");
    assert!(table.is_subscribed(a, "room.1"));
    assert!(!table.is_subscribed(b, "room.1"));
}

#[test]
fn remove_client_clears_all_its_subscriptions() {
    let table = SubscriptionTable::new();
    let a = Uuid::new_v4();
    table.subscribe(a, "room.1");
    table.subscribe(a, "room.2");
    table.remove_client(a);
    assert!(!table.is_subscribed(a, "room.1"));
    assert!(!table.is_subscribed(a, "room.2"));
}
