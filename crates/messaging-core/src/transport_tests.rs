// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn missing_user_id_is_unauthorized() {
    let query = WsQuery { user_id: None };
    assert_eq!(authorize(&query), Err(CoreError::Unauthorized));
}

#[test]
fn empty_user_id_is_unauthorized() {
    let query = WsQuery { user_id: Some(String::new()) };
    assert_eq!(authorize(&query), Err(CoreError::Unauthorized));
}

#[test]
fn present_user_id_authorizes() {
    let query = WsQuery { user_id: Some("alice".to_owned()) };
    assert_eq!(authorize(&query), Ok("alice".to_owned()));
}
