// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport: builds the axum `Router` exposing `/ws/html`
//! and `/ws/data`.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::bridge::{run_read_task, run_write_task, WsBridge};
use crate::error::CoreError;

/// Shared application state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub html_bridge: Arc<WsBridge>,
    pub data_bridge: Arc<WsBridge>,
}

/// Query parameters for a WebSocket upgrade. Identifying the caller is all
/// this core does; real authentication (tokens, sessions, SSO) is out of
/// scope and left to whatever sits in front of this service.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    user_id: Option<String>,
}

/// Build the router exposing both bridge endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/html", get(upgrade_html))
        .route("/ws/data", get(upgrade_data))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn upgrade_html(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade(state.html_bridge, query, ws).await
}

async fn upgrade_data(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade(state.data_bridge, query, ws).await
}

/// Identify the caller from the query string. Missing or empty `user_id`
/// is unauthorized; there is no token or session validation here.
fn authorize(query: &WsQuery) -> Result<String, CoreError> {
    query.user_id.clone().filter(|id| !id.is_empty()).ok_or(CoreError::Unauthorized)
}

async fn upgrade(bridge: Arc<WsBridge>, query: WsQuery, ws: WebSocketUpgrade) -> axum::response::Response {
    let user_id = match authorize(&query) {
        Ok(user_id) => user_id,
        Err(e) => {
            let (status, body) = e.to_http_response("missing user_id");
            return (status, body).into_response();
        }
    };

    ws.on_upgrade(move |socket| async move {
        let (client, outbound_rx) = bridge.accept(user_id).await;
        let (sink, stream) = socket.split();

        let write_bridge = Arc::clone(&bridge);
        let write_client_id = client.id;
        bridge.spawn_tracked(async move {
            run_write_task(write_bridge, write_client_id, outbound_rx, sink).await;
        });

        let read_bridge = Arc::clone(&bridge);
        let read_client = Arc::clone(&client);
        bridge.spawn_tracked(async move {
            run_read_task(read_bridge, read_client, stream).await;
        });
    })
    .into_response()
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
