// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Realtime messaging core: an in-process pub/sub bus, a WebSocket bridge
//! for html and data clients, and a connection-derived presence service.

pub mod bridge;
pub mod bus;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod presence;
pub mod registry;
pub mod telemetry;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::bridge::WsBridge;
use crate::bus::Bus;
use crate::client::EndpointKind;
use crate::config::MessagingConfig;
use crate::metrics::Metrics;
use crate::presence::PresenceService;
use crate::registry::TopicRegistry;
use crate::transport::{build_router, AppState};

/// How long shutdown waits for in-flight client tasks to drain before
/// logging a warning and returning anyway.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Run the messaging core until `shutdown_signal` resolves (typically
/// Ctrl-C/SIGTERM), then drain in-flight connections with a bounded grace
/// period.
pub async fn run(config: MessagingConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let config = Arc::new(config);
    let shutdown = CancellationToken::new();

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_shutdown.cancel();
        }
    });

    let registry = Arc::new(TopicRegistry::with_framework_topics());
    let metrics = Arc::new(Metrics::new());
    let bus = Arc::new(Bus::new(Arc::clone(&config)));

    let html_bridge =
        WsBridge::new(EndpointKind::Html, Arc::clone(&config), Arc::clone(&bus), Arc::clone(&registry), Arc::clone(&metrics), &shutdown);
    html_bridge.start().await;
    let data_bridge =
        WsBridge::new(EndpointKind::Data, Arc::clone(&config), Arc::clone(&bus), Arc::clone(&registry), Arc::clone(&metrics), &shutdown);
    data_bridge.start().await;

    let presence =
        PresenceService::new(Arc::clone(&config), Arc::clone(&bus), &registry, Arc::clone(&metrics), &shutdown);
    presence.start().await;

    let state = AppState { html_bridge: Arc::clone(&html_bridge), data_bridge: Arc::clone(&data_bridge) };
    let router = build_router(state);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "messaging-core listening");

    axum::serve(listener, router).with_graceful_shutdown(shutdown.clone().cancelled_owned()).await?;

    tracing::info!("shutting down, draining in-flight connections");
    html_bridge.shutdown(SHUTDOWN_GRACE).await;
    data_bridge.shutdown(SHUTDOWN_GRACE).await;
    bus.close().await;
    presence.shutdown();

    Ok(())
}
