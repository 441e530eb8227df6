// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use messaging_core::config::MessagingConfig;

/// Top-level CLI, flattening `MessagingConfig`'s args so the config struct
/// stays reusable from `#[command(flatten)]` in tests without a `Parser`
/// impl of its own.
#[derive(Parser)]
struct Cli {
    #[command(flatten)]
    config: MessagingConfig,
}

#[tokio::main]
async fn main() {
    let config = Cli::parse().config;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = messaging_core::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
