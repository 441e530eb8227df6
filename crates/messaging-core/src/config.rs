// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

/// Configuration for the messaging core.
#[derive(Debug, Clone, clap::Args)]
pub struct MessagingConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "MESSAGING_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080, env = "MESSAGING_PORT")]
    pub port: u16,

    /// Maximum accepted WebSocket frame size, in bytes.
    #[arg(long, default_value_t = 512, env = "WS_MAX_FRAME_BYTES")]
    pub max_frame_bytes: usize,

    /// Capacity of each client's outbound queue.
    #[arg(long, default_value_t = 256, env = "WS_OUTBOUND_QUEUE")]
    pub outbound_queue: usize,

    /// How long the server waits for a pong before considering the peer gone.
    #[arg(long, default_value_t = 60_000, env = "WS_PONG_WAIT_MS")]
    pub pong_wait_ms: u64,

    /// Timeout for a single frame write.
    #[arg(long, default_value_t = 10_000, env = "WS_WRITE_WAIT_MS")]
    pub write_wait_ms: u64,

    /// Grace window after a user's last connection closes before they are
    /// reported offline. Zero disables debouncing.
    #[arg(long, default_value_t = 5_000, env = "PRESENCE_DEBOUNCE_MS")]
    pub presence_debounce_ms: u64,

    /// Elapsed `last_seen` age, beyond the debounce, at which a stale
    /// connection is reaped.
    #[arg(long, default_value_t = 180_000, env = "PRESENCE_STALE_THRESHOLD_MS")]
    pub presence_stale_threshold_ms: u64,

    /// How often the stale-connection reaper ticks.
    #[arg(long, default_value_t = 120_000, env = "PRESENCE_CLEANUP_INTERVAL_MS")]
    pub presence_cleanup_interval_ms: u64,

    /// Minimum spacing between presence broadcasts for the same user.
    #[arg(long, default_value_t = 1_000, env = "PRESENCE_RATE_LIMIT_MS")]
    pub presence_rate_limit_ms: u64,

    /// Capacity of the presence service's internal publish channel.
    #[arg(long, default_value_t = 100, env = "PRESENCE_PUBLISH_CHANNEL_CAPACITY")]
    pub presence_publish_channel_capacity: usize,

    /// Use the adaptive debounce delay learned from a user's reconnect history
    /// instead of the fixed `presence_debounce_ms`, when available.
    #[arg(long, default_value_t = false, env = "PRESENCE_ADAPTIVE_DEBOUNCE")]
    pub presence_adaptive_debounce: bool,

    /// Enable the publish/delivery tracing spans.
    #[arg(long, default_value_t = false, env = "PUBSUB_TRACING_ENABLED")]
    pub tracing_enabled: bool,

    /// Service name attached to tracing spans when tracing is enabled.
    #[arg(long, default_value = "messaging-core", env = "PUBSUB_SERVICE_NAME")]
    pub tracing_service_name: String,

    /// Zipkin collector URL. Stored and attached as a span resource
    /// attribute only; no exporter is wired up (observability backends are
    /// out of scope for this core).
    #[arg(long, env = "PUBSUB_ZIPKIN_URL")]
    pub tracing_zipkin_url: Option<String>,
}

impl MessagingConfig {
    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_millis(self.write_wait_ms)
    }

    /// `ping_period = 9 * pong_wait / 10`.
    pub fn ping_period(&self) -> Duration {
        self.pong_wait() * 9 / 10
    }

    pub fn presence_debounce(&self) -> Duration {
        Duration::from_millis(self.presence_debounce_ms)
    }

    pub fn presence_stale_threshold(&self) -> Duration {
        Duration::from_millis(self.presence_stale_threshold_ms)
    }

    pub fn presence_cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.presence_cleanup_interval_ms)
    }

    pub fn presence_rate_limit(&self) -> Duration {
        Duration::from_millis(self.presence_rate_limit_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
