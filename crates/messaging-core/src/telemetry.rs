// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Optional tracing spans around bus publish/delivery.
//!
//! Wiring a real exporter from `PUBSUB_ZIPKIN_URL` is out of scope; this
//! module only shapes the span fields the spec names.

use tracing::Span;

use crate::bus::Message;
use crate::config::MessagingConfig;

/// Truncate `s` to at most `max_bytes`, stepping back to the nearest
/// preceding UTF-8 char boundary so multi-byte payload previews never panic.
pub fn truncate_preview(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Open a span for a `Publish` call. A no-op span (not recorded) when
/// tracing is disabled in configuration — spans are cheap to create but the
/// preview computation is skipped entirely.
pub fn publish_span(config: &MessagingConfig, message: &Message) -> Span {
    if !config.tracing_enabled {
        return Span::none();
    }
    let preview = String::from_utf8_lossy(&message.payload);
    let preview = truncate_preview(&preview, 100);
    tracing::info_span!(
        "pubsub.publish",
        system = "pubsub",
        operation = "publish",
        destination = %message.topic,
        message_id = message.message_id,
        user_id = %message.user_id,
        payload_size = message.payload.len(),
        payload_preview = %preview,
        "service.name" = %config.tracing_service_name,
    )
}

/// Open a span for a single subscriber delivery.
pub fn delivery_span(config: &MessagingConfig, message: &Message) -> Span {
    if !config.tracing_enabled {
        return Span::none();
    }
    let preview = String::from_utf8_lossy(&message.payload);
    let preview = truncate_preview(&preview, 100);
    tracing::info_span!(
        "pubsub.deliver",
        system = "pubsub",
        operation = "deliver",
        destination = %message.topic,
        message_id = message.message_id,
        user_id = %message.user_id,
        payload_size = message.payload.len(),
        payload_preview = %preview,
        "service.name" = %config.tracing_service_name,
    )
}

#[cfg(test)]
#[path = "telemetry_tests.rs"]
mod tests;
