// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clap::Parser;

#[derive(clap::Parser)]
struct Wrapper {
    #[command(flatten)]
    config: MessagingConfig,
}

fn parse(args: &[&str]) -> MessagingConfig {
    Wrapper::parse_from(std::iter::once("messaging-core").chain(args.iter().copied())).config
}

#[test]
fn defaults_match_spec() {
    let config = parse(&[]);
    assert_eq!(config.max_frame_bytes, 512);
    assert_eq!(config.outbound_queue, 256);
    assert_eq!(config.pong_wait_ms, 60_000);
    assert_eq!(config.write_wait_ms, 10_000);
    assert_eq!(config.presence_debounce_ms, 5_000);
    assert_eq!(config.presence_stale_threshold_ms, 180_000);
    assert_eq!(config.presence_cleanup_interval_ms, 120_000);
}

#[test]
fn ping_period_is_nine_tenths_of_pong_wait() {
    let config = parse(&[]);
    assert_eq!(config.ping_period(), Duration::from_millis(54_000));
}

#[test]
fn overrides_apply() {
    let config = parse(&["--presence-debounce-ms", "0", "--max-frame-bytes", "1024"]);
    assert_eq!(config.presence_debounce_ms, 0);
    assert_eq!(config.presence_debounce(), Duration::ZERO);
    assert_eq!(config.max_frame_bytes, 1024);
}
