// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn counters_start_at_zero() {
    let metrics = Metrics::new();
    assert_eq!(metrics.dropped_frames(), 0);
    assert_eq!(metrics.stale_reaps(), 0);
    assert_eq!(metrics.presence_publish_errors(), 0);
}

#[test]
fn counters_accumulate() {
    let metrics = Metrics::new();
    metrics.record_dropped_frame();
    metrics.record_dropped_frame();
    metrics.record_stale_reap(3);
    metrics.record_presence_publish_error();
    assert_eq!(metrics.dropped_frames(), 2);
    assert_eq!(metrics.stale_reaps(), 3);
    assert_eq!(metrics.presence_publish_errors(), 1);
}
