// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rolling per-user statistics feeding the adaptive debounce delay and the
//! presence-probability heuristic (§4.5.5, §3 `UserActivityPattern`).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const HISTORY_LEN: usize = 20;

/// Per-client status in the optional learning layer (§3). Not currently
/// surfaced outside the presence service; kept as the vocabulary the
/// adaptive layer reasons in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Active,
    Suspected,
    Stale,
    Reconnecting,
    Offline,
}

/// Rolling statistics for one user, used to adapt the offline debounce
/// delay and to compute `GetPresenceProbability`.
#[derive(Debug, Default)]
pub struct UserActivityPattern {
    reconnect_count: u32,
    /// How long each completed session (connect → fully offline) lasted.
    session_durations: VecDeque<Duration>,
    /// How long each reconnect took to happen after the disconnect that
    /// preceded it.
    reconnect_gaps: VecDeque<Duration>,
    current_session_started: Option<Instant>,
    /// Set when the user's last live connection closes; cleared by the
    /// reconnect it was waiting for, or by the session finally ending.
    draining_since: Option<Instant>,
    last_activity: Option<Instant>,
}

impl UserActivityPattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect(&mut self, now: Instant, is_reconnect: bool) {
        if is_reconnect {
            self.reconnect_count += 1;
            if let Some(draining_since) = self.draining_since.take() {
                self.reconnect_gaps.push_back(now.saturating_duration_since(draining_since));
                while self.reconnect_gaps.len() > HISTORY_LEN {
                    self.reconnect_gaps.pop_front();
                }
            }
        }
        if self.current_session_started.is_none() {
            self.current_session_started = Some(now);
        }
        self.last_activity = Some(now);
    }

    pub fn on_activity(&mut self, now: Instant) {
        self.last_activity = Some(now);
    }

    /// Called when a user's last live connection closes and an offline
    /// transition starts debouncing, so a reconnect that cancels it can
    /// measure how long the gap actually was.
    pub fn on_disconnect(&mut self, now: Instant) {
        self.draining_since = Some(now);
    }

    /// Called when a user's last connection finally goes offline (after
    /// debounce, not on every disconnect — a reconnect within the debounce
    /// window is not a session boundary).
    pub fn on_session_end(&mut self, now: Instant) {
        if let Some(started) = self.current_session_started.take() {
            self.session_durations.push_back(now.saturating_duration_since(started));
            while self.session_durations.len() > HISTORY_LEN {
                self.session_durations.pop_front();
            }
        }
        self.draining_since = None;
    }

    /// Average gap between a disconnect and the reconnect that followed it,
    /// if we have history — the §4.5.2 "historical average reconnection
    /// time" used to pick an adaptive debounce delay in place of the fixed
    /// default.
    pub fn average_reconnect_gap(&self) -> Option<Duration> {
        if self.reconnect_gaps.is_empty() {
            return None;
        }
        let total: Duration = self.reconnect_gaps.iter().sum();
        Some(total / self.reconnect_gaps.len() as u32)
    }

    /// Average length of a completed connect-to-offline session, used only
    /// by the presence-probability heuristic below.
    fn average_session_duration(&self) -> Option<Duration> {
        if self.session_durations.is_empty() {
            return None;
        }
        let total: Duration = self.session_durations.iter().sum();
        Some(total / self.session_durations.len() as u32)
    }

    pub fn presence_probability(&self, now: Instant) -> f64 {
        let mut probability = 0.8_f64;

        if self.reconnect_count > 3 {
            probability += 0.1;
        }
        if let Some(avg) = self.average_session_duration() {
            if avg < Duration::from_secs(5 * 60) {
                probability -= 0.1;
            }
        }
        if let Some(last) = self.last_activity {
            if now.saturating_duration_since(last) < Duration::from_secs(30) {
                probability += 0.05;
            }
        }

        probability.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;
