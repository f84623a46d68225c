//! Reconnection backoff for the auxiliary connection.
//!
//! [`ReconnectState`] is polled from the world tick rather than driving its
//! own timer: [`ReconnectState::ready`] says whether an attempt may start,
//! and [`ReconnectState::schedule`] records one and pushes the deadline out
//! by the current interval before doubling it.

use std::time::{Duration, Instant};

/// Backoff parameters.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Interval after the first attempt. Default: 1 s.
    pub initial_delay: Duration,
    /// Multiplier applied after each attempt. Default: 2.
    pub backoff_multiplier: u32,
    /// Longest interval between attempts. Default: 6 s.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2,
            max_delay: Duration::from_secs(6),
        }
    }
}

/// Attempt counter, current interval, and next permitted attempt time.
#[derive(Debug, Clone)]
pub struct ReconnectState {
    config: ReconnectConfig,
    attempts: u32,
    current_delay: Duration,
    deadline: Option<Instant>,
}

impl Default for ReconnectState {
    fn default() -> Self {
        Self::new(ReconnectConfig::default())
    }
}

impl ReconnectState {
    /// Create a new state from the given config. The first attempt is
    /// permitted immediately.
    pub fn new(config: ReconnectConfig) -> Self {
        let initial = config.initial_delay;
        Self {
            config,
            attempts: 0,
            current_delay: initial,
            deadline: None,
        }
    }

    /// Whether an attempt may start at `now`.
    pub fn ready(&self, now: Instant) -> bool {
        self.deadline.is_none_or(|deadline| now >= deadline)
    }

    /// Record an attempt at `now`. The next one is permitted after the
    /// returned interval.
    pub fn schedule(&mut self, now: Instant) -> Duration {
        let delay = self.current_delay;
        self.deadline = Some(now + delay);
        self.attempts += 1;
        self.current_delay = (delay * self.config.backoff_multiplier).min(self.config.max_delay);
        delay
    }

    /// Reset after a successful connection: interval back to the initial
    /// delay, next attempt permitted immediately.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current_delay = self.config.initial_delay;
        self.deadline = None;
    }

    /// Attempts since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Interval the next [`ReconnectState::schedule`] will apply.
    #[cfg(test)]
    fn current_delay(&self) -> Duration {
        self.current_delay
    }
}
