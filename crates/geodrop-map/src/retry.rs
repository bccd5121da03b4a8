//! Bounded exponential backoff for surface readiness.
//!
//! Polled rather than timer-driven: the owner calls [`RetryState::schedule`]
//! after a failed attempt and checks [`RetryState::is_due`] from its tick.

use geodrop_core::config::RetryConfig;
use geodrop_core::error::TransientError;
use std::time::Instant;
use tracing::{debug, warn};

/// Attempt counter with a due time.
#[derive(Debug, Clone)]
pub struct RetryState {
    config: RetryConfig,
    attempts: u32,
    next_due: Option<Instant>,
}

impl RetryState {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            attempts: 0,
            next_due: None,
        }
    }

    /// Retries scheduled since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns true while a retry is scheduled.
    pub fn is_pending(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// Returns true if a scheduled retry should run now.
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_due.is_some_and(|due| now >= due)
    }

    /// Schedules the next attempt after a failure.
    ///
    /// Gives up once `max_attempts` retries have been scheduled, clearing the
    /// schedule and returning the error to surface.
    pub fn schedule(&mut self, now: Instant) -> Result<Instant, TransientError> {
        if self.attempts >= self.config.max_attempts {
            let attempts = self.attempts;
            self.next_due = None;
            warn!(attempts, "Rendering surface not ready, giving up");
            return Err(TransientError::SurfaceNotReady { attempts });
        }

        let delay = self.config.backoff(self.attempts);
        self.attempts += 1;
        let due = now + delay;
        self.next_due = Some(due);
        debug!(
            attempt = self.attempts,
            delay_ms = delay.as_millis() as u64,
            "Rendering surface not ready, retry scheduled"
        );
        Ok(due)
    }

    /// Clears the schedule and the attempt counter.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.next_due = None;
    }
}
