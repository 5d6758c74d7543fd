//! Reconnect controller (C6): exponential backoff with an attempt cap.
//!
//! Delay for attempt `n` (0-indexed) is `min(base * 2^n, max)`. The
//! counter resets to zero on every successful connect and is shared by
//! nothing else: a fresh [`ReconnectController`] per session is correct.

use crate::types::{RECONNECT_BASE_SECS, RECONNECT_MAX_ATTEMPTS, RECONNECT_MAX_SECS};
use std::time::Duration;

/// Tracks consecutive reconnect failures and hands back the next delay,
/// or `None` once [`RECONNECT_MAX_ATTEMPTS`] has been exhausted.
#[derive(Debug, Default)]
pub struct ReconnectController {
    attempts: u32,
}

impl ReconnectController {
    /// A fresh controller with zero recorded failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Call on every successful connect.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Returns the delay to wait before the next connect attempt, and
    /// records that attempt as having been scheduled. Returns `None` once
    /// the attempt cap is reached; the caller should stop reconnecting.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= RECONNECT_MAX_ATTEMPTS {
            return None;
        }

        let exponent = self.attempts.min(63);
        let scaled = RECONNECT_BASE_SECS.saturating_mul(1u64 << exponent);
        let secs = scaled.min(RECONNECT_MAX_SECS);
        self.attempts += 1;
        Some(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_follows_expected_sequence() {
        let mut controller = ReconnectController::new();
        let expected = [1u64, 2, 4, 8, 16, 30, 30, 30, 30, 30];

        for expected_secs in expected {
            let delay = controller.next_delay().expect("delay available");
            assert_eq!(delay, Duration::from_secs(expected_secs));
        }

        assert!(controller.next_delay().is_none());
    }

    #[test]
    fn reset_restarts_the_sequence() {
        let mut controller = ReconnectController::new();
        controller.next_delay();
        controller.next_delay();
        controller.reset();

        assert_eq!(controller.next_delay(), Some(Duration::from_secs(1)));
    }
}
