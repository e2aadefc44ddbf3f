//! # Reconnect Policy
//!
//! Exponential backoff between reconnect attempts. The delay starts at the
//! configured minimum, doubles after every scheduled attempt and is clamped to
//! the maximum. A successful connect puts everything back to the start.

use std::time::Duration;

use crate::configs::options::PubSubOptions;

/// Backoff bounds and the attempt limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt after a successful session.
    pub min_delay: Duration,
    /// Largest delay ever scheduled.
    pub max_delay: Duration,
    /// Attempts allowed before giving up, `-1` for no limit.
    pub max_attempts: i64,
}

/// Mutable reconnect bookkeeping, owned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectState {
    /// Delay the next attempt will wait.
    pub delay: Duration,
    /// Attempts scheduled since the last successful connect.
    pub attempts: u64,
    /// Whether reconnecting is allowed at all.
    pub enabled: bool,
}

impl ReconnectPolicy {
    /// The policy described by `options`.
    pub fn from_options(options: &PubSubOptions) -> Self {
        Self {
            min_delay: options.min_reconnect_delay,
            max_delay: options.max_reconnect_delay,
            max_attempts: options.max_reconnect_attempts,
        }
    }

    /// The starting state.
    pub fn initial_state(&self, enabled: bool) -> ReconnectState {
        ReconnectState {
            delay: self.min_delay,
            attempts: 0,
            enabled,
        }
    }

    /// Puts the delay and the attempt counter back to the start.
    pub fn reset(&self, state: &mut ReconnectState) {
        state.delay = self.min_delay;
        state.attempts = 0;
    }

    /// Whether another attempt may be scheduled.
    pub fn should_retry(&self, state: &ReconnectState) -> bool {
        if !state.enabled {
            return false;
        }
        self.max_attempts < 0 || state.attempts < self.max_attempts as u64
    }

    /// Takes the delay for the attempt being scheduled and advances the state:
    /// one more attempt, and the delay doubled up to the maximum.
    pub fn next_delay(&self, state: &mut ReconnectState) -> Duration {
        let delay = state.delay.min(self.max_delay);
        state.attempts += 1;
        state.delay = state.delay.saturating_mul(2).min(self.max_delay);
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: i64) -> ReconnectPolicy {
        ReconnectPolicy {
            min_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            max_attempts,
        }
    }

    #[test]
    fn delays_double_until_the_cap() {
        let p = policy(-1);
        let mut state = p.initial_state(true);
        let delays: Vec<u64> = (0..9).map(|_| p.next_delay(&mut state).as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 80, 160, 300, 300, 300]);
        assert!(p.should_retry(&state));
    }

    #[test]
    fn reset_restores_the_minimum() {
        let p = policy(-1);
        let mut state = p.initial_state(true);
        p.next_delay(&mut state);
        p.next_delay(&mut state);
        p.reset(&mut state);
        assert_eq!(state.attempts, 0);
        assert_eq!(p.next_delay(&mut state), Duration::from_secs(5));
    }

    #[test]
    fn attempt_limit_stops_retries() {
        let p = policy(2);
        let mut state = p.initial_state(true);
        assert!(p.should_retry(&state));
        p.next_delay(&mut state);
        assert!(p.should_retry(&state));
        p.next_delay(&mut state);
        assert!(!p.should_retry(&state));
    }

    #[test]
    fn zero_attempts_never_retries() {
        let p = policy(0);
        assert!(!p.should_retry(&p.initial_state(true)));
    }

    #[test]
    fn disabled_state_never_retries() {
        let p = policy(-1);
        assert!(!p.should_retry(&p.initial_state(false)));
    }
}
