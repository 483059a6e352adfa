//! Retry state machine of the fetch client.
//!
//! `Idle -> Attempting(n) -> { Success | RetryScheduled -> Attempting(n + 1) | TerminalFailure }`
//!
//! The machine holds no clock and performs no I/O: callers feed it attempt outcomes
//! and sleep for the delay it schedules. Jitter comes from the `Rng` the caller passes.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryState {
    Idle,
    /// 1-based attempt number.
    Attempting(u32),
    RetryScheduled {
        next_attempt: u32,
        delay: Duration,
    },
    Success,
    TerminalFailure,
}

/// How one attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    /// 429, 5xx, transport failure or timeout.
    Retryable,
    /// Any other failure; never retried.
    Terminal,
}

/// Exponential backoff with symmetric jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: f64,
}

impl Backoff {
    // Anything beyond one day is not a meaningful retry delay.
    const MAX_BACKOFF_SECS: f64 = 86_400.0;

    #[must_use]
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        let jitter = if jitter.is_finite() {
            jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self { base, max, jitter }
    }

    /// Delay before retry number `retry_index` (0-based): `base * 2^retry_index`,
    /// scaled by a random factor in `[1 - jitter, 1 + jitter]`, capped at `max`.
    pub fn delay<R: Rng + ?Sized>(&self, retry_index: u32, rng: &mut R) -> Duration {
        let max_secs = self.max.as_secs_f64().min(Self::MAX_BACKOFF_SECS);
        let exponent = i32::try_from(retry_index).unwrap_or(i32::MAX);
        let raw = self.base.as_secs_f64() * 2f64.powi(exponent);

        let factor = if self.jitter > 0.0 {
            rng.random_range((1.0 - self.jitter)..=(1.0 + self.jitter))
        } else {
            1.0
        };
        let jittered = raw * factor;

        let secs = if jittered.is_finite() {
            jittered.clamp(0.0, max_secs)
        } else {
            max_secs
        };
        Duration::from_secs_f64(secs)
    }
}

/// Bounded retry driver for one fetch.
#[derive(Debug, Clone)]
pub struct RetryMachine {
    max_attempts: u32,
    backoff: Backoff,
    state: RetryState,
}

impl RetryMachine {
    #[must_use]
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Backoff::new(config.base_delay, config.max_delay, config.jitter),
            state: RetryState::Idle,
        }
    }

    #[must_use]
    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Start the next attempt. Returns its 1-based number, or `None` once the machine
    /// has finished (or an attempt is already running).
    pub fn begin(&mut self) -> Option<u32> {
        let attempt = match self.state {
            RetryState::Idle => 1,
            RetryState::RetryScheduled { next_attempt, .. } => next_attempt,
            RetryState::Attempting(_) | RetryState::Success | RetryState::TerminalFailure => {
                return None;
            }
        };
        self.state = RetryState::Attempting(attempt);
        Some(attempt)
    }

    /// Record the outcome of the running attempt and return the new state.
    pub fn record<R: Rng + ?Sized>(&mut self, outcome: AttemptOutcome, rng: &mut R) -> RetryState {
        let RetryState::Attempting(attempt) = self.state else {
            return self.state;
        };
        self.state = match outcome {
            AttemptOutcome::Success => RetryState::Success,
            AttemptOutcome::Terminal => RetryState::TerminalFailure,
            AttemptOutcome::Retryable if attempt >= self.max_attempts => {
                RetryState::TerminalFailure
            }
            AttemptOutcome::Retryable => RetryState::RetryScheduled {
                next_attempt: attempt + 1,
                delay: self.backoff.delay(attempt - 1, rng),
            },
        };
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn config(max_attempts: u32, jitter: f64) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter,
        }
    }

    #[test]
    fn retries_until_bound_then_fails() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut machine = RetryMachine::new(&config(3, 0.0));

        assert_eq!(machine.state(), RetryState::Idle);
        assert_eq!(machine.begin(), Some(1));
        assert_eq!(
            machine.record(AttemptOutcome::Retryable, &mut rng),
            RetryState::RetryScheduled {
                next_attempt: 2,
                delay: Duration::from_secs(1)
            }
        );
        assert_eq!(machine.begin(), Some(2));
        assert_eq!(
            machine.record(AttemptOutcome::Retryable, &mut rng),
            RetryState::RetryScheduled {
                next_attempt: 3,
                delay: Duration::from_secs(2)
            }
        );
        assert_eq!(machine.begin(), Some(3));
        assert_eq!(
            machine.record(AttemptOutcome::Retryable, &mut rng),
            RetryState::TerminalFailure
        );
        assert_eq!(machine.begin(), None);
    }

    #[test]
    fn terminal_outcome_stops_immediately() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut machine = RetryMachine::new(&config(5, 0.2));

        machine.begin();
        assert_eq!(
            machine.record(AttemptOutcome::Terminal, &mut rng),
            RetryState::TerminalFailure
        );
        assert_eq!(machine.begin(), None);
    }

    #[test]
    fn success_after_retry() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut machine = RetryMachine::new(&config(3, 0.2));

        machine.begin();
        machine.record(AttemptOutcome::Retryable, &mut rng);
        assert_eq!(machine.begin(), Some(2));
        assert_eq!(
            machine.record(AttemptOutcome::Success, &mut rng),
            RetryState::Success
        );
    }

    #[test]
    fn record_without_running_attempt_is_ignored() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut machine = RetryMachine::new(&config(3, 0.0));
        assert_eq!(
            machine.record(AttemptOutcome::Success, &mut rng),
            RetryState::Idle
        );
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30), 0.2);

        for retry_index in 0..4u32 {
            let nominal = f64::from(1u32 << retry_index);
            for _ in 0..200 {
                let delay = backoff.delay(retry_index, &mut rng).as_secs_f64();
                assert!(delay >= nominal * 0.8 - 1e-9, "{delay} below bound");
                assert!(delay <= nominal * 1.2 + 1e-9, "{delay} above bound");
            }
        }
    }

    #[test]
    fn delay_is_capped() {
        let mut rng = StdRng::seed_from_u64(1);
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5), 0.0);
        assert_eq!(backoff.delay(10, &mut rng), Duration::from_secs(5));
        assert_eq!(backoff.delay(u32::MAX, &mut rng), Duration::from_secs(5));
    }
}
