//! Per-provider circuit breaker.
//!
//! `closed` counts consecutive upstream failures; at the threshold the
//! provider opens for the cooldown. After the cooldown a single trial call is
//! admitted (`half-open`); its outcome closes or re-opens the breaker.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed { failures: u32 },
    Open { until: Instant },
    HalfOpen { trial_in_flight: bool },
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    states: Mutex<HashMap<String, BreakerState>>,
}

impl CircuitBreaker {
    /// A zero threshold disables the breaker.
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// `Err(retry_after)` when calls to `provider` must fail fast.
    pub fn admit(&self, provider: &str) -> Result<(), Duration> {
        if self.failure_threshold == 0 {
            return Ok(());
        }
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(state) = states.get_mut(provider) else {
            return Ok(());
        };
        let now = Instant::now();
        match *state {
            BreakerState::Closed { .. } => Ok(()),
            BreakerState::Open { until } if now < until => Err(until - now),
            BreakerState::Open { .. } | BreakerState::HalfOpen { trial_in_flight: false } => {
                *state = BreakerState::HalfOpen { trial_in_flight: true };
                Ok(())
            }
            BreakerState::HalfOpen { trial_in_flight: true } => Err(self.cooldown),
        }
    }

    pub fn record_success(&self, provider: &str) {
        if self.failure_threshold == 0 {
            return;
        }
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = states.remove(provider)
            && matches!(previous, BreakerState::HalfOpen { .. })
        {
            tracing::info!(provider, "Circuit closed after successful trial call");
        }
    }

    pub fn record_failure(&self, provider: &str) {
        if self.failure_threshold == 0 {
            return;
        }
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let state = states
            .entry(provider.to_string())
            .or_insert(BreakerState::Closed { failures: 0 });
        let open = BreakerState::Open {
            until: Instant::now() + self.cooldown,
        };
        match *state {
            BreakerState::Closed { failures } if failures + 1 >= self.failure_threshold => {
                tracing::warn!(provider, failures = failures + 1, "Circuit opened");
                *state = open;
            }
            BreakerState::Closed { failures } => {
                *state = BreakerState::Closed { failures: failures + 1 };
            }
            BreakerState::HalfOpen { .. } => {
                tracing::warn!(provider, "Trial call failed; circuit re-opened");
                *state = open;
            }
            BreakerState::Open { .. } => {}
        }
    }

    /// Frees the half-open slot when a trial call ends without an upstream
    /// verdict, e.g. on invalid parameters.
    pub fn record_neutral(&self, provider: &str) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(state @ BreakerState::HalfOpen { .. }) = states.get_mut(provider) {
            *state = BreakerState::HalfOpen { trial_in_flight: false };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_consecutive_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        for _ in 0..2 {
            breaker.record_failure("github");
        }
        assert!(breaker.admit("github").is_ok());
        breaker.record_failure("github");

        let retry_after = breaker.admit("github").unwrap_err();
        assert!(retry_after <= Duration::from_secs(30));
        assert!(breaker.admit("notion").is_ok());
    }

    #[test]
    fn success_resets_the_count() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(30));
        breaker.record_failure("github");
        breaker.record_success("github");
        breaker.record_failure("github");
        assert!(breaker.admit("github").is_ok());
    }

    #[test]
    fn half_open_admits_one_trial() {
        let breaker = CircuitBreaker::new(1, Duration::ZERO);
        breaker.record_failure("github");

        assert!(breaker.admit("github").is_ok());
        assert!(breaker.admit("github").is_err());

        breaker.record_success("github");
        assert!(breaker.admit("github").is_ok());
        assert!(breaker.admit("github").is_ok());
    }

    #[test]
    fn failed_trial_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(20));
        breaker.record_failure("github");
        std::thread::sleep(Duration::from_millis(30));

        assert!(breaker.admit("github").is_ok());
        breaker.record_failure("github");
        assert!(breaker.admit("github").is_err());
    }

    #[test]
    fn neutral_outcome_frees_trial_slot() {
        let breaker = CircuitBreaker::new(1, Duration::ZERO);
        breaker.record_failure("github");
        assert!(breaker.admit("github").is_ok());
        breaker.record_neutral("github");
        assert!(breaker.admit("github").is_ok());
    }

    #[test]
    fn zero_threshold_disables() {
        let breaker = CircuitBreaker::new(0, Duration::from_secs(30));
        for _ in 0..10 {
            breaker.record_failure("github");
        }
        assert!(breaker.admit("github").is_ok());
    }
}
