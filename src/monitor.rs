use crate::prelude::*;

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const HISTORY_SIZE: usize = 20;

/// Rolling success/failure statistics for one cloud account connection.
#[derive(Debug)]
pub struct ConnectionStats {
    history: VecDeque<bool>,
    response_times: VecDeque<Duration>,
    pub total_successes: u64,
    pub total_failures: u64,
    pub consecutive_failures: u64,
    pub last_error: Option<String>,
}

impl Default for ConnectionStats {
    fn default() -> Self {
        Self {
            history: VecDeque::with_capacity(HISTORY_SIZE),
            response_times: VecDeque::with_capacity(HISTORY_SIZE),
            total_successes: 0,
            total_failures: 0,
            consecutive_failures: 0,
            last_error: None,
        }
    }
}

impl ConnectionStats {
    pub fn record_success(&mut self, response_time: Duration) {
        self.push_history(true);
        self.total_successes += 1;
        self.consecutive_failures = 0;

        if self.response_times.len() == HISTORY_SIZE {
            self.response_times.pop_front();
        }
        self.response_times.push_back(response_time);
    }

    pub fn record_failure(&mut self, error: String) {
        self.push_history(false);
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.last_error = Some(error);
    }

    pub fn sample_count(&self) -> usize {
        self.history.len()
    }

    /// Success rate over the rolling window, 1.0 when no samples yet.
    pub fn success_rate(&self) -> f64 {
        if self.history.is_empty() {
            return 1.0;
        }
        let successes = self.history.iter().filter(|s| **s).count();
        successes as f64 / self.history.len() as f64
    }

    pub fn average_response_time(&self) -> Option<Duration> {
        if self.response_times.is_empty() {
            return None;
        }
        let total: Duration = self.response_times.iter().sum();
        Some(total / self.response_times.len() as u32)
    }

    fn push_history(&mut self, success: bool) {
        if self.history.len() == HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(success);
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BreakerState {
    /// Normal operation, requests allowed
    Closed,
    /// Failure threshold reached, requests refused
    Open,
    /// Recovery timeout elapsed, one probe request allowed
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit breaker around the cloud API.
///
/// The cloud occasionally goes down for minutes at a time; without the
/// breaker every queued command would grind through its full retry budget
/// against a dead endpoint.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: BreakerState,
    failure_threshold: f64,
    recovery_timeout: Duration,
    last_state_change: Instant,
    pub stats: ConnectionStats,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(0.5, Duration::from_secs(300))
    }
}

impl CircuitBreaker {
    pub fn new(failure_threshold: f64, recovery_timeout: Duration) -> Self {
        Self {
            state: BreakerState::Closed,
            failure_threshold,
            recovery_timeout,
            last_state_change: Instant::now(),
            stats: ConnectionStats::default(),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn record_success(&mut self, response_time: Duration) {
        self.stats.record_success(response_time);

        if self.state == BreakerState::HalfOpen {
            info!("circuit breaker closing after successful probe");
            self.transition(BreakerState::Closed);
        }
    }

    pub fn record_failure(&mut self, error: String) {
        self.stats.record_failure(error);

        match self.state {
            // need a few data points before giving up on the connection
            BreakerState::Closed
                if self.stats.sample_count() >= 3
                    && self.stats.success_rate() < self.failure_threshold =>
            {
                warn!(
                    "circuit breaker opening: success rate {:.0}% below threshold {:.0}%",
                    self.stats.success_rate() * 100.0,
                    self.failure_threshold * 100.0
                );
                self.transition(BreakerState::Open);
            }
            BreakerState::HalfOpen => {
                warn!("circuit breaker re-opening after failed probe");
                self.transition(BreakerState::Open);
            }
            _ => (),
        }
    }

    pub fn can_execute(&mut self) -> bool {
        if self.state == BreakerState::Open
            && self.last_state_change.elapsed() > self.recovery_timeout
        {
            info!(
                "circuit breaker half-opening after {}s timeout",
                self.recovery_timeout.as_secs()
            );
            self.transition(BreakerState::HalfOpen);
        }

        self.state != BreakerState::Open
    }

    /// Forget accumulated failure history, eg after a manual reconnect.
    pub fn reset(&mut self) {
        self.stats = ConnectionStats::default();
        self.transition(BreakerState::Closed);
    }

    fn transition(&mut self, state: BreakerState) {
        self.state = state;
        self.last_state_change = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing_breaker() -> CircuitBreaker {
        let mut breaker = CircuitBreaker::new(0.5, Duration::from_millis(10));
        for _ in 0..4 {
            breaker.record_failure("connect timeout".to_string());
        }
        breaker
    }

    #[test]
    fn opens_after_repeated_failures() {
        let breaker = failing_breaker();
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn stays_closed_below_three_samples() {
        let mut breaker = CircuitBreaker::new(0.5, Duration::from_secs(300));
        breaker.record_failure("x".to_string());
        breaker.record_failure("x".to_string());
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.can_execute());
    }

    #[test]
    fn half_opens_after_recovery_timeout() {
        let mut breaker = failing_breaker();
        assert!(!breaker.can_execute());

        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn probe_success_closes_probe_failure_reopens() {
        let mut breaker = failing_breaker();
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.can_execute());

        breaker.record_failure("still down".to_string());
        assert_eq!(breaker.state(), BreakerState::Open);

        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.can_execute());
        breaker.record_success(Duration::from_millis(50));
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn success_rate_tracks_window() {
        let mut stats = ConnectionStats::default();
        assert_eq!(stats.success_rate(), 1.0);

        stats.record_success(Duration::from_millis(100));
        stats.record_failure("x".to_string());
        assert_eq!(stats.success_rate(), 0.5);
        assert_eq!(stats.consecutive_failures, 1);
        assert_eq!(stats.last_error.as_deref(), Some("x"));
    }
}
