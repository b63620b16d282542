//! Reconnection mechanism implementation
//!
//! Provides a reconnection helper with a fixed backoff schedule: `1s, 2s, 5s, 10s,
//! 30s, 30s, …` with no jitter, so attempt timing is exact rather than falling in a
//! random band.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

/// Reconnection error types
#[derive(Error, Debug)]
pub enum ReconnectError {
    /// Maximum retry attempts exceeded
    #[error("Maximum reconnection attempts exceeded")]
    MaxAttemptsExceeded,

    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

/// Connection state enumeration for a pooled transport entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// The fixed reconnect schedule: attempt 1 -> 1s, 2 -> 2s, 3 -> 5s, 4 -> 10s,
/// attempt >= 5 -> 30s.
pub fn backoff_for_attempt(attempt: u32) -> Duration {
    let secs = match attempt {
        0 => 0,
        1 => 1,
        2 => 2,
        3 => 5,
        4 => 10,
        _ => 30,
    };
    Duration::from_secs(secs)
}

/// Reconnection policy configuration. `max_attempts == 0` means unlimited retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn unlimited() -> Self {
        Self { max_attempts: 0 }
    }

    pub fn bounded(max_attempts: u32) -> Self {
        Self { max_attempts }
    }
}

/// Reconnection context tracking current state and attempts
#[derive(Debug, Clone)]
pub struct ReconnectContext {
    pub current_attempt: u32,
    pub last_attempt: Option<Instant>,
    pub next_attempt: Option<Instant>,
    pub connection_state: ConnectionState,
}

impl Default for ReconnectContext {
    fn default() -> Self {
        Self {
            current_attempt: 0,
            last_attempt: None,
            next_attempt: None,
            connection_state: ConnectionState::Disconnected,
        }
    }
}

/// Reconnection statistics tracking
#[derive(Debug, Default, Clone)]
pub struct ReconnectStats {
    pub total_attempts: u64,
    pub successful_reconnects: u64,
    pub failed_reconnects: u64,
    pub last_connected: Option<Instant>,
}

/// Reconnection helper driving one `ConnectionEntry`'s backoff and statistics.
#[derive(Debug)]
pub struct ReconnectHelper {
    policy: ReconnectPolicy,
    context: ReconnectContext,
    stats: ReconnectStats,
}

impl ReconnectHelper {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, context: ReconnectContext::default(), stats: ReconnectStats::default() }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.context.connection_state
    }

    pub fn stats(&self) -> &ReconnectStats {
        &self.stats
    }

    pub fn attempt_count(&self) -> u32 {
        self.context.current_attempt
    }

    pub fn exhausted(&self) -> bool {
        self.policy.max_attempts > 0 && self.context.current_attempt >= self.policy.max_attempts
    }

    pub fn reset(&mut self) {
        self.context.current_attempt = 0;
        self.context.last_attempt = None;
        self.context.next_attempt = None;
        if self.context.connection_state != ConnectionState::Connected {
            self.context.connection_state = ConnectionState::Disconnected;
        }
    }

    pub fn mark_connecting(&mut self) {
        self.context.connection_state = ConnectionState::Connecting;
    }

    pub fn mark_connected(&mut self) {
        self.context.connection_state = ConnectionState::Connected;
        self.context.current_attempt = 0;
        self.stats.last_connected = Some(Instant::now());
        debug!("connection marked as successful");
    }

    pub fn mark_disconnected(&mut self) {
        self.context.connection_state = ConnectionState::Disconnected;
        debug!("connection marked as disconnected");
    }

    /// The fixed delay before the *next* attempt, given attempts made so far.
    pub fn next_delay(&self) -> Option<Duration> {
        if self.exhausted() {
            return None;
        }
        Some(backoff_for_attempt(self.context.current_attempt))
    }

    /// Record that a new reconnect attempt is about to be made; advances the
    /// attempt counter and returns `Err` if the policy's bound is already hit.
    pub fn begin_attempt(&mut self) -> Result<(), ReconnectError> {
        if self.exhausted() {
            self.context.connection_state = ConnectionState::Disconnected;
            warn!("maximum reconnection attempts ({}) exceeded", self.policy.max_attempts);
            return Err(ReconnectError::MaxAttemptsExceeded);
        }
        self.context.connection_state = ConnectionState::Reconnecting;
        self.context.current_attempt += 1;
        self.stats.total_attempts += 1;
        self.context.last_attempt = Some(Instant::now());
        self.context.next_attempt = Some(Instant::now() + backoff_for_attempt(self.context.current_attempt));
        info!("reconnect attempt {} scheduled", self.context.current_attempt);
        Ok(())
    }

    pub fn record_success(&mut self) {
        self.stats.successful_reconnects += 1;
        self.mark_connected();
    }

    pub fn record_failure(&mut self) {
        self.stats.failed_reconnects += 1;
        if self.exhausted() {
            self.context.connection_state = ConnectionState::Disconnected;
        } else {
            self.context.connection_state = ConnectionState::Disconnected;
            self.context.next_attempt = Some(Instant::now() + backoff_for_attempt(self.context.current_attempt));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_schedule_matches_attempt_table() {
        assert_eq!(backoff_for_attempt(1), Duration::from_secs(1));
        assert_eq!(backoff_for_attempt(2), Duration::from_secs(2));
        assert_eq!(backoff_for_attempt(3), Duration::from_secs(5));
        assert_eq!(backoff_for_attempt(4), Duration::from_secs(10));
        assert_eq!(backoff_for_attempt(5), Duration::from_secs(30));
        assert_eq!(backoff_for_attempt(100), Duration::from_secs(30));
    }

    #[test]
    fn five_consecutive_failures_follow_schedule() {
        let mut helper = ReconnectHelper::new(ReconnectPolicy::unlimited());
        let expected = [1u64, 2, 5, 10, 30];
        for exp in expected {
            helper.begin_attempt().unwrap();
            assert_eq!(helper.next_delay().unwrap(), Duration::from_secs(exp));
            helper.record_failure();
        }
    }

    #[test]
    fn bounded_policy_exhausts_after_max_attempts() {
        let mut helper = ReconnectHelper::new(ReconnectPolicy::bounded(2));
        helper.begin_attempt().unwrap();
        helper.record_failure();
        helper.begin_attempt().unwrap();
        helper.record_failure();
        assert!(helper.begin_attempt().is_err());
    }

    #[test]
    fn success_resets_attempt_counter() {
        let mut helper = ReconnectHelper::new(ReconnectPolicy::unlimited());
        helper.begin_attempt().unwrap();
        helper.record_failure();
        helper.begin_attempt().unwrap();
        helper.record_success();
        assert_eq!(helper.attempt_count(), 0);
        assert_eq!(helper.connection_state(), ConnectionState::Connected);
    }
}
