use std::time::Duration;

/// Trait for defining reconnection strategies
///
/// Implement this trait to control how long the supervisor waits before
/// each reconnection attempt.
pub trait ReconnectionStrategy: Send + Sync {
    /// Get the delay before the given reconnection attempt
    ///
    /// # Arguments
    /// * `attempt` - The reconnection attempt number (1-indexed)
    ///
    /// # Returns
    /// * `Some(duration)` - Wait this long before reconnecting
    /// * `None` - Stop reconnecting
    fn next_delay(&self, attempt: u32) -> Option<Duration>;

    /// Reset the strategy state (called after a successful connection)
    fn reset(&mut self);

    /// Check if the given attempt is still allowed
    fn should_reconnect(&self, attempt: u32) -> bool;
}

/// Exponential backoff reconnection strategy
///
/// `delay(n) = min(initial_delay * 2^(n-1), max_delay)`
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff strategy
    ///
    /// # Arguments
    /// * `initial_delay` - Delay before the first attempt
    /// * `max_delay` - Upper bound for any single delay
    /// * `max_attempts` - Maximum number of attempts (None = unlimited)
    pub fn new(initial_delay: Duration, max_delay: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }
}

impl Default for ExponentialBackoff {
    /// 1s, 2s, 4s, 8s, 16s
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(16), Some(5))
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || !self.should_reconnect(attempt) {
            return None;
        }

        let base = self.initial_delay.as_millis() as u64;
        let cap = self.max_delay.as_millis() as u64;
        let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
        let delay = base.saturating_mul(factor).min(cap);
        Some(Duration::from_millis(delay))
    }

    fn reset(&mut self) {
        // Stateless
    }

    fn should_reconnect(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }
}

/// Fixed delay reconnection strategy
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl FixedDelay {
    pub fn new(delay: Duration, max_attempts: Option<u32>) -> Self {
        Self { delay, max_attempts }
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || !self.should_reconnect(attempt) {
            return None;
        }
        Some(self.delay)
    }

    fn reset(&mut self) {}

    fn should_reconnect(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }
}

/// Never reconnect strategy
///
/// The first unintentional close moves the supervisor straight to `Failed`.
#[derive(Debug, Clone)]
pub struct NeverReconnect;

impl ReconnectionStrategy for NeverReconnect {
    fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        None
    }

    fn reset(&mut self) {}

    fn should_reconnect(&self, _attempt: u32) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sequence() {
        let strategy = ExponentialBackoff::default();
        let delays: Vec<u64> = (1..=5)
            .map(|n| strategy.next_delay(n).unwrap().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
        assert!(strategy.next_delay(6).is_none());
    }

    #[test]
    fn test_attempt_zero_is_not_an_attempt() {
        assert!(ExponentialBackoff::default().next_delay(0).is_none());
        assert!(FixedDelay::new(Duration::from_millis(10), None).next_delay(0).is_none());
    }

    #[test]
    fn test_huge_attempt_saturates_at_cap() {
        let strategy = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(16), None);
        assert_eq!(strategy.next_delay(200), Some(Duration::from_secs(16)));
    }
}
