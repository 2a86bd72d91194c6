//! Reconnection scheduling
//!
//! Owns the single pending reconnect timer of a supervisor. Holding it in an
//! `Option` is what guarantees there is never more than one.

use crate::traits::ReconnectionStrategy;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// The scheduled reconnection attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingReconnect {
    /// 1-indexed attempt number
    pub attempt: u32,
    #[serde(rename = "delayMs", serialize_with = "as_millis")]
    pub delay: Duration,
    #[serde(skip)]
    deadline: Instant,
}

fn as_millis<S: serde::Serializer>(delay: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(delay.as_millis() as u64)
}

impl PendingReconnect {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// Result of asking the policy for another attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Scheduled(PendingReconnect),
    Exhausted,
}

pub struct ReconnectionPolicy {
    strategy: Box<dyn ReconnectionStrategy>,
    max_retries: u32,
    pending: Option<PendingReconnect>,
}

impl ReconnectionPolicy {
    pub fn new(strategy: Box<dyn ReconnectionStrategy>, max_retries: u32) -> Self {
        Self {
            strategy,
            max_retries,
            pending: None,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Schedule the attempt that follows `attempts_so_far`
    ///
    /// Replaces any timer still pending.
    pub fn schedule(&mut self, attempts_so_far: u32) -> ScheduleOutcome {
        if self.cancel() {
            debug!("Replacing pending reconnect timer");
        }

        if attempts_so_far >= self.max_retries {
            return ScheduleOutcome::Exhausted;
        }

        let attempt = attempts_so_far + 1;
        match self.strategy.next_delay(attempt) {
            Some(delay) => {
                let pending = PendingReconnect {
                    attempt,
                    delay,
                    deadline: Instant::now() + delay,
                };
                self.pending = Some(pending.clone());
                ScheduleOutcome::Scheduled(pending)
            }
            None => ScheduleOutcome::Exhausted,
        }
    }

    /// Drop the pending timer; true if one existed
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// Called once a session is established again
    pub fn reset(&mut self) {
        self.cancel();
        self.strategy.reset();
    }

    pub fn pending(&self) -> Option<&PendingReconnect> {
        self.pending.as_ref()
    }

    /// Take the pending timer once its deadline has passed
    pub fn take_due(&mut self) -> Option<PendingReconnect> {
        match &self.pending {
            Some(p) if p.deadline <= Instant::now() => self.pending.take(),
            _ => None,
        }
    }

    /// Resolves when the pending timer is due; never resolves when idle
    pub async fn due(&self) {
        match &self.pending {
            Some(p) => tokio::time::sleep_until(p.deadline).await,
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ExponentialBackoff, NeverReconnect};

    fn policy() -> ReconnectionPolicy {
        ReconnectionPolicy::new(Box::new(ExponentialBackoff::default()), 5)
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_sequence_until_exhausted() {
        let mut policy = policy();
        let mut attempts = 0;
        let mut delays = Vec::new();

        while let ScheduleOutcome::Scheduled(p) = policy.schedule(attempts) {
            attempts = p.attempt;
            delays.push(p.delay.as_millis() as u64);
        }

        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
        assert_eq!(attempts, 5);
        assert!(policy.pending().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_timer_pending() {
        let mut policy = policy();
        policy.schedule(0);
        policy.schedule(1);
        assert_eq!(policy.pending().map(|p| p.attempt), Some(2));
        assert!(policy.cancel());
        assert!(!policy.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_due_respects_deadline() {
        let mut policy = policy();
        policy.schedule(0);
        assert!(policy.take_due().is_none());

        tokio::time::advance(Duration::from_millis(1000)).await;
        let due = policy.take_due().expect("timer should be due");
        assert_eq!(due.attempt, 1);
        assert!(policy.pending().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_strategy_refusal_exhausts() {
        let mut policy = ReconnectionPolicy::new(Box::new(NeverReconnect), 5);
        assert_eq!(policy.schedule(0), ScheduleOutcome::Exhausted);
    }
}
