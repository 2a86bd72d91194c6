//! PONG Response Tracker
//!
//! Tracks heartbeat probes and the replies to them so a link that stopped
//! answering can be told apart from one that is merely idle. A server `ping`
//! is also proof the link is alive and is recorded like a reply.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Tracks PONG responses to detect dead connections
///
/// Timestamps are stored as milliseconds since an internal epoch, offset by
/// one so that zero means "never".
pub struct PongTracker {
    epoch: Instant,
    last_ping_sent_ms: AtomicU64,
    last_pong_received_ms: AtomicU64,
    /// If no reply arrives within this long after a probe the link is dead
    timeout: Duration,
}

impl PongTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            epoch: Instant::now(),
            last_ping_sent_ms: AtomicU64::new(0),
            last_pong_received_ms: AtomicU64::new(0),
            timeout,
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64 + 1
    }

    pub fn record_ping_sent(&self) {
        self.last_ping_sent_ms.store(self.now_ms(), Ordering::Release);
    }

    /// Record a reply and return the round trip since the last probe
    pub fn record_pong_received(&self) -> Option<Duration> {
        let now = self.now_ms();
        self.last_pong_received_ms.store(now, Ordering::Release);
        match self.last_ping_sent_ms.load(Ordering::Acquire) {
            0 => None,
            ping_ms => Some(Duration::from_millis(now.saturating_sub(ping_ms))),
        }
    }

    /// Check if the connection appears healthy
    ///
    /// Returns true if:
    /// - No probe has been sent yet
    /// - A reply was received after the last probe
    /// - The timeout hasn't elapsed since the last probe
    pub fn is_healthy(&self) -> bool {
        let ping_ms = self.last_ping_sent_ms.load(Ordering::Acquire);
        let pong_ms = self.last_pong_received_ms.load(Ordering::Acquire);

        if ping_ms == 0 || pong_ms >= ping_ms {
            return true;
        }

        let since_ping_ms = self.now_ms().saturating_sub(ping_ms);
        since_ping_ms < self.timeout.as_millis() as u64
    }

    /// Time since the last reply, None if none was ever received
    pub fn time_since_last_pong(&self) -> Option<Duration> {
        match self.last_pong_received_ms.load(Ordering::Acquire) {
            0 => None,
            pong_ms => Some(Duration::from_millis(self.now_ms().saturating_sub(pong_ms))),
        }
    }

    /// Call this when a new session starts
    pub fn reset(&self) {
        self.last_ping_sent_ms.store(0, Ordering::Release);
        self.last_pong_received_ms.store(0, Ordering::Release);
    }
}
