//! Heartbeat monitor
//!
//! # Architecture
//!
//! The monitor owns an optional ticker that the supervisor's driver loop
//! selects on next to its input channel:
//!
//! ```text
//! ┌───────────────────────┐
//! │  Driver loop (select) │
//! │                       │
//! │  ticker.tick() ───────┼──> check() ──> Probe(ping) ──> transport
//! │                       │             └─> Dead ──────> reconnection path
//! └───────────────────────┘
//! ```
//!
//! Two strategies:
//! - **Passive**: each tick only asks the transport whether it is still open.
//! - **Active**: each tick verifies the previous probe was answered, then
//!   sends a fresh `ping{timestamp}`.
//!
//! The default 35s period sits one margin above a ~30s server ping cadence,
//! so an idle-but-alive link always shows activity between two checks.

use super::envelope::Envelope;
use super::pong_tracker::PongTracker;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::debug;

/// Default heartbeat period
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(35);

/// Liveness strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatStrategy {
    /// Only verify the transport still reports itself open
    Passive,
    /// Send `ping` and expect `pong`
    #[default]
    Active,
}

/// Outcome of one heartbeat check
#[derive(Debug, Clone, PartialEq)]
pub enum HeartbeatVerdict {
    Alive,
    /// Link alive, send this probe
    Probe(Envelope),
    /// Link declared dead
    Dead(String),
}

pub struct HeartbeatMonitor {
    strategy: HeartbeatStrategy,
    period: Duration,
    ticker: Option<Interval>,
    tracker: PongTracker,
}

impl HeartbeatMonitor {
    pub fn new(strategy: HeartbeatStrategy, period: Duration) -> Self {
        Self {
            strategy,
            period,
            ticker: None,
            tracker: PongTracker::new(period),
        }
    }

    pub fn strategy(&self) -> HeartbeatStrategy {
        self.strategy
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Start (or restart) the ticker; first check one period from now
    pub fn start(&mut self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        // If we miss ticks due to slow processing, skip them rather than bursting
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);
        self.tracker.reset();
        debug!("Heartbeat started ({:?}, every {:?})", self.strategy, self.period);
    }

    /// Stop the ticker; true if it was running
    pub fn stop(&mut self) -> bool {
        let was_running = self.ticker.take().is_some();
        if was_running {
            debug!("Heartbeat stopped");
        }
        was_running
    }

    /// Resolves on the next tick; never resolves while stopped
    pub async fn tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending().await,
        }
    }

    /// Evaluate liveness at a tick
    pub fn check(&self, transport_open: bool) -> HeartbeatVerdict {
        if !transport_open {
            return HeartbeatVerdict::Dead("transport no longer open".to_string());
        }

        match self.strategy {
            HeartbeatStrategy::Passive => HeartbeatVerdict::Alive,
            HeartbeatStrategy::Active => {
                if !self.tracker.is_healthy() {
                    return HeartbeatVerdict::Dead(format!(
                        "no pong received within {:?}",
                        self.period
                    ));
                }
                self.tracker.record_ping_sent();
                HeartbeatVerdict::Probe(Envelope::ping(chrono::Utc::now().timestamp_millis()))
            }
        }
    }

    /// Record a `pong`; returns the probe's round trip
    pub fn record_pong(&self) -> Option<Duration> {
        self.tracker.record_pong_received()
    }

    /// Answer a server `ping`, which also proves the link is alive
    pub fn answer_server_ping(&self, ping: &Envelope) -> Envelope {
        self.tracker.record_pong_received();
        Envelope::pong(ping.data.clone())
    }
}
