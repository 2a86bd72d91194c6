//! Connection health snapshot
//!
//! The driver task writes, everyone else reads. Every read returns an owned
//! copy so callers can never observe a half-applied transition.

use super::backoff::PendingReconnect;
use super::connection_state::{AtomicConnectionState, ConnectionState};
use parking_lot::RwLock;
use serde::Serialize;

/// Health of one logical session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionHealth {
    pub connected: bool,
    pub authenticated: bool,
    pub retry_attempts: u32,
    pub max_retries: u32,
    /// Human-readable description for UI rendering
    pub last_error: Option<String>,
    pub connection_time_ms: Option<u64>,
}

impl ConnectionHealth {
    /// Zero value
    pub fn new(max_retries: u32) -> Self {
        Self {
            connected: false,
            authenticated: false,
            retry_attempts: 0,
            max_retries,
            last_error: None,
            connection_time_ms: None,
        }
    }
}

/// Read side of the supervisor's state
#[derive(Debug)]
pub struct HealthReporter {
    health: RwLock<ConnectionHealth>,
    state: AtomicConnectionState,
    pending: RwLock<Option<PendingReconnect>>,
}

impl HealthReporter {
    pub fn new(max_retries: u32) -> Self {
        Self {
            health: RwLock::new(ConnectionHealth::new(max_retries)),
            state: AtomicConnectionState::new(ConnectionState::Idle),
            pending: RwLock::new(None),
        }
    }

    /// Current health snapshot
    pub fn snapshot(&self) -> ConnectionHealth {
        self.health.read().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// The scheduled reconnect, if any
    pub fn pending_reconnect(&self) -> Option<PendingReconnect> {
        self.pending.read().clone()
    }

    pub(crate) fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut ConnectionHealth),
    {
        let mut health = self.health.write();
        f(&mut *health);
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.set(state);
    }

    pub(crate) fn set_pending(&self, pending: Option<PendingReconnect>) {
        *self.pending.write() = pending;
    }

    /// Back to the zero value
    pub(crate) fn reset(&self) {
        let mut health = self.health.write();
        let max_retries = health.max_retries;
        *health = ConnectionHealth::new(max_retries);
        drop(health);
        self.set_pending(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_keeps_max_retries() {
        let reporter = HealthReporter::new(5);
        reporter.update(|h| {
            h.connected = true;
            h.retry_attempts = 3;
            h.last_error = Some("boom".into());
            h.connection_time_ms = Some(12);
        });
        reporter.reset();
        assert_eq!(reporter.snapshot(), ConnectionHealth::new(5));
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(ConnectionHealth::new(5)).unwrap();
        assert_eq!(json["retryAttempts"], 0);
        assert_eq!(json["maxRetries"], 5);
        assert!(json["lastError"].is_null());
        assert!(json["connectionTimeMs"].is_null());
    }
}
