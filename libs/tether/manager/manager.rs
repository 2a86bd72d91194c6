use crate::core::{ClientEvent, ConnectionHealth, ConnectionState, ConnectionSupervisor, Envelope, Metrics};
use crate::traits::{Result, TetherError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Unique identifier for a session
pub type SessionId = String;

/// Manager for multiple independent supervised connections
///
/// Each session owns its own supervisor, timers and counters; the manager
/// only provides lookup, fan-out and aggregate health.
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<ConnectionSupervisor>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session under a unique id
    pub fn add_session(&self, id: impl Into<SessionId>, supervisor: ConnectionSupervisor) -> Result<()> {
        let id = id.into();
        let mut sessions = self.sessions.write();

        if sessions.contains_key(&id) {
            return Err(TetherError::Configuration(format!(
                "Session with id '{}' already exists",
                id
            )));
        }

        sessions.insert(id.clone(), Arc::new(supervisor));
        info!("Added session '{}'", id);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Arc<ConnectionSupervisor>> {
        self.sessions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| TetherError::Configuration(format!("Session '{}' not found", id)))
    }

    /// Handle to one session
    pub fn session(&self, id: &str) -> Option<Arc<ConnectionSupervisor>> {
        self.sessions.read().get(id).cloned()
    }

    /// Remove a session and tear its link down
    pub async fn remove_session(&self, id: &str) -> Result<()> {
        let supervisor = self.sessions.write().remove(id);

        match supervisor {
            Some(supervisor) => {
                debug!("Removing session '{}'", id);
                stop_session(id, supervisor).await;
                info!("Removed session '{}'", id);
                Ok(())
            }
            None => Err(TetherError::Configuration(format!(
                "Session '{}' not found",
                id
            ))),
        }
    }

    /// Initialize one session with its token
    pub async fn initialize(&self, id: &str, token: Option<&str>) -> Result<()> {
        let supervisor = self.get(id)?;
        supervisor.initialize(token).await;
        Ok(())
    }

    /// Best-effort send to one session
    ///
    /// `Ok(false)` means the session exists but dropped the message.
    pub fn send_to(&self, id: &str, envelope: &Envelope) -> Result<bool> {
        Ok(self.get(id)?.send_message(envelope))
    }

    /// Send to every connected session
    ///
    /// Returns the number of sessions that accepted the message
    pub fn broadcast(&self, envelope: &Envelope) -> usize {
        let sessions = self.sessions.read();
        let mut count = 0;

        for (id, supervisor) in sessions.iter() {
            if !supervisor.is_connected() {
                continue;
            }
            if supervisor.send_message(envelope) {
                count += 1;
            } else {
                warn!("Failed to send to session '{}'", id);
            }
        }

        count
    }

    pub fn health(&self, id: &str) -> Option<ConnectionHealth> {
        self.sessions.read().get(id).map(|s| s.connection_health())
    }

    pub fn metrics(&self, id: &str) -> Option<Metrics> {
        self.sessions.read().get(id).map(|s| s.metrics())
    }

    pub fn list_sessions(&self) -> Vec<SessionId> {
        self.sessions.read().keys().cloned().collect()
    }

    pub fn all_states(&self) -> HashMap<SessionId, ConnectionState> {
        self.sessions
            .read()
            .iter()
            .map(|(id, s)| (id.clone(), s.connection_state()))
            .collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn connected_count(&self) -> usize {
        self.sessions
            .read()
            .values()
            .filter(|s| s.is_connected())
            .count()
    }

    pub fn has_session(&self, id: &str) -> bool {
        self.sessions.read().contains_key(id)
    }

    /// Sessions that were started but are not currently connected
    pub fn disconnected_sessions(&self) -> Vec<SessionId> {
        self.sessions
            .read()
            .iter()
            .filter(|(_, s)| is_down(s.connection_state()))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// True while any started session is down
    pub fn is_halted(&self) -> bool {
        self.sessions
            .read()
            .values()
            .any(|s| is_down(s.connection_state()))
    }

    /// Drain pending events from every session (non-blocking)
    pub fn collect_events(&self) -> Vec<(SessionId, ClientEvent)> {
        let sessions = self.sessions.read();
        let mut events = Vec::new();

        for (id, supervisor) in sessions.iter() {
            while let Some(event) = supervisor.try_recv_event() {
                events.push((id.clone(), event));
            }
        }

        events
    }

    /// Shut every session down
    pub async fn shutdown(self) {
        info!("Shutting down session manager");

        let sessions = std::mem::take(&mut *self.sessions.write());
        for (id, supervisor) in sessions {
            debug!("Shutting down session '{}'", id);
            stop_session(&id, supervisor).await;
        }

        info!("Session manager shutdown complete");
    }
}

fn is_down(state: ConnectionState) -> bool {
    !matches!(
        state,
        ConnectionState::Connected | ConnectionState::Idle | ConnectionState::Closed
    )
}

async fn stop_session(id: &str, supervisor: Arc<ConnectionSupervisor>) {
    match Arc::try_unwrap(supervisor) {
        Ok(supervisor) => supervisor.shutdown().await,
        Err(shared) => {
            // Someone still holds a handle; the task stops when they drop it
            debug!("Session '{}' still referenced, cleaning up only", id);
            shared.cleanup().await;
        }
    }
}
