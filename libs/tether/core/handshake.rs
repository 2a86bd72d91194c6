//! Authentication handshake
//!
//! ```text
//! Client ──[authenticate{token}]──> Server      (first frame after open)
//! Client <──[authenticated]──────── Server      -> session established
//! Client <──[auth_error{message}]── Server      -> credential rejected
//! ```
//!
//! There is no handshake timer: an attempt that never resolves is bounded
//! by the transport's connect timeout.

use super::envelope::{Envelope, InboundKind};
use tracing::debug;

const DEFAULT_AUTH_ERROR: &str = "Authentication failed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated,
    Rejected(String),
}

#[derive(Debug)]
pub struct AuthHandshake {
    token: String,
    awaiting: bool,
}

impl AuthHandshake {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            awaiting: false,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_awaiting(&self) -> bool {
        self.awaiting
    }

    /// The envelope to send right after the transport opens
    pub fn begin(&mut self) -> Envelope {
        self.awaiting = true;
        Envelope::authenticate(&self.token)
    }

    /// Interpret an inbound envelope; None if it is not a handshake reply
    pub fn resolve(&mut self, envelope: &Envelope) -> Option<AuthOutcome> {
        let outcome = match envelope.inbound_kind() {
            InboundKind::Authenticated => AuthOutcome::Authenticated,
            InboundKind::AuthError => AuthOutcome::Rejected(
                envelope
                    .error_message()
                    .unwrap_or_else(|| DEFAULT_AUTH_ERROR.to_string()),
            ),
            _ => return None,
        };

        if !self.awaiting {
            debug!("Handshake reply '{}' arrived outside a handshake", envelope.kind);
        }
        self.awaiting = false;
        Some(outcome)
    }
}
