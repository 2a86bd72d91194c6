//! # Tether Traits
//!
//! Seams of the connection subsystem:
//!
//! - **TransportAdapter**: open/send/close over a concrete socket technology
//! - **ReconnectionStrategy**: delay schedule between reconnection attempts
//! - **MessageHandler**: per-type consumer of inbound envelopes

pub mod error;
pub mod handler;
pub mod reconnect;
pub mod transport;

// Re-export commonly used types
pub use error::{Result, TetherError};
pub use handler::MessageHandler;
pub use reconnect::{ExponentialBackoff, FixedDelay, NeverReconnect, ReconnectionStrategy};
pub use transport::{
    CloseFrame, TransportAdapter, TransportEvent, TransportEvents, WsMessage, CLIENT_CLOSE_CODE,
    CLIENT_CLOSE_REASON,
};
