//! # Tether
//!
//! A resilient client connection to a real-time server: one authenticated,
//! bidirectional link that survives transport failures and exposes
//! room-scoped pub/sub messaging.
//!
//! ## Features
//!
//! - **Single-owner state machine**: one driver task per connection, no globals
//! - **Authenticate-first handshake** on every transport open
//! - **Heartbeat**: passive or active ping/pong liveness detection
//! - **Exponential backoff** with an attempt ceiling and explicit `force_reconnect`
//! - **Rooms and handlers**: membership replayed after reconnect, type-keyed
//!   handlers with unsubscribe handles
//! - **Pluggable transport**: any socket technology behind [`TransportAdapter`],
//!   with a tokio-tungstenite adapter included

pub mod adapters;
pub mod core;
pub mod manager;
pub mod traits;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use core::{
    backoff,
    backoff::PendingReconnect,
    builder,
    builder::{states, SupervisorBuilder},
    config,
    config::{ConfigError, SupervisorConfig},
    connection_state,
    connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics},
    dispatcher,
    dispatcher::{DispatchOutcome, Subscription},
    envelope,
    envelope::{Envelope, InboundKind},
    handshake, health,
    health::ConnectionHealth,
    heartbeat,
    heartbeat::{HeartbeatStrategy, DEFAULT_HEARTBEAT_INTERVAL},
    pong_tracker, rooms,
    rooms::RoomStatus,
    supervisor,
    supervisor::{ClientEvent, ConnectionSupervisor, RETRIES_EXHAUSTED_MESSAGE},
};

// Re-export the WebSocket adapter
pub use adapters::WebSocketTransport;

// Re-export manager
pub use manager::SessionManager;
