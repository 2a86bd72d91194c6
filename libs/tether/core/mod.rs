//! # Tether core
//!
//! The supervisor and the components it composes:
//!
//! - [`supervisor`]: state machine and public handle
//! - [`handshake`], [`heartbeat`], [`backoff`]: the three timers/protocols
//!   that run on top of an open transport
//! - [`rooms`], [`dispatcher`]: room membership and per-type routing
//! - [`health`], [`connection_state`]: what callers observe
//!
//! ## Example
//!
//! ```rust,ignore
//! use tether::{Envelope, WebSocketTransport};
//!
//! #[tokio::main]
//! async fn main() -> tether::Result<()> {
//!     let supervisor = tether::builder()
//!         .transport(WebSocketTransport::new("wss://chat.example.com/ws"))
//!         .build()
//!         .await?;
//!
//!     let _sub = supervisor.on("new_message", |env: &Envelope| -> tether::Result<()> {
//!         println!("{:?}", env.data);
//!         Ok(())
//!     });
//!
//!     supervisor.initialize(Some("abc123")).await;
//!     supervisor.join_room("lobby");
//!
//!     while let Ok(event) = supervisor.events().recv() {
//!         println!("Event: {:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod builder;
pub mod config;
pub mod connection_state;
pub mod dispatcher;
pub mod envelope;
pub mod handshake;
pub mod health;
pub mod heartbeat;
pub mod pong_tracker;
pub mod rooms;
pub mod supervisor;

// Re-export main types
pub use backoff::{PendingReconnect, ReconnectionPolicy, ScheduleOutcome};
pub use builder::{states, SupervisorBuilder};
pub use config::{ConfigError, SupervisorConfig};
pub use connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics};
pub use dispatcher::{DispatchOutcome, MessageDispatcher, Subscription};
pub use envelope::{Envelope, InboundKind};
pub use handshake::{AuthHandshake, AuthOutcome};
pub use health::{ConnectionHealth, HealthReporter};
pub use heartbeat::{HeartbeatMonitor, HeartbeatStrategy, HeartbeatVerdict};
pub use pong_tracker::PongTracker;
pub use rooms::{RoomRegistry, RoomStatus};
pub use supervisor::{ClientEvent, ConnectionSupervisor, RETRIES_EXHAUSTED_MESSAGE};

/// Create a new supervisor builder
///
/// # Example
/// ```ignore
/// let supervisor = tether::builder()
///     .transport(WebSocketTransport::new("wss://chat.example.com/ws"))
///     .heartbeat(HeartbeatStrategy::Passive, Duration::from_secs(35))
///     .build()
///     .await?;
/// ```
pub fn builder() -> SupervisorBuilder<builder::states::NoTransport> {
    SupervisorBuilder::new()
}
