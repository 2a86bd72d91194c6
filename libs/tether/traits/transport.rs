//! Transport Adapter Trait
//!
//! The supervisor never talks to a socket library directly. It drives a
//! [`TransportAdapter`] through `open`/`send`/`close` and receives the
//! adapter's open/message/close/error callbacks as [`TransportEvent`]s
//! through a [`TransportEvents`] sink handed over on every `open`.
//!
//! ```text
//! Supervisor ──open(events)──> Adapter ──connect──> Server
//!     ▲                           │
//!     └──── TransportEvent ───────┘  (Open | Message | Close | Error)
//! ```

use crate::core::supervisor::DriverInput;
use crate::error::Result;
use tokio::sync::mpsc;

/// Close code sent when the client tears the link down on purpose.
///
/// The supervisor invalidates the link before issuing it, so the echo is
/// dropped as stale. A server close that happens to reuse the code is still
/// treated as a loss.
pub const CLIENT_CLOSE_CODE: u16 = 4000;

/// Close reason paired with [`CLIENT_CLOSE_CODE`]
pub const CLIENT_CLOSE_REASON: &str = "client cleanup";

/// Raw frame carried by a transport
/// Can be Text or Binary data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl WsMessage {
    /// Get the message as text, if it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WsMessage::Text(s) => Some(s),
            WsMessage::Binary(_) => None,
        }
    }

    /// Get the raw bytes regardless of frame kind
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            WsMessage::Text(s) => s.as_bytes(),
            WsMessage::Binary(b) => b,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, WsMessage::Text(_))
    }
}

/// Close code and reason reported by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// The sentinel close the supervisor issues during cleanup
    pub fn client_initiated() -> Self {
        Self::new(CLIENT_CLOSE_CODE, CLIENT_CLOSE_REASON)
    }

    /// Exact match of the sentinel pair
    pub fn is_client_initiated(&self) -> bool {
        self.code == CLIENT_CLOSE_CODE && self.reason == CLIENT_CLOSE_REASON
    }
}

/// Callback events produced by a transport adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The link is open and ready for traffic
    Open,
    /// A frame arrived
    Message(WsMessage),
    /// The link closed
    Close(CloseFrame),
    /// Open/connect-level failure or I/O error
    Error(String),
}

/// Sink for the callbacks of one `open` call
///
/// Every event is stamped with the generation of the attempt it belongs to,
/// so late callbacks from a replaced socket are discarded by the supervisor.
#[derive(Clone)]
pub struct TransportEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<DriverInput>,
}

impl TransportEvents {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<DriverInput>) -> Self {
        Self { generation, tx }
    }

    /// Attempt number this sink belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver an event to the supervisor
    ///
    /// Returns false once the supervisor has shut down.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(DriverInput::Transport {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    pub fn opened(&self) -> bool {
        self.emit(TransportEvent::Open)
    }

    pub fn message(&self, message: WsMessage) -> bool {
        self.emit(TransportEvent::Message(message))
    }

    pub fn closed(&self, code: u16, reason: impl Into<String>) -> bool {
        self.emit(TransportEvent::Close(CloseFrame::new(code, reason)))
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.emit(TransportEvent::Error(message.into()))
    }

    /// True once the supervisor is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for TransportEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportEvents")
            .field("generation", &self.generation)
            .finish()
    }
}

/// Thin interface over a concrete socket technology
///
/// Implementations must be cheap to call from the supervisor's driver task:
/// `open` starts connecting in the background and reports progress through
/// `events`, it never waits for the connection itself.
pub trait TransportAdapter: Send + Sync + 'static {
    /// Start a new connection attempt
    ///
    /// Any previous socket held by the adapter is replaced. An `Err` is
    /// treated like an immediate transport error.
    fn open(&self, events: TransportEvents) -> Result<()>;

    /// Send a frame on the current socket
    fn send(&self, message: WsMessage) -> Result<()>;

    /// Close the current socket with the given code and reason
    ///
    /// Must be safe to call when nothing is open.
    fn close(&self, code: u16, reason: &str);

    /// Whether the transport currently reports itself open
    fn is_open(&self) -> bool;
}
