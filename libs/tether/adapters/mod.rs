//! Concrete transport adapters

pub mod websocket;

pub use websocket::{WebSocketTransport, DEFAULT_CONNECT_TIMEOUT};
