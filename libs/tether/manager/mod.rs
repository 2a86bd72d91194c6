//! # Tether Manager
//!
//! Runs several independent supervised connections side by side with
//! aggregate health and fan-out sends.

pub mod manager;

pub use manager::{SessionId, SessionManager};
