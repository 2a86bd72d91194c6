//! Tether client - main library
//!
//! Re-exports the `tether` connection library and hosts the helpers shared
//! by the binaries.
//!
//! ## Architecture
//!
//! - **tether**: supervised real-time connection (re-exported from workspace)
//! - **bin_common**: CLI/env settings, logging and shutdown for binaries
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use tether_client::bin_common::{init_tracing, ProbeSettings, StopSignal};
//! use tether_client::tether::{SupervisorConfig, WebSocketTransport};
//! ```

// Re-export workspace libraries for convenience
pub use tether;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod logging;
    pub mod shutdown;

    pub use cli::{load_config_from_env, parse_args, parse_rooms, ConfigType, ProbeSettings};
    pub use logging::init_tracing;
    pub use shutdown::StopSignal;
}
