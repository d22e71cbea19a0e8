//! Snoti Listener - Main Library
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (config path, logging, event logger)
//! - **snoti**: Snoti push client (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust
//! use snoti_listener::bin_common::{init_tracing, load_config_from_env, ConfigType};
//! use snoti_listener::snoti::{ClientConfig, SnotiClient};
//! ```

// Re-export workspace libraries for convenience
pub use snoti;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod events;
    pub mod logging;

    pub use cli::{load_config_from_env, parse_args, ConfigType};
    pub use events::spawn_event_logger;
    pub use logging::init_tracing;
}
