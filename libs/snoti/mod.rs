//! # Snoti
//!
//! Persistent client for the Snoti device-event push service.
//!
//! ## Features
//!
//! - **TLS session with login**: product or enterprise credentials
//! - **Heartbeat watchdog**: periodic ping, session torn down without pong
//! - **Per-device ordering**: events for one `did` handled sequentially on a fixed lane
//! - **Automatic reconnection**: pluggable strategy, fixed 5s delay by default
//! - **Caller API**: ack, subscribe, unsubscribe and remote control on the live session

pub mod traits;
pub mod core;
pub mod protocol;

// Re-export all traits
pub use traits::*;

// Re-export core client functionality
pub use self::core::{
    builder, client, config, connection_state, dispatch, heartbeat, transport,
    builder::{states, SnotiClientBuilder},
    client::{ClientEvent, Metrics, SnotiClient},
    config::{AuthFailurePolicy, ClientConfig, Credentials},
    connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState},
    dispatch::lane_index,
};

// Re-export protocol types
pub use protocol::{Command, ControlCmd, ControlData, ControlDetail, Envelope, EventPush};

/// Type alias for Result with SnotiError
pub type Result<T> = std::result::Result<T, traits::SnotiError>;
