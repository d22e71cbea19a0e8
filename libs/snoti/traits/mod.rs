//! # Snoti Traits
//!
//! Seams of the client:
//!
//! - **Connector**: open the transport (TLS or plain TCP)
//! - **EventHandler**: receive pushed events on lane threads
//! - **ReconnectionStrategy**: control delays between sessions
//! - **SnotiError**: the single error type

pub mod connector;
pub mod error;
pub mod handler;
pub mod reconnect;

// Re-export commonly used types
pub use connector::{BoxedStream, Connector, SessionStream, TcpConnector, TlsConnector};
pub use error::{Result, SnotiError};
pub use handler::{EventHandler, NoOpHandler};
pub use reconnect::{ExponentialBackoff, FixedDelay, NeverReconnect, ReconnectionStrategy};
