//! # Snoti Core
//!
//! Session machinery behind [`SnotiClient`]:
//!
//! - **config**: credentials, heartbeat and lane tunables
//! - **connection_state**: lock-free state and counters
//! - **transport**: bounded line reader and serialized writer
//! - **handshake**: login request and `login_res` verdict
//! - **heartbeat**: ping schedule and pong watchdog
//! - **dispatch**: per-device ordered lanes
//! - **client**: lifecycle orchestrator and caller API
//!
//! ## Example
//!
//! ```rust,ignore
//! use snoti::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ClientConfig::product(
//!         "snoti.gizwits.com:2017",
//!         "product-key",
//!         "auth-id",
//!         "auth-secret",
//!         "subkey",
//!     )
//!     .with_events("device.online,device.offline");
//!
//!     let client = snoti::builder()
//!         .config(config)
//!         .handler(|client: &SnotiClient, event: EventPush| {
//!             if let Some((msg_id, delivery_id)) = event.ack_ids() {
//!                 client.ack_blocking(msg_id, delivery_id)?;
//!             }
//!             Ok(())
//!         })
//!         .build()?;
//!
//!     client.start()?;
//!     while let Ok(event) = client.recv_event() {
//!         println!("Event: {:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod connection_state;
pub mod dispatch;
pub mod handshake;
pub mod heartbeat;
pub mod transport;

// Re-export main types
pub use builder::{states, SnotiClientBuilder};
pub use client::{ClientEvent, Metrics, SnotiClient};
pub use config::{AuthFailurePolicy, ClientConfig, Credentials};
pub use connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
pub use dispatch::{lane_index, DispatchPool};

/// Create a new client builder
///
/// # Example
/// ```ignore
/// let client = snoti::builder()
///     .config(ClientConfig::load("config/snoti.yaml")?)
///     .handler(MyHandler::new())
///     .reconnect_strategy(FixedDelay::new(Duration::from_secs(5), None))
///     .build()?;
/// ```
pub fn builder() -> SnotiClientBuilder<states::NoConfig, states::NoHandler> {
    SnotiClientBuilder::new()
}

impl SnotiClient {
    /// Create a new client builder
    pub fn builder() -> SnotiClientBuilder<states::NoConfig, states::NoHandler> {
        SnotiClientBuilder::new()
    }
}
