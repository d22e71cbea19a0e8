//! Event Handler Boundary
//!
//! The caller-supplied handler is the only place pushed events leave the
//! client.
//!
//! # Threading
//!
//! ```text
//! Receive loop ──hash(did) % N──> Lane 0 thread ──┐
//!                                 Lane 1 thread ──┼──> EventHandler::handle
//!                                 Lane N thread ──┘
//! ```
//!
//! One handler instance is shared by every lane, so `handle` may run on up to
//! N threads at once. Events for the same device always arrive on the same
//! lane, in the order the server sent them.

use crate::core::client::SnotiClient;
use crate::error::Result;
use crate::protocol::EventPush;

/// Handler invoked once per inbound `event_push` frame
///
/// The client handle is passed in so the handler can acknowledge the
/// delivery (`client.ack_blocking(..)`) or issue remote-control requests
/// without reaching for global state.
///
/// **Important**: this runs on a dedicated lane OS thread, not in an async
/// context. Use the `*_blocking` client methods to talk to the server.
///
/// # Errors
/// Errors are logged; the lane keeps processing subsequent events. An event
/// that is not acknowledged is redelivered by the server.
///
/// # Example
///
/// ```ignore
/// let client = SnotiClient::builder()
///     .config(config)
///     .handler(|client: &SnotiClient, event: EventPush| {
///         if let Some((msg_id, delivery_id)) = event.ack_ids() {
///             client.ack_blocking(msg_id, delivery_id)?;
///         }
///         Ok(())
///     })
///     .build()?;
/// ```
pub trait EventHandler: Send + Sync + 'static {
    fn handle(&self, client: &SnotiClient, event: EventPush) -> Result<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&SnotiClient, EventPush) -> Result<()> + Send + Sync + 'static,
{
    fn handle(&self, client: &SnotiClient, event: EventPush) -> Result<()> {
        self(client, event)
    }
}

/// Handler that drops every event (useful for tests and dry runs)
///
/// Events are never acknowledged, so the server will redeliver them.
pub struct NoOpHandler;

impl EventHandler for NoOpHandler {
    fn handle(&self, _client: &SnotiClient, _event: EventPush) -> Result<()> {
        Ok(())
    }
}
