//! Client event logging for binaries

use snoti::{ClientEvent, SnotiClient};
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tracing::{error, info};

/// Log client events on a dedicated thread
///
/// The returned receiver resolves once the client reports
/// [`ClientEvent::Terminated`], so callers can stop waiting for Ctrl+C when
/// the client will never connect again.
pub fn spawn_event_logger(
    client: &SnotiClient,
) -> std::io::Result<(JoinHandle<()>, oneshot::Receiver<()>)> {
    let events = client.clone();
    let (terminated_tx, terminated_rx) = oneshot::channel();

    let handle = std::thread::Builder::new()
        .name("snoti-events".to_string())
        .spawn(move || {
            while let Ok(event) = events.recv_event() {
                match &event {
                    ClientEvent::Error(msg) => error!("Session error: {}", msg),
                    ClientEvent::AuthRejected(msg) => error!("Login rejected: {}", msg),
                    other => info!("Client event: {:?}", other),
                }
                if matches!(event, ClientEvent::Terminated) {
                    let _ = terminated_tx.send(());
                    break;
                }
            }
        })?;

    Ok((handle, terminated_rx))
}
