//! Heartbeat and pong watchdog
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │  Heartbeat (per session) │
//! │                          │
//! │  every ping_interval ────┼──> {"cmd":"ping"} ──> SessionWriter
//! │  on Control::Pong ───────┼──> watchdog deadline = now + watchdog_timeout
//! │  deadline reached ───────┼──> Err(WatchdogTimeout) ──> session torn down
//! └──────────────────────────┘
//! ```
//!
//! The watchdog is armed when the heartbeat starts (right after login
//! succeeds). Only a `pong` moves the deadline; other inbound traffic does
//! not count as liveness. A ping write blocked on a full send buffer or a
//! busy writer is raced against the same deadline.
//!
//! The heartbeat runs inside the session's `select!`, so it is dropped with
//! the session and can never outlive it.

use super::dispatch::Control;
use super::transport::SessionWriter;
use crate::error::{Result, SnotiError};
use crate::protocol::{encode, Envelope};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Send pings and enforce the pong watchdog until cancelled or expired
///
/// Returns `Ok(())` on cancellation, `Err(WatchdogTimeout)` when no pong
/// arrived within `watchdog`, or the write error if a ping could not be sent.
pub(crate) async fn run_heartbeat(
    writer: &SessionWriter,
    control_rx: &mut UnboundedReceiver<Control>,
    ping_interval: Duration,
    watchdog: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    let ping = encode(&Envelope::ping())?;

    // First ping after one full interval, never immediately
    let mut ticker = interval_at(Instant::now() + ping_interval, ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let deadline = sleep(watchdog);
    tokio::pin!(deadline);

    debug!(
        "Heartbeat started (ping every {:?}, watchdog {:?})",
        ping_interval, watchdog
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Heartbeat cancelled");
                return Ok(());
            }
            _ = ticker.tick() => {
                debug!("Heartbeat tick - sending ping");
                // A peer that stops reading stalls the write; the deadline still applies
                tokio::select! {
                    result = writer.send(&ping) => result?,
                    _ = &mut deadline => {
                        warn!("Ping write stalled past the watchdog, closing session");
                        return Err(SnotiError::WatchdogTimeout(watchdog));
                    }
                    _ = cancel.cancelled() => return Ok(()),
                }
            }
            signal = control_rx.recv() => match signal {
                Some(Control::Pong) => {
                    debug!("Pong received, watchdog reset");
                    deadline.as_mut().reset(Instant::now() + watchdog);
                }
                None => {
                    // Control sender lives in the session; only gone on teardown
                    return Ok(());
                }
            },
            _ = &mut deadline => {
                warn!("No pong within {:?}, closing session", watchdog);
                return Err(SnotiError::WatchdogTimeout(watchdog));
            }
        }
    }
}
