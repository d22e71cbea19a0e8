//! Hash-sharded dispatch pool
//!
//! # Architecture
//!
//! ```text
//! Receive loop ──probe(cmd, did)──┬── did present: lane = fxhash(did) % N
//!                                 └── no did:      lane = round-robin
//!
//! Lane 0: bounded queue ──> OS thread ──┬── pong      ──> heartbeat watchdog reset
//!   ...                                 ├── event_push ─> EventHandler
//! Lane N: bounded queue ──> OS thread ──┴── *_res     ──> ClientEvent::Response
//! ```
//!
//! # Ordering Guarantees
//!
//! - **Per-device sequential**: one device always maps to one lane (FIFO)
//! - **Cross-device parallel**: up to N devices are handled concurrently
//! - **Backpressure**: a full lane blocks the receive loop, which stops
//!   reading from the socket
//!
//! Only frames of an authenticated session reach the lanes; `login_res` is
//! consumed by the handshake before the receive loop starts.
//!
//! Lanes are allocated once and outlive individual sessions. Every frame
//! carries the control sender of the session that read it, so a late `pong`
//! from a torn-down session is dropped instead of reaching the next one.

use super::client::{ClientEvent, SnotiClient};
use crate::error::{Result, SnotiError};
use crate::handler::EventHandler;
use crate::protocol::{decode, Command, EventPush, FrameHeader};
use bytes::Bytes;
use rustc_hash::FxHasher;
use std::hash::Hasher;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Session-scoped signals delivered from lane threads to the session supervisor
#[derive(Debug)]
pub(crate) enum Control {
    /// A `pong` arrived
    Pong,
}

/// Inbound frame travelling through a lane
pub(crate) struct Frame {
    pub header: FrameHeader,
    pub raw: Bytes,
    pub control: mpsc::UnboundedSender<Control>,
}

/// Stable lane index for an affinity key
///
/// FxHash is unseeded, so the mapping is identical across reconnects and
/// process restarts for a fixed lane count.
pub fn lane_index(key: &str, lanes: usize) -> usize {
    let mut hasher = FxHasher::default();
    hasher.write(key.as_bytes());
    (hasher.finish() % lanes.max(1) as u64) as usize
}

/// Fixed set of ordered delivery lanes
pub struct DispatchPool {
    lanes: Vec<mpsc::Sender<Frame>>,
    handles: Vec<std::thread::JoinHandle<()>>,
    next_lane: AtomicUsize,
}

impl DispatchPool {
    /// Allocate `lanes` bounded queues and spawn one consumer thread per lane
    ///
    /// Consumers are running before this returns, so no frame can be queued
    /// without a consumer.
    pub(crate) fn spawn(client: &SnotiClient, lanes: usize, capacity: usize) -> Result<Self> {
        let lanes = lanes.max(1);
        let mut senders = Vec::with_capacity(lanes);
        let mut handles = Vec::with_capacity(lanes);

        for index in 0..lanes {
            let (tx, mut rx) = mpsc::channel::<Frame>(capacity.max(1));
            let client = client.clone();

            let handle = std::thread::Builder::new()
                .name(format!("snoti-lane-{}", index))
                .spawn(move || {
                    debug!("Lane {} consumer started", index);
                    while let Some(frame) = rx.blocking_recv() {
                        consume_frame(&client, index, frame);
                    }
                    debug!("Lane {} channel closed, consumer exiting", index);
                })
                .map_err(|e| SnotiError::Configuration(format!("failed to spawn lane: {}", e)))?;

            senders.push(tx);
            handles.push(handle);
        }

        info!("Dispatch pool started with {} lanes (capacity {})", lanes, capacity);

        Ok(Self {
            lanes: senders,
            handles,
            next_lane: AtomicUsize::new(0),
        })
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Lane for a frame: hashed by affinity key, round-robin otherwise
    pub fn select_lane(&self, affinity_key: Option<&str>) -> usize {
        match affinity_key {
            Some(key) => lane_index(key, self.lanes.len()),
            None => self.next_lane.fetch_add(1, Ordering::Relaxed) % self.lanes.len(),
        }
    }

    /// Queue a frame on its lane, waiting while the lane is full
    pub(crate) async fn dispatch(&self, frame: Frame) -> Result<()> {
        let lane = self.select_lane(frame.header.affinity_key());
        self.lanes[lane]
            .send(frame)
            .await
            .map_err(|_| SnotiError::ChannelSend(format!("lane {} consumer is gone", lane)))
    }

    /// Close every lane and wait for consumers to drain their queues
    pub(crate) fn shutdown(self) {
        drop(self.lanes);
        debug!("Waiting for {} lane threads to complete", self.handles.len());
        for handle in self.handles {
            if handle.join().is_err() {
                error!("Lane thread panicked");
            }
        }
    }
}

fn consume_frame(client: &SnotiClient, lane: usize, frame: Frame) {
    let Frame {
        header,
        raw,
        control,
    } = frame;

    match header.cmd {
        Command::LoginRes => {
            warn!("Unexpected login_res on an authenticated session, dropping");
        }
        Command::Pong => {
            client.metrics_ref().increment_pongs();
            if control.send(Control::Pong).is_err() {
                debug!("Pong arrived after its session ended, dropping");
            }
        }
        Command::EventPush => match EventPush::from_frame(raw) {
            Ok(event) => {
                client.metrics_ref().increment_dispatched();
                if let Err(e) = client.handler().handle(client, event) {
                    error!("Event handler error on lane {}: {}", lane, e);
                }
            }
            Err(e) => {
                client.metrics_ref().increment_decode_errors();
                warn!("Dropping undecodable event_push on lane {}: {}", lane, e);
            }
        },
        cmd if cmd.is_response() => match decode(&raw) {
            Ok(envelope) => {
                if cmd == Command::InvalidMsg {
                    warn!("Server reported invalid message: {:?}", envelope.data);
                } else {
                    info!("Received {}", cmd);
                }
                client.emit(ClientEvent::Response {
                    cmd,
                    data: envelope.data,
                });
            }
            Err(e) => {
                client.metrics_ref().increment_decode_errors();
                warn!("Dropping undecodable {} on lane {}: {}", cmd, lane, e);
            }
        },
        other => {
            warn!("Unknown cmd {}, dropping frame", other);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_index_is_stable_and_in_range() {
        for lanes in 1..16 {
            for key in ["dev1", "dev2", "a", "", "0123456789abcdef"] {
                let lane = lane_index(key, lanes);
                assert!(lane < lanes);
                assert_eq!(lane, lane_index(key, lanes));
            }
        }
    }

    #[test]
    fn test_lane_index_spreads_keys() {
        let lanes = 8;
        let mut counts = vec![0usize; lanes];
        for i in 0..8000 {
            counts[lane_index(&format!("device-{}", i), lanes)] += 1;
        }
        // Every lane gets a reasonable share of 1000 expected
        assert!(counts.iter().all(|&c| c > 500), "skewed distribution: {:?}", counts);
    }
}
