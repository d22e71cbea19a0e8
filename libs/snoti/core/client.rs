//! Snoti client: lifecycle orchestrator and public API
//!
//! # Architecture
//!
//! ```text
//!                         ┌──────────────────── run_client (tokio task) ─────────────────────┐
//!  start() ─spawn lanes──>│ loop {                                                           │
//!                         │   connect ──> split ──> login (reads login_res inline)           │
//!                         │     publish session ──┬── receive_loop ──> DispatchPool lanes    │
//!                         │                       ├── heartbeat/watchdog                     │
//!                         │                       └── shutdown token                         │
//!                         │   first to finish tears the session down                         │
//!                         │   sleep(reconnect delay) or exit on stop                         │
//!                         │ }                                                                │
//!                         └──────────────────────────────────────────────────────────────────┘
//!  ack()/subscribe()/remote_control() ──> current authenticated SessionWriter (or NotConnected)
//! ```
//!
//! Exactly one session exists at a time. Its login, reader and heartbeat
//! live inside one `select!`, so nothing from an old session
//! survives into the next one.

use super::config::{AuthFailurePolicy, ClientConfig};
use super::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use super::dispatch::{Control, DispatchPool, Frame};
use super::handshake::authenticate;
use super::heartbeat::run_heartbeat;
use super::transport::{split, FrameReader, SessionWriter};
use crate::connector::Connector;
use crate::error::{Result, SnotiError};
use crate::handler::EventHandler;
use crate::protocol::{
    remote_control_envelope, subscribe_envelope, unsubscribe_envelope, Command, ControlData,
    Envelope, FrameHeader,
};
use crate::reconnect::ReconnectionStrategy;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle notifications from the client
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Transport connected (login not yet done)
    Connected,
    /// Login accepted, heartbeat running
    Authenticated,
    /// Server rejected the login
    AuthRejected(String),
    /// An authenticated session ended
    Disconnected,
    /// Reconnecting (reconnect number)
    Reconnecting(usize),
    /// Response to a subscribe/unsubscribe/remote-control request
    Response { cmd: Command, data: Option<Value> },
    /// Session-ending error
    Error(String),
    /// The client will not connect again
    Terminated,
}

/// Client metrics snapshot
#[derive(Debug, Clone)]
pub struct Metrics {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub events_dispatched: u64,
    pub decode_errors: u64,
    pub pongs_received: u64,
    pub reconnect_count: u64,
    pub connection_state: ConnectionState,
}

struct Inner {
    config: ClientConfig,
    handler: Box<dyn EventHandler>,
    connector: Box<dyn Connector>,
    reconnect_strategy: Box<dyn ReconnectionStrategy>,
    state: AtomicConnectionState,
    metrics: Arc<AtomicMetrics>,
    /// Writer of the current session, published only after login succeeds
    session: RwLock<Option<Arc<SessionWriter>>>,
    shutdown: CancellationToken,
    started: AtomicBool,
    runtime: OnceLock<tokio::runtime::Handle>,
    task: Mutex<Option<JoinHandle<()>>>,
    event_tx: Sender<ClientEvent>,
    event_rx: Receiver<ClientEvent>,
}

/// Persistent Snoti push client
///
/// Cheap to clone; every clone drives the same connection. The event
/// handler receives a reference to the client so it can acknowledge
/// deliveries from its lane thread.
///
/// # Example
///
/// ```ignore
/// let client = SnotiClient::builder()
///     .config(ClientConfig::load("config/snoti.yaml")?)
///     .handler(|client: &SnotiClient, event: EventPush| {
///         if let Some((msg_id, delivery_id)) = event.ack_ids() {
///             client.ack_blocking(msg_id, delivery_id)?;
///         }
///         Ok(())
///     })
///     .build()?;
///
/// client.start()?;
/// tokio::signal::ctrl_c().await?;
/// client.stop().await;
/// ```
#[derive(Clone)]
pub struct SnotiClient {
    inner: Arc<Inner>,
}

impl SnotiClient {
    /// Called by the builder's `build()` method
    pub(crate) fn new(
        config: ClientConfig,
        handler: Box<dyn EventHandler>,
        connector: Box<dyn Connector>,
        reconnect_strategy: Box<dyn ReconnectionStrategy>,
    ) -> Self {
        let (event_tx, event_rx) = unbounded();
        Self {
            inner: Arc::new(Inner {
                config,
                handler,
                connector,
                reconnect_strategy,
                state: AtomicConnectionState::new(ConnectionState::Disconnected),
                metrics: Arc::new(AtomicMetrics::new()),
                session: RwLock::new(None),
                shutdown: CancellationToken::new(),
                started: AtomicBool::new(false),
                runtime: OnceLock::new(),
                task: Mutex::new(None),
                event_tx,
                event_rx,
            }),
        }
    }

    /// Spawn the dispatch lanes and begin the connect/login/reconnect cycle
    ///
    /// Returns immediately; connection progress is reported through
    /// [`ClientEvent`]s. Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// `InvalidState` if the client was already started or has been stopped.
    pub fn start(&self) -> Result<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SnotiError::InvalidState(
                "client has been stopped and cannot be restarted".to_string(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            SnotiError::InvalidState("start must be called within a tokio runtime".to_string())
        })?;
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Err(SnotiError::InvalidState("client already started".to_string()));
        }
        let _ = self.inner.runtime.set(runtime.clone());

        let pool = DispatchPool::spawn(
            self,
            self.inner.config.lane_count(),
            self.inner.config.lane_capacity,
        )?;

        info!(
            "Starting snoti client for {} ({} lanes)",
            self.inner.config.endpoint,
            pool.lane_count()
        );

        let client = self.clone();
        let handle = runtime.spawn(async move {
            run_client(client, pool).await;
        });
        *self.inner.task.lock() = Some(handle);
        Ok(())
    }

    /// Stop the client
    ///
    /// Cancels any pending reconnect, closes the current session and waits
    /// until every lane has drained. No handler runs after this returns.
    /// Must not be called from inside the event handler.
    pub async fn stop(&self) {
        info!("Stopping snoti client");
        if self.inner.state.get() != ConnectionState::Failed {
            self.inner.state.set(ConnectionState::ShuttingDown);
        }
        self.inner.shutdown.cancel();

        let handle = self.inner.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Client task failed: {}", e);
            }
        }
        let _ = self
            .inner
            .state
            .compare_exchange(ConnectionState::ShuttingDown, ConnectionState::Disconnected);

        info!("Snoti client stopped");
    }

    /// Acknowledge one delivery of a pushed event
    pub async fn ack(&self, msg_id: &str, delivery_id: u64) -> Result<()> {
        self.send(&Envelope::ack(msg_id, delivery_id)).await
    }

    /// Add event types to the running subscription
    pub async fn subscribe(&self, event_types: &[&str]) -> Result<()> {
        self.send(&subscribe_envelope(&self.inner.config, event_types)?)
            .await
    }

    /// Remove event types from the running subscription
    pub async fn unsubscribe(&self, event_types: &[&str]) -> Result<()> {
        self.send(&unsubscribe_envelope(&self.inner.config, event_types)?)
            .await
    }

    /// Send one remote-control request covering `entries`
    pub async fn remote_control(&self, entries: &[ControlData]) -> Result<()> {
        self.send(&remote_control_envelope(entries)?).await
    }

    /// Write an envelope on the current authenticated session
    ///
    /// # Errors
    /// `NotConnected` when no session is logged in; nothing is queued.
    pub async fn send(&self, envelope: &Envelope) -> Result<()> {
        let writer = self
            .inner
            .session
            .read()
            .as_ref()
            .map(Arc::clone)
            .ok_or(SnotiError::NotConnected)?;
        writer.send_envelope(envelope).await
    }

    /// Blocking [`ack`](Self::ack) for use from the event handler
    pub fn ack_blocking(&self, msg_id: &str, delivery_id: u64) -> Result<()> {
        self.block_on(self.ack(msg_id, delivery_id))
    }

    /// Blocking [`remote_control`](Self::remote_control) for use from the event handler
    pub fn remote_control_blocking(&self, entries: &[ControlData]) -> Result<()> {
        self.block_on(self.remote_control(entries))
    }

    /// Blocking [`send`](Self::send) for use from the event handler
    pub fn send_blocking(&self, envelope: &Envelope) -> Result<()> {
        self.block_on(self.send(envelope))
    }

    fn block_on<F>(&self, future: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(SnotiError::InvalidState(
                "blocking call from async context, use the async method".to_string(),
            ));
        }
        let runtime = self
            .inner
            .runtime
            .get()
            .ok_or_else(|| SnotiError::InvalidState("client not started".to_string()))?;
        runtime.block_on(future)
    }

    /// Get current connection state
    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    /// Logged in and able to send
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.inner.state.is_connected()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Get current metrics
    pub fn metrics(&self) -> Metrics {
        let metrics = &self.inner.metrics;
        Metrics {
            frames_sent: metrics.frames_sent(),
            frames_received: metrics.frames_received(),
            events_dispatched: metrics.events_dispatched(),
            decode_errors: metrics.decode_errors(),
            pongs_received: metrics.pongs_received(),
            reconnect_count: metrics.reconnect_count(),
            connection_state: self.inner.state.get(),
        }
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv_event(&self) -> Option<ClientEvent> {
        self.inner.event_rx.try_recv().ok()
    }

    /// Receive an event (blocking)
    pub fn recv_event(&self) -> std::result::Result<ClientEvent, crossbeam_channel::RecvError> {
        self.inner.event_rx.recv()
    }

    /// Receive an event, giving up after `timeout`
    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<ClientEvent> {
        self.inner.event_rx.recv_timeout(timeout).ok()
    }

    pub(crate) fn emit(&self, event: ClientEvent) {
        let _ = self.inner.event_tx.send(event);
    }

    pub(crate) fn metrics_ref(&self) -> &AtomicMetrics {
        &self.inner.metrics
    }

    pub(crate) fn handler(&self) -> &dyn EventHandler {
        self.inner.handler.as_ref()
    }
}

/// Main client task loop
async fn run_client(client: SnotiClient, pool: DispatchPool) {
    let inner = &client.inner;
    let mut attempt = 0usize;
    let mut reconnects = 0usize;

    loop {
        if inner.shutdown.is_cancelled() {
            debug!("Shutdown requested, exiting main loop");
            break;
        }

        if reconnects == 0 {
            inner.state.set(ConnectionState::Connecting);
        } else {
            inner.state.set(ConnectionState::Reconnecting);
            client.emit(ClientEvent::Reconnecting(reconnects));
        }

        let (authenticated, result) = run_session(&client, &pool).await;

        if authenticated {
            attempt = 0;
            client.emit(ClientEvent::Disconnected);
        }

        match result {
            Ok(()) => {}
            Err(SnotiError::AuthRejected(msg)) => {
                error!("Login rejected: {}", msg);
                client.emit(ClientEvent::AuthRejected(msg));
                if inner.config.auth_failure_policy == AuthFailurePolicy::Stop {
                    warn!("Auth failure policy is stop, not reconnecting");
                    inner.state.set(ConnectionState::Failed);
                    break;
                }
            }
            Err(e) => {
                if e.is_transport() {
                    warn!("Session ended: {}", e);
                } else {
                    error!("Session failed: {}", e);
                }
                client.emit(ClientEvent::Error(e.to_string()));
            }
        }

        if inner.shutdown.is_cancelled() {
            debug!("Shutdown requested during session, stopping reconnection");
            break;
        }
        inner.state.set(ConnectionState::Disconnected);

        match inner.reconnect_strategy.next_delay(attempt) {
            Some(delay) => {
                info!("Reconnecting in {:?} (attempt {})", delay, attempt + 1);
                tokio::select! {
                    _ = inner.shutdown.cancelled() => {
                        debug!("Shutdown requested during reconnection delay");
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
                reconnects += 1;
                inner.metrics.increment_reconnects();
            }
            None => {
                warn!("Reconnection strategy exhausted, stopping");
                inner.state.set(ConnectionState::Failed);
                break;
            }
        }
    }

    if inner.state.get() != ConnectionState::Failed {
        inner.state.set(ConnectionState::Disconnected);
    }

    // Lane threads block on their queues; join them off the runtime
    if let Err(e) = tokio::task::spawn_blocking(move || pool.shutdown()).await {
        error!("Dispatch pool shutdown failed: {}", e);
    }

    client.emit(ClientEvent::Terminated);
    info!("Client task exiting");
}

/// One connect-to-teardown session
///
/// Returns whether the session got past login, plus the reason it ended
/// (`Ok` only for a requested shutdown).
async fn run_session(client: &SnotiClient, pool: &DispatchPool) -> (bool, Result<()>) {
    let inner = &client.inner;
    let config = &inner.config;

    let connect = tokio::time::timeout(
        config.connect_timeout(),
        inner.connector.connect(&config.endpoint),
    );
    let stream = tokio::select! {
        _ = inner.shutdown.cancelled() => return (false, Ok(())),
        result = connect => match result {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return (false, Err(e)),
            Err(_) => {
                return (
                    false,
                    Err(SnotiError::Timeout(format!(
                        "connect to {} exceeded {:?}",
                        config.endpoint,
                        config.connect_timeout()
                    ))),
                )
            }
        },
    };

    info!("Connected to {}", config.endpoint);
    client.emit(ClientEvent::Connected);

    let (mut reader, writer) = split(
        stream,
        config.effective_packet_size(),
        Arc::clone(&inner.metrics),
    );
    let writer = Arc::new(writer);
    let (control_tx, mut control_rx) = mpsc::unbounded_channel();
    let cancel = inner.shutdown.child_token();

    let result = tokio::select! {
        _ = cancel.cancelled() => Ok(()),
        result = run_authenticated(
            client,
            pool,
            &writer,
            &mut reader,
            &control_tx,
            &mut control_rx,
            &cancel,
        ) => result,
    };

    cancel.cancel();
    let authenticated = inner.session.write().take().is_some();
    writer.close().await;
    debug!("Session closed (authenticated: {})", authenticated);

    (authenticated, result)
}

/// Log in, publish the session, then read and keep alive until failure
///
/// The receive loop starts only after the session is published, so every
/// frame a handler sees belongs to a session it can acknowledge on.
async fn run_authenticated<R>(
    client: &SnotiClient,
    pool: &DispatchPool,
    writer: &Arc<SessionWriter>,
    reader: &mut FrameReader<R>,
    control_tx: &mpsc::UnboundedSender<Control>,
    control_rx: &mut mpsc::UnboundedReceiver<Control>,
    cancel: &CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let inner = &client.inner;
    authenticate(writer, reader, &inner.config, &inner.state, &inner.metrics).await?;

    *inner.session.write() = Some(Arc::clone(writer));
    client.emit(ClientEvent::Authenticated);
    inner.state.set(ConnectionState::HeartbeatActive);

    tokio::select! {
        result = receive_loop(client, pool, reader, control_tx) => result,
        result = run_heartbeat(
            writer,
            control_rx,
            inner.config.ping_interval(),
            inner.config.watchdog_timeout(),
            cancel,
        ) => result,
    }
}

/// Read frames and hand them to the lanes until the stream fails
async fn receive_loop<R>(
    client: &SnotiClient,
    pool: &DispatchPool,
    reader: &mut FrameReader<R>,
    control: &mpsc::UnboundedSender<Control>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let metrics = client.metrics_ref();

    loop {
        let raw = match reader.read_frame().await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                return Err(SnotiError::ConnectionClosed(
                    "server closed the connection".to_string(),
                ))
            }
            Err(SnotiError::FrameTooLarge { size, limit }) => {
                metrics.increment_decode_errors();
                warn!("Dropping frame of {} bytes (limit {})", size, limit);
                continue;
            }
            Err(e) => return Err(e),
        };
        metrics.increment_received();

        let header = match FrameHeader::probe(&raw) {
            Ok(header) => header,
            Err(e) => {
                metrics.increment_decode_errors();
                warn!("Dropping undecodable frame: {}", e);
                continue;
            }
        };

        pool.dispatch(Frame {
            header,
            raw,
            control: control.clone(),
        })
        .await?;
    }
}
