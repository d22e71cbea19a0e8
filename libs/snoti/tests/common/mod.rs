//! Common test utilities for snoti integration tests
//!
//! [`MockSnotiServer`] speaks the line protocol over plain TCP (tests use
//! `TcpConnector`), answers logins according to its [`LoginReply`], and
//! records every line each connection receives.

#![allow(dead_code)]

use parking_lot::Mutex;
use serde_json::Value;
use snoti::{ClientConfig, ClientEvent, SnotiClient};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

pub const LOGIN_OK: &str = r#"{"cmd":"login_res","data":{"result":true,"msg":"ok"}}"#;
pub const PONG: &str = r#"{"cmd":"pong"}"#;

/// How the server answers a login request
#[derive(Debug, Clone)]
pub enum LoginReply {
    Accept,
    Reject(String),
    /// Never answer
    Silent,
}

#[derive(Debug, Clone)]
pub struct ServerBehavior {
    pub login: LoginReply,
    pub reply_pong: bool,
    /// Lines sent in the same write as an accepting `login_res`
    pub push_with_login: Vec<String>,
}

impl Default for ServerBehavior {
    fn default() -> Self {
        Self {
            login: LoginReply::Accept,
            reply_pong: true,
            push_with_login: Vec::new(),
        }
    }
}

struct Connection {
    lines: Vec<String>,
    push: mpsc::UnboundedSender<String>,
    kill: CancellationToken,
    closed: bool,
}

/// A scripted Snoti server for testing
pub struct MockSnotiServer {
    pub addr: SocketAddr,
    connections: Arc<Mutex<Vec<Connection>>>,
    shutdown: CancellationToken,
}

impl MockSnotiServer {
    /// Create and start a new mock server on an ephemeral port
    pub async fn start(behavior: ServerBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(Mutex::new(Vec::new()));
        let shutdown = CancellationToken::new();

        let accept_connections = Arc::clone(&connections);
        let accept_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => match result {
                        Ok((stream, _)) => {
                            let connections = Arc::clone(&accept_connections);
                            let behavior = behavior.clone();
                            let shutdown = accept_shutdown.clone();
                            tokio::spawn(async move {
                                Self::handle_connection(stream, connections, behavior, shutdown).await;
                            });
                        }
                        Err(e) => {
                            eprintln!("Accept error: {}", e);
                            break;
                        }
                    },
                    _ = accept_shutdown.cancelled() => break,
                }
            }
        });

        Self {
            addr,
            connections,
            shutdown,
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        connections: Arc<Mutex<Vec<Connection>>>,
        behavior: ServerBehavior,
        shutdown: CancellationToken,
    ) {
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        let (push_tx, mut push_rx) = mpsc::unbounded_channel::<String>();
        let kill = CancellationToken::new();

        let index = {
            let mut connections = connections.lock();
            connections.push(Connection {
                lines: Vec::new(),
                push: push_tx,
                kill: kill.clone(),
                closed: false,
            });
            connections.len() - 1
        };

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = kill.cancelled() => break,
                line = lines.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        _ => break,
                    };
                    connections.lock()[index].lines.push(line.clone());

                    let reply = match command_of(&line).as_deref() {
                        Some("login_req") | Some("enterprise_login_req") => match &behavior.login {
                            LoginReply::Accept => Some(
                                std::iter::once(LOGIN_OK.to_string())
                                    .chain(behavior.push_with_login.iter().cloned())
                                    .collect::<Vec<_>>()
                                    .join("\n"),
                            ),
                            LoginReply::Reject(msg) => Some(format!(
                                r#"{{"cmd":"login_res","data":{{"result":false,"msg":"{}"}}}}"#,
                                msg
                            )),
                            LoginReply::Silent => None,
                        },
                        Some("ping") if behavior.reply_pong => Some(PONG.to_string()),
                        Some("subscribe_req") => {
                            Some(r#"{"cmd":"subscribe_res","data":{"result":true}}"#.to_string())
                        }
                        _ => None,
                    };

                    if let Some(reply) = reply {
                        if write.write_all(format!("{}\n", reply).as_bytes()).await.is_err() {
                            break;
                        }
                    }
                }
                Some(out) = push_rx.recv() => {
                    if write.write_all(format!("{}\n", out).as_bytes()).await.is_err() {
                        break;
                    }
                }
            }
        }

        let _ = write.shutdown().await;
        connections.lock()[index].closed = true;
    }

    pub fn endpoint(&self) -> String {
        self.addr.to_string()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Lines received on connection `index`
    pub fn lines(&self, index: usize) -> Vec<String> {
        self.connections
            .lock()
            .get(index)
            .map(|c| c.lines.clone())
            .unwrap_or_default()
    }

    /// Lines received on any connection with the given `cmd`
    pub fn lines_with_cmd(&self, cmd: &str) -> Vec<String> {
        self.connections
            .lock()
            .iter()
            .flat_map(|c| c.lines.iter())
            .filter(|line| command_of(line).as_deref() == Some(cmd))
            .cloned()
            .collect()
    }

    pub fn is_closed(&self, index: usize) -> bool {
        self.connections
            .lock()
            .get(index)
            .map(|c| c.closed)
            .unwrap_or(false)
    }

    /// Send a raw line (delimiter appended) on the newest connection
    pub fn push(&self, line: impl Into<String>) {
        if let Some(conn) = self.connections.lock().last() {
            let _ = conn.push.send(line.into());
        }
    }

    /// Drop the newest connection from the server side
    pub fn kill_latest(&self) {
        if let Some(conn) = self.connections.lock().last() {
            conn.kill.cancel();
        }
    }
}

impl Drop for MockSnotiServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn command_of(line: &str) -> Option<String> {
    serde_json::from_str::<Value>(line)
        .ok()
        .and_then(|v| v.get("cmd").and_then(Value::as_str).map(str::to_string))
}

/// Product-mode config pointed at the mock server with fast timings
pub fn test_config(server: &MockSnotiServer) -> ClientConfig {
    ClientConfig::product(server.endpoint(), "pk", "aid", "secret", "sub")
        .with_events("device.online,device.status.kv")
        .with_lanes(4)
        .with_heartbeat(Duration::from_secs(5), Duration::from_secs(15))
        .with_reconnect_delay(Duration::from_millis(50))
        .with_login_timeout(Duration::from_secs(2))
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Wait for the first client event matching `predicate`, discarding others
pub async fn wait_for_event(
    client: &SnotiClient,
    timeout: Duration,
    predicate: impl Fn(&ClientEvent) -> bool,
) -> Option<ClientEvent> {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        while let Some(event) = client.try_recv_event() {
            crate::verbose_println!("  event: {:?}", event);
            if predicate(&event) {
                return Some(event);
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    None
}
