//! Login handshake
//!
//! ```text
//! connected ─> send login_req / enterprise_login_req ─> AwaitingLogin
//!                                                          │
//!          login_res {result:true}  ───────────────────────┼─> Authenticated
//!          login_res {result:false} / malformed  ──────────┼─> Err(AuthRejected)
//!          no exchange within login_timeout ───────────────┘─> Err(Timeout)
//! ```
//!
//! The handshake reads the session directly, before the receive loop starts.
//! Frames the server sends after `login_res` stay buffered in the reader and
//! only reach the lanes once the session is published, so a handler can
//! always acknowledge the first pushed batch.
//!
//! No other outbound frame is written on the session before this succeeds.

use super::config::ClientConfig;
use super::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use super::transport::{FrameReader, SessionWriter};
use crate::error::{Result, SnotiError};
use crate::protocol::{check_login_response, login_envelope, Command, FrameHeader};
use bytes::Bytes;
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

pub(crate) async fn authenticate<R>(
    writer: &SessionWriter,
    reader: &mut FrameReader<R>,
    config: &ClientConfig,
    state: &AtomicConnectionState,
    metrics: &AtomicMetrics,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    state.set(ConnectionState::AwaitingLogin);
    let login = login_envelope(config)?;

    let exchange = async {
        writer.send_envelope(&login).await?;
        debug!("Login request sent, awaiting login_res");
        read_login_response(reader, metrics).await
    };
    let response = tokio::time::timeout(config.login_timeout(), exchange)
        .await
        .map_err(|_| {
            SnotiError::Timeout(format!(
                "no login_res within {:?}",
                config.login_timeout()
            ))
        })??;

    if let Err(e) = check_login_response(&response) {
        warn!("Login rejected by server: {}", e);
        return Err(e);
    }

    state.set(ConnectionState::Authenticated);
    info!("Logged in to {}", config.endpoint);
    Ok(())
}

/// Read frames until `login_res`, leaving everything after it unread
async fn read_login_response<R>(reader: &mut FrameReader<R>, metrics: &AtomicMetrics) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    loop {
        let raw = match reader.read_frame().await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                return Err(SnotiError::ConnectionClosed(
                    "session ended before login_res".to_string(),
                ))
            }
            Err(SnotiError::FrameTooLarge { size, limit }) => {
                metrics.increment_decode_errors();
                warn!("Dropping frame of {} bytes (limit {}) during login", size, limit);
                continue;
            }
            Err(e) => return Err(e),
        };
        metrics.increment_received();

        match FrameHeader::probe(&raw) {
            Ok(header) if header.cmd == Command::LoginRes => return Ok(raw),
            Ok(header) if header.cmd == Command::Pong => {
                metrics.increment_pongs();
                debug!("Ignoring pong before login completed");
            }
            Ok(header) => warn!("Dropping {} received before login_res", header.cmd),
            Err(e) => {
                metrics.increment_decode_errors();
                warn!("Dropping undecodable frame during login: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::BoxedStream;
    use crate::core::transport::split;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf};

    fn config() -> ClientConfig {
        ClientConfig::product("127.0.0.1:2017", "pk", "aid", "secret", "sub")
            .with_login_timeout(Duration::from_secs(5))
    }

    fn session() -> (
        SessionWriter,
        FrameReader<ReadHalf<BoxedStream>>,
        DuplexStream,
        Arc<AtomicMetrics>,
    ) {
        let (client, server) = tokio::io::duplex(4096);
        let metrics = Arc::new(AtomicMetrics::new());
        let (reader, writer) = split(Box::new(client), 1024, Arc::clone(&metrics));
        (writer, reader, server, metrics)
    }

    #[tokio::test]
    async fn test_accepted_login_authenticates() {
        let (writer, mut reader, mut server, metrics) = session();
        let state = AtomicConnectionState::new(ConnectionState::Connecting);

        server
            .write_all(b"{\"cmd\":\"pong\"}\n{\"cmd\":\"login_res\",\"data\":{\"result\":true,\"msg\":\"ok\"}}\n")
            .await
            .unwrap();

        authenticate(&writer, &mut reader, &config(), &state, &metrics)
            .await
            .unwrap();
        assert_eq!(state.get(), ConnectionState::Authenticated);
        assert_eq!(metrics.frames_received(), 2);
    }

    #[tokio::test]
    async fn test_frames_after_login_res_stay_unread() {
        let (writer, mut reader, mut server, metrics) = session();
        let state = AtomicConnectionState::new(ConnectionState::Connecting);

        // One write: verdict plus the first pushed event
        server
            .write_all(
                b"{\"cmd\":\"login_res\",\"data\":{\"result\":true}}\n\
                  {\"cmd\":\"event_push\",\"msg_id\":\"m1\",\"delivery_id\":7,\"did\":\"dev1\"}\n",
            )
            .await
            .unwrap();

        authenticate(&writer, &mut reader, &config(), &state, &metrics)
            .await
            .unwrap();

        let next = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(FrameHeader::probe(&next).unwrap().cmd, Command::EventPush);
        assert_eq!(metrics.frames_received(), 1);
    }

    #[tokio::test]
    async fn test_rejected_login_carries_server_message() {
        let (writer, mut reader, mut server, metrics) = session();
        let state = AtomicConnectionState::new(ConnectionState::Connecting);

        server
            .write_all(b"{\"cmd\":\"login_res\",\"data\":{\"result\":false,\"msg\":\"bad secret\"}}\n")
            .await
            .unwrap();

        let err = authenticate(&writer, &mut reader, &config(), &state, &metrics)
            .await
            .unwrap_err();
        assert!(matches!(err, SnotiError::AuthRejected(msg) if msg == "bad secret"));
        assert_eq!(state.get(), ConnectionState::AwaitingLogin);
    }

    #[tokio::test]
    async fn test_closed_peer_fails_login() {
        let (writer, mut reader, server, metrics) = session();
        let state = AtomicConnectionState::new(ConnectionState::Connecting);
        drop(server);

        let err = authenticate(&writer, &mut reader, &config(), &state, &metrics)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SnotiError::ConnectionClosed(_) | SnotiError::Io(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_login_res_times_out() {
        let (writer, mut reader, _server, metrics) = session();
        let state = AtomicConnectionState::new(ConnectionState::Connecting);

        let err = authenticate(&writer, &mut reader, &config(), &state, &metrics)
            .await
            .unwrap_err();
        assert!(matches!(err, SnotiError::Timeout(_)));
    }
}
