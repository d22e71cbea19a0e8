//! Transport session: framed reads and atomic writes over one stream
//!
//! ```text
//!                    ┌──> FrameReader  (receive loop only)
//! BoxedStream ─split─┤
//!                    └──> SessionWriter (shared: caller API + heartbeat)
//! ```
//!
//! Each outbound envelope is written with a single `write_all` while holding
//! the writer lock, so concurrent senders never interleave partial frames.

use super::connection_state::AtomicMetrics;
use crate::connector::BoxedStream;
use crate::error::{Result, SnotiError};
use crate::protocol::envelope::{encode, trim_line, Envelope, DELIMITER};
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Longest wait for a graceful write-side shutdown
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Split a connected stream into its read and write sides
pub(crate) fn split(
    stream: BoxedStream,
    packet_size: usize,
    metrics: Arc<AtomicMetrics>,
) -> (FrameReader<ReadHalf<BoxedStream>>, SessionWriter) {
    let (read_half, write_half) = tokio::io::split(stream);
    (
        FrameReader::new(read_half, packet_size),
        SessionWriter::new(write_half, metrics),
    )
}

/// Bounded line reader
///
/// The read buffer is sized to the packet limit and reused for every frame.
pub struct FrameReader<R> {
    reader: BufReader<R>,
    line: BytesMut,
    limit: usize,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    /// `limit` is the largest accepted frame, delimiter included
    pub fn new(inner: R, limit: usize) -> Self {
        Self {
            reader: BufReader::with_capacity(limit, inner),
            line: BytesMut::with_capacity(limit),
            limit,
        }
    }

    /// Read the next delimiter-terminated frame
    ///
    /// Returns:
    /// * `Ok(Some(frame))` - one frame, delimiter included
    /// * `Ok(None)` - clean EOF between frames
    /// * `Err(FrameTooLarge)` - an oversized line was consumed and discarded;
    ///   the reader is positioned at the next frame and may be called again
    /// * `Err(_)` - the stream is unusable
    ///
    /// Blank lines are skipped.
    pub async fn read_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            self.line.clear();
            let mut size = 0usize;
            let mut discarding = false;

            loop {
                let available = self.reader.fill_buf().await?;
                if available.is_empty() {
                    if size == 0 {
                        return Ok(None);
                    }
                    return Err(SnotiError::ConnectionClosed(
                        "stream ended in the middle of a frame".to_string(),
                    ));
                }

                let (chunk_len, complete) = match available.iter().position(|&b| b == DELIMITER) {
                    Some(pos) => (pos + 1, true),
                    None => (available.len(), false),
                };

                size += chunk_len;
                if !discarding && size <= self.limit {
                    self.line.extend_from_slice(&available[..chunk_len]);
                } else {
                    discarding = true;
                    self.line.clear();
                }
                self.reader.consume(chunk_len);

                if complete {
                    break;
                }
            }

            if discarding {
                return Err(SnotiError::FrameTooLarge {
                    size,
                    limit: self.limit,
                });
            }

            if trim_line(&self.line).is_empty() {
                continue;
            }

            return Ok(Some(self.line.split().freeze()));
        }
    }
}

/// Write side of a session
pub struct SessionWriter {
    inner: Mutex<WriteHalf<BoxedStream>>,
    metrics: Arc<AtomicMetrics>,
}

impl SessionWriter {
    pub(crate) fn new(inner: WriteHalf<BoxedStream>, metrics: Arc<AtomicMetrics>) -> Self {
        Self {
            inner: Mutex::new(inner),
            metrics,
        }
    }

    /// Write one already-encoded frame
    pub async fn send(&self, frame: &[u8]) -> Result<()> {
        let mut writer = self.inner.lock().await;
        writer.write_all(frame).await?;
        writer.flush().await?;
        self.metrics.increment_sent();
        Ok(())
    }

    pub async fn send_envelope(&self, envelope: &Envelope) -> Result<()> {
        let frame = encode(envelope)?;
        debug!("Sending {} frame ({} bytes)", envelope.cmd, frame.len());
        self.send(&frame).await
    }

    /// Shut down the write side; the peer sees EOF
    ///
    /// Gives up after [`CLOSE_TIMEOUT`] if a stalled write holds the lock or
    /// the peer stops reading; the stream is then released when the last
    /// handle to it is dropped.
    pub async fn close(&self) {
        let shutdown = async {
            let mut writer = self.inner.lock().await;
            writer.shutdown().await
        };
        match tokio::time::timeout(CLOSE_TIMEOUT, shutdown).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Socket shutdown returned error: {}", e),
            Err(_) => warn!("Socket shutdown did not finish within {:?}", CLOSE_TIMEOUT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_reads_frames_and_skips_blank_lines() {
        let input: &[u8] = b"{\"cmd\":\"pong\"}\n\r\n\n{\"cmd\":\"login_res\"}\r\n";
        let mut reader = FrameReader::new(input, 64);

        assert_eq!(
            reader.read_frame().await.unwrap().unwrap(),
            Bytes::from_static(b"{\"cmd\":\"pong\"}\n")
        );
        assert_eq!(
            reader.read_frame().await.unwrap().unwrap(),
            Bytes::from_static(b"{\"cmd\":\"login_res\"}\r\n")
        );
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_discarded_and_stream_continues() {
        let mut input = vec![b'x'; 100];
        input.push(b'\n');
        input.extend_from_slice(b"{\"cmd\":\"pong\"}\n");
        let mut reader = FrameReader::new(input.as_slice(), 32);

        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, SnotiError::FrameTooLarge { size: 101, limit: 32 }));
        assert_eq!(
            reader.read_frame().await.unwrap().unwrap(),
            Bytes::from_static(b"{\"cmd\":\"pong\"}\n")
        );
    }

    #[tokio::test]
    async fn test_frame_exactly_at_limit_is_accepted() {
        let input: &[u8] = b"{\"cmd\":\"ping\"}\n";
        let mut reader = FrameReader::new(input, input.len());
        assert_eq!(reader.read_frame().await.unwrap().unwrap().len(), input.len());
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_an_error() {
        let input: &[u8] = b"{\"cmd\":\"po";
        let mut reader = FrameReader::new(input, 64);
        assert!(matches!(
            reader.read_frame().await,
            Err(SnotiError::ConnectionClosed(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_gives_up_behind_a_stalled_write() {
        let (client, _server) = tokio::io::duplex(8);
        let (_reader, writer) = split(Box::new(client), 1024, Arc::new(AtomicMetrics::new()));
        let writer = Arc::new(writer);

        // Larger than the duplex buffer and never read: holds the lock forever
        let stalled = Arc::clone(&writer);
        let blocked = tokio::spawn(async move { stalled.send(&[b'x'; 64]).await });
        tokio::task::yield_now().await;

        let started = tokio::time::Instant::now();
        writer.close().await;
        assert!(started.elapsed() >= CLOSE_TIMEOUT);
        assert!(!blocked.is_finished());
        blocked.abort();
    }

    #[tokio::test]
    async fn test_writer_emits_whole_frames_and_closes() {
        let (client, mut server) = tokio::io::duplex(1024);
        let metrics = Arc::new(AtomicMetrics::new());
        let (_reader, writer) = split(Box::new(client), 1024, Arc::clone(&metrics));

        writer.send_envelope(&Envelope::ack("m1", 7)).await.unwrap();
        writer.send_envelope(&Envelope::ping()).await.unwrap();
        writer.close().await;

        let mut received = String::new();
        server.read_to_string(&mut received).await.unwrap();
        assert_eq!(
            received,
            "{\"cmd\":\"event_ack\",\"msg_id\":\"m1\",\"delivery_id\":7}\n{\"cmd\":\"ping\"}\n"
        );
        assert_eq!(metrics.frames_sent(), 2);
    }
}
