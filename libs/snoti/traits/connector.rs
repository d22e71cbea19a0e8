//! Transport connectors
//!
//! A [`Connector`] turns an endpoint (`host:port`) into a duplex byte stream.
//! The session layer only needs `AsyncRead + AsyncWrite`, so TLS and plain
//! TCP are interchangeable here.
//!
//! # Certificate trust
//!
//! The Snoti service presents a fixed certificate that does not chain to a
//! public root. [`TlsConnector::permissive`] therefore disables certificate
//! and hostname verification: trust rests on the configured endpoint, not on
//! the certificate. Use [`TlsConnector::from_native`] to supply a stricter
//! connector.

use crate::error::{Result, SnotiError};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_native_tls::native_tls;
use tracing::debug;

/// Duplex stream produced by a connector
pub trait SessionStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> SessionStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Boxed session stream
pub type BoxedStream = Box<dyn SessionStream>;

/// Trait for opening the transport to the Snoti endpoint
///
/// Called once per connect attempt; a fresh stream is created for every
/// session and never reused across reconnects.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<BoxedStream>;
}

/// Plain TCP connector
///
/// For local relays that terminate TLS themselves, and for tests.
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, endpoint: &str) -> Result<BoxedStream> {
        let stream = open_tcp(endpoint).await?;
        Ok(Box::new(stream))
    }
}

/// TLS-over-TCP connector backed by native-tls
pub struct TlsConnector {
    inner: tokio_native_tls::TlsConnector,
}

impl TlsConnector {
    /// Connector that accepts the service's self-issued certificate
    pub fn permissive() -> Result<Self> {
        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|e| SnotiError::Tls(e.to_string()))?;
        Ok(Self::from_native(connector))
    }

    /// Wrap a caller-configured native-tls connector
    pub fn from_native(connector: native_tls::TlsConnector) -> Self {
        Self {
            inner: tokio_native_tls::TlsConnector::from(connector),
        }
    }
}

#[async_trait]
impl Connector for TlsConnector {
    async fn connect(&self, endpoint: &str) -> Result<BoxedStream> {
        let tcp = open_tcp(endpoint).await?;
        let domain = host_of(endpoint);
        let stream = self
            .inner
            .connect(domain, tcp)
            .await
            .map_err(|e| SnotiError::Tls(e.to_string()))?;
        debug!("TLS handshake completed with {}", endpoint);
        Ok(Box::new(stream))
    }
}

async fn open_tcp(endpoint: &str) -> Result<TcpStream> {
    let stream = TcpStream::connect(endpoint)
        .await
        .map_err(|e| SnotiError::Connect(format!("{}: {}", endpoint, e)))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Host part of `host:port` (IPv6 brackets stripped)
fn host_of(endpoint: &str) -> &str {
    let host = endpoint
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(endpoint);
    host.trim_start_matches('[').trim_end_matches(']')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("snoti.gizwits.com:2017"), "snoti.gizwits.com");
        assert_eq!(host_of("[::1]:2017"), "::1");
        assert_eq!(host_of("localhost"), "localhost");
    }

    #[tokio::test]
    async fn test_tcp_connect_refused_is_connect_error() {
        // Bind then drop to get a port that is very likely closed
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = TcpConnector.connect(&addr.to_string()).await.err().unwrap();
        assert!(matches!(err, SnotiError::Connect(_)));
    }
}
