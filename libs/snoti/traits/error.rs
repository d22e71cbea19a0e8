use std::time::Duration;
use thiserror::Error;

/// Main error type for the snoti client
#[derive(Error, Debug)]
pub enum SnotiError {
    /// TCP connect failed
    #[error("Connect error: {0}")]
    Connect(String),

    /// TLS handshake or connector setup failed
    #[error("TLS error: {0}")]
    Tls(String),

    /// Socket read/write failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection closed by the peer
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// No authenticated session is available for outbound frames
    #[error("Not connected: no authenticated session")]
    NotConnected,

    /// A single inbound frame could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// An outbound envelope could not be serialized
    #[error("Encode error: {0}")]
    Encode(String),

    /// Inbound line exceeded the configured packet size
    #[error("Frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    /// Server answered the login request with `result: false`
    #[error("Login rejected: {0}")]
    AuthRejected(String),

    /// No pong arrived within the watchdog window
    #[error("Heartbeat watchdog expired after {0:?} without pong")]
    WatchdogTimeout(Duration),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid client lifecycle transition (e.g. start after stop)
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl SnotiError {
    /// Errors that end the current session and trigger a reconnect.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SnotiError::Connect(_)
                | SnotiError::Tls(_)
                | SnotiError::Io(_)
                | SnotiError::ConnectionClosed(_)
                | SnotiError::WatchdogTimeout(_)
                | SnotiError::Timeout(_)
        )
    }
}

/// Result type for snoti operations
pub type Result<T> = std::result::Result<T, SnotiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(SnotiError::ConnectionClosed("eof".into()).is_transport());
        assert!(SnotiError::WatchdogTimeout(Duration::from_secs(180)).is_transport());
        assert!(!SnotiError::AuthRejected("bad credentials".into()).is_transport());
        assert!(!SnotiError::NotConnected.is_transport());
    }

    #[test]
    fn test_frame_too_large_message() {
        let err = SnotiError::FrameTooLarge { size: 2048, limit: 1024 };
        assert_eq!(err.to_string(), "Frame of 2048 bytes exceeds limit of 1024 bytes");
    }
}
