//! Wire envelope and line codec
//!
//! Every protocol unit is one JSON object terminated by a single `\n`:
//!
//! ```text
//! {"cmd":"event_ack","msg_id":"m1","delivery_id":7}\n
//! ```
//!
//! Outbound frames are fully typed [`Envelope`]s. Inbound frames are first
//! probed for just `cmd` and `did` ([`FrameHeader`]) so the receive loop can
//! pick a lane without decoding the whole payload.

use crate::error::{Result, SnotiError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Line delimiter
pub const DELIMITER: u8 = b'\n';

/// Protocol command tag
///
/// Unknown tags decode as [`Command::Other`] so a new server-side command
/// never breaks the stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Command {
    LoginReq,
    EnterpriseLoginReq,
    LoginRes,
    EventPush,
    EventAck,
    Ping,
    Pong,
    SubscribeReq,
    SubscribeRes,
    UnsubscribeReq,
    UnsubscribeRes,
    RemoteControlReq,
    RemoteControlRes,
    InvalidMsg,
    Other(String),
}

impl Command {
    pub fn as_str(&self) -> &str {
        match self {
            Command::LoginReq => "login_req",
            Command::EnterpriseLoginReq => "enterprise_login_req",
            Command::LoginRes => "login_res",
            Command::EventPush => "event_push",
            Command::EventAck => "event_ack",
            Command::Ping => "ping",
            Command::Pong => "pong",
            Command::SubscribeReq => "subscribe_req",
            Command::SubscribeRes => "subscribe_res",
            Command::UnsubscribeReq => "unsubscribe_req",
            Command::UnsubscribeRes => "unsubscribe_res",
            Command::RemoteControlReq => "remote_control_v2_req",
            Command::RemoteControlRes => "remote_control_v2_res",
            Command::InvalidMsg => "invalid_msg",
            Command::Other(tag) => tag,
        }
    }

    /// Responses to caller-issued requests, surfaced as client events
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            Command::SubscribeRes
                | Command::UnsubscribeRes
                | Command::RemoteControlRes
                | Command::InvalidMsg
        )
    }
}

impl From<String> for Command {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "login_req" => Command::LoginReq,
            "enterprise_login_req" => Command::EnterpriseLoginReq,
            "login_res" => Command::LoginRes,
            "event_push" => Command::EventPush,
            "event_ack" => Command::EventAck,
            "ping" => Command::Ping,
            "pong" => Command::Pong,
            "subscribe_req" => Command::SubscribeReq,
            "subscribe_res" => Command::SubscribeRes,
            "unsubscribe_req" => Command::UnsubscribeReq,
            "unsubscribe_res" => Command::UnsubscribeRes,
            "remote_control_v2_req" => Command::RemoteControlReq,
            "remote_control_v2_res" => Command::RemoteControlRes,
            "invalid_msg" => Command::InvalidMsg,
            _ => Command::Other(tag),
        }
    }
}

impl From<Command> for String {
    fn from(cmd: Command) -> Self {
        match cmd {
            Command::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One protocol unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub cmd: Command,

    /// Only sent with login requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefetch_count: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<u64>,
}

impl Envelope {
    pub fn new(cmd: Command) -> Self {
        Self {
            cmd,
            prefetch_count: None,
            data: None,
            msg_id: None,
            delivery_id: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_prefetch_count(mut self, prefetch_count: u16) -> Self {
        self.prefetch_count = Some(prefetch_count);
        self
    }

    pub fn ping() -> Self {
        Self::new(Command::Ping)
    }

    /// Acknowledge one delivery of a pushed event
    pub fn ack(msg_id: impl Into<String>, delivery_id: u64) -> Self {
        Self {
            msg_id: Some(msg_id.into()),
            delivery_id: Some(delivery_id),
            ..Self::new(Command::EventAck)
        }
    }
}

/// Serialize an envelope into one delimiter-terminated frame
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>> {
    let mut frame =
        serde_json::to_vec(envelope).map_err(|e| SnotiError::Encode(e.to_string()))?;
    frame.push(DELIMITER);
    Ok(frame)
}

/// Parse one frame (delimiter optional)
pub fn decode(frame: &[u8]) -> Result<Envelope> {
    serde_json::from_slice(trim_line(frame)).map_err(|e| SnotiError::Decode(e.to_string()))
}

/// Routing view of an inbound frame
///
/// `did` is the affinity key: every frame for one device lands on the same
/// lane. Control frames (login, pong) carry none.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FrameHeader {
    pub cmd: Command,
    #[serde(default)]
    pub did: Option<String>,
}

impl FrameHeader {
    pub fn probe(frame: &[u8]) -> Result<Self> {
        serde_json::from_slice(trim_line(frame)).map_err(|e| SnotiError::Decode(e.to_string()))
    }

    /// Affinity key, if the frame carries a non-empty device id
    pub fn affinity_key(&self) -> Option<&str> {
        self.did.as_deref().filter(|did| !did.is_empty())
    }
}

/// Strip the trailing delimiter (and a `\r`, if the peer sent CRLF)
pub(crate) fn trim_line(frame: &[u8]) -> &[u8] {
    let mut end = frame.len();
    while end > 0 && matches!(frame[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    &frame[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ack_wire_format() {
        let frame = encode(&Envelope::ack("m1", 7)).unwrap();
        assert_eq!(
            String::from_utf8(frame).unwrap(),
            "{\"cmd\":\"event_ack\",\"msg_id\":\"m1\",\"delivery_id\":7}\n"
        );
    }

    #[test]
    fn test_ping_wire_format() {
        let frame = encode(&Envelope::ping()).unwrap();
        assert_eq!(frame, b"{\"cmd\":\"ping\"}\n");
    }

    #[test]
    fn test_decode_then_encode_preserves_fields() {
        let raw = b"{\"cmd\":\"event_push\",\"data\":{\"k\":[1,2]},\"msg_id\":\"m9\",\"delivery_id\":3}\n";
        let envelope = decode(raw).unwrap();
        assert_eq!(envelope.cmd, Command::EventPush);
        assert_eq!(envelope.data, Some(json!({"k": [1, 2]})));

        let again = decode(&encode(&envelope).unwrap()).unwrap();
        assert_eq!(again, envelope);
    }

    #[test]
    fn test_unknown_command_is_preserved() {
        let envelope = decode(b"{\"cmd\":\"device_shadow\"}").unwrap();
        assert_eq!(envelope.cmd, Command::Other("device_shadow".into()));
        assert_eq!(encode(&envelope).unwrap(), b"{\"cmd\":\"device_shadow\"}\n");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode(b"not json\n"), Err(SnotiError::Decode(_))));
        assert!(matches!(decode(b"{\"data\":1}\n"), Err(SnotiError::Decode(_))));
    }

    #[test]
    fn test_probe_extracts_affinity_key() {
        let header = FrameHeader::probe(
            b"{\"cmd\":\"event_push\",\"msg_id\":\"m1\",\"delivery_id\":7,\"did\":\"dev1\"}\r\n",
        )
        .unwrap();
        assert_eq!(header.cmd, Command::EventPush);
        assert_eq!(header.affinity_key(), Some("dev1"));

        let pong = FrameHeader::probe(b"{\"cmd\":\"pong\"}\n").unwrap();
        assert_eq!(pong.affinity_key(), None);

        let empty = FrameHeader::probe(b"{\"cmd\":\"event_push\",\"did\":\"\"}\n").unwrap();
        assert_eq!(empty.affinity_key(), None);
    }
}
