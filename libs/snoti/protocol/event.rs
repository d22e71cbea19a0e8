use super::envelope::trim_line;
use crate::error::{Result, SnotiError};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;

/// One `event_push` frame as handed to the event handler
///
/// The commonly used fields are parsed; everything else stays in `payload`,
/// the raw JSON line (without delimiter).
#[derive(Debug, Clone)]
pub struct EventPush {
    pub msg_id: Option<String>,
    pub delivery_id: Option<u64>,
    pub did: Option<String>,
    pub mac: Option<String>,
    pub product_key: Option<String>,
    pub event_type: Option<String>,
    pub payload: Bytes,
}

#[derive(Deserialize)]
struct EventFields {
    #[serde(default)]
    msg_id: Option<String>,
    #[serde(default)]
    delivery_id: Option<u64>,
    #[serde(default)]
    did: Option<String>,
    #[serde(default)]
    mac: Option<String>,
    #[serde(default)]
    product_key: Option<String>,
    #[serde(default)]
    event_type: Option<String>,
}

impl EventPush {
    pub fn from_frame(frame: Bytes) -> Result<Self> {
        let end = trim_line(&frame).len();
        let payload = frame.slice(..end);
        let fields: EventFields =
            serde_json::from_slice(&payload).map_err(|e| SnotiError::Decode(e.to_string()))?;

        Ok(Self {
            msg_id: fields.msg_id,
            delivery_id: fields.delivery_id,
            did: fields.did,
            mac: fields.mac,
            product_key: fields.product_key,
            event_type: fields.event_type,
            payload,
        })
    }

    /// `(msg_id, delivery_id)` when both are present
    pub fn ack_ids(&self) -> Option<(&str, u64)> {
        match (&self.msg_id, self.delivery_id) {
            (Some(msg_id), Some(delivery_id)) => Some((msg_id.as_str(), delivery_id)),
            _ => None,
        }
    }

    /// Full payload as a JSON value
    pub fn json(&self) -> Result<Value> {
        serde_json::from_slice(&self.payload).map_err(|e| SnotiError::Decode(e.to_string()))
    }
}
