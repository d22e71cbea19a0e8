//! Outbound request payloads (subscribe, unsubscribe, remote control)

use super::envelope::{Command, Envelope};
use super::login::LoginData;
use crate::core::config::ClientConfig;
use crate::error::{Result, SnotiError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Remote-control instruction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlCmd {
    /// Write data-point key/values
    #[serde(rename = "write_attrs")]
    WriteAttrs,
    /// Write a raw protocol payload
    #[serde(rename = "write")]
    Write,
}

/// Target device and payload of one remote-control instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlDetail {
    pub product_key: String,
    pub did: String,
    pub mac: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<Map<String, Value>>,
    /// Encoding of `raw` (e.g. `"hex"`, `"base64"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_coding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

/// One entry of a `remote_control_v2_req`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlData {
    pub cmd: ControlCmd,
    pub data: ControlDetail,
}

impl ControlData {
    /// Data-point write (`write_attrs`)
    pub fn attrs(
        product_key: impl Into<String>,
        did: impl Into<String>,
        mac: impl Into<String>,
        attrs: Map<String, Value>,
    ) -> Self {
        Self {
            cmd: ControlCmd::WriteAttrs,
            data: ControlDetail {
                product_key: product_key.into(),
                did: did.into(),
                mac: mac.into(),
                attrs: Some(attrs),
                binary_coding: None,
                raw: None,
            },
        }
    }

    /// Raw payload write (`write`)
    pub fn raw(
        product_key: impl Into<String>,
        did: impl Into<String>,
        mac: impl Into<String>,
        binary_coding: impl Into<String>,
        raw: impl Into<String>,
    ) -> Self {
        Self {
            cmd: ControlCmd::Write,
            data: ControlDetail {
                product_key: product_key.into(),
                did: did.into(),
                mac: mac.into(),
                attrs: None,
                binary_coding: Some(binary_coding.into()),
                raw: Some(raw.into()),
            },
        }
    }
}

/// `subscribe_req` for additional event types under the session's credentials
pub fn subscribe_envelope(config: &ClientConfig, event_types: &[&str]) -> Result<Envelope> {
    subscription_envelope(Command::SubscribeReq, config, event_types)
}

/// `unsubscribe_req` for event types under the session's credentials
pub fn unsubscribe_envelope(config: &ClientConfig, event_types: &[&str]) -> Result<Envelope> {
    subscription_envelope(Command::UnsubscribeReq, config, event_types)
}

fn subscription_envelope(
    cmd: Command,
    config: &ClientConfig,
    event_types: &[&str],
) -> Result<Envelope> {
    if event_types.is_empty() {
        return Err(SnotiError::Configuration(format!(
            "{} requires at least one event type",
            cmd
        )));
    }
    let events = event_types.iter().map(|event| event.to_string()).collect();
    let data = LoginData::from_config(config, events);
    to_envelope(cmd, vec![data])
}

/// `remote_control_v2_req` carrying one or more instructions
pub fn remote_control_envelope(entries: &[ControlData]) -> Result<Envelope> {
    if entries.is_empty() {
        return Err(SnotiError::Configuration(
            "remote control requires at least one entry".to_string(),
        ));
    }
    to_envelope(Command::RemoteControlReq, entries)
}

fn to_envelope<T: Serialize>(cmd: Command, data: T) -> Result<Envelope> {
    let data = serde_json::to_value(data).map_err(|e| SnotiError::Encode(e.to_string()))?;
    Ok(Envelope::new(cmd).with_data(data))
}
