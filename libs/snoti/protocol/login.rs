//! Login request/response payloads
//!
//! Two credential modes, chosen by the presence of an enterprise id:
//!
//! ```text
//! product:    {"cmd":"login_req","prefetch_count":50,
//!              "data":[{"product_key":..,"auth_id":..,"auth_secret":..,"subkey":..,"events":[..]}]}
//! enterprise: {"cmd":"enterprise_login_req","prefetch_count":50,
//!              "data":[{"subkey":..,"enterprise_id":..,"enterprise_secret":..}]}
//! ```

use super::envelope::{trim_line, Command, Envelope};
use crate::core::config::{ClientConfig, Credentials};
use crate::error::{Result, SnotiError};
use serde::{Deserialize, Serialize};

/// Credential block shared by login and subscription requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoginData {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub product_key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub auth_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub auth_secret: String,
    pub subkey: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub enterprise_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub enterprise_secret: String,
}

impl LoginData {
    /// Credential block for the configured mode, carrying `events`
    pub fn from_config(config: &ClientConfig, events: Vec<String>) -> Self {
        match config.credentials() {
            Credentials::Product {
                product_key,
                auth_id,
                auth_secret,
            } => Self {
                product_key: product_key.to_string(),
                auth_id: auth_id.to_string(),
                auth_secret: auth_secret.to_string(),
                subkey: config.subkey.clone(),
                events,
                ..Self::default()
            },
            Credentials::Enterprise {
                enterprise_id,
                enterprise_secret,
            } => Self {
                subkey: config.subkey.clone(),
                events,
                enterprise_id: enterprise_id.to_string(),
                enterprise_secret: enterprise_secret.to_string(),
                ..Self::default()
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub data: LoginResult,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResult {
    pub result: bool,
    #[serde(default)]
    pub msg: String,
}

/// Build the login envelope for the configured credential mode
pub fn login_envelope(config: &ClientConfig) -> Result<Envelope> {
    let (cmd, data) = match config.credentials() {
        Credentials::Product { .. } => (
            Command::LoginReq,
            LoginData::from_config(config, split_event_types(&config.events)),
        ),
        Credentials::Enterprise { .. } => (
            Command::EnterpriseLoginReq,
            LoginData::from_config(config, Vec::new()),
        ),
    };

    let data = serde_json::to_value(vec![data]).map_err(|e| SnotiError::Encode(e.to_string()))?;
    Ok(Envelope::new(cmd)
        .with_prefetch_count(config.effective_prefetch_count())
        .with_data(data))
}

/// Interpret a `login_res` frame
///
/// `result: false` and unparseable responses are both rejections.
pub fn check_login_response(frame: &[u8]) -> Result<()> {
    match serde_json::from_slice::<LoginResponse>(trim_line(frame)) {
        Ok(response) if response.data.result => Ok(()),
        Ok(response) if response.data.msg.is_empty() => {
            Err(SnotiError::AuthRejected("login rejected".to_string()))
        }
        Ok(response) => Err(SnotiError::AuthRejected(response.data.msg)),
        Err(e) => Err(SnotiError::AuthRejected(format!(
            "malformed login response: {}",
            e
        ))),
    }
}

/// Split the comma-separated event filter, dropping blanks
pub fn split_event_types(events: &str) -> Vec<String> {
    events
        .split(',')
        .map(str::trim)
        .filter(|event| !event.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn product_config() -> ClientConfig {
        ClientConfig::product("snoti.gizwits.com:2017", "pk", "aid", "secret", "sub")
            .with_events("device.online, device.offline,,device.status.kv")
    }

    #[test]
    fn test_product_login_envelope() {
        let envelope = login_envelope(&product_config()).unwrap();
        assert_eq!(envelope.cmd, Command::LoginReq);
        assert_eq!(envelope.prefetch_count, Some(50));
        assert_eq!(
            envelope.data,
            Some(json!([{
                "product_key": "pk",
                "auth_id": "aid",
                "auth_secret": "secret",
                "subkey": "sub",
                "events": ["device.online", "device.offline", "device.status.kv"],
            }]))
        );
    }

    #[test]
    fn test_enterprise_mode_wins_when_id_present() {
        let mut config = product_config();
        config.enterprise_id = "eid".into();
        config.enterprise_secret = "esecret".into();

        let envelope = login_envelope(&config).unwrap();
        assert_eq!(envelope.cmd, Command::EnterpriseLoginReq);
        assert_eq!(
            envelope.data,
            Some(json!([{
                "subkey": "sub",
                "enterprise_id": "eid",
                "enterprise_secret": "esecret",
            }]))
        );
    }

    #[test]
    fn test_zero_prefetch_defaults_to_fifty() {
        let config = product_config().with_prefetch_count(0);
        let envelope = login_envelope(&config).unwrap();
        assert_eq!(envelope.prefetch_count, Some(50));
    }

    #[test]
    fn test_login_response_outcomes() {
        assert!(check_login_response(b"{\"cmd\":\"login_res\",\"data\":{\"result\":true}}\n").is_ok());

        let err = check_login_response(
            b"{\"cmd\":\"login_res\",\"data\":{\"result\":false,\"msg\":\"bad credentials\"}}\n",
        )
        .unwrap_err();
        assert!(matches!(err, SnotiError::AuthRejected(ref msg) if msg == "bad credentials"));

        let err = check_login_response(b"{\"cmd\":\"login_res\"}\n").unwrap_err();
        assert!(matches!(err, SnotiError::AuthRejected(_)));
    }

    #[test]
    fn test_split_event_types() {
        assert_eq!(split_event_types(""), Vec::<String>::new());
        assert_eq!(split_event_types("a,b"), vec!["a", "b"]);
    }
}
