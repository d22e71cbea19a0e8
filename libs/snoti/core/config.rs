use crate::error::{Result, SnotiError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Prefetch count used when the configured value is 0 or out of range
pub const DEFAULT_PREFETCH_COUNT: u16 = 50;
/// Largest prefetch count the protocol accepts
pub const MAX_PREFETCH_COUNT: u32 = 32767;
/// Default maximum frame size in bytes (delimiter included)
pub const DEFAULT_PACKET_SIZE: usize = 1024;
/// Default bounded queue depth per dispatch lane
pub const DEFAULT_LANE_CAPACITY: usize = 64;

const DEFAULT_PING_INTERVAL_MS: u64 = 60_000;
const DEFAULT_WATCHDOG_TIMEOUT_MS: u64 = 180_000;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_LOGIN_TIMEOUT_MS: u64 = 30_000;

/// What the orchestrator does after the server rejects the login
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthFailurePolicy {
    /// Tear down, back off, and log in again
    #[default]
    Retry,
    /// Emit `ClientEvent::Terminated` and stop reconnecting
    Stop,
}

/// Active credential set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credentials<'a> {
    Product {
        product_key: &'a str,
        auth_id: &'a str,
        auth_secret: &'a str,
    },
    Enterprise {
        enterprise_id: &'a str,
        enterprise_secret: &'a str,
    },
}

/// Session configuration
///
/// Exactly one credential mode is active: enterprise credentials when
/// `enterprise_id` is non-empty, product credentials otherwise.
///
/// Loadable from YAML:
///
/// ```yaml
/// endpoint: snoti.gizwits.com:2017
/// product_key: your-product-key
/// auth_id: your-auth-id
/// auth_secret: your-auth-secret   # or SNOTI_AUTH_SECRET
/// subkey: subkey_test
/// events: device.online,device.offline,device.status.kv
/// prefetch_count: 50
/// packet_size: 1024
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// `host:port` of the Snoti service
    pub endpoint: String,

    #[serde(default)]
    pub product_key: String,
    #[serde(default)]
    pub auth_id: String,
    #[serde(default)]
    pub auth_secret: String,

    #[serde(default)]
    pub enterprise_id: String,
    #[serde(default)]
    pub enterprise_secret: String,

    /// Subscription key (any value; limited per auth id server-side)
    pub subkey: String,

    /// Comma-separated event types, e.g. `device.online,device.offline`
    #[serde(default)]
    pub events: String,

    /// Max undelivered messages buffered per pull (0 = default)
    #[serde(default)]
    pub prefetch_count: u32,

    /// Max inbound frame size in bytes (0 = default)
    #[serde(default)]
    pub packet_size: usize,

    /// Dispatch lanes (0 = available parallelism)
    #[serde(default)]
    pub lanes: usize,

    #[serde(default = "default_lane_capacity")]
    pub lane_capacity: usize,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_watchdog_timeout_ms")]
    pub watchdog_timeout_ms: u64,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_login_timeout_ms")]
    pub login_timeout_ms: u64,

    #[serde(default)]
    pub auth_failure_policy: AuthFailurePolicy,
}

fn default_lane_capacity() -> usize {
    DEFAULT_LANE_CAPACITY
}

fn default_ping_interval_ms() -> u64 {
    DEFAULT_PING_INTERVAL_MS
}

fn default_watchdog_timeout_ms() -> u64 {
    DEFAULT_WATCHDOG_TIMEOUT_MS
}

fn default_reconnect_delay_ms() -> u64 {
    DEFAULT_RECONNECT_DELAY_MS
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_login_timeout_ms() -> u64 {
    DEFAULT_LOGIN_TIMEOUT_MS
}

impl ClientConfig {
    fn base(endpoint: impl Into<String>, subkey: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            product_key: String::new(),
            auth_id: String::new(),
            auth_secret: String::new(),
            enterprise_id: String::new(),
            enterprise_secret: String::new(),
            subkey: subkey.into(),
            events: String::new(),
            prefetch_count: 0,
            packet_size: 0,
            lanes: 0,
            lane_capacity: DEFAULT_LANE_CAPACITY,
            ping_interval_ms: DEFAULT_PING_INTERVAL_MS,
            watchdog_timeout_ms: DEFAULT_WATCHDOG_TIMEOUT_MS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            login_timeout_ms: DEFAULT_LOGIN_TIMEOUT_MS,
            auth_failure_policy: AuthFailurePolicy::Retry,
        }
    }

    /// Product-credential configuration
    pub fn product(
        endpoint: impl Into<String>,
        product_key: impl Into<String>,
        auth_id: impl Into<String>,
        auth_secret: impl Into<String>,
        subkey: impl Into<String>,
    ) -> Self {
        Self {
            product_key: product_key.into(),
            auth_id: auth_id.into(),
            auth_secret: auth_secret.into(),
            ..Self::base(endpoint, subkey)
        }
    }

    /// Enterprise-credential configuration
    pub fn enterprise(
        endpoint: impl Into<String>,
        enterprise_id: impl Into<String>,
        enterprise_secret: impl Into<String>,
        subkey: impl Into<String>,
    ) -> Self {
        Self {
            enterprise_id: enterprise_id.into(),
            enterprise_secret: enterprise_secret.into(),
            ..Self::base(endpoint, subkey)
        }
    }

    pub fn with_events(mut self, events: impl Into<String>) -> Self {
        self.events = events.into();
        self
    }

    pub fn with_prefetch_count(mut self, prefetch_count: u32) -> Self {
        self.prefetch_count = prefetch_count;
        self
    }

    pub fn with_packet_size(mut self, packet_size: usize) -> Self {
        self.packet_size = packet_size;
        self
    }

    pub fn with_lanes(mut self, lanes: usize) -> Self {
        self.lanes = lanes;
        self
    }

    /// Set probe interval and watchdog window
    pub fn with_heartbeat(mut self, ping_interval: Duration, watchdog_timeout: Duration) -> Self {
        self.ping_interval_ms = ping_interval.as_millis() as u64;
        self.watchdog_timeout_ms = watchdog_timeout.as_millis() as u64;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_auth_failure_policy(mut self, policy: AuthFailurePolicy) -> Self {
        self.auth_failure_policy = policy;
        self
    }

    /// Load configuration from a YAML file
    ///
    /// Secrets may be kept out of the file: `SNOTI_AUTH_SECRET` and
    /// `SNOTI_ENTERPRISE_SECRET` override the corresponding fields.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path.as_ref()).map_err(|e| {
            SnotiError::Configuration(format!(
                "failed to read {}: {}",
                config_path.as_ref().display(),
                e
            ))
        })?;
        let mut config = Self::from_yaml(&yaml_content)?;

        if let Ok(secret) = std::env::var("SNOTI_AUTH_SECRET") {
            info!("Overriding auth secret from environment variable");
            config.auth_secret = secret;
        }
        if let Ok(secret) = std::env::var("SNOTI_ENTERPRISE_SECRET") {
            info!("Overriding enterprise secret from environment variable");
            config.enterprise_secret = secret;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse YAML without environment overrides or validation
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| SnotiError::Configuration(format!("failed to parse YAML: {}", e)))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(SnotiError::Configuration("endpoint must be set".to_string()));
        }

        if self.subkey.is_empty() {
            return Err(SnotiError::Configuration("subkey must be set".to_string()));
        }

        match self.credentials() {
            Credentials::Enterprise {
                enterprise_secret, ..
            } if enterprise_secret.is_empty() => {
                return Err(SnotiError::Configuration(
                    "enterprise_secret is required with enterprise_id".to_string(),
                ));
            }
            Credentials::Product {
                product_key,
                auth_id,
                auth_secret,
            } if product_key.is_empty() || auth_id.is_empty() || auth_secret.is_empty() => {
                return Err(SnotiError::Configuration(
                    "product_key, auth_id and auth_secret are required without enterprise_id"
                        .to_string(),
                ));
            }
            _ => {}
        }

        if self.ping_interval_ms == 0 || self.watchdog_timeout_ms == 0 {
            return Err(SnotiError::Configuration(
                "heartbeat intervals must be greater than 0".to_string(),
            ));
        }

        if self.watchdog_timeout_ms <= self.ping_interval_ms {
            return Err(SnotiError::Configuration(
                "watchdog_timeout_ms must exceed ping_interval_ms".to_string(),
            ));
        }

        if self.lane_capacity == 0 {
            return Err(SnotiError::Configuration(
                "lane_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Active credential set, selected by presence of the enterprise id
    pub fn credentials(&self) -> Credentials<'_> {
        if self.enterprise_id.is_empty() {
            Credentials::Product {
                product_key: &self.product_key,
                auth_id: &self.auth_id,
                auth_secret: &self.auth_secret,
            }
        } else {
            Credentials::Enterprise {
                enterprise_id: &self.enterprise_id,
                enterprise_secret: &self.enterprise_secret,
            }
        }
    }

    /// Prefetch count sent on login, clamped to the protocol range
    pub fn effective_prefetch_count(&self) -> u16 {
        if self.prefetch_count == 0 || self.prefetch_count > MAX_PREFETCH_COUNT {
            DEFAULT_PREFETCH_COUNT
        } else {
            self.prefetch_count as u16
        }
    }

    /// Maximum inbound frame size, delimiter included
    pub fn effective_packet_size(&self) -> usize {
        if self.packet_size == 0 {
            DEFAULT_PACKET_SIZE
        } else {
            self.packet_size
        }
    }

    /// Number of dispatch lanes
    pub fn lane_count(&self) -> usize {
        if self.lanes > 0 {
            return self.lanes;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_millis(self.login_timeout_ms)
    }
}
