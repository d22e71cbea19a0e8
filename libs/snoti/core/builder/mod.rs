pub mod states;

use crate::core::client::SnotiClient;
use crate::core::config::{AuthFailurePolicy, ClientConfig};
use crate::traits::*;
use states::*;

/// Type-state builder for [`SnotiClient`]
///
/// The configuration and the event handler are required; `build()` only
/// exists once both are set. Transport and reconnection behaviour have
/// defaults matching the production service (TLS without certificate
/// verification, fixed delay from the config, unlimited attempts).
pub struct SnotiClientBuilder<C, H>
where
    C: ConfigState,
    H: HandlerState,
{
    _state: TypeState<C, H>,
    config: Option<ClientConfig>,
    handler: Option<Box<dyn EventHandler>>,
    connector: Option<Box<dyn Connector>>,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    auth_failure_policy: Option<AuthFailurePolicy>,
}

impl SnotiClientBuilder<NoConfig, NoHandler> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            config: None,
            handler: None,
            connector: None,
            reconnect_strategy: None,
            auth_failure_policy: None,
        }
    }
}

impl Default for SnotiClientBuilder<NoConfig, NoHandler> {
    fn default() -> Self {
        Self::new()
    }
}

// Config setting
impl<H> SnotiClientBuilder<NoConfig, H>
where
    H: HandlerState,
{
    pub fn config(self, config: ClientConfig) -> SnotiClientBuilder<HasConfig, H> {
        SnotiClientBuilder {
            _state: TypeState::new(),
            config: Some(config),
            handler: self.handler,
            connector: self.connector,
            reconnect_strategy: self.reconnect_strategy,
            auth_failure_policy: self.auth_failure_policy,
        }
    }
}

// Handler setting
impl<C> SnotiClientBuilder<C, NoHandler>
where
    C: ConfigState,
{
    /// Set the event handler invoked for every pushed event
    pub fn handler(self, handler: impl EventHandler) -> SnotiClientBuilder<C, HasHandler> {
        SnotiClientBuilder {
            _state: TypeState::new(),
            config: self.config,
            handler: Some(Box::new(handler)),
            connector: self.connector,
            reconnect_strategy: self.reconnect_strategy,
            auth_failure_policy: self.auth_failure_policy,
        }
    }
}

// Optional configuration methods
impl<C, H> SnotiClientBuilder<C, H>
where
    C: ConfigState,
    H: HandlerState,
{
    /// Replace the transport (default: [`TlsConnector::permissive`])
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Box::new(connector));
        self
    }

    /// Replace the reconnection strategy (default: fixed `reconnect_delay_ms`)
    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.reconnect_strategy = Some(Box::new(strategy));
        self
    }

    /// Override the config's behaviour on login rejection
    pub fn auth_failure_policy(mut self, policy: AuthFailurePolicy) -> Self {
        self.auth_failure_policy = Some(policy);
        self
    }
}

// Build method - only available when all required fields are set
impl SnotiClientBuilder<HasConfig, HasHandler> {
    /// Validate the configuration and assemble the client
    ///
    /// Nothing connects until [`SnotiClient::start`] is called.
    pub fn build(self) -> Result<SnotiClient> {
        let mut config = self
            .config
            .ok_or_else(|| SnotiError::Configuration("config must be set".to_string()))?;
        let handler = self
            .handler
            .ok_or_else(|| SnotiError::Configuration("handler must be set".to_string()))?;

        if let Some(policy) = self.auth_failure_policy {
            config.auth_failure_policy = policy;
        }
        config.validate()?;

        let connector = match self.connector {
            Some(connector) => connector,
            None => Box::new(TlsConnector::permissive()?),
        };

        let reconnect_strategy = self
            .reconnect_strategy
            .unwrap_or_else(|| Box::new(FixedDelay::new(config.reconnect_delay(), None)));

        Ok(SnotiClient::new(
            config,
            handler,
            connector,
            reconnect_strategy,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        ClientConfig::product("127.0.0.1:2017", "pk", "aid", "secret", "sub")
    }

    #[test]
    fn test_build_applies_policy_override() {
        let client = SnotiClientBuilder::new()
            .config(config())
            .handler(NoOpHandler)
            .connector(TcpConnector)
            .auth_failure_policy(AuthFailurePolicy::Stop)
            .build()
            .unwrap();
        assert_eq!(client.config().auth_failure_policy, AuthFailurePolicy::Stop);
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let result = SnotiClientBuilder::new()
            .handler(NoOpHandler)
            .config(ClientConfig::product("", "pk", "aid", "secret", "sub"))
            .connector(TcpConnector)
            .build();
        assert!(matches!(result, Err(SnotiError::Configuration(_))));
    }
}
