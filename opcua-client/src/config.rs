//! Client configuration and builder
//!
//! `ClientConfig` holds the tunables of the client stack and can be loaded
//! from any serde format. `ClientBuilder` combines it with the runtime pieces
//! (endpoint, identity, transport, trust provider) and builds a `Session`.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use opcua_client::ClientBuilder;
//! use opcua_security::UserIdentity;
//! # async fn run(endpoint: opcua_services::EndpointDescription) -> opcua_core::UaResult<()> {
//! let session = ClientBuilder::new()
//!     .application_uri("urn:example:client")
//!     .session_timeout(std::time::Duration::from_secs(60))
//!     .endpoint(endpoint)
//!     .identity(UserIdentity::user_name("operator", "secret"))
//!     .build()?;
//! session.open().await?;
//! # Ok(())
//! # }
//! ```

use crate::channel::ChannelConfig;
use crate::session::Session;
use opcua_binary::DecodingOptions;
use opcua_core::{UaError, UaResult};
use opcua_security::{CertificateTrustProvider, TrustList, UserIdentity};
use opcua_services::EndpointDescription;
use opcua_transport::{TcpConnector, TcpSettings, TransportConnector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Tunables of the client stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub application_uri: String,
    pub product_uri: String,
    pub application_name: String,
    pub session_name: String,
    /// Requested session timeout in milliseconds
    pub session_timeout_ms: u64,
    /// Default timeout of a single request in milliseconds
    pub request_timeout_ms: u64,
    /// Timeout of the TCP connect and the Hello/Acknowledge handshake
    pub connect_timeout_ms: u64,
    /// Requested security token lifetime in milliseconds
    pub channel_lifetime_ms: u32,
    /// Fraction of the token lifetime after which it is renewed
    pub token_renewal_ratio: f64,
    pub receive_buffer_size: u32,
    pub send_buffer_size: u32,
    /// Largest message accepted, 0 = unlimited
    pub max_message_size: u32,
    /// Most chunks accepted per message, 0 = unlimited
    pub max_chunk_count: u32,
    pub max_string_length: usize,
    pub max_byte_string_length: usize,
    pub max_array_length: usize,
    /// Publish requests kept outstanding per session
    pub max_inflight_publish: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let decoding = DecodingOptions::default();
        Self {
            application_uri: "urn:opcua-rs:client".to_string(),
            product_uri: "urn:opcua-rs".to_string(),
            application_name: "OPC UA Rust Client".to_string(),
            session_name: "opcua-rs session".to_string(),
            session_timeout_ms: 60_000,
            request_timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            channel_lifetime_ms: 3_600_000,
            token_renewal_ratio: 0.75,
            receive_buffer_size: 65_535,
            send_buffer_size: 65_535,
            max_message_size: decoding.max_message_size as u32,
            max_chunk_count: 0,
            max_string_length: decoding.max_string_length,
            max_byte_string_length: decoding.max_byte_string_length,
            max_array_length: decoding.max_array_length,
            max_inflight_publish: 1,
        }
    }
}

impl ClientConfig {
    /// Decoding limits derived from the configuration
    pub fn decoding_options(&self) -> DecodingOptions {
        DecodingOptions {
            max_message_size: self.max_message_size as usize,
            max_string_length: self.max_string_length,
            max_byte_string_length: self.max_byte_string_length,
            max_array_length: self.max_array_length,
            ..DecodingOptions::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Check values that would make the stack unusable
    pub fn validate(&self) -> UaResult<()> {
        if !(0.1..=0.95).contains(&self.token_renewal_ratio) {
            return Err(UaError::InvalidData(format!(
                "token_renewal_ratio {} outside 0.1..=0.95",
                self.token_renewal_ratio
            )));
        }
        if self.max_inflight_publish == 0 {
            return Err(UaError::InvalidData("max_inflight_publish must be at least 1".to_string()));
        }
        if self.application_uri.is_empty() {
            return Err(UaError::InvalidData("application_uri is empty".to_string()));
        }
        Ok(())
    }
}

/// Builder for a client `Session`
#[derive(Clone, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    endpoint: Option<EndpointDescription>,
    identity: UserIdentity,
    connector: Option<Arc<dyn TransportConnector>>,
    trust_provider: Option<Arc<dyn CertificateTrustProvider>>,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("endpoint", &self.endpoint.as_ref().map(|e| e.endpoint_url.to_string()))
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn application_uri(mut self, uri: &str) -> Self {
        self.config.application_uri = uri.to_string();
        self
    }

    pub fn product_uri(mut self, uri: &str) -> Self {
        self.config.product_uri = uri.to_string();
        self
    }

    pub fn application_name(mut self, name: &str) -> Self {
        self.config.application_name = name.to_string();
        self
    }

    pub fn session_name(mut self, name: &str) -> Self {
        self.config.session_name = name.to_string();
        self
    }

    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.config.session_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Requested token lifetime and the fraction of it after which to renew
    pub fn token_lifetime(mut self, lifetime: Duration, renewal_ratio: f64) -> Self {
        self.config.channel_lifetime_ms = lifetime.as_millis().min(u32::MAX as u128) as u32;
        self.config.token_renewal_ratio = renewal_ratio;
        self
    }

    pub fn buffer_sizes(mut self, receive: u32, send: u32) -> Self {
        self.config.receive_buffer_size = receive;
        self.config.send_buffer_size = send;
        self
    }

    pub fn max_message_size(mut self, size: u32, chunk_count: u32) -> Self {
        self.config.max_message_size = size;
        self.config.max_chunk_count = chunk_count;
        self
    }

    pub fn max_inflight_publish(mut self, count: usize) -> Self {
        self.config.max_inflight_publish = count;
        self
    }

    /// Endpoint to connect to, as obtained from discovery
    pub fn endpoint(mut self, endpoint: EndpointDescription) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn identity(mut self, identity: UserIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Transport used to reach the server, TCP when not set
    pub fn connector(mut self, connector: Arc<dyn TransportConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Trust provider, an empty `TrustList` when not set
    pub fn trust_provider(mut self, provider: Arc<dyn CertificateTrustProvider>) -> Self {
        self.trust_provider = Some(provider);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Build a session for the configured endpoint
    ///
    /// # Errors
    /// `InvalidData` when no endpoint is set or the configuration is invalid,
    /// `BadSecurityPolicyRejected` for unsupported endpoint security.
    pub fn build(self) -> UaResult<Session> {
        self.config.validate()?;
        let endpoint = self
            .endpoint
            .ok_or_else(|| UaError::InvalidData("No endpoint configured".to_string()))?;
        let connector = self.connector.unwrap_or_else(|| {
            Arc::new(TcpConnector::new(TcpSettings::with_timeout(self.config.connect_timeout())))
        });
        let trust_provider = self
            .trust_provider
            .unwrap_or_else(|| Arc::new(TrustList::new()));
        let channel = ChannelConfig::new(&self.config, endpoint, connector, trust_provider)?;
        Ok(Session::new(self.config, channel, self.identity))
    }
}
