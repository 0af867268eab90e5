//! TCP transport implementation

use crate::stream::{TransportConnector, TransportStreams};
use crate::url::EndpointUrl;
use async_trait::async_trait;
use opcua_core::{UaError, UaResult};
use std::time::Duration;
use tokio::net::TcpStream;

/// TCP connection settings
#[derive(Debug, Clone)]
pub struct TcpSettings {
    /// Timeout for establishing the connection, `None` waits indefinitely
    pub connect_timeout: Option<Duration>,
    /// Disable Nagle's algorithm
    pub nodelay: bool,
}

impl Default for TcpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(30)),
            nodelay: true,
        }
    }
}

impl TcpSettings {
    /// Create TCP settings with a connect timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            connect_timeout: Some(timeout),
            ..Default::default()
        }
    }
}

/// Connector opening plain TCP connections
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    settings: TcpSettings,
}

impl TcpConnector {
    pub fn new(settings: TcpSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &TcpSettings {
        &self.settings
    }
}

#[async_trait]
impl TransportConnector for TcpConnector {
    async fn connect(&self, endpoint: &EndpointUrl) -> UaResult<TransportStreams> {
        let address = endpoint.socket_address();
        log::debug!("Connecting to {}", address);

        let stream = match self.settings.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, TcpStream::connect(&address))
                .await
                .map_err(|_| UaError::Timeout)??,
            None => TcpStream::connect(&address).await?,
        };
        stream.set_nodelay(self.settings.nodelay)?;

        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or(address);
        let (reader, writer) = stream.into_split();
        Ok(TransportStreams::new(Box::new(reader), Box::new(writer), peer))
    }
}
