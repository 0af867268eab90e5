//! Connector trait for byte-stream transports

use crate::url::EndpointUrl;
use async_trait::async_trait;
use opcua_core::UaResult;
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};

/// Boxed read half of a connection
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
/// Boxed write half of a connection
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An established connection split into independently owned halves
///
/// The reader half is moved into the channel's reader task while the writer
/// half stays behind the channel's write lock.
pub struct TransportStreams {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
    /// Description of the remote peer for logging
    pub peer: String,
}

impl TransportStreams {
    pub fn new(reader: BoxedReader, writer: BoxedWriter, peer: impl Into<String>) -> Self {
        Self {
            reader,
            writer,
            peer: peer.into(),
        }
    }
}

impl fmt::Debug for TransportStreams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportStreams").field("peer", &self.peer).finish()
    }
}

/// Opens connections to an endpoint
#[async_trait]
pub trait TransportConnector: Send + Sync + fmt::Debug {
    /// Connect to the endpoint
    ///
    /// # Errors
    /// Returns `UaError::Connection` when the remote cannot be reached and
    /// `UaError::Timeout` when the connect timeout elapses.
    async fn connect(&self, endpoint: &EndpointUrl) -> UaResult<TransportStreams>;
}
