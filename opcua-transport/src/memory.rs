//! In-process transport over `tokio::io::duplex`
//!
//! Used to run fake servers inside tests without opening sockets. Each
//! `connect` creates a fresh duplex pair and hands the server end to the
//! paired `MemoryListener`.

use crate::stream::{TransportConnector, TransportStreams};
use crate::url::EndpointUrl;
use async_trait::async_trait;
use opcua_core::{UaError, UaResult};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Client side of an in-memory transport
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    incoming: mpsc::UnboundedSender<(EndpointUrl, DuplexStream)>,
    capacity: usize,
    refuse: Arc<AtomicBool>,
}

/// Server side accepting in-memory connections
#[derive(Debug)]
pub struct MemoryListener {
    incoming: mpsc::UnboundedReceiver<(EndpointUrl, DuplexStream)>,
}

impl MemoryConnector {
    /// Create a connected connector/listener pair
    pub fn pair() -> (MemoryConnector, MemoryListener) {
        Self::pair_with_capacity(DEFAULT_PIPE_CAPACITY)
    }

    /// Create a pair whose pipes buffer at most `capacity` bytes per direction
    pub fn pair_with_capacity(capacity: usize) -> (MemoryConnector, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            MemoryConnector {
                incoming: tx,
                capacity,
                refuse: Arc::new(AtomicBool::new(false)),
            },
            MemoryListener { incoming: rx },
        )
    }

    /// Make subsequent connects fail as if the server were unreachable
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransportConnector for MemoryConnector {
    async fn connect(&self, endpoint: &EndpointUrl) -> UaResult<TransportStreams> {
        let refused = || {
            UaError::Connection(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{} refused the connection", endpoint),
            ))
        };
        if self.refuse.load(Ordering::SeqCst) {
            return Err(refused());
        }
        let (client, server) = tokio::io::duplex(self.capacity);
        self.incoming
            .send((endpoint.clone(), server))
            .map_err(|_| refused())?;
        let (reader, writer) = tokio::io::split(client);
        Ok(TransportStreams::new(
            Box::new(reader),
            Box::new(writer),
            format!("memory:{}", endpoint),
        ))
    }
}

impl MemoryListener {
    /// Wait for the next connection, `None` once every connector is dropped
    pub async fn accept(&mut self) -> Option<(EndpointUrl, DuplexStream)> {
        self.incoming.recv().await
    }
}
