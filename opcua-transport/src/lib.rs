//! Transport layer for the OPC UA binary protocol
//!
//! The secure conversation layer only needs a reliable, ordered byte stream.
//! This crate provides the `TransportConnector` abstraction with a TCP
//! implementation and an in-memory one used to run fake servers in-process.

pub mod memory;
pub mod stream;
pub mod tcp;
pub mod url;

pub use memory::{MemoryConnector, MemoryListener};
pub use stream::{TransportConnector, TransportStreams};
pub use tcp::{TcpConnector, TcpSettings};
pub use url::{EndpointUrl, DEFAULT_PORT};
