//! OPC UA binary client for Rust
//!
//! Connects to OPC UA servers over UA-TCP (`opc.tcp://`), opens a secure
//! channel, creates and activates a session and keeps subscriptions flowing
//! through a background publish loop.
//!
//! # Architecture
//!
//! The library is organized as a workspace with multiple crates:
//!
//! - `opcua-core`: built-in data types, status codes and the error type
//! - `opcua-binary`: OPC UA Binary encoding and the extension object registry
//! - `opcua-transport`: TCP and in-memory byte stream transports
//! - `opcua-security`: security policies, key derivation, certificates and user identities
//! - `opcua-conversation`: UA-TCP framing, chunk security and reassembly
//! - `opcua-services`: service request and response messages
//! - `opcua-client`: secure channel, session and subscription engine
//!
//! # Usage
//!
//! ```no_run
//! use opcua::client::{ClientBuilder, MonitoredItemParameters, SubscriptionParameters};
//! use opcua::NodeId;
//! # async fn run(endpoint: opcua::services::EndpointDescription) -> opcua::UaResult<()> {
//! let session = ClientBuilder::new().endpoint(endpoint).build()?;
//! session.open().await?;
//! let id = session.create_subscription(SubscriptionParameters::with_interval(500.0)).await?;
//! let mut events = session.subscribe(id)?;
//! session
//!     .create_monitored_items(id, vec![MonitoredItemParameters::value_of(NodeId::numeric(0, 2258))])
//!     .await?;
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

// Re-export core types
pub use opcua_core::datatypes::*;
pub use opcua_core::{StatusCode, UaError, UaResult};

// Re-export client API
pub mod client {
    pub use opcua_client::*;
}

pub mod services {
    pub use opcua_services::*;
}

pub mod security {
    pub use opcua_security::*;
}

pub mod transport {
    pub use opcua_transport::*;
}

pub mod binary {
    pub use opcua_binary::*;
}

pub mod conversation {
    pub use opcua_conversation::*;
}
