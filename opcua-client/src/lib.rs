//! OPC UA binary client
//!
//! Secure channel, session and subscription engine over UA-TCP.
//!
//! ```rust,no_run
//! use opcua_client::{ClientBuilder, MonitoredItemParameters, SubscriptionEvent, SubscriptionParameters};
//! use opcua_core::NodeId;
//! # async fn run(endpoint: opcua_services::EndpointDescription) -> opcua_core::UaResult<()> {
//! let session = ClientBuilder::new().endpoint(endpoint).build()?;
//! session.open().await?;
//!
//! let subscription_id = session.create_subscription(SubscriptionParameters::with_interval(500.0)).await?;
//! let mut events = session.subscribe(subscription_id)?;
//! session
//!     .create_monitored_items(subscription_id, vec![MonitoredItemParameters::value_of(NodeId::numeric(0, 2258))])
//!     .await?;
//! while let Some(event) = events.recv().await {
//!     if let SubscriptionEvent::DataChange { value, .. } = event {
//!         println!("{:?}", value);
//!     }
//! }
//! session.close(true).await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod session;
pub mod subscription;

pub use channel::{ChannelConfig, ChannelEvent, ChannelState, SecureChannel};
pub use config::{ClientBuilder, ClientConfig};
pub use session::{Session, SessionInfo, SessionState};
pub use subscription::{MonitoredItem, MonitoredItemParameters, SubscriptionEvent, SubscriptionParameters};
