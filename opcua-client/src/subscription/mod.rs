//! Subscriptions, monitored items and the publish loop
//!
//! Subscription services are methods of `Session`. Notifications are fanned
//! out per subscription to every receiver obtained from `Session::subscribe`,
//! strictly in sequence-number order.

mod manager;
mod publish;
mod state;
mod tracker;

pub(crate) use publish::Publisher;
pub(crate) use state::SubscriptionState;
pub use state::{MonitoredItem, MonitoredItemParameters, SubscriptionEvent, SubscriptionParameters};
