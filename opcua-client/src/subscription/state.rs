//! Client-side record of subscriptions and monitored items

use super::tracker::{Delivery, SequenceTracker};
use opcua_binary::TypeRegistry;
use opcua_core::{DataValue, ExtensionObject, NodeId, StatusCode, Variant};
use opcua_services::{MonitoringMode, Notification, NotificationMessage, ReadValueId, SubscriptionAcknowledgement};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Requested (or revised) subscription parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionParameters {
    /// Publishing interval in milliseconds
    pub publishing_interval: f64,
    pub lifetime_count: u32,
    pub max_keep_alive_count: u32,
    /// 0 = no limit
    pub max_notifications_per_publish: u32,
    pub publishing_enabled: bool,
    pub priority: u8,
}

impl Default for SubscriptionParameters {
    fn default() -> Self {
        Self {
            publishing_interval: 1000.0,
            lifetime_count: 60,
            max_keep_alive_count: 10,
            max_notifications_per_publish: 0,
            publishing_enabled: true,
            priority: 0,
        }
    }
}

impl SubscriptionParameters {
    pub fn with_interval(publishing_interval: f64) -> Self {
        Self {
            publishing_interval,
            ..Self::default()
        }
    }
}

/// What to monitor and how
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemParameters {
    pub item_to_monitor: ReadValueId,
    pub monitoring_mode: MonitoringMode,
    /// Sampling interval in milliseconds, -1 = publishing interval
    pub sampling_interval: f64,
    pub queue_size: u32,
    pub discard_oldest: bool,
    pub filter: ExtensionObject,
}

impl MonitoredItemParameters {
    /// Report changes of the Value attribute of `node_id`
    pub fn value_of(node_id: NodeId) -> Self {
        Self {
            item_to_monitor: ReadValueId::value_of(node_id),
            monitoring_mode: MonitoringMode::Reporting,
            sampling_interval: -1.0,
            queue_size: 1,
            discard_oldest: true,
            filter: ExtensionObject::null(),
        }
    }
}

/// A monitored item created on the server
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItem {
    /// Handle chosen by the client, used in notifications
    pub client_handle: u32,
    /// Id assigned by the server
    pub monitored_item_id: u32,
    pub item_to_monitor: ReadValueId,
    pub monitoring_mode: MonitoringMode,
    pub sampling_interval: f64,
    pub queue_size: u32,
    pub discard_oldest: bool,
    pub filter: ExtensionObject,
}

/// Something that happened on a subscription
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    DataChange {
        sequence_number: u32,
        client_handle: u32,
        value: DataValue,
    },
    Event {
        sequence_number: u32,
        client_handle: u32,
        fields: Vec<Variant>,
    },
    /// The server changed the subscription's state; any status other than
    /// Good ends the subscription
    StatusChanged(StatusCode),
    /// `count` consecutive notification messages starting at
    /// `sequence_number` could not be recovered
    DataLost { sequence_number: u32, count: u32 },
}

#[derive(Debug)]
pub(crate) struct Subscription {
    pub(crate) id: u32,
    pub(crate) parameters: SubscriptionParameters,
    pub(crate) tracker: SequenceTracker<NotificationMessage>,
    pub(crate) items: BTreeMap<u32, MonitoredItem>,
    next_client_handle: u32,
    subscribers: Vec<UnboundedSender<SubscriptionEvent>>,
}

impl Subscription {
    pub(crate) fn new(id: u32, parameters: SubscriptionParameters) -> Self {
        Self {
            id,
            parameters,
            tracker: SequenceTracker::new(),
            items: BTreeMap::new(),
            next_client_handle: 1,
            subscribers: Vec::new(),
        }
    }

    /// Subscription taken over from another session
    ///
    /// Its parameters and items are not known to this session; the server
    /// keeps using the client handles chosen by the original owner.
    pub(crate) fn adopted(id: u32) -> Self {
        Self {
            tracker: SequenceTracker::unanchored(),
            ..Self::new(id, SubscriptionParameters::default())
        }
    }

    /// Client handle not used by any item of this subscription
    pub(crate) fn allocate_client_handle(&mut self) -> u32 {
        loop {
            let handle = self.next_client_handle;
            self.next_client_handle = self.next_client_handle.wrapping_add(1).max(1);
            if !self.items.contains_key(&handle) {
                return handle;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn item_by_id(&self, monitored_item_id: u32) -> Option<&MonitoredItem> {
        self.items.values().find(|i| i.monitored_item_id == monitored_item_id)
    }

    pub(crate) fn item_by_id_mut(&mut self, monitored_item_id: u32) -> Option<&mut MonitoredItem> {
        self.items.values_mut().find(|i| i.monitored_item_id == monitored_item_id)
    }

    pub(crate) fn subscribe(&mut self) -> UnboundedReceiver<SubscriptionEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.push(sender);
        receiver
    }

    pub(crate) fn emit(&mut self, event: SubscriptionEvent) {
        self.subscribers.retain(|s| s.send(event.clone()).is_ok());
    }

    /// Fan out one delivery; returns the terminal status if the server ended
    /// the subscription
    pub(crate) fn deliver(&mut self, delivery: Delivery<NotificationMessage>, registry: &TypeRegistry) -> Option<StatusCode> {
        let (sequence_number, message) = match delivery {
            Delivery::Message(n, message) => (n, message),
            Delivery::Lost { first, count } => {
                log::warn!("Subscription {} lost {} notifications from {}", self.id, count, first);
                self.emit(SubscriptionEvent::DataLost {
                    sequence_number: first,
                    count,
                });
                return None;
            }
        };
        let notifications = match Notification::decode_all(&message, registry) {
            Ok(notifications) => notifications,
            Err(error) => {
                log::warn!(
                    "Subscription {} notification {} undecodable: {}",
                    self.id,
                    sequence_number,
                    error
                );
                self.emit(SubscriptionEvent::DataLost {
                    sequence_number,
                    count: 1,
                });
                return None;
            }
        };
        let mut terminal = None;
        for notification in notifications {
            match notification {
                Notification::DataChange(change) => {
                    for item in change.monitored_items {
                        self.emit(SubscriptionEvent::DataChange {
                            sequence_number,
                            client_handle: item.client_handle,
                            value: item.value,
                        });
                    }
                }
                Notification::Events(list) => {
                    for event in list.events {
                        self.emit(SubscriptionEvent::Event {
                            sequence_number,
                            client_handle: event.client_handle,
                            fields: event.event_fields,
                        });
                    }
                }
                Notification::StatusChange(change) => {
                    log::info!("Subscription {} status changed to {}", self.id, change.status);
                    self.emit(SubscriptionEvent::StatusChanged(change.status));
                    if change.status != StatusCode::GOOD {
                        terminal = Some(change.status);
                    }
                }
                Notification::Other(eo) => {
                    log::debug!("Subscription {} ignoring notification {}", self.id, eo.node_id);
                }
            }
        }
        terminal
    }
}

/// Every subscription of a session
#[derive(Debug, Default)]
pub(crate) struct SubscriptionState {
    pub(crate) subscriptions: HashMap<u32, Subscription>,
    /// Acknowledgements for subscriptions no longer known locally
    pub(crate) orphan_acks: Vec<SubscriptionAcknowledgement>,
}

impl SubscriptionState {
    pub(crate) fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub(crate) fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.subscriptions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn get_mut(&mut self, id: u32) -> Option<&mut Subscription> {
        self.subscriptions.get_mut(&id)
    }

    pub(crate) fn insert(&mut self, subscription: Subscription) {
        self.subscriptions.insert(subscription.id, subscription);
    }

    pub(crate) fn remove(&mut self, id: u32) -> Option<Subscription> {
        self.subscriptions.remove(&id)
    }
}
