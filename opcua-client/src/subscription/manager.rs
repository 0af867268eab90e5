//! Subscription and monitored item services
//!
//! Local state changes only after the server confirmed them.

use super::state::{MonitoredItem, MonitoredItemParameters, Subscription, SubscriptionEvent, SubscriptionParameters};
use crate::session::Session;
use opcua_core::{StatusCode, UaError, UaResult};
use opcua_services::{
    CreateMonitoredItemsRequest, CreateSubscriptionRequest, DeleteMonitoredItemsRequest, DeleteSubscriptionsRequest,
    ModifyMonitoredItemsRequest, ModifySubscriptionRequest, MonitoredItemCreateRequest, MonitoredItemModifyRequest,
    MonitoringMode, MonitoringParameters, SetMonitoringModeRequest, SetPublishingModeRequest, TimestampsToReturn,
    TransferSubscriptionsRequest,
};
use tokio::sync::mpsc::UnboundedReceiver;

fn unknown_subscription(subscription_id: u32) -> UaError {
    log::debug!("Subscription {} is not known locally", subscription_id);
    UaError::ServiceFault(StatusCode::BAD_SUBSCRIPTION_ID_INVALID)
}

/// Every request item must have a result
fn check_results<T>(results: &[T], expected: usize, service: &str) -> UaResult<()> {
    if results.len() != expected {
        return Err(UaError::protocol(
            StatusCode::BAD_UNEXPECTED_ERROR,
            format!("{} returned {} results for {} items", service, results.len(), expected),
        ));
    }
    Ok(())
}

impl Session {
    fn require_subscription(&self, subscription_id: u32) -> UaResult<()> {
        if self.subscriptions().subscriptions.contains_key(&subscription_id) {
            Ok(())
        } else {
            Err(unknown_subscription(subscription_id))
        }
    }

    /// Ids of the subscriptions of this session, ascending
    pub fn subscription_ids(&self) -> Vec<u32> {
        self.subscriptions().ids()
    }

    /// Current (revised) parameters of a subscription
    pub fn subscription_parameters(&self, subscription_id: u32) -> UaResult<SubscriptionParameters> {
        self.subscriptions()
            .subscriptions
            .get(&subscription_id)
            .map(|s| s.parameters.clone())
            .ok_or_else(|| unknown_subscription(subscription_id))
    }

    /// Monitored items of a subscription, ordered by client handle
    pub fn monitored_items(&self, subscription_id: u32) -> UaResult<Vec<MonitoredItem>> {
        self.subscriptions()
            .subscriptions
            .get(&subscription_id)
            .map(|s| s.items.values().cloned().collect())
            .ok_or_else(|| unknown_subscription(subscription_id))
    }

    /// Receive the events of a subscription from now on
    ///
    /// Dropping the receiver unsubscribes. The stream ends when the
    /// subscription is deleted or ended by the server.
    pub fn subscribe(&self, subscription_id: u32) -> UaResult<UnboundedReceiver<SubscriptionEvent>> {
        self.subscriptions()
            .get_mut(subscription_id)
            .map(Subscription::subscribe)
            .ok_or_else(|| unknown_subscription(subscription_id))
    }

    /// Create a subscription and start publishing for it
    ///
    /// Returns the id assigned by the server. The revised parameters are
    /// available from `subscription_parameters`.
    pub async fn create_subscription(&self, parameters: SubscriptionParameters) -> UaResult<u32> {
        let request = CreateSubscriptionRequest {
            requested_publishing_interval: parameters.publishing_interval,
            requested_lifetime_count: parameters.lifetime_count,
            requested_max_keep_alive_count: parameters.max_keep_alive_count,
            max_notifications_per_publish: parameters.max_notifications_per_publish,
            publishing_enabled: parameters.publishing_enabled,
            priority: parameters.priority,
            ..Default::default()
        };
        let response = self.send(request).await?;
        let revised = SubscriptionParameters {
            publishing_interval: response.revised_publishing_interval,
            lifetime_count: response.revised_lifetime_count,
            max_keep_alive_count: response.revised_max_keep_alive_count,
            ..parameters
        };
        log::info!(
            "Created subscription {} with publishing interval {} ms",
            response.subscription_id,
            revised.publishing_interval
        );
        self.subscriptions()
            .insert(Subscription::new(response.subscription_id, revised));
        self.ensure_publishing();
        Ok(response.subscription_id)
    }

    /// Change the timing parameters of a subscription
    ///
    /// `publishing_enabled` is ignored; use `set_publishing_mode`.
    pub async fn modify_subscription(
        &self,
        subscription_id: u32,
        parameters: SubscriptionParameters,
    ) -> UaResult<SubscriptionParameters> {
        self.require_subscription(subscription_id)?;
        let request = ModifySubscriptionRequest {
            subscription_id,
            requested_publishing_interval: parameters.publishing_interval,
            requested_lifetime_count: parameters.lifetime_count,
            requested_max_keep_alive_count: parameters.max_keep_alive_count,
            max_notifications_per_publish: parameters.max_notifications_per_publish,
            priority: parameters.priority,
            ..Default::default()
        };
        let response = self.send(request).await?;
        let mut state = self.subscriptions();
        let subscription = state
            .get_mut(subscription_id)
            .ok_or_else(|| unknown_subscription(subscription_id))?;
        subscription.parameters = SubscriptionParameters {
            publishing_interval: response.revised_publishing_interval,
            lifetime_count: response.revised_lifetime_count,
            max_keep_alive_count: response.revised_max_keep_alive_count,
            publishing_enabled: subscription.parameters.publishing_enabled,
            ..parameters
        };
        Ok(subscription.parameters.clone())
    }

    /// Enable or disable publishing; returns one status per subscription
    pub async fn set_publishing_mode(&self, subscription_ids: &[u32], publishing_enabled: bool) -> UaResult<Vec<StatusCode>> {
        let request = SetPublishingModeRequest {
            publishing_enabled,
            subscription_ids: subscription_ids.to_vec(),
            ..Default::default()
        };
        let response = self.send(request).await?;
        check_results(&response.results, subscription_ids.len(), "SetPublishingMode")?;
        let mut state = self.subscriptions();
        for (id, status) in subscription_ids.iter().zip(&response.results) {
            if status.is_good() {
                if let Some(subscription) = state.get_mut(*id) {
                    subscription.parameters.publishing_enabled = publishing_enabled;
                }
            }
        }
        Ok(response.results)
    }

    /// Delete subscriptions; returns one status per subscription
    ///
    /// Subscriptions the server no longer knows are removed locally too.
    pub async fn delete_subscriptions(&self, subscription_ids: &[u32]) -> UaResult<Vec<StatusCode>> {
        let request = DeleteSubscriptionsRequest {
            subscription_ids: subscription_ids.to_vec(),
            ..Default::default()
        };
        let response = self.send(request).await?;
        check_results(&response.results, subscription_ids.len(), "DeleteSubscriptions")?;
        let now_empty = {
            let mut state = self.subscriptions();
            for (id, status) in subscription_ids.iter().zip(&response.results) {
                if status.is_good() || *status == StatusCode::BAD_SUBSCRIPTION_ID_INVALID {
                    if state.remove(*id).is_some() {
                        log::info!("Deleted subscription {}", id);
                    }
                }
            }
            state.is_empty()
        };
        if now_empty {
            self.stop_publishing();
        }
        Ok(response.results)
    }

    /// Create monitored items in a subscription
    ///
    /// Client handles are assigned here. Items the server refused come back
    /// as their status and are not recorded.
    pub async fn create_monitored_items(
        &self,
        subscription_id: u32,
        items: Vec<MonitoredItemParameters>,
    ) -> UaResult<Vec<Result<MonitoredItem, StatusCode>>> {
        let handles: Vec<u32> = {
            let mut state = self.subscriptions();
            let subscription = state
                .get_mut(subscription_id)
                .ok_or_else(|| unknown_subscription(subscription_id))?;
            items.iter().map(|_| subscription.allocate_client_handle()).collect()
        };
        let request = CreateMonitoredItemsRequest {
            subscription_id,
            timestamps_to_return: TimestampsToReturn::Both,
            items_to_create: items
                .iter()
                .zip(&handles)
                .map(|(item, &client_handle)| MonitoredItemCreateRequest {
                    item_to_monitor: item.item_to_monitor.clone(),
                    monitoring_mode: item.monitoring_mode,
                    requested_parameters: MonitoringParameters {
                        client_handle,
                        sampling_interval: item.sampling_interval,
                        filter: item.filter.clone(),
                        queue_size: item.queue_size,
                        discard_oldest: item.discard_oldest,
                    },
                })
                .collect(),
            ..Default::default()
        };
        let response = self.send(request).await?;
        check_results(&response.results, items.len(), "CreateMonitoredItems")?;

        let mut state = self.subscriptions();
        let subscription = state
            .get_mut(subscription_id)
            .ok_or_else(|| unknown_subscription(subscription_id))?;
        let created = items
            .into_iter()
            .zip(handles)
            .zip(response.results)
            .map(|((item, client_handle), result)| {
                if result.status_code.is_bad() {
                    log::warn!(
                        "Monitored item for {} refused: {}",
                        item.item_to_monitor.node_id,
                        result.status_code
                    );
                    return Err(result.status_code);
                }
                let monitored = MonitoredItem {
                    client_handle,
                    monitored_item_id: result.monitored_item_id,
                    item_to_monitor: item.item_to_monitor,
                    monitoring_mode: item.monitoring_mode,
                    sampling_interval: result.revised_sampling_interval,
                    queue_size: result.revised_queue_size,
                    discard_oldest: item.discard_oldest,
                    filter: item.filter,
                };
                subscription.items.insert(client_handle, monitored.clone());
                Ok(monitored)
            })
            .collect();
        Ok(created)
    }

    /// Change sampling, queueing and filtering of monitored items
    ///
    /// Items are identified by their `monitored_item_id`; the node and
    /// monitoring mode cannot be changed here.
    pub async fn modify_monitored_items(&self, subscription_id: u32, items: &[MonitoredItem]) -> UaResult<Vec<StatusCode>> {
        self.require_subscription(subscription_id)?;
        let request = ModifyMonitoredItemsRequest {
            subscription_id,
            timestamps_to_return: TimestampsToReturn::Both,
            items_to_modify: items
                .iter()
                .map(|item| MonitoredItemModifyRequest {
                    monitored_item_id: item.monitored_item_id,
                    requested_parameters: MonitoringParameters {
                        client_handle: item.client_handle,
                        sampling_interval: item.sampling_interval,
                        filter: item.filter.clone(),
                        queue_size: item.queue_size,
                        discard_oldest: item.discard_oldest,
                    },
                })
                .collect(),
            ..Default::default()
        };
        let response = self.send(request).await?;
        check_results(&response.results, items.len(), "ModifyMonitoredItems")?;
        let mut state = self.subscriptions();
        let subscription = state
            .get_mut(subscription_id)
            .ok_or_else(|| unknown_subscription(subscription_id))?;
        Ok(items
            .iter()
            .zip(response.results)
            .map(|(item, result)| {
                if result.status_code.is_good() {
                    if let Some(existing) = subscription.item_by_id_mut(item.monitored_item_id) {
                        existing.sampling_interval = result.revised_sampling_interval;
                        existing.queue_size = result.revised_queue_size;
                        existing.discard_oldest = item.discard_oldest;
                        existing.filter = item.filter.clone();
                    }
                }
                result.status_code
            })
            .collect())
    }

    /// Change the monitoring mode of monitored items
    pub async fn set_monitoring_mode(
        &self,
        subscription_id: u32,
        monitoring_mode: MonitoringMode,
        monitored_item_ids: &[u32],
    ) -> UaResult<Vec<StatusCode>> {
        self.require_subscription(subscription_id)?;
        let request = SetMonitoringModeRequest {
            subscription_id,
            monitoring_mode,
            monitored_item_ids: monitored_item_ids.to_vec(),
            ..Default::default()
        };
        let response = self.send(request).await?;
        check_results(&response.results, monitored_item_ids.len(), "SetMonitoringMode")?;
        let mut state = self.subscriptions();
        if let Some(subscription) = state.get_mut(subscription_id) {
            for (id, status) in monitored_item_ids.iter().zip(&response.results) {
                if status.is_good() {
                    if let Some(item) = subscription.item_by_id_mut(*id) {
                        item.monitoring_mode = monitoring_mode;
                    }
                }
            }
        }
        Ok(response.results)
    }

    /// Delete monitored items; returns one status per item
    pub async fn delete_monitored_items(&self, subscription_id: u32, monitored_item_ids: &[u32]) -> UaResult<Vec<StatusCode>> {
        self.require_subscription(subscription_id)?;
        let request = DeleteMonitoredItemsRequest {
            subscription_id,
            monitored_item_ids: monitored_item_ids.to_vec(),
            ..Default::default()
        };
        let response = self.send(request).await?;
        check_results(&response.results, monitored_item_ids.len(), "DeleteMonitoredItems")?;
        let mut state = self.subscriptions();
        if let Some(subscription) = state.get_mut(subscription_id) {
            for (id, status) in monitored_item_ids.iter().zip(&response.results) {
                if status.is_good() || *status == StatusCode::BAD_MONITORED_ITEM_ID_INVALID {
                    subscription.items.retain(|_, item| item.monitored_item_id != *id);
                }
            }
        }
        Ok(response.results)
    }

    /// Move subscriptions of an earlier session to this one
    ///
    /// Subscriptions known locally keep their id, items and sequence
    /// tracking: numbers the server still holds that were already delivered
    /// are acknowledged, the others are republished. A subscription that
    /// cannot be transferred is removed locally and ends with `StatusChanged`.
    ///
    /// Subscriptions created through another `Session` are adopted with
    /// default parameters and no local items. Their delivery starts with the
    /// next notification; `send_initial_values` asks the server for a fresh
    /// value of every item. Call `subscribe` afterwards to receive events.
    pub async fn transfer_subscriptions(
        &self,
        subscription_ids: &[u32],
        send_initial_values: bool,
    ) -> UaResult<Vec<StatusCode>> {
        let request = TransferSubscriptionsRequest {
            subscription_ids: subscription_ids.to_vec(),
            send_initial_values,
            ..Default::default()
        };
        let response = self.send(request).await?;
        check_results(&response.results, subscription_ids.len(), "TransferSubscriptions")?;

        let mut republish = Vec::new();
        let statuses: Vec<StatusCode> = {
            let mut state = self.subscriptions();
            subscription_ids
                .iter()
                .zip(response.results)
                .map(|(&id, result)| {
                    if result.status_code.is_good() {
                        if state.get_mut(id).is_none() {
                            log::info!("Adopting subscription {} from another session", id);
                            state.insert(Subscription::adopted(id));
                        }
                        if let Some(subscription) = state.get_mut(id) {
                            let missing = subscription.tracker.reconcile(&result.available_sequence_numbers);
                            log::info!(
                                "Transferred subscription {}, resuming at {} with {} notifications to republish",
                                id,
                                subscription.tracker.next_expected(),
                                missing.len()
                            );
                            republish.extend(missing.into_iter().map(|n| (id, n)));
                        }
                    } else if let Some(mut subscription) = state.remove(id) {
                        log::warn!("Transfer of subscription {} failed: {}", id, result.status_code);
                        subscription.emit(SubscriptionEvent::StatusChanged(result.status_code));
                    }
                    result.status_code
                })
                .collect()
        };
        self.ensure_publishing();
        self.inner.subscription_added.notify_waiters();
        for (id, sequence_number) in republish {
            self.republish(id, sequence_number).await;
        }
        Ok(statuses)
    }

    /// End every local subscription with `status`
    pub(crate) fn discard_subscriptions(&self, status: StatusCode) {
        let discarded: Vec<Subscription> = self.subscriptions().subscriptions.drain().map(|(_, s)| s).collect();
        for mut subscription in discarded {
            log::warn!("Discarding subscription {}: {}", subscription.id, status);
            subscription.emit(SubscriptionEvent::StatusChanged(status));
        }
        self.stop_publishing();
    }
}
