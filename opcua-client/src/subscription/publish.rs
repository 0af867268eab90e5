//! Publish loop of a session
//!
//! One task per session keeps a number of Publish requests outstanding so the
//! server always has one to answer when a subscription has something to
//! report. Each response is fed through the sequence tracker of its
//! subscription; gaps are filled with Republish before delivery continues.
//! Acknowledgements ride on the next Publish request.

use super::state::Subscription;
use super::tracker::Delivery;
use crate::channel::timeout_hint;
use crate::session::{Session, SessionInner, SessionState};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use opcua_binary::TypeRegistry;
use opcua_core::{StatusCode, UaError, UaResult};
use opcua_services::{
    NotificationMessage, PublishRequest, PublishResponse, RepublishRequest, SubscriptionAcknowledgement,
};
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Wait after a failed Publish before sending the next one
const RETRY_DELAY: Duration = Duration::from_millis(500);
/// Longest pause while the server reports no subscriptions
const NO_SUBSCRIPTION_PAUSE: Duration = Duration::from_secs(1);

type PublishOutcome = (Vec<SubscriptionAcknowledgement>, UaResult<PublishResponse>);

/// Handle of a running publish loop
#[derive(Debug)]
pub(crate) struct Publisher {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl Publisher {
    fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled() && !self.task.is_finished()
    }

    pub(crate) fn stop(self) {
        self.shutdown.cancel();
    }
}

enum Flow {
    Continue,
    Wait(Duration),
    Stop,
}

/// Deliver in order; stops at the first terminal status change
fn deliver_all(
    subscription: &mut Subscription,
    deliveries: Vec<Delivery<NotificationMessage>>,
    registry: &TypeRegistry,
) -> Option<StatusCode> {
    deliveries
        .into_iter()
        .find_map(|delivery| subscription.deliver(delivery, registry))
}

impl Session {
    /// Start the publish loop if the session is active and has subscriptions
    pub(crate) fn ensure_publishing(&self) {
        if self.state() != SessionState::Active || self.subscriptions().is_empty() {
            return;
        }
        let mut publisher = self.inner.publisher.lock().unwrap_or_else(|e| e.into_inner());
        if publisher.as_ref().is_some_and(Publisher::is_running) {
            self.inner.subscription_added.notify_waiters();
            return;
        }
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(publish_loop(self.downgrade(), shutdown.clone()));
        *publisher = Some(Publisher { shutdown, task });
        log::debug!("Publish loop started");
    }

    pub(crate) fn stop_publishing(&self) {
        let publisher = self.inner.publisher.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(publisher) = publisher {
            publisher.stop();
            log::debug!("Publish loop stopped");
        }
    }

    /// How long a Publish may stay unanswered
    ///
    /// A server holds a Publish for up to a keep-alive period of the slowest
    /// subscription before answering it.
    fn publish_timeout(&self) -> Duration {
        let keep_alive_ms = self
            .subscriptions()
            .subscriptions
            .values()
            .map(|s| s.parameters.publishing_interval.max(0.0) * f64::from(s.parameters.max_keep_alive_count.max(1)))
            .fold(0.0, f64::max);
        self.inner.config.request_timeout() + Duration::from_secs_f64(keep_alive_ms / 1000.0)
    }

    fn take_acknowledgements(&self) -> Vec<SubscriptionAcknowledgement> {
        let mut state = self.subscriptions();
        let mut acks = std::mem::take(&mut state.orphan_acks);
        for subscription in state.subscriptions.values_mut() {
            let subscription_id = subscription.id;
            acks.extend(
                subscription
                    .tracker
                    .take_acks()
                    .into_iter()
                    .map(|sequence_number| SubscriptionAcknowledgement {
                        subscription_id,
                        sequence_number,
                    }),
            );
        }
        acks
    }

    fn requeue_acknowledgements(&self, acks: Vec<SubscriptionAcknowledgement>) {
        let mut state = self.subscriptions();
        for ack in acks {
            if let Some(subscription) = state.get_mut(ack.subscription_id) {
                subscription.tracker.requeue_acks(vec![ack.sequence_number]);
            }
        }
    }

    /// Build the next Publish; the returned future holds no session reference
    fn start_publish(&self) -> UaResult<BoxFuture<'static, PublishOutcome>> {
        let acks = self.take_acknowledgements();
        let timeout = self.publish_timeout();
        let mut request = PublishRequest {
            subscription_acknowledgements: acks.clone(),
            ..Default::default()
        };
        request.request_header.timeout_hint = timeout_hint(timeout);
        let channel = match self.prepare_request(&mut request) {
            Ok((channel, _)) => channel,
            Err(error) => {
                self.requeue_acknowledgements(acks);
                return Err(error);
            }
        };
        Ok(async move {
            let result = channel.send(&request, timeout, None).await;
            (acks, result)
        }
        .boxed())
    }

    /// Feed one Publish response to its subscription; false once no subscription is left
    async fn process_publish_response(&self, response: PublishResponse) -> bool {
        for (index, status) in response.results.iter().enumerate() {
            if status.is_bad() {
                log::debug!("Acknowledgement {} rejected: {}", index, status);
            }
        }
        let subscription_id = response.subscription_id;
        let message = response.notification_message;
        let missing = {
            let mut state = self.subscriptions();
            let Some(subscription) = state.get_mut(subscription_id) else {
                log::warn!(
                    "Publish response for unknown subscription {}, dropping notification {}",
                    subscription_id,
                    message.sequence_number
                );
                if !message.is_keep_alive() {
                    state.orphan_acks.push(SubscriptionAcknowledgement {
                        subscription_id,
                        sequence_number: message.sequence_number,
                    });
                }
                return !state.is_empty();
            };
            let deliveries = if message.is_keep_alive() {
                log::trace!("Keep-alive on subscription {}", subscription_id);
                subscription.tracker.on_keep_alive(message.sequence_number)
            } else {
                subscription.tracker.on_notification(message.sequence_number, message)
            };
            match deliver_all(subscription, deliveries, &self.inner.registry) {
                Some(status) => {
                    log::info!("Subscription {} ended by the server: {}", subscription_id, status);
                    state.remove(subscription_id);
                    Vec::new()
                }
                None => {
                    let missing = subscription.tracker.take_missing();
                    if !missing.is_empty() {
                        log::debug!(
                            "Subscription {} missing {:?}, {} messages held back",
                            subscription_id,
                            missing,
                            subscription.tracker.buffered()
                        );
                    }
                    missing
                }
            }
        };
        for sequence_number in missing {
            self.republish(subscription_id, sequence_number).await;
        }
        !self.subscriptions().is_empty()
    }

    /// Fetch one missing notification message and deliver what it unblocks
    pub(crate) async fn republish(&self, subscription_id: u32, sequence_number: u32) {
        log::debug!("Republishing {} of subscription {}", sequence_number, subscription_id);
        let request = RepublishRequest {
            subscription_id,
            retransmit_sequence_number: sequence_number,
            ..Default::default()
        };
        let result = self.send(request).await;

        let mut state = self.subscriptions();
        let Some(subscription) = state.get_mut(subscription_id) else {
            return;
        };
        let deliveries = match result {
            Ok(response) => subscription
                .tracker
                .on_republished(sequence_number, response.notification_message),
            Err(error) if error.is_channel_fatal() || matches!(error, UaError::Session(_) | UaError::InvalidState(_)) => {
                log::debug!("Republish of {} deferred: {}", sequence_number, error);
                subscription.tracker.retry_later(sequence_number);
                return;
            }
            Err(error) => {
                log::warn!(
                    "Notification {} of subscription {} lost: {}",
                    sequence_number,
                    subscription_id,
                    error
                );
                subscription.tracker.on_lost(sequence_number)
            }
        };
        if let Some(status) = deliver_all(subscription, deliveries, &self.inner.registry) {
            log::info!("Subscription {} ended by the server: {}", subscription_id, status);
            state.remove(subscription_id);
        }
    }

    async fn handle_outcome(&self, outcome: PublishOutcome, target: &mut usize) -> Flow {
        let (acks, result) = outcome;
        let error = match result {
            Ok(response) => {
                return if self.process_publish_response(response).await {
                    Flow::Continue
                } else {
                    Flow::Stop
                };
            }
            Err(error) => self.map_error(error),
        };
        match error {
            UaError::ServiceFault(status) if status == StatusCode::BAD_NO_SUBSCRIPTION => {
                if self.subscriptions().is_empty() {
                    Flow::Stop
                } else {
                    log::debug!("Server has no subscriptions yet, pausing publish");
                    Flow::Wait(NO_SUBSCRIPTION_PAUSE)
                }
            }
            UaError::ServiceFault(status) if status == StatusCode::BAD_TOO_MANY_PUBLISH_REQUESTS => {
                self.requeue_acknowledgements(acks);
                if *target > 1 {
                    *target -= 1;
                    log::info!("Server limits Publish requests, now keeping {} outstanding", target);
                }
                Flow::Continue
            }
            UaError::Session(_) | UaError::InvalidState(_) | UaError::Cancelled => Flow::Stop,
            error if error.is_channel_fatal() => {
                log::debug!("Publish loop stopping: {}", error);
                Flow::Stop
            }
            error => {
                log::warn!("Publish failed: {}", error);
                self.requeue_acknowledgements(acks);
                Flow::Wait(RETRY_DELAY)
            }
        }
    }
}

async fn publish_loop(session: Weak<SessionInner>, shutdown: CancellationToken) {
    let Some(mut target) = Session::upgrade(&session).map(|s| s.inner.config.max_inflight_publish.max(1)) else {
        return;
    };
    let mut in_flight = FuturesUnordered::new();
    loop {
        while in_flight.len() < target {
            let Some(session) = Session::upgrade(&session) else {
                return;
            };
            match session.start_publish() {
                Ok(publish) => in_flight.push(publish),
                Err(error) => {
                    log::debug!("Publish loop stopping: {}", error);
                    return;
                }
            }
        }

        let outcome = tokio::select! {
            _ = shutdown.cancelled() => break,
            Some(outcome) = in_flight.next() => outcome,
        };
        let Some(session) = Session::upgrade(&session) else {
            break;
        };
        match session.handle_outcome(outcome, &mut target).await {
            Flow::Continue => {}
            Flow::Stop => break,
            Flow::Wait(delay) => {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = session.inner.subscription_added.notified() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
    shutdown.cancel();
    log::debug!("Publish loop ended with {} requests outstanding", in_flight.len());
}
