//! Subscription services, Publish and Republish

use crate::header::{RequestHeader, ResponseHeader};
use crate::service::impl_service;
use opcua_binary::{impl_encodable_struct, impl_structure};
use opcua_core::{DateTime, DiagnosticInfo, ExtensionObject, StatusCode};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CreateSubscriptionRequest {
    pub request_header: RequestHeader,
    pub requested_publishing_interval: f64,
    pub requested_lifetime_count: u32,
    pub requested_max_keep_alive_count: u32,
    pub max_notifications_per_publish: u32,
    pub publishing_enabled: bool,
    pub priority: u8,
}

impl_encodable_struct!(CreateSubscriptionRequest {
    request_header,
    requested_publishing_interval,
    requested_lifetime_count,
    requested_max_keep_alive_count,
    max_notifications_per_publish,
    publishing_enabled,
    priority,
});
impl_structure!(CreateSubscriptionRequest, 785, 787);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CreateSubscriptionResponse {
    pub response_header: ResponseHeader,
    pub subscription_id: u32,
    pub revised_publishing_interval: f64,
    pub revised_lifetime_count: u32,
    pub revised_max_keep_alive_count: u32,
}

impl_encodable_struct!(CreateSubscriptionResponse {
    response_header,
    subscription_id,
    revised_publishing_interval,
    revised_lifetime_count,
    revised_max_keep_alive_count,
});
impl_structure!(CreateSubscriptionResponse, 788, 790);
impl_service!(CreateSubscriptionRequest => CreateSubscriptionResponse);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModifySubscriptionRequest {
    pub request_header: RequestHeader,
    pub subscription_id: u32,
    pub requested_publishing_interval: f64,
    pub requested_lifetime_count: u32,
    pub requested_max_keep_alive_count: u32,
    pub max_notifications_per_publish: u32,
    pub priority: u8,
}

impl_encodable_struct!(ModifySubscriptionRequest {
    request_header,
    subscription_id,
    requested_publishing_interval,
    requested_lifetime_count,
    requested_max_keep_alive_count,
    max_notifications_per_publish,
    priority,
});
impl_structure!(ModifySubscriptionRequest, 791, 793);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModifySubscriptionResponse {
    pub response_header: ResponseHeader,
    pub revised_publishing_interval: f64,
    pub revised_lifetime_count: u32,
    pub revised_max_keep_alive_count: u32,
}

impl_encodable_struct!(ModifySubscriptionResponse {
    response_header,
    revised_publishing_interval,
    revised_lifetime_count,
    revised_max_keep_alive_count,
});
impl_structure!(ModifySubscriptionResponse, 794, 796);
impl_service!(ModifySubscriptionRequest => ModifySubscriptionResponse);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SetPublishingModeRequest {
    pub request_header: RequestHeader,
    pub publishing_enabled: bool,
    pub subscription_ids: Vec<u32>,
}

impl_encodable_struct!(SetPublishingModeRequest {
    request_header,
    publishing_enabled,
    subscription_ids,
});
impl_structure!(SetPublishingModeRequest, 797, 799);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SetPublishingModeResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<StatusCode>,
    pub diagnostic_infos: Vec<DiagnosticInfo>,
}

impl_encodable_struct!(SetPublishingModeResponse {
    response_header,
    results,
    diagnostic_infos,
});
impl_structure!(SetPublishingModeResponse, 800, 802);
impl_service!(SetPublishingModeRequest => SetPublishingModeResponse);

/// Sequence number the client has received for a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SubscriptionAcknowledgement {
    pub subscription_id: u32,
    pub sequence_number: u32,
}

impl_encodable_struct!(SubscriptionAcknowledgement {
    subscription_id,
    sequence_number,
});

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PublishRequest {
    pub request_header: RequestHeader,
    pub subscription_acknowledgements: Vec<SubscriptionAcknowledgement>,
}

impl_encodable_struct!(PublishRequest {
    request_header,
    subscription_acknowledgements,
});
impl_structure!(PublishRequest, 824, 826);

/// Notifications of one publishing cycle
///
/// A keep-alive carries no notification data; its sequence number is the
/// next one the server will use.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NotificationMessage {
    pub sequence_number: u32,
    pub publish_time: DateTime,
    pub notification_data: Vec<ExtensionObject>,
}

impl_encodable_struct!(NotificationMessage {
    sequence_number,
    publish_time,
    notification_data,
});

impl NotificationMessage {
    pub fn keep_alive(next_sequence_number: u32) -> Self {
        Self {
            sequence_number: next_sequence_number,
            publish_time: DateTime::now(),
            notification_data: Vec::new(),
        }
    }

    pub fn is_keep_alive(&self) -> bool {
        self.notification_data.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PublishResponse {
    pub response_header: ResponseHeader,
    pub subscription_id: u32,
    pub available_sequence_numbers: Vec<u32>,
    pub more_notifications: bool,
    pub notification_message: NotificationMessage,
    /// Results of the acknowledgements in the request
    pub results: Vec<StatusCode>,
    pub diagnostic_infos: Vec<DiagnosticInfo>,
}

impl_encodable_struct!(PublishResponse {
    response_header,
    subscription_id,
    available_sequence_numbers,
    more_notifications,
    notification_message,
    results,
    diagnostic_infos,
});
impl_structure!(PublishResponse, 827, 829);
impl_service!(PublishRequest => PublishResponse);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RepublishRequest {
    pub request_header: RequestHeader,
    pub subscription_id: u32,
    pub retransmit_sequence_number: u32,
}

impl_encodable_struct!(RepublishRequest {
    request_header,
    subscription_id,
    retransmit_sequence_number,
});
impl_structure!(RepublishRequest, 830, 832);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RepublishResponse {
    pub response_header: ResponseHeader,
    pub notification_message: NotificationMessage,
}

impl_encodable_struct!(RepublishResponse {
    response_header,
    notification_message,
});
impl_structure!(RepublishResponse, 833, 835);
impl_service!(RepublishRequest => RepublishResponse);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransferResult {
    pub status_code: StatusCode,
    pub available_sequence_numbers: Vec<u32>,
}

impl_encodable_struct!(TransferResult {
    status_code,
    available_sequence_numbers,
});

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransferSubscriptionsRequest {
    pub request_header: RequestHeader,
    pub subscription_ids: Vec<u32>,
    pub send_initial_values: bool,
}

impl_encodable_struct!(TransferSubscriptionsRequest {
    request_header,
    subscription_ids,
    send_initial_values,
});
impl_structure!(TransferSubscriptionsRequest, 839, 841);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransferSubscriptionsResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<TransferResult>,
    pub diagnostic_infos: Vec<DiagnosticInfo>,
}

impl_encodable_struct!(TransferSubscriptionsResponse {
    response_header,
    results,
    diagnostic_infos,
});
impl_structure!(TransferSubscriptionsResponse, 842, 844);
impl_service!(TransferSubscriptionsRequest => TransferSubscriptionsResponse);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeleteSubscriptionsRequest {
    pub request_header: RequestHeader,
    pub subscription_ids: Vec<u32>,
}

impl_encodable_struct!(DeleteSubscriptionsRequest {
    request_header,
    subscription_ids,
});
impl_structure!(DeleteSubscriptionsRequest, 845, 847);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeleteSubscriptionsResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<StatusCode>,
    pub diagnostic_infos: Vec<DiagnosticInfo>,
}

impl_encodable_struct!(DeleteSubscriptionsResponse {
    response_header,
    results,
    diagnostic_infos,
});
impl_structure!(DeleteSubscriptionsResponse, 848, 850);
impl_service!(DeleteSubscriptionsRequest => DeleteSubscriptionsResponse);
