//! Monitored item services

use crate::attribute::ReadValueId;
use crate::enums::{MonitoringMode, TimestampsToReturn};
use crate::header::{RequestHeader, ResponseHeader};
use crate::service::impl_service;
use opcua_binary::{impl_encodable_struct, impl_structure};
use opcua_core::{DiagnosticInfo, ExtensionObject, StatusCode};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MonitoringParameters {
    pub client_handle: u32,
    /// Sampling interval in milliseconds, -1 = publishing interval
    pub sampling_interval: f64,
    pub filter: ExtensionObject,
    pub queue_size: u32,
    pub discard_oldest: bool,
}

impl_encodable_struct!(MonitoringParameters {
    client_handle,
    sampling_interval,
    filter,
    queue_size,
    discard_oldest,
});

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MonitoredItemCreateRequest {
    pub item_to_monitor: ReadValueId,
    pub monitoring_mode: MonitoringMode,
    pub requested_parameters: MonitoringParameters,
}

impl_encodable_struct!(MonitoredItemCreateRequest {
    item_to_monitor,
    monitoring_mode,
    requested_parameters,
});

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MonitoredItemCreateResult {
    pub status_code: StatusCode,
    pub monitored_item_id: u32,
    pub revised_sampling_interval: f64,
    pub revised_queue_size: u32,
    pub filter_result: ExtensionObject,
}

impl_encodable_struct!(MonitoredItemCreateResult {
    status_code,
    monitored_item_id,
    revised_sampling_interval,
    revised_queue_size,
    filter_result,
});

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CreateMonitoredItemsRequest {
    pub request_header: RequestHeader,
    pub subscription_id: u32,
    pub timestamps_to_return: TimestampsToReturn,
    pub items_to_create: Vec<MonitoredItemCreateRequest>,
}

impl_encodable_struct!(CreateMonitoredItemsRequest {
    request_header,
    subscription_id,
    timestamps_to_return,
    items_to_create,
});
impl_structure!(CreateMonitoredItemsRequest, 749, 751);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CreateMonitoredItemsResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<MonitoredItemCreateResult>,
    pub diagnostic_infos: Vec<DiagnosticInfo>,
}

impl_encodable_struct!(CreateMonitoredItemsResponse {
    response_header,
    results,
    diagnostic_infos,
});
impl_structure!(CreateMonitoredItemsResponse, 752, 754);
impl_service!(CreateMonitoredItemsRequest => CreateMonitoredItemsResponse);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MonitoredItemModifyRequest {
    pub monitored_item_id: u32,
    pub requested_parameters: MonitoringParameters,
}

impl_encodable_struct!(MonitoredItemModifyRequest {
    monitored_item_id,
    requested_parameters,
});

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MonitoredItemModifyResult {
    pub status_code: StatusCode,
    pub revised_sampling_interval: f64,
    pub revised_queue_size: u32,
    pub filter_result: ExtensionObject,
}

impl_encodable_struct!(MonitoredItemModifyResult {
    status_code,
    revised_sampling_interval,
    revised_queue_size,
    filter_result,
});

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModifyMonitoredItemsRequest {
    pub request_header: RequestHeader,
    pub subscription_id: u32,
    pub timestamps_to_return: TimestampsToReturn,
    pub items_to_modify: Vec<MonitoredItemModifyRequest>,
}

impl_encodable_struct!(ModifyMonitoredItemsRequest {
    request_header,
    subscription_id,
    timestamps_to_return,
    items_to_modify,
});
impl_structure!(ModifyMonitoredItemsRequest, 761, 763);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModifyMonitoredItemsResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<MonitoredItemModifyResult>,
    pub diagnostic_infos: Vec<DiagnosticInfo>,
}

impl_encodable_struct!(ModifyMonitoredItemsResponse {
    response_header,
    results,
    diagnostic_infos,
});
impl_structure!(ModifyMonitoredItemsResponse, 764, 766);
impl_service!(ModifyMonitoredItemsRequest => ModifyMonitoredItemsResponse);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SetMonitoringModeRequest {
    pub request_header: RequestHeader,
    pub subscription_id: u32,
    pub monitoring_mode: MonitoringMode,
    pub monitored_item_ids: Vec<u32>,
}

impl_encodable_struct!(SetMonitoringModeRequest {
    request_header,
    subscription_id,
    monitoring_mode,
    monitored_item_ids,
});
impl_structure!(SetMonitoringModeRequest, 767, 769);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SetMonitoringModeResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<StatusCode>,
    pub diagnostic_infos: Vec<DiagnosticInfo>,
}

impl_encodable_struct!(SetMonitoringModeResponse {
    response_header,
    results,
    diagnostic_infos,
});
impl_structure!(SetMonitoringModeResponse, 770, 772);
impl_service!(SetMonitoringModeRequest => SetMonitoringModeResponse);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeleteMonitoredItemsRequest {
    pub request_header: RequestHeader,
    pub subscription_id: u32,
    pub monitored_item_ids: Vec<u32>,
}

impl_encodable_struct!(DeleteMonitoredItemsRequest {
    request_header,
    subscription_id,
    monitored_item_ids,
});
impl_structure!(DeleteMonitoredItemsRequest, 779, 781);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeleteMonitoredItemsResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<StatusCode>,
    pub diagnostic_infos: Vec<DiagnosticInfo>,
}

impl_encodable_struct!(DeleteMonitoredItemsResponse {
    response_header,
    results,
    diagnostic_infos,
});
impl_structure!(DeleteMonitoredItemsResponse, 782, 784);
impl_service!(DeleteMonitoredItemsRequest => DeleteMonitoredItemsResponse);
