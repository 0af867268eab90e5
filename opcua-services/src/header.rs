//! Request and response headers, ServiceFault

use opcua_binary::{impl_encodable_struct, impl_structure};
use opcua_core::{DateTime, DiagnosticInfo, ExtensionObject, NodeId, StatusCode, UaString};

/// Header carried by every service request
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequestHeader {
    /// Session authentication token, null before the session exists
    pub authentication_token: NodeId,
    pub timestamp: DateTime,
    pub request_handle: u32,
    pub return_diagnostics: u32,
    pub audit_entry_id: UaString,
    /// Milliseconds the client waits for the response, 0 = no hint
    pub timeout_hint: u32,
    pub additional_header: ExtensionObject,
}

impl_encodable_struct!(RequestHeader {
    authentication_token,
    timestamp,
    request_handle,
    return_diagnostics,
    audit_entry_id,
    timeout_hint,
    additional_header,
});

impl RequestHeader {
    pub fn new(authentication_token: NodeId, request_handle: u32, timeout_hint: u32) -> Self {
        Self {
            authentication_token,
            timestamp: DateTime::now(),
            request_handle,
            timeout_hint,
            ..Default::default()
        }
    }
}

/// Header carried by every service response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseHeader {
    pub timestamp: DateTime,
    pub request_handle: u32,
    pub service_result: StatusCode,
    pub service_diagnostics: DiagnosticInfo,
    pub string_table: Vec<UaString>,
    pub additional_header: ExtensionObject,
}

impl_encodable_struct!(ResponseHeader {
    timestamp,
    request_handle,
    service_result,
    service_diagnostics,
    string_table,
    additional_header,
});

impl ResponseHeader {
    /// Good response to `request_handle`
    pub fn good(request_handle: u32) -> Self {
        Self::with_result(request_handle, StatusCode::GOOD)
    }

    pub fn with_result(request_handle: u32, service_result: StatusCode) -> Self {
        Self {
            timestamp: DateTime::now(),
            request_handle,
            service_result,
            ..Default::default()
        }
    }
}

/// Response sent instead of the expected one when a service fails as a whole
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceFault {
    pub response_header: ResponseHeader,
}

impl_encodable_struct!(ServiceFault { response_header });
impl_structure!(ServiceFault, 395, 397);

impl ServiceFault {
    pub fn new(request_handle: u32, status: StatusCode) -> Self {
        Self {
            response_header: ResponseHeader::with_result(request_handle, status),
        }
    }
}
