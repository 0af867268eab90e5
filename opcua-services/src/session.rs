//! Session services

use crate::endpoint::{ApplicationDescription, EndpointDescription, SignatureData, SignedSoftwareCertificate};
use crate::header::{RequestHeader, ResponseHeader};
use crate::service::impl_service;
use opcua_binary::{impl_encodable_struct, impl_structure};
use opcua_core::{ByteString, DiagnosticInfo, ExtensionObject, NodeId, StatusCode, UaString};

#[derive(Debug, Clone, PartialEq)]
pub struct CreateSessionRequest {
    pub request_header: RequestHeader,
    pub client_description: ApplicationDescription,
    pub server_uri: UaString,
    pub endpoint_url: UaString,
    pub session_name: UaString,
    pub client_nonce: ByteString,
    pub client_certificate: ByteString,
    /// Requested timeout in milliseconds
    pub requested_session_timeout: f64,
    pub max_response_message_size: u32,
}

impl_encodable_struct!(CreateSessionRequest {
    request_header,
    client_description,
    server_uri,
    endpoint_url,
    session_name,
    client_nonce,
    client_certificate,
    requested_session_timeout,
    max_response_message_size,
});
impl_structure!(CreateSessionRequest, 459, 461);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CreateSessionResponse {
    pub response_header: ResponseHeader,
    pub session_id: NodeId,
    pub authentication_token: NodeId,
    pub revised_session_timeout: f64,
    pub server_nonce: ByteString,
    pub server_certificate: ByteString,
    pub server_endpoints: Vec<EndpointDescription>,
    pub server_software_certificates: Vec<SignedSoftwareCertificate>,
    pub server_signature: SignatureData,
    pub max_request_message_size: u32,
}

impl_encodable_struct!(CreateSessionResponse {
    response_header,
    session_id,
    authentication_token,
    revised_session_timeout,
    server_nonce,
    server_certificate,
    server_endpoints,
    server_software_certificates,
    server_signature,
    max_request_message_size,
});
impl_structure!(CreateSessionResponse, 462, 464);
impl_service!(CreateSessionRequest => CreateSessionResponse);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActivateSessionRequest {
    pub request_header: RequestHeader,
    pub client_signature: SignatureData,
    pub client_software_certificates: Vec<SignedSoftwareCertificate>,
    pub locale_ids: Vec<UaString>,
    /// One of the identity token structures
    pub user_identity_token: ExtensionObject,
    pub user_token_signature: SignatureData,
}

impl_encodable_struct!(ActivateSessionRequest {
    request_header,
    client_signature,
    client_software_certificates,
    locale_ids,
    user_identity_token,
    user_token_signature,
});
impl_structure!(ActivateSessionRequest, 465, 467);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActivateSessionResponse {
    pub response_header: ResponseHeader,
    pub server_nonce: ByteString,
    pub results: Vec<StatusCode>,
    pub diagnostic_infos: Vec<DiagnosticInfo>,
}

impl_encodable_struct!(ActivateSessionResponse {
    response_header,
    server_nonce,
    results,
    diagnostic_infos,
});
impl_structure!(ActivateSessionResponse, 468, 470);
impl_service!(ActivateSessionRequest => ActivateSessionResponse);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CloseSessionRequest {
    pub request_header: RequestHeader,
    pub delete_subscriptions: bool,
}

impl_encodable_struct!(CloseSessionRequest {
    request_header,
    delete_subscriptions,
});
impl_structure!(CloseSessionRequest, 471, 473);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CloseSessionResponse {
    pub response_header: ResponseHeader,
}

impl_encodable_struct!(CloseSessionResponse { response_header });
impl_structure!(CloseSessionResponse, 474, 476);
impl_service!(CloseSessionRequest => CloseSessionResponse);

/// Ask the server to cancel outstanding requests with a request handle
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CancelRequest {
    pub request_header: RequestHeader,
    pub request_handle: u32,
}

impl_encodable_struct!(CancelRequest {
    request_header,
    request_handle,
});
impl_structure!(CancelRequest, 477, 479);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CancelResponse {
    pub response_header: ResponseHeader,
    pub cancel_count: u32,
}

impl_encodable_struct!(CancelResponse {
    response_header,
    cancel_count,
});
impl_structure!(CancelResponse, 480, 482);
impl_service!(CancelRequest => CancelResponse);
