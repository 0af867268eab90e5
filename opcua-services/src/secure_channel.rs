//! OpenSecureChannel and CloseSecureChannel

use crate::enums::{SecurityMode, SecurityTokenRequestType};
use crate::header::{RequestHeader, ResponseHeader};
use crate::service::impl_service;
use opcua_binary::{impl_encodable_struct, impl_structure};
use opcua_core::{ByteString, DateTime};

/// Token issued by the server for a secure channel
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelSecurityToken {
    pub channel_id: u32,
    pub token_id: u32,
    pub created_at: DateTime,
    /// Lifetime in milliseconds
    pub revised_lifetime: u32,
}

impl_encodable_struct!(ChannelSecurityToken {
    channel_id,
    token_id,
    created_at,
    revised_lifetime,
});

#[derive(Debug, Clone, PartialEq)]
pub struct OpenSecureChannelRequest {
    pub request_header: RequestHeader,
    pub client_protocol_version: u32,
    pub request_type: SecurityTokenRequestType,
    pub security_mode: SecurityMode,
    pub client_nonce: ByteString,
    /// Requested lifetime in milliseconds
    pub requested_lifetime: u32,
}

impl_encodable_struct!(OpenSecureChannelRequest {
    request_header,
    client_protocol_version,
    request_type,
    security_mode,
    client_nonce,
    requested_lifetime,
});
impl_structure!(OpenSecureChannelRequest, 444, 446);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OpenSecureChannelResponse {
    pub response_header: ResponseHeader,
    pub server_protocol_version: u32,
    pub security_token: ChannelSecurityToken,
    pub server_nonce: ByteString,
}

impl_encodable_struct!(OpenSecureChannelResponse {
    response_header,
    server_protocol_version,
    security_token,
    server_nonce,
});
impl_structure!(OpenSecureChannelResponse, 447, 449);
impl_service!(OpenSecureChannelRequest => OpenSecureChannelResponse);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CloseSecureChannelRequest {
    pub request_header: RequestHeader,
}

impl_encodable_struct!(CloseSecureChannelRequest { request_header });
impl_structure!(CloseSecureChannelRequest, 450, 452);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CloseSecureChannelResponse {
    pub response_header: ResponseHeader,
}

impl_encodable_struct!(CloseSecureChannelResponse { response_header });
impl_structure!(CloseSecureChannelResponse, 453, 455);
impl_service!(CloseSecureChannelRequest => CloseSecureChannelResponse);
