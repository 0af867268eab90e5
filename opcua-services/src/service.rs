//! Request/response pairing and message body encoding
//!
//! A service message body is the binary encoding id of the structure
//! followed by the structure itself.

use crate::header::{RequestHeader, ResponseHeader, ServiceFault};
use opcua_binary::{BinaryDecoder, BinaryEncodable, BinaryEncoder, DecodingOptions, Structure};
use opcua_core::{NodeId, StatusCode, UaError, UaResult};

/// A service request and the response type it expects
pub trait ServiceRequest: Structure {
    type Response: ServiceResponse;

    fn request_header(&self) -> &RequestHeader;

    fn request_header_mut(&mut self) -> &mut RequestHeader;
}

/// A service response
pub trait ServiceResponse: Structure {
    fn response_header(&self) -> &ResponseHeader;
}

macro_rules! impl_service {
    ($request:ident => $response:ident) => {
        impl $crate::service::ServiceRequest for $request {
            type Response = $response;

            fn request_header(&self) -> &$crate::header::RequestHeader {
                &self.request_header
            }

            fn request_header_mut(&mut self) -> &mut $crate::header::RequestHeader {
                &mut self.request_header
            }
        }

        impl $crate::service::ServiceResponse for $response {
            fn response_header(&self) -> &$crate::header::ResponseHeader {
                &self.response_header
            }
        }
    };
}

pub(crate) use impl_service;

impl ServiceResponse for ServiceFault {
    fn response_header(&self) -> &ResponseHeader {
        &self.response_header
    }
}

/// Encode a structure prefixed with its binary encoding id
pub fn encode_message<T: Structure>(value: &T) -> UaResult<Vec<u8>> {
    let mut encoder = BinaryEncoder::new();
    T::BINARY_ENCODING_ID.encode(&mut encoder)?;
    value.encode(&mut encoder)?;
    Ok(encoder.into_bytes())
}

/// Binary encoding id at the start of a message body
pub fn peek_type_id(body: &[u8], options: DecodingOptions) -> UaResult<NodeId> {
    let mut decoder = BinaryDecoder::new(body, options);
    NodeId::decode(&mut decoder)
}

/// Decode a message body that must carry `T`
///
/// # Errors
/// `BadUnknownResponse` when the body carries another type, a decoding error
/// when the structure is malformed or followed by extra bytes.
pub fn decode_message<T: Structure>(body: &[u8], options: DecodingOptions) -> UaResult<T> {
    let mut decoder = BinaryDecoder::new(body, options);
    let type_id = NodeId::decode(&mut decoder)?;
    if type_id != T::BINARY_ENCODING_ID {
        return Err(UaError::Decoding {
            status: StatusCode::BAD_UNKNOWN_RESPONSE,
            message: format!("Expected {}, received {}", T::BINARY_ENCODING_ID, type_id),
        });
    }
    let value = T::decode(&mut decoder)?;
    decoder.expect_end()?;
    Ok(value)
}

/// Decode the response to a request
///
/// A ServiceFault, or a response whose service result is bad, becomes
/// `UaError::ServiceFault` with the reported status.
pub fn decode_response<R: ServiceResponse>(body: &[u8], options: DecodingOptions) -> UaResult<R> {
    if peek_type_id(body, options)? == ServiceFault::BINARY_ENCODING_ID {
        let fault: ServiceFault = decode_message(body, options)?;
        let status = fault.response_header.service_result;
        log::debug!("ServiceFault {} for handle {}", status, fault.response_header.request_handle);
        return Err(UaError::ServiceFault(if status.is_bad() {
            status
        } else {
            StatusCode::BAD_UNEXPECTED_ERROR
        }));
    }
    let response: R = decode_message(body, options)?;
    let status = response.response_header().service_result;
    if status.is_bad() {
        return Err(UaError::ServiceFault(status));
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{CloseSessionRequest, CloseSessionResponse};

    #[test]
    fn test_message_carries_encoding_id() {
        let request = CloseSessionRequest {
            request_header: RequestHeader::new(NodeId::numeric(1, 5), 3, 1000),
            delete_subscriptions: true,
        };
        let body = encode_message(&request).unwrap();
        assert_eq!(&body[..4], &[0x01, 0x00, 0xD9, 0x01]);
        assert_eq!(peek_type_id(&body, DecodingOptions::default()).unwrap(), NodeId::numeric(0, 473));
        let decoded: CloseSessionRequest = decode_message(&body, DecodingOptions::default()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_service_fault_becomes_error() {
        let body = encode_message(&ServiceFault::new(3, StatusCode::BAD_SESSION_ID_INVALID)).unwrap();
        let err = decode_response::<CloseSessionResponse>(&body, DecodingOptions::default()).unwrap_err();
        assert!(matches!(err, UaError::ServiceFault(s) if s == StatusCode::BAD_SESSION_ID_INVALID));
    }

    #[test]
    fn test_bad_service_result_becomes_error() {
        let response = CloseSessionResponse {
            response_header: ResponseHeader::with_result(1, StatusCode::BAD_TOO_MANY_OPERATIONS),
        };
        let body = encode_message(&response).unwrap();
        let err = decode_response::<CloseSessionResponse>(&body, DecodingOptions::default()).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_TOO_MANY_OPERATIONS);
    }

    #[test]
    fn test_unexpected_response_type() {
        let body = encode_message(&CloseSessionRequest::default()).unwrap();
        let err = decode_response::<CloseSessionResponse>(&body, DecodingOptions::default()).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_UNKNOWN_RESPONSE);
    }
}
