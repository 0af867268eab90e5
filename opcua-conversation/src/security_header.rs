//! Security and sequence headers of secure chunks

use opcua_binary::{impl_encodable_struct, BinaryEncodable, BinaryEncoder};
use opcua_core::{ByteString, UaResult, UaString};

/// Header of OPN chunks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsymmetricSecurityHeader {
    pub security_policy_uri: UaString,
    /// DER certificate of the sender, null with policy None
    pub sender_certificate: ByteString,
    /// SHA-1 thumbprint of the receiver's certificate, null with policy None
    pub receiver_certificate_thumbprint: ByteString,
}

impl_encodable_struct!(AsymmetricSecurityHeader {
    security_policy_uri,
    sender_certificate,
    receiver_certificate_thumbprint,
});

impl AsymmetricSecurityHeader {
    /// Encoded length of the header
    pub fn byte_len(&self) -> UaResult<usize> {
        let mut encoder = BinaryEncoder::new();
        self.encode(&mut encoder)?;
        Ok(encoder.len())
    }
}

/// Header of CLO and MSG chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymmetricSecurityHeader {
    pub token_id: u32,
}

impl_encodable_struct!(SymmetricSecurityHeader { token_id });

/// Size of an encoded symmetric security header
pub const SYMMETRIC_SECURITY_HEADER_SIZE: usize = 4;

/// Sequence header preceding the body of every secure chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceHeader {
    pub sequence_number: u32,
    pub request_id: u32,
}

impl_encodable_struct!(SequenceHeader {
    sequence_number,
    request_id,
});

/// Size of an encoded sequence header
pub const SEQUENCE_HEADER_SIZE: usize = 8;
