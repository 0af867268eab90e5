//! Connection handshake messages: Hello, Acknowledge, Error and ReverseHello

use crate::header::{ChunkType, MessageHeader, MessageType, MESSAGE_HEADER_SIZE};
use opcua_binary::{impl_encodable_struct, BinaryDecoder, BinaryEncodable, BinaryEncoder, DecodingOptions};
use opcua_core::{StatusCode, UaError, UaResult, UaString};

/// Smallest buffer size a peer may announce
pub const MIN_BUFFER_SIZE: u32 = 8192;
/// UA-TCP protocol version
pub const PROTOCOL_VERSION: u32 = 0;

/// HEL body
#[derive(Debug, Clone, PartialEq)]
pub struct HelloMessage {
    pub protocol_version: u32,
    pub receive_buffer_size: u32,
    pub send_buffer_size: u32,
    pub max_message_size: u32,
    pub max_chunk_count: u32,
    pub endpoint_url: UaString,
}

impl_encodable_struct!(HelloMessage {
    protocol_version,
    receive_buffer_size,
    send_buffer_size,
    max_message_size,
    max_chunk_count,
    endpoint_url,
});

/// ACK body
#[derive(Debug, Clone, PartialEq)]
pub struct AcknowledgeMessage {
    pub protocol_version: u32,
    pub receive_buffer_size: u32,
    pub send_buffer_size: u32,
    pub max_message_size: u32,
    pub max_chunk_count: u32,
}

impl_encodable_struct!(AcknowledgeMessage {
    protocol_version,
    receive_buffer_size,
    send_buffer_size,
    max_message_size,
    max_chunk_count,
});

/// ERR body
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorMessage {
    pub error: StatusCode,
    pub reason: UaString,
}

impl_encodable_struct!(ErrorMessage { error, reason });

impl ErrorMessage {
    pub fn new(error: StatusCode, reason: &str) -> Self {
        Self {
            error,
            reason: UaString::from(reason),
        }
    }

    /// Convert into the error surfaced to callers
    pub fn into_error(self) -> UaError {
        UaError::RemoteError {
            status: self.error,
            reason: self.reason.as_ref_or_empty().to_string(),
        }
    }
}

/// RHE body, sent by servers that dial out to the client
#[derive(Debug, Clone, PartialEq)]
pub struct ReverseHelloMessage {
    pub server_uri: UaString,
    pub endpoint_url: UaString,
}

impl_encodable_struct!(ReverseHelloMessage { server_uri, endpoint_url });

/// Encode a single-chunk handshake message with its header
pub fn encode_handshake<T: BinaryEncodable>(message_type: MessageType, body: &T) -> UaResult<Vec<u8>> {
    let mut encoder = BinaryEncoder::new();
    MessageHeader::new(message_type, ChunkType::Final, 0).encode(&mut encoder);
    body.encode(&mut encoder)?;
    let size = u32::try_from(encoder.len())
        .map_err(|_| UaError::encoding("Handshake message too large"))?;
    encoder.patch_u32(4, size)?;
    Ok(encoder.into_bytes())
}

/// Decode a handshake body that follows an 8-byte header
pub fn decode_handshake<T: BinaryEncodable>(message: &[u8], options: DecodingOptions) -> UaResult<T> {
    let body = message.get(MESSAGE_HEADER_SIZE..).ok_or_else(|| UaError::decoding("Truncated handshake message"))?;
    let mut decoder = BinaryDecoder::new(body, options);
    T::decode(&mut decoder)
}

/// Buffer sizes and limits in force after the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportLimits {
    /// Largest chunk this side may send
    pub send_buffer_size: u32,
    /// Largest chunk this side accepts
    pub receive_buffer_size: u32,
    /// Largest message the peer accepts, 0 = unlimited
    pub max_send_message_size: u32,
    /// Largest message this side accepts, 0 = unlimited
    pub max_receive_message_size: u32,
    /// Most chunks the peer accepts per message, 0 = unlimited
    pub max_send_chunk_count: u32,
    /// Most chunks this side accepts per message, 0 = unlimited
    pub max_receive_chunk_count: u32,
}

impl TransportLimits {
    /// Limits before any negotiation took place
    pub fn from_hello(hello: &HelloMessage) -> Self {
        Self {
            send_buffer_size: hello.send_buffer_size,
            receive_buffer_size: hello.receive_buffer_size,
            max_send_message_size: hello.max_message_size,
            max_receive_message_size: hello.max_message_size,
            max_send_chunk_count: hello.max_chunk_count,
            max_receive_chunk_count: hello.max_chunk_count,
        }
    }

    /// Revise the client's limits with the server's acknowledge
    ///
    /// Buffer sizes become the smaller of both sides; message size and chunk
    /// count limits of the peer apply to what we send.
    ///
    /// # Errors
    /// Returns a protocol error when the server announces buffers below the
    /// 8192 byte minimum or larger than the client offered.
    pub fn negotiate(hello: &HelloMessage, ack: &AcknowledgeMessage) -> UaResult<Self> {
        if ack.receive_buffer_size < MIN_BUFFER_SIZE || ack.send_buffer_size < MIN_BUFFER_SIZE {
            return Err(UaError::protocol(
                StatusCode::BAD_CONNECTION_REJECTED,
                format!(
                    "Acknowledged buffer sizes {}/{} below minimum {}",
                    ack.receive_buffer_size, ack.send_buffer_size, MIN_BUFFER_SIZE
                ),
            ));
        }
        if ack.send_buffer_size > hello.receive_buffer_size {
            return Err(UaError::protocol(
                StatusCode::BAD_CONNECTION_REJECTED,
                format!(
                    "Server send buffer {} exceeds offered receive buffer {}",
                    ack.send_buffer_size, hello.receive_buffer_size
                ),
            ));
        }
        Ok(Self {
            send_buffer_size: hello.send_buffer_size.min(ack.receive_buffer_size),
            receive_buffer_size: hello.receive_buffer_size.min(ack.send_buffer_size),
            max_send_message_size: ack.max_message_size,
            max_receive_message_size: hello.max_message_size,
            max_send_chunk_count: ack.max_chunk_count,
            max_receive_chunk_count: hello.max_chunk_count,
        })
    }
}
