//! UA-TCP message header

use opcua_binary::{BinaryDecoder, BinaryEncoder};
use opcua_core::{StatusCode, UaError, UaResult};
use std::fmt;

/// Size of the common message header
pub const MESSAGE_HEADER_SIZE: usize = 8;
/// Size of the header of secure messages (common header + secure channel id)
pub const SECURE_MESSAGE_HEADER_SIZE: usize = 12;

/// Message type carried in the first three header bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Hello,
    Acknowledge,
    Error,
    ReverseHello,
    OpenSecureChannel,
    CloseSecureChannel,
    Message,
}

impl MessageType {
    pub fn as_bytes(&self) -> &'static [u8; 3] {
        match self {
            MessageType::Hello => b"HEL",
            MessageType::Acknowledge => b"ACK",
            MessageType::Error => b"ERR",
            MessageType::ReverseHello => b"RHE",
            MessageType::OpenSecureChannel => b"OPN",
            MessageType::CloseSecureChannel => b"CLO",
            MessageType::Message => b"MSG",
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> UaResult<Self> {
        Ok(match bytes {
            b"HEL" => MessageType::Hello,
            b"ACK" => MessageType::Acknowledge,
            b"ERR" => MessageType::Error,
            b"RHE" => MessageType::ReverseHello,
            b"OPN" => MessageType::OpenSecureChannel,
            b"CLO" => MessageType::CloseSecureChannel,
            b"MSG" => MessageType::Message,
            _ => {
                return Err(UaError::protocol(
                    StatusCode::BAD_TCP_MESSAGE_TYPE_INVALID,
                    format!("Unknown message type {:02X?}", bytes),
                ));
            }
        })
    }

    /// OPN, CLO and MSG travel inside a secure channel
    pub fn is_secure(&self) -> bool {
        matches!(
            self,
            MessageType::OpenSecureChannel | MessageType::CloseSecureChannel | MessageType::Message
        )
    }

    /// OPN uses the asymmetric security header
    pub fn is_asymmetric(&self) -> bool {
        *self == MessageType::OpenSecureChannel
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(std::str::from_utf8(self.as_bytes()).unwrap_or("???"))
    }
}

/// Chunk type carried in the fourth header byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkType {
    /// `F`: final chunk of a message
    Final,
    /// `C`: intermediate chunk
    Intermediate,
    /// `A`: the sender abandoned the message
    Abort,
}

impl ChunkType {
    pub fn as_byte(&self) -> u8 {
        match self {
            ChunkType::Final => b'F',
            ChunkType::Intermediate => b'C',
            ChunkType::Abort => b'A',
        }
    }

    pub fn from_byte(byte: u8) -> UaResult<Self> {
        match byte {
            b'F' => Ok(ChunkType::Final),
            b'C' => Ok(ChunkType::Intermediate),
            b'A' => Ok(ChunkType::Abort),
            _ => Err(UaError::protocol(
                StatusCode::BAD_TCP_MESSAGE_TYPE_INVALID,
                format!("Unknown chunk type 0x{:02X}", byte),
            )),
        }
    }
}

/// Common 8-byte header of every UA-TCP message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub message_type: MessageType,
    pub chunk_type: ChunkType,
    /// Total size of the message including this header
    pub message_size: u32,
}

impl MessageHeader {
    pub fn new(message_type: MessageType, chunk_type: ChunkType, message_size: u32) -> Self {
        Self {
            message_type,
            chunk_type,
            message_size,
        }
    }

    pub fn encode(&self, encoder: &mut BinaryEncoder) {
        encoder.write_raw(self.message_type.as_bytes());
        encoder.write_u8(self.chunk_type.as_byte());
        encoder.write_u32(self.message_size);
    }

    pub fn decode(decoder: &mut BinaryDecoder<'_>) -> UaResult<Self> {
        let message_type = MessageType::from_bytes(decoder.read_bytes(3)?)?;
        let chunk_type = ChunkType::from_byte(decoder.read_u8()?)?;
        let message_size = decoder.read_u32()?;
        if (message_size as usize) < MESSAGE_HEADER_SIZE {
            return Err(UaError::protocol(
                StatusCode::BAD_TCP_MESSAGE_TYPE_INVALID,
                format!("Message size {} smaller than its header", message_size),
            ));
        }
        Ok(Self {
            message_type,
            chunk_type,
            message_size,
        })
    }

    /// Decode from the first 8 bytes of `bytes`
    pub fn from_slice(bytes: &[u8]) -> UaResult<Self> {
        let mut decoder = BinaryDecoder::new(bytes, opcua_binary::DecodingOptions::unlimited());
        Self::decode(&mut decoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let mut encoder = BinaryEncoder::new();
        MessageHeader::new(MessageType::Message, ChunkType::Intermediate, 0x0102).encode(&mut encoder);
        assert_eq!(encoder.as_slice(), b"MSGC\x02\x01\x00\x00");
        let header = MessageHeader::from_slice(encoder.as_slice()).unwrap();
        assert_eq!(header.message_type, MessageType::Message);
        assert_eq!(header.chunk_type, ChunkType::Intermediate);
        assert_eq!(header.message_size, 0x0102);
    }

    #[test]
    fn test_invalid_header() {
        assert!(MessageHeader::from_slice(b"XYZF\x10\x00\x00\x00").is_err());
        assert!(MessageHeader::from_slice(b"MSGX\x10\x00\x00\x00").is_err());
        assert!(MessageHeader::from_slice(b"MSGF\x04\x00\x00\x00").is_err());
    }

    #[test]
    fn test_secure_types() {
        assert!(MessageType::OpenSecureChannel.is_asymmetric());
        assert!(MessageType::CloseSecureChannel.is_secure());
        assert!(!MessageType::Hello.is_secure());
        assert_eq!(MessageType::ReverseHello.to_string(), "RHE");
    }
}
