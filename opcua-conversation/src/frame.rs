//! Reading whole UA-TCP messages from a byte stream

use crate::header::{MessageHeader, MessageType, MESSAGE_HEADER_SIZE, SECURE_MESSAGE_HEADER_SIZE};
use crate::hello::{decode_handshake, AcknowledgeMessage, ErrorMessage, HelloMessage, ReverseHelloMessage};
use opcua_binary::DecodingOptions;
use opcua_core::{StatusCode, UaError, UaResult};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// One raw secure chunk (OPN, CLO or MSG) as received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageChunk {
    pub header: MessageHeader,
    pub secure_channel_id: u32,
    /// Complete chunk including the message header
    pub data: Vec<u8>,
}

impl MessageChunk {
    /// Wrap raw chunk bytes
    pub fn from_bytes(data: Vec<u8>) -> UaResult<Self> {
        let header = MessageHeader::from_slice(&data)?;
        if !header.message_type.is_secure() {
            return Err(UaError::protocol(
                StatusCode::BAD_TCP_MESSAGE_TYPE_INVALID,
                format!("{} is not a secure chunk", header.message_type),
            ));
        }
        if data.len() < SECURE_MESSAGE_HEADER_SIZE || header.message_size as usize != data.len() {
            return Err(UaError::protocol(
                StatusCode::BAD_TCP_MESSAGE_TYPE_INVALID,
                format!("Chunk size {} does not match header size {}", data.len(), header.message_size),
            ));
        }
        let secure_channel_id = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
        Ok(Self {
            header,
            secure_channel_id,
            data,
        })
    }
}

/// A complete message read from the transport
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Hello(HelloMessage),
    Acknowledge(AcknowledgeMessage),
    Error(ErrorMessage),
    ReverseHello(ReverseHelloMessage),
    Chunk(MessageChunk),
}

/// Read the next message from `reader`
///
/// # Errors
/// - `UaError::Connection` with `UnexpectedEof` when the peer closed the stream
/// - `BadTcpMessageTooLarge` when the announced size exceeds `max_size`
/// - decoding errors for malformed handshake bodies
pub async fn read_frame<R>(reader: &mut R, max_size: usize) -> UaResult<Frame>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header_bytes = [0u8; MESSAGE_HEADER_SIZE];
    reader.read_exact(&mut header_bytes).await?;
    let header = MessageHeader::from_slice(&header_bytes)?;
    let size = header.message_size as usize;
    if max_size > 0 && size > max_size {
        return Err(UaError::protocol(
            StatusCode::BAD_TCP_MESSAGE_TOO_LARGE,
            format!("Message of {} bytes exceeds receive buffer {}", size, max_size),
        ));
    }

    let mut data = vec![0u8; size];
    data[..MESSAGE_HEADER_SIZE].copy_from_slice(&header_bytes);
    reader.read_exact(&mut data[MESSAGE_HEADER_SIZE..]).await?;

    let options = DecodingOptions::default();
    Ok(match header.message_type {
        MessageType::Hello => Frame::Hello(decode_handshake(&data, options)?),
        MessageType::Acknowledge => Frame::Acknowledge(decode_handshake(&data, options)?),
        MessageType::Error => Frame::Error(decode_handshake(&data, options)?),
        MessageType::ReverseHello => Frame::ReverseHello(decode_handshake(&data, options)?),
        _ => Frame::Chunk(MessageChunk::from_bytes(data)?),
    })
}

/// Write a complete message and flush
pub async fn write_frame<W>(writer: &mut W, data: &[u8]) -> UaResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Whether an error means the peer closed the connection
pub fn is_end_of_stream(error: &UaError) -> bool {
    matches!(error, UaError::Connection(e) if e.kind() == io::ErrorKind::UnexpectedEof)
}
