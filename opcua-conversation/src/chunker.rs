//! Splitting outbound messages into secured chunks

use crate::header::{ChunkType, MessageType};
use crate::hello::TransportLimits;
use crate::secure_context::SecureContext;
use opcua_binary::{BinaryEncodable, BinaryEncoder};
use opcua_core::{StatusCode, UaError, UaResult, UaString};

/// Builds the chunk sequence of one message
pub struct Chunker;

impl Chunker {
    /// Split `body` into secured chunks within the negotiated limits
    ///
    /// # Errors
    /// - `BadTcpMessageTooLarge` when the body exceeds the peer's message size
    /// - `BadEncodingLimitsExceeded` when more chunks than the peer accepts
    ///   would be needed
    pub fn encode(
        context: &mut SecureContext,
        limits: &TransportLimits,
        message_type: MessageType,
        request_id: u32,
        body: &[u8],
    ) -> UaResult<Vec<Vec<u8>>> {
        let max_message = limits.max_send_message_size as usize;
        if max_message > 0 && body.len() > max_message {
            return Err(UaError::encoding_limit(
                StatusCode::BAD_TCP_MESSAGE_TOO_LARGE,
                format!("Message of {} bytes exceeds peer limit {}", body.len(), max_message),
            ));
        }

        let max_body = context.max_body_size(message_type, limits.send_buffer_size as usize)?;
        let count = body.len().div_ceil(max_body).max(1);
        let max_chunks = limits.max_send_chunk_count as usize;
        if max_chunks > 0 && count > max_chunks {
            return Err(UaError::encoding_limit(
                StatusCode::BAD_ENCODING_LIMITS_EXCEEDED,
                format!("Message needs {} chunks, peer accepts {}", count, max_chunks),
            ));
        }

        let mut chunks = Vec::with_capacity(count);
        for index in 0..count {
            let start = index * max_body;
            let end = (start + max_body).min(body.len());
            let chunk_type = if index + 1 == count { ChunkType::Final } else { ChunkType::Intermediate };
            chunks.push(context.secure_chunk(message_type, chunk_type, request_id, &body[start..end])?);
        }
        log::trace!("{} request {} split into {} chunks", message_type, request_id, count);
        Ok(chunks)
    }

    /// Build an abort chunk carrying `status` and `reason`
    pub fn abort(
        context: &mut SecureContext,
        message_type: MessageType,
        request_id: u32,
        status: StatusCode,
        reason: &str,
    ) -> UaResult<Vec<u8>> {
        let mut encoder = BinaryEncoder::new();
        status.encode(&mut encoder)?;
        UaString::from(reason).encode(&mut encoder)?;
        context.secure_chunk(message_type, ChunkType::Abort, request_id, encoder.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MessageChunk;
    use crate::secure_context::{Role, SecurityToken};
    use opcua_core::DateTime;
    use opcua_security::{MessageSecurityMode, SecurityPolicy};

    fn context() -> SecureContext {
        let mut context = SecureContext::new(Role::Client, SecurityPolicy::None, MessageSecurityMode::None).unwrap();
        context
            .install_token(SecurityToken::new(3, 1, DateTime::now(), 60_000), &[])
            .unwrap();
        context
    }

    fn limits(chunk_count: u32, message_size: u32) -> TransportLimits {
        TransportLimits {
            send_buffer_size: 8192,
            receive_buffer_size: 8192,
            max_send_message_size: message_size,
            max_receive_message_size: 0,
            max_send_chunk_count: chunk_count,
            max_receive_chunk_count: 0,
        }
    }

    #[test]
    fn test_split_into_chunks() {
        let mut context = context();
        let body = vec![7u8; 20_000];
        let chunks = Chunker::encode(&mut context, &limits(0, 0), MessageType::Message, 5, &body).unwrap();
        assert_eq!(chunks.len(), 3);
        let types: Vec<u8> = chunks.iter().map(|c| c[3]).collect();
        assert_eq!(types, vec![b'C', b'C', b'F']);
        assert!(chunks.iter().all(|c| c.len() <= 8192));
        let total: usize = chunks
            .iter()
            .map(|c| MessageChunk::from_bytes(c.clone()).unwrap().data.len() - 24)
            .sum();
        assert_eq!(total, body.len());
    }

    #[test]
    fn test_empty_body_is_one_chunk() {
        let mut context = context();
        let chunks = Chunker::encode(&mut context, &limits(0, 0), MessageType::Message, 1, &[]).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0][3], b'F');
    }

    #[test]
    fn test_limits_enforced() {
        let mut context = context();
        let body = vec![0u8; 20_000];
        let err = Chunker::encode(&mut context, &limits(2, 0), MessageType::Message, 1, &body).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_ENCODING_LIMITS_EXCEEDED);
        let err = Chunker::encode(&mut context, &limits(0, 10_000), MessageType::Message, 1, &body).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_TCP_MESSAGE_TOO_LARGE);
    }

    #[test]
    fn test_abort_chunk() {
        let mut context = context();
        let chunk = Chunker::abort(&mut context, MessageType::Message, 9, StatusCode::BAD_TIMEOUT, "gave up").unwrap();
        assert_eq!(chunk[3], b'A');
    }
}
