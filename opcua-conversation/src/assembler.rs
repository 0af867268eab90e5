//! Reassembly of inbound chunks into messages
//!
//! Chunks are collected per request id. A request that breaks the receive
//! limits is rejected once and its remaining chunks are dropped until the
//! final one arrives, so one oversized response never affects other requests.
//! Chunks that trail an abort are dropped the same way.

use crate::header::{ChunkType, MessageType};
use crate::secure_context::OpenedChunk;
use opcua_binary::{BinaryDecoder, BinaryEncodable, DecodingOptions};
use opcua_core::{StatusCode, UaError, UaResult, UaString};
use std::collections::{HashMap, VecDeque};

/// Aborted request ids remembered for dropping trailing chunks
const ABORTED_HISTORY: usize = 64;

/// A complete message body
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledMessage {
    pub message_type: MessageType,
    pub request_id: u32,
    pub body: Vec<u8>,
}

/// What a pushed chunk produced
#[derive(Debug)]
pub enum AssemblyOutcome {
    /// More chunks are needed
    Incomplete,
    Complete(AssembledMessage),
    /// The sender aborted the message
    Aborted {
        request_id: u32,
        status: StatusCode,
        reason: String,
    },
    /// The message broke a receive limit and is being discarded
    Rejected { request_id: u32, error: UaError },
}

#[derive(Debug)]
struct PartialMessage {
    message_type: MessageType,
    chunk_count: usize,
    body: Vec<u8>,
    discarding: bool,
}

/// Collects chunks into complete messages
#[derive(Debug)]
pub struct MessageAssembler {
    partial: HashMap<u32, PartialMessage>,
    aborted: VecDeque<u32>,
    max_message_size: usize,
    max_chunk_count: usize,
    options: DecodingOptions,
}

impl MessageAssembler {
    /// Assembler enforcing the given limits, 0 meaning unlimited
    pub fn new(max_message_size: usize, max_chunk_count: usize) -> Self {
        Self {
            partial: HashMap::new(),
            aborted: VecDeque::new(),
            max_message_size,
            max_chunk_count,
            options: DecodingOptions::default(),
        }
    }

    /// Number of requests with chunks outstanding
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    /// Forget all partial messages
    pub fn clear(&mut self) {
        self.partial.clear();
        self.aborted.clear();
    }

    fn remember_abort(&mut self, request_id: u32) {
        if self.aborted.contains(&request_id) {
            return;
        }
        if self.aborted.len() == ABORTED_HISTORY {
            self.aborted.pop_front();
        }
        self.aborted.push_back(request_id);
    }

    /// Drop a chunk of an aborted message; true when it was dropped
    fn drop_after_abort(&mut self, request_id: u32, is_final: bool) -> bool {
        let Some(index) = self.aborted.iter().position(|id| *id == request_id) else {
            return false;
        };
        if is_final {
            self.aborted.remove(index);
        }
        log::debug!("Dropping chunk of aborted request {}", request_id);
        true
    }

    /// Add an opened chunk
    ///
    /// # Errors
    /// Returns a protocol error when chunks of one request mix message types.
    pub fn push(&mut self, chunk: OpenedChunk) -> UaResult<AssemblyOutcome> {
        let request_id = chunk.request_id;
        if chunk.chunk_type == ChunkType::Abort {
            self.partial.remove(&request_id);
            self.remember_abort(request_id);
            let (status, reason) = self.decode_abort(&chunk.body);
            log::debug!("Request {} aborted by peer: {} {}", request_id, status, reason);
            return Ok(AssemblyOutcome::Aborted {
                request_id,
                status,
                reason,
            });
        }

        let is_final = chunk.chunk_type == ChunkType::Final;
        if self.drop_after_abort(request_id, is_final) {
            return Ok(AssemblyOutcome::Incomplete);
        }
        let partial = self.partial.entry(request_id).or_insert_with(|| PartialMessage {
            message_type: chunk.message_type,
            chunk_count: 0,
            body: Vec::new(),
            discarding: false,
        });
        if partial.message_type != chunk.message_type {
            let expected = partial.message_type;
            self.partial.remove(&request_id);
            return Err(UaError::protocol(
                StatusCode::BAD_TCP_MESSAGE_TYPE_INVALID,
                format!("{} chunk in {} message {}", chunk.message_type, expected, request_id),
            ));
        }

        if partial.discarding {
            if is_final {
                self.partial.remove(&request_id);
            }
            return Ok(AssemblyOutcome::Incomplete);
        }

        partial.chunk_count += 1;
        let size = partial.body.len() + chunk.body.len();
        let violation = if self.max_chunk_count > 0 && partial.chunk_count > self.max_chunk_count {
            Some(UaError::decoding_limit(format!(
                "Message {} exceeds {} chunks",
                request_id, self.max_chunk_count
            )))
        } else if self.max_message_size > 0 && size > self.max_message_size {
            Some(UaError::protocol(
                StatusCode::BAD_TCP_MESSAGE_TOO_LARGE,
                format!("Message {} exceeds {} bytes", request_id, self.max_message_size),
            ))
        } else {
            None
        };
        if let Some(error) = violation {
            log::warn!("Discarding message {}: {}", request_id, error);
            if is_final {
                self.partial.remove(&request_id);
            } else {
                partial.discarding = true;
                partial.body = Vec::new();
            }
            return Ok(AssemblyOutcome::Rejected { request_id, error });
        }

        partial.body.extend_from_slice(&chunk.body);
        if !is_final {
            return Ok(AssemblyOutcome::Incomplete);
        }
        match self.partial.remove(&request_id) {
            Some(done) => Ok(AssemblyOutcome::Complete(AssembledMessage {
                message_type: done.message_type,
                request_id,
                body: done.body,
            })),
            None => Ok(AssemblyOutcome::Incomplete),
        }
    }

    fn decode_abort(&self, body: &[u8]) -> (StatusCode, String) {
        let mut decoder = BinaryDecoder::new(body, self.options);
        let status = StatusCode::decode(&mut decoder).unwrap_or(StatusCode::BAD_UNEXPECTED_ERROR);
        let reason = UaString::decode(&mut decoder)
            .ok()
            .and_then(UaString::into_inner)
            .unwrap_or_default();
        (status, reason)
    }
}
