//! UA-TCP framing and secure conversation
//!
//! This crate covers everything between the byte stream and a service
//! message body:
//!
//! - the Hello/Acknowledge handshake and the negotiated transport limits
//! - reading and writing whole UA-TCP messages
//! - securing chunks (sequence numbers, signing, encryption, padding)
//! - splitting outbound messages and reassembling inbound ones

pub mod assembler;
pub mod chunker;
pub mod frame;
pub mod header;
pub mod hello;
pub mod secure_context;
pub mod security_header;

pub use assembler::{AssembledMessage, AssemblyOutcome, MessageAssembler};
pub use chunker::Chunker;
pub use frame::{is_end_of_stream, read_frame, write_frame, Frame, MessageChunk};
pub use header::{ChunkType, MessageHeader, MessageType, MESSAGE_HEADER_SIZE, SECURE_MESSAGE_HEADER_SIZE};
pub use hello::{
    decode_handshake, encode_handshake, AcknowledgeMessage, ErrorMessage, HelloMessage, ReverseHelloMessage,
    TransportLimits, MIN_BUFFER_SIZE, PROTOCOL_VERSION,
};
pub use secure_context::{OpenedChunk, Role, SecureContext, SecurityToken, SEQUENCE_WRAP_THRESHOLD};
pub use security_header::{AsymmetricSecurityHeader, SequenceHeader, SymmetricSecurityHeader};
