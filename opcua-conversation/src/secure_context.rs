//! Security state of one secure channel
//!
//! `SecureContext` owns everything needed to turn a message body into secured
//! chunks and back: the policy and mode, the local and remote key material,
//! the current and previous security token and the sequence counters of both
//! directions.

use crate::frame::MessageChunk;
use crate::header::{ChunkType, MessageHeader, MessageType, SECURE_MESSAGE_HEADER_SIZE};
use crate::security_header::{
    AsymmetricSecurityHeader, SequenceHeader, SymmetricSecurityHeader, SEQUENCE_HEADER_SIZE,
    SYMMETRIC_SECURITY_HEADER_SIZE,
};
use opcua_binary::{BinaryDecoder, BinaryEncodable, BinaryEncoder, DecodingOptions};
use opcua_core::{ByteString, DateTime, StatusCode, UaError, UaResult, UaString};
use opcua_security::{
    derive_channel_keys, thumbprint_of, ChannelKeys, MessageSecurityMode, PrivateKey, PublicKey, SecurityPolicy,
    SymmetricKeys,
};
use std::time::{Duration, Instant};

/// Sequence numbers above this value wrap around to a value below 1024
pub const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX - 1024;

/// RSA keys above 2048 bits need a second padding size byte
const EXTRA_PADDING_KEY_SIZE: usize = 256;

/// Which end of the channel this context belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// A security token issued by OpenSecureChannel
#[derive(Debug, Clone)]
pub struct SecurityToken {
    pub channel_id: u32,
    pub token_id: u32,
    pub created_at: DateTime,
    pub revised_lifetime: Duration,
    installed_at: Instant,
    keys: Option<ChannelKeys>,
}

impl SecurityToken {
    /// Token as reported by the server, without derived keys yet
    pub fn new(channel_id: u32, token_id: u32, created_at: DateTime, revised_lifetime_ms: u32) -> Self {
        Self {
            channel_id,
            token_id,
            created_at,
            revised_lifetime: Duration::from_millis(revised_lifetime_ms as u64),
            installed_at: Instant::now(),
            keys: None,
        }
    }

    pub fn installed_at(&self) -> Instant {
        self.installed_at
    }

    /// Whether the token's lifetime has elapsed at `now`
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.installed_at + self.revised_lifetime
    }
}

/// A chunk after verification, decryption and header removal
#[derive(Debug, Clone, PartialEq)]
pub struct OpenedChunk {
    pub message_type: MessageType,
    pub chunk_type: ChunkType,
    pub secure_channel_id: u32,
    /// Token of a symmetric chunk
    pub token_id: Option<u32>,
    /// Header of an asymmetric (OPN) chunk
    pub asymmetric_header: Option<AsymmetricSecurityHeader>,
    pub sequence_number: u32,
    pub request_id: u32,
    pub body: Vec<u8>,
}

fn security_error(message: impl Into<String>) -> UaError {
    UaError::SecurityChecksFailed(message.into())
}

fn size_u32(size: usize) -> UaResult<u32> {
    u32::try_from(size).map_err(|_| {
        UaError::encoding_limit(StatusCode::BAD_TCP_MESSAGE_TOO_LARGE, format!("Chunk of {} bytes", size))
    })
}

/// Write `padding` padding bytes preceded by the padding size byte
fn write_padding(encoder: &mut BinaryEncoder, padding: usize, extra: bool) {
    let low = (padding & 0xFF) as u8;
    encoder.write_u8(low);
    for _ in 0..padding {
        encoder.write_u8(low);
    }
    if extra {
        encoder.write_u8((padding >> 8) as u8);
    }
}

/// Length of the padding region at the end of `data`, checking its bytes
fn padding_length(data: &[u8], content_start: usize, extra: bool) -> UaResult<usize> {
    let len = data.len();
    let (padding, region) = match (extra, len) {
        (true, l) if l >= 2 => {
            let padding = ((data[l - 1] as usize) << 8) | data[l - 2] as usize;
            (padding, padding + 2)
        }
        (false, l) if l >= 1 => {
            let padding = data[l - 1] as usize;
            (padding, padding + 1)
        }
        _ => return Err(security_error("Chunk too short for padding")),
    };
    if region > len.saturating_sub(content_start) {
        return Err(security_error(format!("Padding of {} bytes exceeds chunk", padding)));
    }
    let low = (padding & 0xFF) as u8;
    let pad_end = if extra { len - 1 } else { len };
    if data[len - region..pad_end].iter().any(|b| *b != low) {
        return Err(security_error("Invalid padding bytes"));
    }
    Ok(region)
}

/// Security state of a secure channel
#[derive(Debug)]
pub struct SecureContext {
    role: Role,
    policy: SecurityPolicy,
    mode: MessageSecurityMode,
    local_certificate: Option<Vec<u8>>,
    local_key: Option<PrivateKey>,
    remote_certificate: Option<Vec<u8>>,
    remote_key: Option<PublicKey>,
    local_nonce: Vec<u8>,
    channel_id: u32,
    current: Option<SecurityToken>,
    previous: Option<SecurityToken>,
    send_sequence: u32,
    last_received_sequence: Option<u32>,
    decoding_options: DecodingOptions,
}

impl SecureContext {
    /// Create a context for `policy` and `mode`
    ///
    /// # Errors
    /// Returns `BadSecurityPolicyRejected` when the mode does not fit the
    /// policy (None must go with None).
    pub fn new(role: Role, policy: SecurityPolicy, mode: MessageSecurityMode) -> UaResult<Self> {
        let consistent = match mode {
            MessageSecurityMode::Invalid => false,
            MessageSecurityMode::None => policy.is_none(),
            MessageSecurityMode::Sign | MessageSecurityMode::SignAndEncrypt => !policy.is_none(),
        };
        if !consistent {
            return Err(UaError::protocol(
                StatusCode::BAD_SECURITY_POLICY_REJECTED,
                format!("Security mode {} is not valid with {}", mode, policy),
            ));
        }
        Ok(Self {
            role,
            policy,
            mode,
            local_certificate: None,
            local_key: None,
            remote_certificate: None,
            remote_key: None,
            local_nonce: Vec::new(),
            channel_id: 0,
            current: None,
            previous: None,
            send_sequence: 1,
            last_received_sequence: None,
            decoding_options: DecodingOptions::default(),
        })
    }

    /// Set the local certificate (DER) and private key
    pub fn set_local_identity(&mut self, certificate: Vec<u8>, key: PrivateKey) {
        self.local_certificate = Some(certificate);
        self.local_key = Some(key);
    }

    /// Set the remote certificate (DER) and its public key
    pub fn set_remote(&mut self, certificate: Vec<u8>, key: PublicKey) {
        self.remote_certificate = Some(certificate);
        self.remote_key = Some(key);
    }

    pub fn set_decoding_options(&mut self, options: DecodingOptions) {
        self.decoding_options = options;
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn policy(&self) -> SecurityPolicy {
        self.policy
    }

    pub fn mode(&self) -> MessageSecurityMode {
        self.mode
    }

    pub fn channel_id(&self) -> u32 {
        self.channel_id
    }

    /// Nonce sent in the last OpenSecureChannel request
    pub fn local_nonce(&self) -> &[u8] {
        &self.local_nonce
    }

    pub fn set_local_nonce(&mut self, nonce: Vec<u8>) {
        self.local_nonce = nonce;
    }

    /// Token used for outbound traffic
    pub fn current_token(&self) -> Option<&SecurityToken> {
        self.current.as_ref()
    }

    pub fn previous_token(&self) -> Option<&SecurityToken> {
        self.previous.as_ref()
    }

    /// Install a newly issued token, keeping the old one for inbound traffic
    ///
    /// Keys are derived from the local nonce and `remote_nonce` according to
    /// the role of this context.
    pub fn install_token(&mut self, mut token: SecurityToken, remote_nonce: &[u8]) -> UaResult<()> {
        if !self.policy.is_none() {
            let keys = match self.role {
                Role::Client => derive_channel_keys(self.policy, &self.local_nonce, remote_nonce)?,
                Role::Server => derive_channel_keys(self.policy, remote_nonce, &self.local_nonce)?,
            };
            token.keys = Some(keys);
        }
        if self.channel_id != 0 && token.channel_id != self.channel_id {
            return Err(UaError::protocol(
                StatusCode::BAD_SECURE_CHANNEL_ID_INVALID,
                format!("Token for channel {} on channel {}", token.channel_id, self.channel_id),
            ));
        }
        self.channel_id = token.channel_id;
        log::debug!(
            "Installing token {} on channel {} (lifetime {:?})",
            token.token_id,
            token.channel_id,
            token.revised_lifetime
        );
        self.previous = self.current.replace(token);
        Ok(())
    }

    /// Drop the previous token once its lifetime has elapsed
    pub fn expire_previous_token(&mut self, now: Instant) {
        if self.previous.as_ref().is_some_and(|t| t.is_expired(now)) {
            if let Some(token) = self.previous.take() {
                log::debug!("Previous token {} expired", token.token_id);
            }
        }
    }

    /// Next outbound sequence number
    pub fn next_sequence_number(&mut self) -> u32 {
        let value = self.send_sequence;
        self.send_sequence = if value >= SEQUENCE_WRAP_THRESHOLD { 1 } else { value + 1 };
        value
    }

    fn check_sequence_number(&mut self, sequence_number: u32) -> UaResult<()> {
        if let Some(last) = self.last_received_sequence {
            let wrapped = last >= SEQUENCE_WRAP_THRESHOLD && sequence_number < 1024;
            if sequence_number != last.wrapping_add(1) && !wrapped {
                return Err(UaError::protocol(
                    StatusCode::BAD_SEQUENCE_NUMBER_INVALID,
                    format!("Sequence number {} after {}", sequence_number, last),
                ));
            }
        }
        self.last_received_sequence = Some(sequence_number);
        Ok(())
    }

    fn keys_for(&self, token: &SecurityToken, outbound: bool) -> UaResult<SymmetricKeys> {
        let keys = token
            .keys
            .as_ref()
            .ok_or_else(|| security_error(format!("Token {} has no keys", token.token_id)))?;
        let client_side = (self.role == Role::Client) == outbound;
        Ok(if client_side { keys.client.clone() } else { keys.server.clone() })
    }

    fn asymmetric_header(&self) -> UaResult<AsymmetricSecurityHeader> {
        if self.policy.is_none() {
            return Ok(AsymmetricSecurityHeader {
                security_policy_uri: UaString::from(self.policy.uri()),
                sender_certificate: ByteString::null(),
                receiver_certificate_thumbprint: ByteString::null(),
            });
        }
        let local = self
            .local_certificate
            .as_ref()
            .ok_or_else(|| security_error("No local certificate for asymmetric security"))?;
        let remote = self
            .remote_certificate
            .as_ref()
            .ok_or_else(|| security_error("No remote certificate for asymmetric security"))?;
        Ok(AsymmetricSecurityHeader {
            security_policy_uri: UaString::from(self.policy.uri()),
            sender_certificate: ByteString::from(local.clone()),
            receiver_certificate_thumbprint: ByteString::from(thumbprint_of(remote).to_vec()),
        })
    }

    fn asymmetric_keys(&self) -> UaResult<(&PrivateKey, &PublicKey)> {
        let local = self
            .local_key
            .as_ref()
            .ok_or_else(|| security_error("No local private key for asymmetric security"))?;
        let remote = self
            .remote_key
            .as_ref()
            .ok_or_else(|| security_error("No remote public key for asymmetric security"))?;
        Ok((local, remote))
    }

    /// Largest body that fits in one chunk of `chunk_size` bytes
    pub fn max_body_size(&self, message_type: MessageType, chunk_size: usize) -> UaResult<usize> {
        let body = if message_type.is_asymmetric() {
            let prefix = SECURE_MESSAGE_HEADER_SIZE + self.asymmetric_header()?.byte_len()?;
            let available = chunk_size.saturating_sub(prefix);
            if self.policy.is_none() {
                available.saturating_sub(SEQUENCE_HEADER_SIZE)
            } else {
                let (local, remote) = self.asymmetric_keys()?;
                let extra = (remote.size() > EXTRA_PADDING_KEY_SIZE) as usize;
                let plain = available / remote.size() * remote.plain_block_size();
                plain.saturating_sub(SEQUENCE_HEADER_SIZE + local.size() + 1 + extra)
            }
        } else {
            let available = chunk_size.saturating_sub(SECURE_MESSAGE_HEADER_SIZE + SYMMETRIC_SECURITY_HEADER_SIZE);
            let signature = if self.mode.signs() { self.policy.symmetric_signature_size() } else { 0 };
            if self.mode.encrypts() {
                let block = self.policy.encrypting_block_size();
                (available / block * block).saturating_sub(SEQUENCE_HEADER_SIZE + signature + 1)
            } else {
                available.saturating_sub(SEQUENCE_HEADER_SIZE + signature)
            }
        };
        if body == 0 {
            return Err(UaError::encoding_limit(
                StatusCode::BAD_TCP_MESSAGE_TOO_LARGE,
                format!("Chunk size {} leaves no room for a body", chunk_size),
            ));
        }
        Ok(body)
    }

    /// Build one secured chunk
    pub fn secure_chunk(
        &mut self,
        message_type: MessageType,
        chunk_type: ChunkType,
        request_id: u32,
        body: &[u8],
    ) -> UaResult<Vec<u8>> {
        if !message_type.is_secure() {
            return Err(UaError::encoding(format!("{} cannot be secured", message_type)));
        }
        if message_type.is_asymmetric() {
            self.secure_asymmetric(chunk_type, request_id, body)
        } else {
            self.secure_symmetric(message_type, chunk_type, request_id, body)
        }
    }

    fn secure_symmetric(
        &mut self,
        message_type: MessageType,
        chunk_type: ChunkType,
        request_id: u32,
        body: &[u8],
    ) -> UaResult<Vec<u8>> {
        let token = self
            .current
            .as_ref()
            .ok_or_else(|| UaError::InvalidState("No security token installed".to_string()))?;
        let token_id = token.token_id;
        let keys = if self.mode.signs() { Some(self.keys_for(token, true)?) } else { None };

        let signature_size = if self.mode.signs() { self.policy.symmetric_signature_size() } else { 0 };
        let padding = if self.mode.encrypts() {
            let block = self.policy.encrypting_block_size();
            let unpadded = SEQUENCE_HEADER_SIZE + body.len() + 1 + signature_size;
            Some((block - unpadded % block) % block)
        } else {
            None
        };
        let prefix = SECURE_MESSAGE_HEADER_SIZE + SYMMETRIC_SECURITY_HEADER_SIZE;
        let total = prefix
            + SEQUENCE_HEADER_SIZE
            + body.len()
            + padding.map_or(0, |p| p + 1)
            + signature_size;

        let sequence_number = self.next_sequence_number();
        let mut encoder = BinaryEncoder::with_capacity(total);
        MessageHeader::new(message_type, chunk_type, size_u32(total)?).encode(&mut encoder);
        encoder.write_u32(self.channel_id);
        SymmetricSecurityHeader { token_id }.encode(&mut encoder)?;
        SequenceHeader {
            sequence_number,
            request_id,
        }
        .encode(&mut encoder)?;
        encoder.write_raw(body);
        if let Some(padding) = padding {
            write_padding(&mut encoder, padding, false);
        }
        let mut data = encoder.into_bytes();

        if let Some(keys) = &keys {
            let signature = keys.sign(&data)?;
            data.extend_from_slice(&signature);
            if self.mode.encrypts() {
                keys.encrypt(&mut data[prefix..])?;
            }
        }
        Ok(data)
    }

    fn secure_asymmetric(&mut self, chunk_type: ChunkType, request_id: u32, body: &[u8]) -> UaResult<Vec<u8>> {
        let header = self.asymmetric_header()?;
        let prefix = SECURE_MESSAGE_HEADER_SIZE + header.byte_len()?;
        let sequence = SequenceHeader {
            sequence_number: self.next_sequence_number(),
            request_id,
        };

        if self.policy.is_none() {
            let total = prefix + SEQUENCE_HEADER_SIZE + body.len();
            let mut encoder = BinaryEncoder::with_capacity(total);
            MessageHeader::new(MessageType::OpenSecureChannel, chunk_type, size_u32(total)?).encode(&mut encoder);
            encoder.write_u32(self.channel_id);
            header.encode(&mut encoder)?;
            sequence.encode(&mut encoder)?;
            encoder.write_raw(body);
            return Ok(encoder.into_bytes());
        }

        let (local_key, remote_key) = self.asymmetric_keys()?;
        let plain_block = remote_key.plain_block_size();
        let extra = remote_key.size() > EXTRA_PADDING_KEY_SIZE;
        let signature_size = local_key.size();
        let unpadded = SEQUENCE_HEADER_SIZE + body.len() + 1 + extra as usize + signature_size;
        let padding = (plain_block - unpadded % plain_block) % plain_block;
        let plain_len = unpadded + padding;
        let total = prefix + plain_len / plain_block * remote_key.size();

        let mut encoder = BinaryEncoder::with_capacity(prefix + plain_len);
        MessageHeader::new(MessageType::OpenSecureChannel, chunk_type, size_u32(total)?).encode(&mut encoder);
        encoder.write_u32(self.channel_id);
        header.encode(&mut encoder)?;
        sequence.encode(&mut encoder)?;
        encoder.write_raw(body);
        write_padding(&mut encoder, padding, extra);
        let mut data = encoder.into_bytes();

        let signature = local_key.sign_sha256(&data)?;
        data.extend_from_slice(&signature);
        let encrypted = remote_key.encrypt_oaep(&data[prefix..])?;
        data.truncate(prefix);
        data.extend_from_slice(&encrypted);
        if data.len() != total {
            return Err(UaError::encoding(format!(
                "Encrypted chunk is {} bytes, expected {}",
                data.len(),
                total
            )));
        }
        Ok(data)
    }

    /// Verify, decrypt and strip a received chunk
    ///
    /// # Errors
    /// - `BadTcpSecureChannelUnknown` for a foreign channel id
    /// - `BadSecureChannelTokenUnknown` for an unknown or expired token
    /// - `SecurityChecksFailed` for signature, padding or certificate mismatches
    /// - `BadSequenceNumberInvalid` when the sequence number is out of order
    pub fn open_chunk(&mut self, chunk: &MessageChunk) -> UaResult<OpenedChunk> {
        if self.channel_id != 0 && chunk.secure_channel_id != self.channel_id {
            return Err(UaError::protocol(
                StatusCode::BAD_TCP_SECURE_CHANNEL_UNKNOWN,
                format!("Chunk for channel {} on channel {}", chunk.secure_channel_id, self.channel_id),
            ));
        }
        if chunk.header.message_type.is_asymmetric() {
            self.open_asymmetric(chunk)
        } else {
            self.open_symmetric(chunk)
        }
    }

    fn receiving_token(&mut self, token_id: u32) -> UaResult<SecurityToken> {
        self.expire_previous_token(Instant::now());
        [self.current.as_ref(), self.previous.as_ref()]
            .into_iter()
            .flatten()
            .find(|t| t.token_id == token_id)
            .cloned()
            .ok_or_else(|| {
                UaError::protocol(
                    StatusCode::BAD_SECURE_CHANNEL_TOKEN_UNKNOWN,
                    format!("Unknown security token {}", token_id),
                )
            })
    }

    fn open_symmetric(&mut self, chunk: &MessageChunk) -> UaResult<OpenedChunk> {
        let prefix = SECURE_MESSAGE_HEADER_SIZE + SYMMETRIC_SECURITY_HEADER_SIZE;
        let mut data = chunk.data.clone();
        if data.len() < prefix + SEQUENCE_HEADER_SIZE {
            return Err(UaError::decoding("Symmetric chunk too short"));
        }
        let token_id = u32::from_le_bytes([data[12], data[13], data[14], data[15]]);
        let token = self.receiving_token(token_id)?;

        let mut end = data.len();
        if self.mode.signs() {
            let keys = self.keys_for(&token, false)?;
            if self.mode.encrypts() {
                keys.decrypt(&mut data[prefix..])?;
            }
            let signature_size = self.policy.symmetric_signature_size();
            if end < prefix + SEQUENCE_HEADER_SIZE + signature_size {
                return Err(security_error("Chunk too short for its signature"));
            }
            let (signed, signature) = data.split_at(end - signature_size);
            keys.verify(signed, signature)?;
            end -= signature_size;
            if self.mode.encrypts() {
                end -= padding_length(&data[..end], prefix + SEQUENCE_HEADER_SIZE, false)?;
            }
        }

        let (sequence, body) = self.split_sequence(&data[prefix..end])?;
        Ok(OpenedChunk {
            message_type: chunk.header.message_type,
            chunk_type: chunk.header.chunk_type,
            secure_channel_id: chunk.secure_channel_id,
            token_id: Some(token_id),
            asymmetric_header: None,
            sequence_number: sequence.sequence_number,
            request_id: sequence.request_id,
            body,
        })
    }

    fn open_asymmetric(&mut self, chunk: &MessageChunk) -> UaResult<OpenedChunk> {
        let data = &chunk.data;
        let mut decoder = BinaryDecoder::new(&data[SECURE_MESSAGE_HEADER_SIZE..], self.decoding_options);
        let header = AsymmetricSecurityHeader::decode(&mut decoder)?;
        let prefix = SECURE_MESSAGE_HEADER_SIZE + decoder.position();

        let policy = SecurityPolicy::from_uri(header.security_policy_uri.as_ref_or_empty())?;
        if policy != self.policy {
            return Err(UaError::protocol(
                StatusCode::BAD_SECURITY_POLICY_REJECTED,
                format!("Peer uses {}, channel uses {}", policy, self.policy),
            ));
        }

        let content = if self.policy.is_none() {
            data[prefix..].to_vec()
        } else {
            if let (Some(thumbprint), Some(local)) =
                (header.receiver_certificate_thumbprint.as_bytes(), &self.local_certificate)
            {
                if !thumbprint.is_empty() && thumbprint != thumbprint_of(local) {
                    return Err(security_error("Receiver thumbprint does not match the local certificate"));
                }
            }
            if let (Some(sender), Some(remote)) = (header.sender_certificate.as_bytes(), &self.remote_certificate) {
                if sender != remote.as_slice() {
                    return Err(security_error("Sender certificate does not match the remote certificate"));
                }
            }
            let (local_key, remote_key) = self.asymmetric_keys()?;
            let plain = local_key.decrypt_oaep(&data[prefix..])?;
            let signature_size = remote_key.size();
            if plain.len() < SEQUENCE_HEADER_SIZE + signature_size + 1 {
                return Err(security_error("Asymmetric chunk too short"));
            }
            let (signed_part, signature) = plain.split_at(plain.len() - signature_size);
            let mut signed = Vec::with_capacity(prefix + signed_part.len());
            signed.extend_from_slice(&data[..prefix]);
            signed.extend_from_slice(signed_part);
            remote_key.verify_sha256(&signed, signature)?;

            let extra = local_key.size() > EXTRA_PADDING_KEY_SIZE;
            let padding = padding_length(signed_part, SEQUENCE_HEADER_SIZE, extra)?;
            signed_part[..signed_part.len() - padding].to_vec()
        };

        let (sequence, body) = self.split_sequence(&content)?;
        Ok(OpenedChunk {
            message_type: MessageType::OpenSecureChannel,
            chunk_type: chunk.header.chunk_type,
            secure_channel_id: chunk.secure_channel_id,
            token_id: None,
            asymmetric_header: Some(header),
            sequence_number: sequence.sequence_number,
            request_id: sequence.request_id,
            body,
        })
    }

    fn split_sequence(&mut self, content: &[u8]) -> UaResult<(SequenceHeader, Vec<u8>)> {
        let mut decoder = BinaryDecoder::new(content, self.decoding_options);
        let sequence = SequenceHeader::decode(&mut decoder)?;
        self.check_sequence_number(sequence.sequence_number)?;
        Ok((sequence, content[SEQUENCE_HEADER_SIZE..].to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;

    static CLIENT_KEY: Lazy<PrivateKey> = Lazy::new(|| PrivateKey::generate(2048).unwrap());
    static SERVER_KEY: Lazy<PrivateKey> = Lazy::new(|| PrivateKey::generate(2048).unwrap());

    const CLIENT_CERT: &[u8] = b"client-certificate-der";
    const SERVER_CERT: &[u8] = b"server-certificate-der";

    fn pair(policy: SecurityPolicy, mode: MessageSecurityMode) -> (SecureContext, SecureContext) {
        let mut client = SecureContext::new(Role::Client, policy, mode).unwrap();
        let mut server = SecureContext::new(Role::Server, policy, mode).unwrap();
        if !policy.is_none() {
            client.set_local_identity(CLIENT_CERT.to_vec(), CLIENT_KEY.clone());
            client.set_remote(SERVER_CERT.to_vec(), SERVER_KEY.public_key());
            server.set_local_identity(SERVER_CERT.to_vec(), SERVER_KEY.clone());
            server.set_remote(CLIENT_CERT.to_vec(), CLIENT_KEY.public_key());
        }
        (client, server)
    }

    fn install(client: &mut SecureContext, server: &mut SecureContext, token_id: u32, seed: u8) {
        let nonce_len = client.policy().nonce_length();
        client.set_local_nonce(vec![seed; nonce_len]);
        server.set_local_nonce(vec![seed + 1; nonce_len]);
        let client_nonce = client.local_nonce().to_vec();
        let server_nonce = server.local_nonce().to_vec();
        client
            .install_token(SecurityToken::new(9, token_id, DateTime::now(), 60_000), &server_nonce)
            .unwrap();
        server
            .install_token(SecurityToken::new(9, token_id, DateTime::now(), 60_000), &client_nonce)
            .unwrap();
    }

    fn round_trip(
        sender: &mut SecureContext,
        receiver: &mut SecureContext,
        message_type: MessageType,
        body: &[u8],
    ) -> OpenedChunk {
        let bytes = sender.secure_chunk(message_type, ChunkType::Final, 42, body).unwrap();
        let chunk = MessageChunk::from_bytes(bytes).unwrap();
        receiver.open_chunk(&chunk).unwrap()
    }

    #[test]
    fn test_mode_must_fit_policy() {
        assert!(SecureContext::new(Role::Client, SecurityPolicy::None, MessageSecurityMode::Sign).is_err());
        assert!(SecureContext::new(Role::Client, SecurityPolicy::Basic256Sha256, MessageSecurityMode::None).is_err());
    }

    #[test]
    fn test_none_round_trip() {
        let (mut client, mut server) = pair(SecurityPolicy::None, MessageSecurityMode::None);
        let opened = round_trip(&mut client, &mut server, MessageType::OpenSecureChannel, b"open");
        assert_eq!(opened.body, b"open");
        install(&mut client, &mut server, 1, 1);
        let opened = round_trip(&mut client, &mut server, MessageType::Message, b"hello");
        assert_eq!(opened.body, b"hello");
        assert_eq!(opened.request_id, 42);
        assert_eq!(opened.token_id, Some(1));
    }

    #[test]
    fn test_sign_round_trip_detects_tampering() {
        let (mut client, mut server) = pair(SecurityPolicy::Basic256Sha256, MessageSecurityMode::Sign);
        install(&mut client, &mut server, 1, 1);
        let opened = round_trip(&mut client, &mut server, MessageType::Message, b"signed body");
        assert_eq!(opened.body, b"signed body");

        let mut bytes = client.secure_chunk(MessageType::Message, ChunkType::Final, 43, b"x").unwrap();
        bytes[24] ^= 0xFF;
        let chunk = MessageChunk::from_bytes(bytes).unwrap();
        assert!(matches!(server.open_chunk(&chunk), Err(UaError::SecurityChecksFailed(_))));
    }

    #[test]
    fn test_sign_and_encrypt_round_trip_both_policies() {
        for policy in [SecurityPolicy::Basic256Sha256, SecurityPolicy::Aes128Sha256RsaOaep] {
            let (mut client, mut server) = pair(policy, MessageSecurityMode::SignAndEncrypt);
            install(&mut client, &mut server, 5, 3);
            for len in [0usize, 1, 15, 16, 17, 300] {
                let body = vec![0xA5u8; len];
                let bytes = client.secure_chunk(MessageType::Message, ChunkType::Final, 7, &body).unwrap();
                let opened = server.open_chunk(&MessageChunk::from_bytes(bytes).unwrap()).unwrap();
                assert_eq!(opened.body, body);
                let reply = round_trip(&mut server, &mut client, MessageType::Message, &body);
                assert_eq!(reply.body, body);
            }
        }
    }

    #[test]
    fn test_asymmetric_round_trip() {
        let (mut client, mut server) = pair(SecurityPolicy::Basic256Sha256, MessageSecurityMode::SignAndEncrypt);
        let body = vec![0x11u8; 500];
        let opened = round_trip(&mut client, &mut server, MessageType::OpenSecureChannel, &body);
        assert_eq!(opened.body, body);
        let header = opened.asymmetric_header.unwrap();
        assert_eq!(header.sender_certificate.as_slice(), CLIENT_CERT);
        let reply = round_trip(&mut server, &mut client, MessageType::OpenSecureChannel, b"response");
        assert_eq!(reply.body, b"response");
    }

    #[test]
    fn test_previous_token_accepted_after_renewal() {
        let (mut client, mut server) = pair(SecurityPolicy::Aes128Sha256RsaOaep, MessageSecurityMode::SignAndEncrypt);
        install(&mut client, &mut server, 1, 1);
        // server sends under token 1 while the client already renewed
        let old = server.secure_chunk(MessageType::Message, ChunkType::Final, 1, b"old token").unwrap();
        let client_nonce = vec![7u8; 32];
        client.set_local_nonce(client_nonce);
        client
            .install_token(SecurityToken::new(9, 2, DateTime::now(), 60_000), &[8u8; 32])
            .unwrap();
        assert_eq!(client.current_token().map(|t| t.token_id), Some(2));
        assert_eq!(client.previous_token().map(|t| t.token_id), Some(1));
        let opened = client.open_chunk(&MessageChunk::from_bytes(old).unwrap()).unwrap();
        assert_eq!(opened.body, b"old token");
        assert_eq!(opened.token_id, Some(1));
    }

    #[test]
    fn test_expired_previous_token_rejected() {
        let (mut client, mut server) = pair(SecurityPolicy::None, MessageSecurityMode::None);
        client
            .install_token(SecurityToken::new(9, 1, DateTime::now(), 0), &[])
            .unwrap();
        server
            .install_token(SecurityToken::new(9, 1, DateTime::now(), 0), &[])
            .unwrap();
        let old = server.secure_chunk(MessageType::Message, ChunkType::Final, 1, b"late").unwrap();
        client
            .install_token(SecurityToken::new(9, 2, DateTime::now(), 60_000), &[])
            .unwrap();
        let err = client.open_chunk(&MessageChunk::from_bytes(old).unwrap()).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_SECURE_CHANNEL_TOKEN_UNKNOWN);
    }

    #[test]
    fn test_sequence_number_gap_rejected() {
        let (mut client, mut server) = pair(SecurityPolicy::None, MessageSecurityMode::None);
        install(&mut client, &mut server, 1, 1);
        round_trip(&mut client, &mut server, MessageType::Message, b"1");
        client.next_sequence_number();
        let bytes = client.secure_chunk(MessageType::Message, ChunkType::Final, 2, b"3").unwrap();
        let err = server.open_chunk(&MessageChunk::from_bytes(bytes).unwrap()).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_SEQUENCE_NUMBER_INVALID);
    }

    #[test]
    fn test_sequence_number_wraps() {
        let (mut client, _) = pair(SecurityPolicy::None, MessageSecurityMode::None);
        client.send_sequence = SEQUENCE_WRAP_THRESHOLD;
        assert_eq!(client.next_sequence_number(), SEQUENCE_WRAP_THRESHOLD);
        assert_eq!(client.next_sequence_number(), 1);

        client.last_received_sequence = Some(SEQUENCE_WRAP_THRESHOLD);
        assert!(client.check_sequence_number(5).is_ok());
    }

    #[test]
    fn test_foreign_channel_rejected() {
        let (mut client, mut server) = pair(SecurityPolicy::None, MessageSecurityMode::None);
        install(&mut client, &mut server, 1, 1);
        let mut bytes = server.secure_chunk(MessageType::Message, ChunkType::Final, 1, b"x").unwrap();
        bytes[8] = 10;
        let err = client.open_chunk(&MessageChunk::from_bytes(bytes).unwrap()).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_TCP_SECURE_CHANNEL_UNKNOWN);
    }

    #[test]
    fn test_max_body_size_fits_chunk() {
        let (mut client, mut server) = pair(SecurityPolicy::Basic256Sha256, MessageSecurityMode::SignAndEncrypt);
        install(&mut client, &mut server, 1, 1);
        for message_type in [MessageType::Message, MessageType::OpenSecureChannel] {
            let max = client.max_body_size(message_type, 8192).unwrap();
            let bytes = client.secure_chunk(message_type, ChunkType::Final, 1, &vec![0u8; max]).unwrap();
            assert!(bytes.len() <= 8192, "{:?}: {} > 8192", message_type, bytes.len());
        }
    }
}
