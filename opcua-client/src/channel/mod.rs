//! Secure channel to an OPC UA server
//!
//! A `SecureChannel` owns one transport connection and the secure
//! conversation running over it. It multiplexes any number of concurrent
//! requests: each caller registers a pending slot, writes its chunks under the
//! writer lock and waits for the reader task to hand back the matching
//! response.
//!
//! # State Machine
//!
//! - `Closed` -> `Opening` (`open()`)
//! - `Opening` -> `Open` once the first security token is installed
//! - `Open` -> `Closing` -> `Closed` (`close()`)
//! - `Opening`/`Open` -> `Faulted` on a transport or protocol failure
//! - any state -> `Closed` (`abort()`)
//!
//! # Background Tasks
//!
//! While open, the channel runs a reader task that opens and reassembles
//! inbound chunks, and a renewal task that requests a fresh security token
//! after a fraction of the token lifetime. Both stop when the channel closes,
//! faults or is dropped.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use opcua_client::channel::{ChannelConfig, SecureChannel};
//! use opcua_services::ReadRequest;
//! # async fn run(config: ChannelConfig) -> opcua_core::UaResult<()> {
//! let channel = SecureChannel::new(config);
//! channel.open().await?;
//! let request = ReadRequest::default();
//! let _response = channel.send(&request, std::time::Duration::from_secs(5), None).await?;
//! channel.close().await?;
//! # Ok(())
//! # }
//! ```

mod pending;
mod worker;

use crate::config::ClientConfig;
use opcua_binary::DecodingOptions;
use opcua_conversation::{
    encode_handshake, read_frame, write_frame, Chunker, Frame, HelloMessage, MessageType, Role, SecureContext,
    SecurityToken, TransportLimits, PROTOCOL_VERSION,
};
use opcua_core::{ByteString, NodeId, StatusCode, UaError, UaResult};
use opcua_security::{
    generate_nonce, Certificate, CertificateTrustProvider, LocalIdentity, MessageSecurityMode, SecurityPolicy,
    TrustDecision,
};
use opcua_services::{
    decode_response, encode_message, ChannelSecurityToken, CloseSecureChannelRequest, EndpointDescription,
    OpenSecureChannelRequest, RequestHeader, SecurityMode, SecurityTokenRequestType, ServiceRequest,
};
use opcua_transport::stream::BoxedWriter;
use opcua_transport::{EndpointUrl, TransportConnector, TransportStreams};
use pending::{PendingGuard, PendingRequests};
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, watch, Mutex};
use tokio_util::sync::CancellationToken;

/// Shortest delay between two token renewals
const MIN_RENEWAL_DELAY: Duration = Duration::from_millis(100);

/// Lifecycle state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    Opening,
    Open,
    Closing,
    Faulted,
}

/// Notable changes of a channel, broadcast to every subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened { channel_id: u32 },
    TokenRenewed { token_id: u32 },
    Faulted { status: StatusCode },
    Closed,
}

/// Everything needed to open a channel
#[derive(Clone)]
pub struct ChannelConfig {
    pub endpoint: EndpointDescription,
    pub security_policy: SecurityPolicy,
    pub security_mode: MessageSecurityMode,
    pub application_uri: String,
    pub connector: Arc<dyn TransportConnector>,
    pub trust_provider: Arc<dyn CertificateTrustProvider>,
    pub receive_buffer_size: u32,
    pub send_buffer_size: u32,
    pub max_message_size: u32,
    pub max_chunk_count: u32,
    /// Requested token lifetime in milliseconds
    pub requested_lifetime: u32,
    pub renewal_ratio: f64,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub decoding_options: DecodingOptions,
}

impl fmt::Debug for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelConfig")
            .field("endpoint_url", &self.endpoint.endpoint_url)
            .field("security_policy", &self.security_policy)
            .field("security_mode", &self.security_mode)
            .field("connector", &self.connector)
            .field("requested_lifetime", &self.requested_lifetime)
            .finish_non_exhaustive()
    }
}

impl ChannelConfig {
    /// Channel settings for `endpoint` taken from the client configuration
    ///
    /// # Errors
    /// `BadSecurityPolicyRejected` when the endpoint's policy is unsupported or
    /// does not fit its security mode.
    pub fn new(
        config: &ClientConfig,
        endpoint: EndpointDescription,
        connector: Arc<dyn TransportConnector>,
        trust_provider: Arc<dyn CertificateTrustProvider>,
    ) -> UaResult<Self> {
        let security_policy = SecurityPolicy::from_uri(endpoint.security_policy_uri.as_ref_or_empty())?;
        let security_mode = MessageSecurityMode::from_id(endpoint.security_mode.id())?;
        SecureContext::new(Role::Client, security_policy, security_mode)?;
        Ok(Self {
            endpoint,
            security_policy,
            security_mode,
            application_uri: config.application_uri.clone(),
            connector,
            trust_provider,
            receive_buffer_size: config.receive_buffer_size,
            send_buffer_size: config.send_buffer_size,
            max_message_size: config.max_message_size,
            max_chunk_count: config.max_chunk_count,
            requested_lifetime: config.channel_lifetime_ms,
            renewal_ratio: config.token_renewal_ratio,
            request_timeout: config.request_timeout(),
            connect_timeout: config.connect_timeout(),
            decoding_options: config.decoding_options(),
        })
    }

    fn hello_message(&self) -> HelloMessage {
        HelloMessage {
            protocol_version: PROTOCOL_VERSION,
            receive_buffer_size: self.receive_buffer_size,
            send_buffer_size: self.send_buffer_size,
            max_message_size: self.max_message_size,
            max_chunk_count: self.max_chunk_count,
            endpoint_url: self.endpoint.endpoint_url.clone(),
        }
    }
}

/// Wire value of a security mode
pub(crate) fn wire_security_mode(mode: MessageSecurityMode) -> SecurityMode {
    match mode {
        MessageSecurityMode::Invalid => SecurityMode::Invalid,
        MessageSecurityMode::None => SecurityMode::None,
        MessageSecurityMode::Sign => SecurityMode::Sign,
        MessageSecurityMode::SignAndEncrypt => SecurityMode::SignAndEncrypt,
    }
}

/// Timeout hint carried in request headers
pub(crate) fn timeout_hint(timeout: Duration) -> u32 {
    timeout.as_millis().min(u32::MAX as u128) as u32
}

fn channel_closed() -> UaError {
    UaError::ChannelAborted(StatusCode::BAD_SECURE_CHANNEL_CLOSED)
}

fn short_type_name<T>() -> &'static str {
    let name = std::any::type_name::<T>();
    name.rsplit("::").next().unwrap_or(name)
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

struct Conversation {
    context: SecureContext,
    limits: TransportLimits,
}

#[derive(Default)]
struct PeerSecurity {
    local: Option<LocalIdentity>,
    remote: Option<Certificate>,
}

struct ChannelShared {
    config: ChannelConfig,
    state: watch::Sender<ChannelState>,
    events: broadcast::Sender<ChannelEvent>,
    pending: PendingRequests,
    writer: Mutex<Option<BoxedWriter>>,
    conversation: Mutex<Option<Conversation>>,
    peer: StdMutex<PeerSecurity>,
    shutdown: StdMutex<CancellationToken>,
}

impl ChannelShared {
    fn peer(&self) -> MutexGuard<'_, PeerSecurity> {
        self.peer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn replace_shutdown_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = std::mem::replace(
            &mut *self.shutdown.lock().unwrap_or_else(|e| e.into_inner()),
            token.clone(),
        );
        previous.cancel();
        token
    }

    /// Time left until the current token should be renewed
    async fn renewal_delay(&self) -> Option<Duration> {
        let conversation = self.conversation.lock().await;
        let token = conversation.as_ref()?.context.current_token()?;
        if token.revised_lifetime.is_zero() {
            return None;
        }
        let due = token.revised_lifetime.mul_f64(self.config.renewal_ratio);
        Some(due.saturating_sub(token.installed_at().elapsed()).max(MIN_RENEWAL_DELAY))
    }
}

impl Drop for ChannelShared {
    fn drop(&mut self) {
        self.shutdown_token().cancel();
    }
}

/// A secure channel shared by every clone of this handle
#[derive(Clone)]
pub struct SecureChannel {
    shared: Arc<ChannelShared>,
}

impl fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureChannel")
            .field("endpoint_url", &self.shared.config.endpoint.endpoint_url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SecureChannel {
    /// Create a closed channel
    pub fn new(config: ChannelConfig) -> Self {
        let (state, _) = watch::channel(ChannelState::Closed);
        let (events, _) = broadcast::channel(16);
        Self {
            shared: Arc::new(ChannelShared {
                config,
                state,
                events,
                pending: PendingRequests::new(),
                writer: Mutex::new(None),
                conversation: Mutex::new(None),
                peer: StdMutex::new(PeerSecurity::default()),
                shutdown: StdMutex::new(CancellationToken::new()),
            }),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    /// Receiver that observes every state change
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }

    /// Receiver for channel events from now on
    pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.shared.events.subscribe()
    }

    pub fn security_policy(&self) -> SecurityPolicy {
        self.shared.config.security_policy
    }

    pub fn security_mode(&self) -> MessageSecurityMode {
        self.shared.config.security_mode
    }

    /// Certificate and key of the local application, set when secured
    pub fn local_identity(&self) -> Option<LocalIdentity> {
        self.shared.peer().local.clone()
    }

    /// Validated server certificate, set when secured
    pub fn server_certificate(&self) -> Option<Certificate> {
        self.shared.peer().remote.clone()
    }

    /// Channel id assigned by the server, 0 before the first token
    pub async fn channel_id(&self) -> u32 {
        self.shared
            .conversation
            .lock()
            .await
            .as_ref()
            .map_or(0, |c| c.context.channel_id())
    }

    /// Id of the token used for outbound traffic
    pub async fn token_id(&self) -> Option<u32> {
        self.shared
            .conversation
            .lock()
            .await
            .as_ref()
            .and_then(|c| c.context.current_token().map(|t| t.token_id))
    }

    /// Number of requests waiting for a response
    pub fn pending_requests(&self) -> usize {
        self.shared.pending.len()
    }

    /// Connect and open the secure channel
    ///
    /// Opening an open channel is a no-op.
    ///
    /// # Errors
    /// - `Connection` when the transport cannot be established
    /// - `RemoteError` when the server answers the handshake with ERR
    /// - `SecurityChecksFailed` when the server certificate is rejected
    /// - `InvalidState` while the channel is opening or closing
    pub async fn open(&self) -> UaResult<()> {
        let mut starting = false;
        self.shared.state.send_if_modified(|state| match state {
            ChannelState::Closed | ChannelState::Faulted => {
                *state = ChannelState::Opening;
                starting = true;
                true
            }
            _ => false,
        });
        if !starting {
            return match self.state() {
                ChannelState::Open => Ok(()),
                other => Err(UaError::InvalidState(format!("Channel is {:?}", other))),
            };
        }

        let url = self.shared.config.endpoint.endpoint_url.to_string();
        match self.establish().await {
            Ok(channel_id) => {
                self.shared.state.send_replace(ChannelState::Open);
                log::info!(
                    "Secure channel {} open to {} ({}, {})",
                    channel_id,
                    url,
                    self.security_policy(),
                    self.security_mode()
                );
                let _ = self.shared.events.send(ChannelEvent::Opened { channel_id });
                Ok(())
            }
            Err(error) => {
                log::error!("Failed to open secure channel to {}: {}", url, error);
                self.teardown(error.status_code()).await;
                self.shared.state.send_replace(ChannelState::Faulted);
                Err(error)
            }
        }
    }

    async fn establish(&self) -> UaResult<u32> {
        let config = &self.shared.config;
        let url = EndpointUrl::parse(config.endpoint.endpoint_url.as_ref_or_empty())?;
        let TransportStreams {
            mut reader,
            mut writer,
            peer,
        } = config.connector.connect(&url).await?;
        log::debug!("Transport connected to {}", peer);

        let hello = config.hello_message();
        write_frame(&mut writer, &encode_handshake(MessageType::Hello, &hello)?).await?;
        let frame = tokio::time::timeout(
            config.connect_timeout,
            read_frame(&mut reader, hello.receive_buffer_size as usize),
        )
        .await
        .map_err(|_| UaError::Timeout)??;
        let limits = match frame {
            Frame::Acknowledge(ack) => TransportLimits::negotiate(&hello, &ack)?,
            Frame::Error(message) => return Err(message.into_error()),
            other => {
                return Err(UaError::protocol(
                    StatusCode::BAD_TCP_MESSAGE_TYPE_INVALID,
                    format!("Expected ACK, received {}", worker::frame_kind(&other)),
                ))
            }
        };
        log::debug!("Negotiated transport limits {:?}", limits);

        let mut context = SecureContext::new(Role::Client, config.security_policy, config.security_mode)?;
        context.set_decoding_options(config.decoding_options);
        if !config.security_policy.is_none() {
            self.prepare_security(&mut context)?;
        }

        let shutdown = self.shared.replace_shutdown_token();
        *self.shared.conversation.lock().await = Some(Conversation { context, limits });
        *self.shared.writer.lock().await = Some(writer);
        self.shared.pending.reopen();

        tokio::spawn(worker::read_loop(
            Arc::downgrade(&self.shared),
            reader,
            limits,
            shutdown.clone(),
        ));
        let token = self.request_token(SecurityTokenRequestType::Issue).await?;
        tokio::spawn(worker::renew_loop(Arc::downgrade(&self.shared), shutdown));
        Ok(token.channel_id)
    }

    /// Validate the server certificate and load the local identity
    fn prepare_security(&self, context: &mut SecureContext) -> UaResult<()> {
        let config = &self.shared.config;
        let certificate = Certificate::from_byte_string(&config.endpoint.server_certificate)?
            .ok_or_else(|| UaError::SecurityChecksFailed("Endpoint carries no server certificate".to_string()))?;
        if let TrustDecision::Rejected(status) = config.trust_provider.validate_remote(&certificate) {
            return Err(UaError::SecurityChecksFailed(format!(
                "Server certificate {} rejected: {}",
                certificate.thumbprint_hex(),
                status
            )));
        }
        let local = config
            .trust_provider
            .local_identity(&config.application_uri)
            .ok_or_else(|| UaError::SecurityChecksFailed("No application instance certificate".to_string()))?;
        context.set_local_identity(local.certificate.as_der().to_vec(), local.private_key.clone());
        context.set_remote(certificate.as_der().to_vec(), certificate.public_key()?);
        *self.shared.peer() = PeerSecurity {
            local: Some(local),
            remote: Some(certificate),
        };
        Ok(())
    }

    /// Issue or renew the security token
    async fn request_token(&self, request_type: SecurityTokenRequestType) -> UaResult<ChannelSecurityToken> {
        let config = &self.shared.config;
        let policy = config.security_policy;
        let nonce = if policy.is_none() {
            Vec::new()
        } else {
            generate_nonce(policy.nonce_length())?
        };
        let request = OpenSecureChannelRequest {
            request_header: RequestHeader::new(NodeId::null(), 0, timeout_hint(config.request_timeout)),
            client_protocol_version: PROTOCOL_VERSION,
            request_type,
            security_mode: wire_security_mode(config.security_mode),
            client_nonce: if nonce.is_empty() {
                ByteString::null()
            } else {
                ByteString::from(nonce.clone())
            },
            requested_lifetime: config.requested_lifetime,
        };
        let response = self
            .exchange(
                MessageType::OpenSecureChannel,
                &request,
                config.request_timeout,
                None,
                Some(nonce),
            )
            .await?;

        let issued = response.security_token;
        let token = SecurityToken::new(
            issued.channel_id,
            issued.token_id,
            issued.created_at,
            issued.revised_lifetime,
        );
        {
            let mut conversation = self.shared.conversation.lock().await;
            let conversation = conversation.as_mut().ok_or_else(channel_closed)?;
            conversation.context.install_token(token, response.server_nonce.as_slice())?;
        }
        log::debug!(
            "{:?} token {} for channel {}, lifetime {} ms",
            request_type,
            issued.token_id,
            issued.channel_id,
            issued.revised_lifetime
        );
        Ok(issued)
    }

    /// Send a service request and wait for its response
    ///
    /// `timeout` bounds the wait for the response; `cancel` abandons it early.
    /// Either way only this request is affected.
    ///
    /// # Errors
    /// - `ChannelAborted` when the channel is not open or goes away
    /// - `Timeout` / `Cancelled`
    /// - `ServiceFault` for a ServiceFault or a bad service result
    pub async fn send<R: ServiceRequest>(
        &self,
        request: &R,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> UaResult<R::Response> {
        if self.state() != ChannelState::Open {
            return Err(UaError::ChannelAborted(StatusCode::BAD_SECURE_CHANNEL_CLOSED));
        }
        self.exchange(MessageType::Message, request, timeout, cancel, None).await
    }

    async fn exchange<R: ServiceRequest>(
        &self,
        message_type: MessageType,
        request: &R,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
        nonce: Option<Vec<u8>>,
    ) -> UaResult<R::Response> {
        let shared = &self.shared;
        let body = encode_message(request)?;
        let request_type = short_type_name::<R>();
        let (request_id, receiver) = shared.pending.register(request_type)?;
        let _guard = PendingGuard::new(&shared.pending, request_id);
        self.write_message(message_type, request_id, &body, nonce).await?;

        let result = tokio::select! {
            result = receiver => result.unwrap_or_else(|_| Err(channel_closed())),
            _ = tokio::time::sleep(timeout) => {
                log::warn!("{} {} timed out after {:?}", request_type, request_id, timeout);
                Err(UaError::Timeout)
            }
            _ = cancelled(cancel) => {
                log::debug!("{} {} cancelled", request_type, request_id);
                Err(UaError::Cancelled)
            }
        };
        decode_response::<R::Response>(&result?, shared.config.decoding_options)
    }

    /// Chunk, secure and write one message
    ///
    /// Chunks are secured and written under the writer lock so sequence
    /// numbers reach the server in order.
    async fn write_message(
        &self,
        message_type: MessageType,
        request_id: u32,
        body: &[u8],
        nonce: Option<Vec<u8>>,
    ) -> UaResult<()> {
        let written = {
            let mut writer = self.shared.writer.lock().await;
            let writer = writer.as_mut().ok_or_else(channel_closed)?;
            let chunks = {
                let mut conversation = self.shared.conversation.lock().await;
                let conversation = conversation.as_mut().ok_or_else(channel_closed)?;
                if let Some(nonce) = nonce {
                    conversation.context.set_local_nonce(nonce);
                }
                Chunker::encode(
                    &mut conversation.context,
                    &conversation.limits,
                    message_type,
                    request_id,
                    body,
                )?
            };
            let mut result = Ok(());
            for chunk in &chunks {
                result = write_frame(writer, chunk).await;
                if result.is_err() {
                    break;
                }
            }
            result
        };
        if let Err(error) = &written {
            self.fault(error).await;
        }
        written
    }

    /// Close the channel, sending CloseSecureChannel when possible
    ///
    /// Always ends in `Closed`; closing a closed channel is a no-op.
    pub async fn close(&self) -> UaResult<()> {
        let previous = loop {
            let current = self.state();
            match current {
                ChannelState::Closed => return Ok(()),
                ChannelState::Opening | ChannelState::Closing => {
                    let mut state = self.watch_state();
                    let _ = state
                        .wait_for(|s| !matches!(s, ChannelState::Opening | ChannelState::Closing))
                        .await;
                }
                ChannelState::Open | ChannelState::Faulted => {
                    let claimed = self.shared.state.send_if_modified(|state| {
                        if *state == current {
                            *state = ChannelState::Closing;
                            true
                        } else {
                            false
                        }
                    });
                    if claimed {
                        break current;
                    }
                }
            }
        };

        if previous == ChannelState::Open {
            if let Err(error) = self.send_close_request().await {
                log::debug!("CloseSecureChannel not sent: {}", error);
            }
        }
        self.teardown(StatusCode::BAD_SECURE_CHANNEL_CLOSED).await;
        self.shared.state.send_replace(ChannelState::Closed);
        let _ = self.shared.events.send(ChannelEvent::Closed);
        log::info!("Secure channel to {} closed", self.shared.config.endpoint.endpoint_url);
        Ok(())
    }

    async fn send_close_request(&self) -> UaResult<()> {
        let request = CloseSecureChannelRequest {
            request_header: RequestHeader::new(NodeId::null(), 0, 0),
        };
        let body = encode_message(&request)?;
        let request_id = self.shared.pending.next_request_id();
        self.write_message(MessageType::CloseSecureChannel, request_id, &body, None)
            .await
    }

    /// Drop the channel without protocol shutdown
    ///
    /// Every pending request fails with `ChannelAborted`.
    pub async fn abort(&self) {
        if self.state() == ChannelState::Closed {
            return;
        }
        log::warn!("Aborting secure channel to {}", self.shared.config.endpoint.endpoint_url);
        self.teardown(StatusCode::BAD_SECURE_CHANNEL_CLOSED).await;
        self.shared.state.send_replace(ChannelState::Closed);
        let _ = self.shared.events.send(ChannelEvent::Closed);
    }

    /// Move an open channel to `Faulted` after an unrecoverable error
    async fn fault(&self, error: &UaError) {
        let status = if opcua_conversation::is_end_of_stream(error) {
            StatusCode::BAD_CONNECTION_CLOSED
        } else {
            error.status_code()
        };
        let faulted = self.shared.state.send_if_modified(|state| match state {
            ChannelState::Opening | ChannelState::Open => {
                *state = ChannelState::Faulted;
                true
            }
            _ => false,
        });
        if !faulted {
            return;
        }
        log::error!("Secure channel faulted: {}", error);
        self.teardown(status).await;
        let _ = self.shared.events.send(ChannelEvent::Faulted { status });
    }

    /// Stop the tasks, fail pending requests and release the transport
    async fn teardown(&self, status: StatusCode) {
        self.shared.shutdown_token().cancel();
        self.shared.pending.fail_all(status);
        if let Some(mut writer) = self.shared.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.shared.conversation.lock().await.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opcua_conversation::ErrorMessage;
    use opcua_core::UaString;
    use opcua_security::TrustList;
    use opcua_services::ApplicationDescription;
    use opcua_transport::MemoryConnector;
    use tokio::io::AsyncReadExt;

    fn endpoint(policy: SecurityPolicy, mode: SecurityMode) -> EndpointDescription {
        EndpointDescription {
            endpoint_url: UaString::from("opc.tcp://fake:4840"),
            server: ApplicationDescription::client("urn:fake", "urn:fake", "Fake"),
            server_certificate: ByteString::null(),
            security_mode: mode,
            security_policy_uri: UaString::from(policy.uri()),
            user_identity_tokens: Vec::new(),
            transport_profile_uri: UaString::null(),
            security_level: 0,
        }
    }

    fn config(connector: MemoryConnector, policy: SecurityPolicy, mode: SecurityMode) -> UaResult<ChannelConfig> {
        ChannelConfig::new(
            &ClientConfig::default(),
            endpoint(policy, mode),
            Arc::new(connector),
            Arc::new(TrustList::new()),
        )
    }

    #[test]
    fn test_config_rejects_inconsistent_mode() {
        let (connector, _listener) = MemoryConnector::pair();
        let err = config(connector, SecurityPolicy::None, SecurityMode::Sign).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_SECURITY_POLICY_REJECTED);
    }

    #[tokio::test]
    async fn test_close_on_closed_channel_is_noop() {
        let (connector, _listener) = MemoryConnector::pair();
        let channel = SecureChannel::new(config(connector, SecurityPolicy::None, SecurityMode::None).unwrap());
        let mut events = channel.events();
        channel.close().await.unwrap();
        channel.close().await.unwrap();
        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_requires_open_channel() {
        let (connector, _listener) = MemoryConnector::pair();
        let channel = SecureChannel::new(config(connector, SecurityPolicy::None, SecurityMode::None).unwrap());
        let request = CloseSecureChannelRequest::default();
        let err = channel
            .send(&request, Duration::from_secs(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, UaError::ChannelAborted(_)));
    }

    #[tokio::test]
    async fn test_refused_connection_faults() {
        let (connector, _listener) = MemoryConnector::pair();
        connector.set_refuse(true);
        let channel = SecureChannel::new(config(connector, SecurityPolicy::None, SecurityMode::None).unwrap());
        let err = channel.open().await.unwrap_err();
        assert!(matches!(err, UaError::Connection(_)));
        assert_eq!(channel.state(), ChannelState::Faulted);
    }

    #[tokio::test]
    async fn test_handshake_error_surfaces_status() {
        let (connector, mut listener) = MemoryConnector::pair();
        let channel = SecureChannel::new(config(connector, SecurityPolicy::None, SecurityMode::None).unwrap());
        let server = tokio::spawn(async move {
            let (_, mut stream) = listener.accept().await.unwrap();
            let mut hello = [0u8; 8];
            stream.read_exact(&mut hello).await.unwrap();
            let size = u32::from_le_bytes([hello[4], hello[5], hello[6], hello[7]]) as usize;
            let mut rest = vec![0u8; size - 8];
            stream.read_exact(&mut rest).await.unwrap();
            let reply = encode_handshake(
                MessageType::Error,
                &ErrorMessage::new(StatusCode::BAD_TCP_SERVER_TOO_BUSY, "busy"),
            )
            .unwrap();
            write_frame(&mut stream, &reply).await.unwrap();
            stream
        });
        let err = channel.open().await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_TCP_SERVER_TOO_BUSY);
        assert!(matches!(err, UaError::RemoteError { .. }));
        drop(server.await.unwrap());
    }

    #[test]
    fn test_type_name_is_short() {
        assert_eq!(short_type_name::<CloseSecureChannelRequest>(), "CloseSecureChannelRequest");
    }
}
