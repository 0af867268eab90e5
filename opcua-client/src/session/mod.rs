//! Client session
//!
//! A `Session` runs on top of a `SecureChannel` and carries the
//! authentication token every service request needs. It also owns the
//! subscription state and the publish loop that feeds it.
//!
//! # State Machine
//!
//! - `Closed` -> `Creating` -> `Activating` -> `Active` (`open()`)
//! - `Active` -> `Closing` -> `Closed` (`close()`)
//! - `Creating`/`Activating` -> `Faulted` when creation or activation fails
//! - `Active` -> `Faulted` when the server reports the session as gone
//! - `Active`/`Faulted` -> `Activating` -> `Active` (`reconnect()`)
//!
//! Session loss is detected reactively: the first request answered with
//! `BadSessionIdInvalid`, `BadSessionClosed` or `BadSessionNotActivated`
//! faults the session. Nothing is retried automatically.

mod identity;

use crate::channel::{timeout_hint, ChannelConfig, SecureChannel};
use crate::config::ClientConfig;
use crate::subscription::{Publisher, SubscriptionState};
use opcua_binary::TypeRegistry;
use opcua_core::{ByteString, DataValue, DateTime, NodeId, StatusCode, UaError, UaResult, UaString};
use opcua_security::{generate_nonce, Certificate, MessageSecurityMode, UserIdentity};
use opcua_services::{
    register_service_types, ActivateSessionRequest, ApplicationDescription, CloseSessionRequest,
    CreateSessionRequest, CreateSessionResponse, ReadRequest, ReadValueId, RequestHeader, ServiceRequest,
    SignatureData,
};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;

/// Length of the nonce sent in CreateSession
const CLIENT_NONCE_LENGTH: usize = 32;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Creating,
    Activating,
    Active,
    Closing,
    Faulted,
}

/// What the server told us about the session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub session_id: NodeId,
    pub authentication_token: NodeId,
    pub revised_timeout: Duration,
    /// Largest request the server accepts, 0 = no limit
    pub max_request_message_size: u32,
    /// Nonce from the latest CreateSession or ActivateSession response
    pub server_nonce: Vec<u8>,
    pub server_certificate: ByteString,
}

pub(crate) struct SessionInner {
    pub(crate) config: ClientConfig,
    channel_config: ChannelConfig,
    identity: UserIdentity,
    channel: RwLock<SecureChannel>,
    state: watch::Sender<SessionState>,
    info: Mutex<Option<SessionInfo>>,
    request_handle: AtomicU32,
    pub(crate) subscriptions: Mutex<SubscriptionState>,
    pub(crate) publisher: Mutex<Option<Publisher>>,
    /// Signalled when a subscription is created or transferred
    pub(crate) subscription_added: Notify,
    pub(crate) registry: TypeRegistry,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(publisher) = self.publisher.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            publisher.stop();
        }
    }
}

/// Handle to a client session, cheap to clone
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint_url", &self.inner.channel_config.endpoint.endpoint_url)
            .field("state", &self.state())
            .field("identity", &self.inner.identity)
            .finish_non_exhaustive()
    }
}

/// Map activation failures to their dedicated error kinds
fn activation_error(error: UaError) -> UaError {
    match error {
        UaError::ServiceFault(status)
            if matches!(
                status.sub_code(),
                StatusCode::BAD_IDENTITY_TOKEN_REJECTED
                    | StatusCode::BAD_IDENTITY_TOKEN_INVALID
                    | StatusCode::BAD_USER_ACCESS_DENIED
            ) =>
        {
            UaError::IdentityTokenRejected(status)
        }
        UaError::ServiceFault(status) if status.is_security_error() => {
            UaError::SecurityChecksFailed(format!("Server reported {}", status))
        }
        other => other,
    }
}

impl Session {
    /// Create a closed session for the endpoint of `channel_config`
    pub fn new(config: ClientConfig, channel_config: ChannelConfig, identity: UserIdentity) -> Self {
        let mut registry = TypeRegistry::with_options(config.decoding_options());
        register_service_types(&mut registry);
        let (state, _) = watch::channel(SessionState::Closed);
        Self {
            inner: Arc::new(SessionInner {
                channel: RwLock::new(SecureChannel::new(channel_config.clone())),
                config,
                channel_config,
                identity,
                state,
                info: Mutex::new(None),
                request_handle: AtomicU32::new(1),
                subscriptions: Mutex::new(SubscriptionState::default()),
                publisher: Mutex::new(None),
                subscription_added: Notify::new(),
                registry,
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<SessionInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(inner: &Weak<SessionInner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Receiver that observes every state change
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Details of the current session, `None` before CreateSession
    pub fn info(&self) -> Option<SessionInfo> {
        self.lock_info().clone()
    }

    /// Channel the session currently runs on
    pub fn channel(&self) -> SecureChannel {
        self.inner.channel.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn lock_info(&self) -> MutexGuard<'_, Option<SessionInfo>> {
        self.inner.info.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn subscriptions(&self) -> MutexGuard<'_, SubscriptionState> {
        self.inner.subscriptions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: SessionState) {
        self.inner.state.send_replace(state);
    }

    fn next_handle(&self) -> u32 {
        loop {
            let handle = self.inner.request_handle.fetch_add(1, Ordering::Relaxed);
            if handle != 0 {
                return handle;
            }
        }
    }

    fn authentication_token(&self) -> NodeId {
        self.lock_info()
            .as_ref()
            .map_or_else(NodeId::null, |i| i.authentication_token.clone())
    }

    /// Create and activate the session, opening the channel first
    ///
    /// Opening an active session is a no-op.
    ///
    /// # Errors
    /// - any channel error from opening the channel
    /// - `SecurityChecksFailed` when the server signature does not verify
    /// - `IdentityTokenRejected` when the server refuses the user identity
    /// - `InvalidState` while the session is being opened or closed
    pub async fn open(&self) -> UaResult<()> {
        let mut starting = false;
        self.inner.state.send_if_modified(|state| match state {
            SessionState::Closed | SessionState::Faulted => {
                *state = SessionState::Creating;
                starting = true;
                true
            }
            _ => false,
        });
        if !starting {
            return match self.state() {
                SessionState::Active => Ok(()),
                other => Err(UaError::InvalidState(format!("Session is {:?}", other))),
            };
        }

        let channel = self.channel();
        let result = match channel.open().await {
            Ok(()) => self.create_and_activate(&channel).await,
            Err(error) => Err(error),
        };
        match result {
            Ok(()) => {
                self.set_state(SessionState::Active);
                if let Some(info) = self.info() {
                    log::info!("Session {} active", info.session_id);
                }
                self.ensure_publishing();
                Ok(())
            }
            Err(error) => {
                log::error!("Failed to open session: {}", error);
                self.set_state(SessionState::Faulted);
                Err(error)
            }
        }
    }

    async fn create_and_activate(&self, channel: &SecureChannel) -> UaResult<()> {
        self.inner.state.send_replace(SessionState::Creating);
        let info = self.create_session(channel).await?;
        *self.lock_info() = Some(info);
        self.set_state(SessionState::Activating);
        self.activate_session(channel).await
    }

    async fn create_session(&self, channel: &SecureChannel) -> UaResult<SessionInfo> {
        let config = &self.inner.config;
        let endpoint = &self.inner.channel_config.endpoint;
        let timeout = config.request_timeout();
        let client_nonce = generate_nonce(CLIENT_NONCE_LENGTH)?;
        let client_certificate = channel
            .local_identity()
            .map_or_else(ByteString::null, |local| local.certificate.to_byte_string());
        let request = CreateSessionRequest {
            request_header: RequestHeader::new(NodeId::null(), self.next_handle(), timeout_hint(timeout)),
            client_description: ApplicationDescription::client(
                &config.application_uri,
                &config.product_uri,
                &config.application_name,
            ),
            server_uri: endpoint.server.application_uri.clone(),
            endpoint_url: endpoint.endpoint_url.clone(),
            session_name: UaString::from(config.session_name.as_str()),
            client_nonce: ByteString::from(client_nonce.clone()),
            client_certificate: client_certificate.clone(),
            requested_session_timeout: config.session_timeout_ms as f64,
            max_response_message_size: config.max_message_size,
        };
        let response = channel
            .send(&request, timeout, None)
            .await
            .map_err(activation_error)?;
        if channel.security_mode() != MessageSecurityMode::None {
            verify_server_signature(channel, &response, client_certificate.as_slice(), &client_nonce)?;
        }
        log::debug!(
            "Created session {}, revised timeout {} ms",
            response.session_id,
            response.revised_session_timeout
        );
        Ok(SessionInfo {
            session_id: response.session_id,
            authentication_token: response.authentication_token,
            revised_timeout: Duration::from_secs_f64(response.revised_session_timeout.max(0.0) / 1000.0),
            max_request_message_size: response.max_request_message_size,
            server_nonce: response.server_nonce.as_slice().to_vec(),
            server_certificate: response.server_certificate,
        })
    }

    /// Activate the current session on `channel`
    async fn activate_session(&self, channel: &SecureChannel) -> UaResult<()> {
        let (authentication_token, server_certificate, server_nonce) = {
            let info = self.lock_info();
            let info = info
                .as_ref()
                .ok_or_else(|| UaError::InvalidState("No session to activate".to_string()))?;
            (
                info.authentication_token.clone(),
                info.server_certificate.clone(),
                info.server_nonce.clone(),
            )
        };
        let server_certificate = Certificate::from_byte_string(&server_certificate)
            .ok()
            .flatten()
            .or_else(|| channel.server_certificate());

        let client_signature = if channel.security_mode() == MessageSecurityMode::None {
            SignatureData::default()
        } else {
            let local = channel
                .local_identity()
                .ok_or_else(|| UaError::SecurityChecksFailed("No application instance certificate".to_string()))?;
            let mut data = server_certificate
                .as_ref()
                .map(|c| c.as_der().to_vec())
                .unwrap_or_default();
            data.extend_from_slice(&server_nonce);
            SignatureData::new(
                channel.security_policy().asymmetric_signature_algorithm(),
                local.private_key.sign_sha256(&data)?,
            )
        };
        let (user_identity_token, user_token_signature) = identity::identity_token(
            &self.inner.identity,
            &self.inner.channel_config.endpoint,
            channel.security_policy(),
            server_certificate.as_ref(),
            &server_nonce,
        )?;

        let timeout = self.inner.config.request_timeout();
        let request = ActivateSessionRequest {
            request_header: RequestHeader::new(authentication_token, self.next_handle(), timeout_hint(timeout)),
            client_signature,
            user_identity_token,
            user_token_signature,
            ..Default::default()
        };
        let response = channel
            .send(&request, timeout, None)
            .await
            .map_err(activation_error)?;
        if let Some(info) = self.lock_info().as_mut() {
            info.server_nonce = response.server_nonce.as_slice().to_vec();
        }
        log::debug!("Session activated as {:?}", self.inner.identity);
        Ok(())
    }

    /// Send a service request on the session
    ///
    /// The request header is filled in here. A non-zero timeout hint already
    /// set on the request is used as its timeout; otherwise the configured
    /// request timeout applies.
    ///
    /// # Errors
    /// - `InvalidState` when the session is not active
    /// - `Session` when the server reports the session as gone
    /// - any error of `SecureChannel::send`
    pub async fn send<R: ServiceRequest>(&self, request: R) -> UaResult<R::Response> {
        self.send_with_cancel(request, None).await
    }

    /// `send` that can be abandoned through `cancel`
    pub async fn send_with_cancel<R: ServiceRequest>(
        &self,
        mut request: R,
        cancel: Option<&CancellationToken>,
    ) -> UaResult<R::Response> {
        let (channel, timeout) = self.prepare_request(&mut request)?;
        channel
            .send(&request, timeout, cancel)
            .await
            .map_err(|error| self.map_error(error))
    }

    /// Fill the request header; returns the channel to send on and the timeout
    pub(crate) fn prepare_request<R: ServiceRequest>(&self, request: &mut R) -> UaResult<(SecureChannel, Duration)> {
        let state = self.state();
        if state != SessionState::Active {
            return Err(UaError::InvalidState(format!("Session is {:?}", state)));
        }
        let hint = request.request_header().timeout_hint;
        let timeout = if hint > 0 {
            Duration::from_millis(u64::from(hint))
        } else {
            self.inner.config.request_timeout()
        };
        let authentication_token = self.authentication_token();
        let request_handle = self.next_handle();
        let header = request.request_header_mut();
        header.authentication_token = authentication_token;
        header.timestamp = DateTime::now();
        header.request_handle = request_handle;
        header.timeout_hint = timeout_hint(timeout);
        Ok((self.channel(), timeout))
    }

    /// Fault the session when the server says it is gone
    pub(crate) fn map_error(&self, error: UaError) -> UaError {
        match error {
            UaError::ServiceFault(status) if status.is_session_error() => {
                let faulted = self.inner.state.send_if_modified(|state| {
                    if *state == SessionState::Active {
                        *state = SessionState::Faulted;
                        true
                    } else {
                        false
                    }
                });
                if faulted {
                    log::error!("Session faulted: {}", status);
                }
                UaError::Session(status)
            }
            other => other,
        }
    }

    /// Read the Value attribute of `nodes`
    pub async fn read(&self, nodes: &[NodeId]) -> UaResult<Vec<DataValue>> {
        let request = ReadRequest {
            nodes_to_read: nodes.iter().cloned().map(ReadValueId::value_of).collect(),
            ..Default::default()
        };
        Ok(self.send(request).await?.results)
    }

    /// Close the session and its channel
    ///
    /// Stops the publish loop, sends CloseSession when the session is active
    /// and closes the channel. Local subscription state is dropped, which ends
    /// every subscriber stream. Closing a closed session is a no-op.
    pub async fn close(&self, delete_subscriptions: bool) -> UaResult<()> {
        let mut previous = None;
        self.inner.state.send_if_modified(|state| match *state {
            SessionState::Closed | SessionState::Closing => false,
            other => {
                previous = Some(other);
                *state = SessionState::Closing;
                true
            }
        });
        let Some(previous) = previous else {
            return Ok(());
        };

        self.stop_publishing();
        let channel = self.channel();
        if previous == SessionState::Active {
            let timeout = self.inner.config.request_timeout();
            let request = CloseSessionRequest {
                request_header: RequestHeader::new(
                    self.authentication_token(),
                    self.next_handle(),
                    timeout_hint(timeout),
                ),
                delete_subscriptions,
            };
            if let Err(error) = channel.send(&request, timeout, None).await {
                log::warn!("CloseSession failed: {}", error);
            }
        }
        self.subscriptions().subscriptions.clear();
        *self.lock_info() = None;
        let result = channel.close().await;
        self.set_state(SessionState::Closed);
        log::info!("Session closed");
        result
    }

    /// Restore the session over a new channel
    ///
    /// The current channel is aborted and a new one opened. The existing
    /// session is reactivated if the server still has it; otherwise a new
    /// session is created and every subscription transferred to it.
    /// Subscriptions that cannot be transferred end with `StatusChanged`.
    ///
    /// # Errors
    /// Any error of opening the channel or activating the session; the
    /// session is then `Faulted` and `reconnect` may be called again.
    pub async fn reconnect(&self) -> UaResult<()> {
        let mut allowed = false;
        self.inner.state.send_if_modified(|state| match state {
            SessionState::Active | SessionState::Faulted => {
                *state = SessionState::Activating;
                allowed = true;
                true
            }
            _ => false,
        });
        if !allowed {
            return Err(UaError::InvalidState(format!("Cannot reconnect a {:?} session", self.state())));
        }

        self.stop_publishing();
        self.channel().abort().await;
        let channel = SecureChannel::new(self.inner.channel_config.clone());
        *self.inner.channel.write().unwrap_or_else(|e| e.into_inner()) = channel.clone();

        let recreated = match self.restore(&channel).await {
            Ok(recreated) => recreated,
            Err(error) => {
                log::error!("Reconnect failed: {}", error);
                self.set_state(SessionState::Faulted);
                return Err(error);
            }
        };
        self.set_state(SessionState::Active);
        if recreated {
            let ids = self.subscription_ids();
            if !ids.is_empty() {
                if let Err(error) = self.transfer_subscriptions(&ids, false).await {
                    log::error!("Transferring subscriptions failed: {}", error);
                    self.discard_subscriptions(error.status_code());
                }
            }
        }
        self.ensure_publishing();
        log::info!("Session reconnected");
        Ok(())
    }

    /// Open `channel` and reactivate or recreate the session; true when recreated
    async fn restore(&self, channel: &SecureChannel) -> UaResult<bool> {
        channel.open().await?;
        if self.lock_info().is_some() {
            match self.activate_session(channel).await {
                Ok(()) => {
                    log::info!("Reactivated existing session");
                    return Ok(false);
                }
                Err(UaError::ServiceFault(status)) if status.is_session_error() => {
                    log::warn!("Server no longer knows the session ({}), creating a new one", status);
                }
                Err(error) => return Err(error),
            }
        }
        self.create_and_activate(channel).await?;
        Ok(true)
    }
}

/// Check the server's proof of possession of its certificate
fn verify_server_signature(
    channel: &SecureChannel,
    response: &CreateSessionResponse,
    client_certificate: &[u8],
    client_nonce: &[u8],
) -> UaResult<()> {
    let certificate = channel
        .server_certificate()
        .ok_or_else(|| UaError::SecurityChecksFailed("Secured channel without server certificate".to_string()))?;
    if !response.server_certificate.is_null() && response.server_certificate.as_slice() != certificate.as_der() {
        return Err(UaError::SecurityChecksFailed(
            "CreateSession certificate differs from the endpoint certificate".to_string(),
        ));
    }
    if response.server_nonce.len() < CLIENT_NONCE_LENGTH {
        return Err(UaError::SecurityChecksFailed(format!(
            "Server nonce of {} bytes is too short",
            response.server_nonce.len()
        )));
    }
    let mut data = client_certificate.to_vec();
    data.extend_from_slice(client_nonce);
    certificate
        .public_key()?
        .verify_sha256(&data, response.server_signature.signature.as_slice())
        .map_err(|_| UaError::SecurityChecksFailed("Server signature does not verify".to_string()))
}
