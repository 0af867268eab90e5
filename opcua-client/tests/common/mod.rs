//! In-process OPC UA server for the client integration tests
//!
//! Speaks UA-TCP with SecurityPolicy None over a `MemoryConnector` and keeps
//! just enough session and subscription state to drive the client. Tests
//! steer it through the `FakeServer` handle: push notifications, hold some
//! back, forget sessions or drop every connection.

#![allow(dead_code)]

use anyhow::{bail, Result};
use opcua_binary::{DecodingOptions, ExtensionObjectExt, Structure};
use opcua_client::{ClientBuilder, SubscriptionEvent};
use opcua_conversation::{
    encode_handshake, read_frame, write_frame, AcknowledgeMessage, AssembledMessage, AssemblyOutcome, ChunkType,
    Chunker, Frame, MessageAssembler, MessageType, Role, SecureContext, SecurityToken, TransportLimits,
    PROTOCOL_VERSION,
};
use opcua_core::{ByteString, DataValue, DateTime, NodeId, StatusCode, UaString, Variant};
use opcua_security::{MessageSecurityMode, SecurityPolicy};
use opcua_services::{
    decode_message, encode_message, peek_type_id, ActivateSessionRequest, ActivateSessionResponse,
    ApplicationDescription, ChannelSecurityToken, CloseSessionRequest, CloseSessionResponse, CreateMonitoredItemsRequest,
    CreateMonitoredItemsResponse, CreateSessionRequest, CreateSessionResponse, CreateSubscriptionRequest,
    CreateSubscriptionResponse, DeleteMonitoredItemsRequest, DeleteMonitoredItemsResponse, DeleteSubscriptionsRequest,
    DeleteSubscriptionsResponse, EndpointDescription, ModifyMonitoredItemsRequest, ModifyMonitoredItemsResponse,
    ModifySubscriptionRequest, ModifySubscriptionResponse, MonitoredItemCreateResult, MonitoredItemModifyResult,
    MonitoredItemNotification, NotificationMessage, OpenSecureChannelRequest, OpenSecureChannelResponse, PublishRequest,
    PublishResponse, ReadRequest, ReadResponse, RepublishRequest, RepublishResponse, RequestHeader, ResponseHeader,
    SecurityMode, SecurityTokenRequestType, ServiceFault, SetMonitoringModeRequest, SetMonitoringModeResponse,
    SetPublishingModeRequest, SetPublishingModeResponse, TransferResult, TransferSubscriptionsRequest,
    TransferSubscriptionsResponse, UserNameIdentityToken, UserTokenPolicy, UserTokenType,
};
use opcua_transport::{MemoryConnector, MemoryListener};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{DuplexStream, WriteHalf};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

pub const ENDPOINT_URL: &str = "opc.tcp://fake-server:4840";
/// Reads of this node are never answered
pub const HANG_NODE: &str = "Hang";
/// Reads of this node are answered with an abort chunk
pub const ABORT_NODE: &str = "Abort";
/// Monitoring this node fails with BadNodeIdUnknown
pub const MISSING_NODE: &str = "Missing";

const BUFFER_SIZE: u32 = 65_535;
const WAIT: Duration = Duration::from_secs(5);

pub fn node(name: &str) -> NodeId {
    NodeId::string(1, name)
}

/// Unsecured endpoint offering anonymous and user name tokens
pub fn endpoint() -> EndpointDescription {
    EndpointDescription {
        endpoint_url: UaString::from(ENDPOINT_URL),
        server: ApplicationDescription::client("urn:fake-server", "urn:fake-server", "Fake Server"),
        server_certificate: ByteString::null(),
        security_mode: SecurityMode::None,
        security_policy_uri: UaString::from(SecurityPolicy::None.uri()),
        user_identity_tokens: vec![
            UserTokenPolicy::new("anonymous", UserTokenType::Anonymous, None),
            UserTokenPolicy::new("username", UserTokenType::UserName, None),
        ],
        transport_profile_uri: UaString::null(),
        security_level: 0,
    }
}

/// Next subscription event, failing the test after a few seconds
pub async fn next_event(events: &mut UnboundedReceiver<SubscriptionEvent>) -> SubscriptionEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("subscription event in time")
        .expect("subscription still alive")
}

/// Poll `condition` until it holds, failing the test after a few seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition met in time");
}

enum Reply {
    Response(Vec<u8>),
    /// Answered later from the publish queue
    Parked,
    /// Never answered
    Silent,
    /// An intermediate chunk followed by an abort chunk
    Abort(StatusCode),
}

type Outbound = UnboundedSender<(u32, Reply)>;

struct SessionRecord {
    activated: bool,
    connection: u64,
}

struct FakeSubscription {
    owner: NodeId,
    next_sequence: u32,
    /// monitored item id -> client handle
    items: BTreeMap<u32, u32>,
    queued: VecDeque<NotificationMessage>,
    /// Sent or withheld messages not yet acknowledged
    retained: BTreeMap<u32, NotificationMessage>,
}

impl FakeSubscription {
    fn take_sequence(&mut self) -> u32 {
        let n = self.next_sequence;
        self.next_sequence += 1;
        n
    }

    fn data_change(&mut self, value: &Variant) -> NotificationMessage {
        let sequence_number = self.take_sequence();
        let items = self
            .items
            .values()
            .map(|&client_handle| MonitoredItemNotification {
                client_handle,
                value: DataValue::new(value.clone()),
            })
            .collect();
        NotificationMessage::data_change(sequence_number, items).expect("data change encodes")
    }
}

struct ParkedPublish {
    connection: u64,
    session: NodeId,
    request_id: u32,
    request_handle: u32,
    results: Vec<StatusCode>,
    outbound: Outbound,
}

struct ServerState {
    connections: u64,
    next_channel_id: u32,
    next_session: u32,
    next_subscription: u32,
    next_item: u32,
    sessions: HashMap<NodeId, SessionRecord>,
    subscriptions: BTreeMap<u32, FakeSubscription>,
    parked: Vec<ParkedPublish>,
    values: HashMap<NodeId, Variant>,
    rejected_users: HashSet<String>,
    requests: Vec<&'static str>,
    kill: CancellationToken,
}

fn respond<T: Structure>(response: &T) -> Result<Reply> {
    Ok(Reply::Response(encode_message(response)?))
}

fn fault(request_handle: u32, status: StatusCode) -> Result<Reply> {
    respond(&ServiceFault::new(request_handle, status))
}

fn is<T: Structure>(type_id: &NodeId) -> bool {
    *type_id == T::BINARY_ENCODING_ID
}

macro_rules! session_or_fault {
    ($server:expr, $request:expr) => {
        match $server.session_of(&$request.request_header) {
            Ok(session) => session,
            Err(status) => return fault($request.request_header.request_handle, status),
        }
    };
}

impl ServerState {
    fn new() -> Self {
        Self {
            connections: 0,
            next_channel_id: 1,
            next_session: 1,
            next_subscription: 100,
            next_item: 1000,
            sessions: HashMap::new(),
            subscriptions: BTreeMap::new(),
            parked: Vec::new(),
            values: HashMap::new(),
            rejected_users: HashSet::new(),
            requests: Vec::new(),
            kill: CancellationToken::new(),
        }
    }

    fn disconnect(&mut self, connection: u64) {
        self.parked.retain(|p| p.connection != connection);
    }

    fn session_of(&self, header: &RequestHeader) -> Result<NodeId, StatusCode> {
        match self.sessions.get(&header.authentication_token) {
            Some(session) if session.activated => Ok(header.authentication_token.clone()),
            Some(_) => Err(StatusCode::BAD_SESSION_NOT_ACTIVATED),
            None => Err(StatusCode::BAD_SESSION_ID_INVALID),
        }
    }

    fn owned_mut(&mut self, session: &NodeId, subscription_id: u32) -> Option<&mut FakeSubscription> {
        self.subscriptions
            .get_mut(&subscription_id)
            .filter(|s| s.owner == *session)
    }

    fn handle(&mut self, body: &[u8], request_id: u32, connection: u64, outbound: &Outbound) -> Result<Reply> {
        let options = DecodingOptions::default();
        let type_id = peek_type_id(body, options)?;
        if is::<CreateSessionRequest>(&type_id) {
            self.requests.push("CreateSession");
            self.create_session(decode_message(body, options)?, connection)
        } else if is::<ActivateSessionRequest>(&type_id) {
            self.requests.push("ActivateSession");
            self.activate_session(decode_message(body, options)?, connection)
        } else if is::<CloseSessionRequest>(&type_id) {
            self.requests.push("CloseSession");
            self.close_session(decode_message(body, options)?)
        } else if is::<ReadRequest>(&type_id) {
            self.requests.push("Read");
            self.read(decode_message(body, options)?)
        } else if is::<CreateSubscriptionRequest>(&type_id) {
            self.requests.push("CreateSubscription");
            self.create_subscription(decode_message(body, options)?)
        } else if is::<ModifySubscriptionRequest>(&type_id) {
            self.requests.push("ModifySubscription");
            self.modify_subscription(decode_message(body, options)?)
        } else if is::<SetPublishingModeRequest>(&type_id) {
            self.requests.push("SetPublishingMode");
            self.set_publishing_mode(decode_message(body, options)?)
        } else if is::<DeleteSubscriptionsRequest>(&type_id) {
            self.requests.push("DeleteSubscriptions");
            self.delete_subscriptions(decode_message(body, options)?)
        } else if is::<CreateMonitoredItemsRequest>(&type_id) {
            self.requests.push("CreateMonitoredItems");
            self.create_monitored_items(decode_message(body, options)?)
        } else if is::<ModifyMonitoredItemsRequest>(&type_id) {
            self.requests.push("ModifyMonitoredItems");
            self.modify_monitored_items(decode_message(body, options)?)
        } else if is::<SetMonitoringModeRequest>(&type_id) {
            self.requests.push("SetMonitoringMode");
            self.set_monitoring_mode(decode_message(body, options)?)
        } else if is::<DeleteMonitoredItemsRequest>(&type_id) {
            self.requests.push("DeleteMonitoredItems");
            self.delete_monitored_items(decode_message(body, options)?)
        } else if is::<PublishRequest>(&type_id) {
            self.requests.push("Publish");
            self.publish(decode_message(body, options)?, request_id, connection, outbound)
        } else if is::<RepublishRequest>(&type_id) {
            self.requests.push("Republish");
            self.republish(decode_message(body, options)?)
        } else if is::<TransferSubscriptionsRequest>(&type_id) {
            self.requests.push("TransferSubscriptions");
            self.transfer_subscriptions(decode_message(body, options)?)
        } else {
            self.requests.push("Unsupported");
            fault(0, StatusCode::BAD_SERVICE_UNSUPPORTED)
        }
    }

    fn create_session(&mut self, request: CreateSessionRequest, connection: u64) -> Result<Reply> {
        let n = self.next_session;
        self.next_session += 1;
        let authentication_token = NodeId::numeric(2, n);
        self.sessions.insert(
            authentication_token.clone(),
            SessionRecord {
                activated: false,
                connection,
            },
        );
        respond(&CreateSessionResponse {
            response_header: ResponseHeader::good(request.request_header.request_handle),
            session_id: NodeId::numeric(1, n),
            authentication_token,
            revised_session_timeout: request.requested_session_timeout,
            server_nonce: ByteString::from(vec![n as u8; 32]),
            ..Default::default()
        })
    }

    fn activate_session(&mut self, request: ActivateSessionRequest, connection: u64) -> Result<Reply> {
        let handle = request.request_header.request_handle;
        let token = &request.user_identity_token;
        if token.is_structure::<UserNameIdentityToken>() {
            let token: UserNameIdentityToken = token.decode_structure(DecodingOptions::default())?;
            if self.rejected_users.contains(token.user_name.as_ref_or_empty()) {
                return fault(handle, StatusCode::BAD_USER_ACCESS_DENIED);
            }
        }
        let Some(session) = self.sessions.get_mut(&request.request_header.authentication_token) else {
            return fault(handle, StatusCode::BAD_SESSION_ID_INVALID);
        };
        session.activated = true;
        session.connection = connection;
        respond(&ActivateSessionResponse {
            response_header: ResponseHeader::good(handle),
            server_nonce: ByteString::from(vec![0xA5; 32]),
            ..Default::default()
        })
    }

    fn close_session(&mut self, request: CloseSessionRequest) -> Result<Reply> {
        let session = session_or_fault!(self, request);
        self.sessions.remove(&session);
        if request.delete_subscriptions {
            self.subscriptions.retain(|_, s| s.owner != session);
        }
        respond(&CloseSessionResponse {
            response_header: ResponseHeader::good(request.request_header.request_handle),
        })
    }

    fn read(&mut self, request: ReadRequest) -> Result<Reply> {
        session_or_fault!(self, request);
        let mut results = Vec::with_capacity(request.nodes_to_read.len());
        for item in &request.nodes_to_read {
            if item.node_id == node(HANG_NODE) {
                return Ok(Reply::Silent);
            }
            if item.node_id == node(ABORT_NODE) {
                return Ok(Reply::Abort(StatusCode::BAD_RESPONSE_TOO_LARGE));
            }
            results.push(match self.values.get(&item.node_id) {
                Some(value) => DataValue::new(value.clone()),
                None => DataValue {
                    status: Some(StatusCode::BAD_NODE_ID_UNKNOWN),
                    ..Default::default()
                },
            });
        }
        respond(&ReadResponse {
            response_header: ResponseHeader::good(request.request_header.request_handle),
            results,
            ..Default::default()
        })
    }

    fn create_subscription(&mut self, request: CreateSubscriptionRequest) -> Result<Reply> {
        let session = session_or_fault!(self, request);
        let subscription_id = self.next_subscription;
        self.next_subscription += 1;
        self.subscriptions.insert(
            subscription_id,
            FakeSubscription {
                owner: session,
                next_sequence: 1,
                items: BTreeMap::new(),
                queued: VecDeque::new(),
                retained: BTreeMap::new(),
            },
        );
        respond(&CreateSubscriptionResponse {
            response_header: ResponseHeader::good(request.request_header.request_handle),
            subscription_id,
            revised_publishing_interval: request.requested_publishing_interval.max(50.0),
            revised_lifetime_count: request.requested_lifetime_count,
            revised_max_keep_alive_count: request.requested_max_keep_alive_count,
        })
    }

    fn modify_subscription(&mut self, request: ModifySubscriptionRequest) -> Result<Reply> {
        let session = session_or_fault!(self, request);
        let handle = request.request_header.request_handle;
        if self.owned_mut(&session, request.subscription_id).is_none() {
            return fault(handle, StatusCode::BAD_SUBSCRIPTION_ID_INVALID);
        }
        respond(&ModifySubscriptionResponse {
            response_header: ResponseHeader::good(handle),
            revised_publishing_interval: request.requested_publishing_interval.max(50.0),
            revised_lifetime_count: request.requested_lifetime_count,
            revised_max_keep_alive_count: request.requested_max_keep_alive_count,
        })
    }

    fn subscription_results(&mut self, session: &NodeId, ids: &[u32]) -> Vec<StatusCode> {
        ids.iter()
            .map(|&id| {
                if self.owned_mut(session, id).is_some() {
                    StatusCode::GOOD
                } else {
                    StatusCode::BAD_SUBSCRIPTION_ID_INVALID
                }
            })
            .collect()
    }

    fn set_publishing_mode(&mut self, request: SetPublishingModeRequest) -> Result<Reply> {
        let session = session_or_fault!(self, request);
        let results = self.subscription_results(&session, &request.subscription_ids);
        respond(&SetPublishingModeResponse {
            response_header: ResponseHeader::good(request.request_header.request_handle),
            results,
            ..Default::default()
        })
    }

    fn delete_subscriptions(&mut self, request: DeleteSubscriptionsRequest) -> Result<Reply> {
        let session = session_or_fault!(self, request);
        let results = self.subscription_results(&session, &request.subscription_ids);
        for (id, status) in request.subscription_ids.iter().zip(&results) {
            if status.is_good() {
                self.subscriptions.remove(id);
            }
        }
        respond(&DeleteSubscriptionsResponse {
            response_header: ResponseHeader::good(request.request_header.request_handle),
            results,
            ..Default::default()
        })
    }

    fn create_monitored_items(&mut self, request: CreateMonitoredItemsRequest) -> Result<Reply> {
        let session = session_or_fault!(self, request);
        let handle = request.request_header.request_handle;
        let mut next_item = self.next_item;
        let mut initial = Vec::new();
        let Some(subscription) = self.owned_mut(&session, request.subscription_id) else {
            return fault(handle, StatusCode::BAD_SUBSCRIPTION_ID_INVALID);
        };
        let mut results = Vec::with_capacity(request.items_to_create.len());
        for item in &request.items_to_create {
            if item.item_to_monitor.node_id == node(MISSING_NODE) {
                results.push(MonitoredItemCreateResult {
                    status_code: StatusCode::BAD_NODE_ID_UNKNOWN,
                    ..Default::default()
                });
                continue;
            }
            let monitored_item_id = next_item;
            next_item += 1;
            let client_handle = item.requested_parameters.client_handle;
            subscription.items.insert(monitored_item_id, client_handle);
            initial.push((client_handle, item.item_to_monitor.node_id.clone()));
            results.push(MonitoredItemCreateResult {
                status_code: StatusCode::GOOD,
                monitored_item_id,
                revised_sampling_interval: item.requested_parameters.sampling_interval.max(0.0),
                revised_queue_size: item.requested_parameters.queue_size.max(1),
                ..Default::default()
            });
        }
        self.next_item = next_item;

        if !initial.is_empty() {
            let notifications = initial
                .into_iter()
                .map(|(client_handle, node_id)| MonitoredItemNotification {
                    client_handle,
                    value: DataValue::new(self.values.get(&node_id).cloned().unwrap_or(Variant::Double(0.0))),
                })
                .collect();
            if let Some(subscription) = self.subscriptions.get_mut(&request.subscription_id) {
                let sequence_number = subscription.take_sequence();
                let message = NotificationMessage::data_change(sequence_number, notifications)?;
                subscription.retained.insert(sequence_number, message.clone());
                subscription.queued.push_back(message);
            }
            self.dispatch();
        }
        respond(&CreateMonitoredItemsResponse {
            response_header: ResponseHeader::good(handle),
            results,
            ..Default::default()
        })
    }

    fn item_results(&mut self, session: &NodeId, subscription_id: u32, ids: &[u32]) -> Option<Vec<StatusCode>> {
        let subscription = self.owned_mut(session, subscription_id)?;
        Some(
            ids.iter()
                .map(|id| {
                    if subscription.items.contains_key(id) {
                        StatusCode::GOOD
                    } else {
                        StatusCode::BAD_MONITORED_ITEM_ID_INVALID
                    }
                })
                .collect(),
        )
    }

    fn modify_monitored_items(&mut self, request: ModifyMonitoredItemsRequest) -> Result<Reply> {
        let session = session_or_fault!(self, request);
        let handle = request.request_header.request_handle;
        let ids: Vec<u32> = request.items_to_modify.iter().map(|i| i.monitored_item_id).collect();
        let Some(statuses) = self.item_results(&session, request.subscription_id, &ids) else {
            return fault(handle, StatusCode::BAD_SUBSCRIPTION_ID_INVALID);
        };
        let results = statuses
            .into_iter()
            .zip(&request.items_to_modify)
            .map(|(status_code, item)| MonitoredItemModifyResult {
                status_code,
                revised_sampling_interval: item.requested_parameters.sampling_interval.max(0.0),
                revised_queue_size: item.requested_parameters.queue_size.max(1),
                ..Default::default()
            })
            .collect();
        respond(&ModifyMonitoredItemsResponse {
            response_header: ResponseHeader::good(handle),
            results,
            ..Default::default()
        })
    }

    fn set_monitoring_mode(&mut self, request: SetMonitoringModeRequest) -> Result<Reply> {
        let session = session_or_fault!(self, request);
        let handle = request.request_header.request_handle;
        let Some(results) = self.item_results(&session, request.subscription_id, &request.monitored_item_ids) else {
            return fault(handle, StatusCode::BAD_SUBSCRIPTION_ID_INVALID);
        };
        respond(&SetMonitoringModeResponse {
            response_header: ResponseHeader::good(handle),
            results,
            ..Default::default()
        })
    }

    fn delete_monitored_items(&mut self, request: DeleteMonitoredItemsRequest) -> Result<Reply> {
        let session = session_or_fault!(self, request);
        let handle = request.request_header.request_handle;
        let Some(results) = self.item_results(&session, request.subscription_id, &request.monitored_item_ids) else {
            return fault(handle, StatusCode::BAD_SUBSCRIPTION_ID_INVALID);
        };
        if let Some(subscription) = self.owned_mut(&session, request.subscription_id) {
            for id in &request.monitored_item_ids {
                subscription.items.remove(id);
            }
        }
        respond(&DeleteMonitoredItemsResponse {
            response_header: ResponseHeader::good(handle),
            results,
            ..Default::default()
        })
    }

    fn publish(&mut self, request: PublishRequest, request_id: u32, connection: u64, outbound: &Outbound) -> Result<Reply> {
        let session = session_or_fault!(self, request);
        let results = request
            .subscription_acknowledgements
            .iter()
            .map(|ack| match self.owned_mut(&session, ack.subscription_id) {
                Some(s) => {
                    if s.retained.remove(&ack.sequence_number).is_some() {
                        StatusCode::GOOD
                    } else {
                        StatusCode::BAD_SEQUENCE_NUMBER_UNKNOWN
                    }
                }
                None => StatusCode::BAD_SUBSCRIPTION_ID_INVALID,
            })
            .collect();
        if !self.subscriptions.values().any(|s| s.owner == session) {
            return fault(request.request_header.request_handle, StatusCode::BAD_NO_SUBSCRIPTION);
        }
        self.parked.push(ParkedPublish {
            connection,
            session,
            request_id,
            request_handle: request.request_header.request_handle,
            results,
            outbound: outbound.clone(),
        });
        self.dispatch();
        Ok(Reply::Parked)
    }

    /// Answer parked Publish requests with queued notifications
    fn dispatch(&mut self) {
        let ids: Vec<u32> = self.subscriptions.keys().copied().collect();
        for id in ids {
            loop {
                let Some(subscription) = self.subscriptions.get_mut(&id) else { break };
                let owner = subscription.owner.clone();
                let Some(index) = self.parked.iter().position(|p| p.session == owner) else { break };
                let Some(message) = subscription.queued.pop_front() else { break };
                let parked = self.parked.remove(index);
                let response = PublishResponse {
                    response_header: ResponseHeader::good(parked.request_handle),
                    subscription_id: id,
                    available_sequence_numbers: subscription.retained.keys().copied().collect(),
                    more_notifications: !subscription.queued.is_empty(),
                    notification_message: message.clone(),
                    results: parked.results,
                    ..Default::default()
                };
                let sent = encode_message(&response)
                    .map(|body| parked.outbound.send((parked.request_id, Reply::Response(body))).is_ok())
                    .unwrap_or(false);
                if !sent {
                    subscription.queued.push_front(message);
                }
            }
        }
    }

    fn republish(&mut self, request: RepublishRequest) -> Result<Reply> {
        let session = session_or_fault!(self, request);
        let handle = request.request_header.request_handle;
        let message = self
            .owned_mut(&session, request.subscription_id)
            .and_then(|s| s.retained.get(&request.retransmit_sequence_number).cloned());
        match message {
            Some(notification_message) => respond(&RepublishResponse {
                response_header: ResponseHeader::good(handle),
                notification_message,
            }),
            None => fault(handle, StatusCode::BAD_MESSAGE_NOT_AVAILABLE),
        }
    }

    fn transfer_subscriptions(&mut self, request: TransferSubscriptionsRequest) -> Result<Reply> {
        let session = session_or_fault!(self, request);
        let results = request
            .subscription_ids
            .iter()
            .map(|id| match self.subscriptions.get_mut(id) {
                Some(subscription) => {
                    subscription.owner = session.clone();
                    TransferResult {
                        status_code: StatusCode::GOOD,
                        available_sequence_numbers: subscription.retained.keys().copied().collect(),
                    }
                }
                None => TransferResult {
                    status_code: StatusCode::BAD_SUBSCRIPTION_ID_INVALID,
                    available_sequence_numbers: Vec::new(),
                },
            })
            .collect();
        self.dispatch();
        respond(&TransferSubscriptionsResponse {
            response_header: ResponseHeader::good(request.request_header.request_handle),
            results,
            ..Default::default()
        })
    }
}

fn lock(state: &Mutex<ServerState>) -> MutexGuard<'_, ServerState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Handle of a running fake server
pub struct FakeServer {
    pub connector: MemoryConnector,
    state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    pub fn start() -> Self {
        let (connector, listener) = MemoryConnector::pair();
        let state = Arc::new(Mutex::new(ServerState::new()));
        tokio::spawn(accept_loop(listener, state.clone()));
        Self { connector, state }
    }

    /// Client builder pointed at this server
    pub fn client(&self) -> ClientBuilder {
        ClientBuilder::new()
            .application_uri("urn:opcua-rs:test-client")
            .request_timeout(WAIT)
            .endpoint(endpoint())
            .connector(Arc::new(self.connector.clone()))
    }

    pub fn set_value(&self, name: &str, value: Variant) {
        lock(&self.state).values.insert(node(name), value);
    }

    pub fn reject_user(&self, user: &str) {
        lock(&self.state).rejected_users.insert(user.to_string());
    }

    /// Drop every session, keeping their subscriptions for transfer
    pub fn forget_sessions(&self) {
        lock(&self.state).sessions.clear();
    }

    /// Close every open connection without a protocol goodbye
    pub fn drop_connections(&self) {
        let mut state = lock(&self.state);
        let kill = std::mem::replace(&mut state.kill, CancellationToken::new());
        kill.cancel();
    }

    /// Publish a data change for every item of `subscription_id`
    pub fn notify(&self, subscription_id: u32, value: Variant) -> u32 {
        let mut state = lock(&self.state);
        let subscription = state.subscriptions.get_mut(&subscription_id).expect("known subscription");
        let message = subscription.data_change(&value);
        let sequence_number = message.sequence_number;
        subscription.retained.insert(sequence_number, message.clone());
        subscription.queued.push_back(message);
        state.dispatch();
        sequence_number
    }

    /// Consume a sequence number without publishing it; only Republish returns it
    pub fn notify_withheld(&self, subscription_id: u32, value: Variant) -> u32 {
        let mut state = lock(&self.state);
        let subscription = state.subscriptions.get_mut(&subscription_id).expect("known subscription");
        let message = subscription.data_change(&value);
        let sequence_number = message.sequence_number;
        subscription.retained.insert(sequence_number, message);
        sequence_number
    }

    /// Make a retained notification unavailable for Republish
    pub fn forget_notification(&self, subscription_id: u32, sequence_number: u32) {
        if let Some(subscription) = lock(&self.state).subscriptions.get_mut(&subscription_id) {
            subscription.retained.remove(&sequence_number);
        }
    }

    /// Publish a status change that ends the subscription
    pub fn end_subscription(&self, subscription_id: u32, status: StatusCode) {
        let mut state = lock(&self.state);
        let subscription = state.subscriptions.get_mut(&subscription_id).expect("known subscription");
        let sequence_number = subscription.take_sequence();
        let message = NotificationMessage::status_change(sequence_number, status).expect("status change encodes");
        subscription.queued.push_back(message);
        state.dispatch();
    }

    pub fn subscription_ids(&self) -> Vec<u32> {
        lock(&self.state).subscriptions.keys().copied().collect()
    }

    pub fn request_count(&self, service: &str) -> usize {
        lock(&self.state).requests.iter().filter(|r| **r == service).count()
    }

    pub fn session_count(&self) -> usize {
        lock(&self.state).sessions.len()
    }
}

async fn accept_loop(mut listener: MemoryListener, state: Arc<Mutex<ServerState>>) {
    while let Some((_, stream)) = listener.accept().await {
        tokio::spawn(serve(state.clone(), stream));
    }
}

async fn serve(state: Arc<Mutex<ServerState>>, stream: DuplexStream) {
    let (connection, kill) = {
        let mut state = lock(&state);
        state.connections += 1;
        (state.connections, state.kill.clone())
    };
    if let Err(error) = converse(&state, stream, connection, kill).await {
        log::debug!("Fake server connection {} ended: {}", connection, error);
    }
    lock(&state).disconnect(connection);
}

async fn converse(
    state: &Mutex<ServerState>,
    stream: DuplexStream,
    connection: u64,
    kill: CancellationToken,
) -> Result<()> {
    let (mut reader, mut writer) = tokio::io::split(stream);
    let Frame::Hello(hello) = read_frame(&mut reader, 0).await? else {
        bail!("expected HEL");
    };
    let ack = AcknowledgeMessage {
        protocol_version: PROTOCOL_VERSION,
        receive_buffer_size: hello.send_buffer_size.min(BUFFER_SIZE),
        send_buffer_size: hello.receive_buffer_size.min(BUFFER_SIZE),
        max_message_size: 0,
        max_chunk_count: 0,
    };
    write_frame(&mut writer, &encode_handshake(MessageType::Acknowledge, &ack)?).await?;
    let limits = TransportLimits {
        send_buffer_size: ack.send_buffer_size,
        receive_buffer_size: ack.receive_buffer_size,
        max_send_message_size: hello.max_message_size,
        max_receive_message_size: 0,
        max_send_chunk_count: hello.max_chunk_count,
        max_receive_chunk_count: 0,
    };

    // read_frame is not cancel-safe, so frames arrive through a channel
    let (frame_tx, frames) = mpsc::unbounded_channel();
    let reader_task = tokio::spawn(async move {
        loop {
            let frame = read_frame(&mut reader, 0).await;
            let failed = frame.is_err();
            if frame_tx.send(frame).is_err() || failed {
                break;
            }
        }
    });
    let mut channel = ServerChannel {
        context: SecureContext::new(Role::Server, SecurityPolicy::None, MessageSecurityMode::None)?,
        limits,
        writer,
        token_id: 0,
    };
    let result = channel.run(state, frames, connection, kill).await;
    reader_task.abort();
    result
}

struct ServerChannel {
    context: SecureContext,
    limits: TransportLimits,
    writer: WriteHalf<DuplexStream>,
    token_id: u32,
}

impl ServerChannel {
    async fn run(
        &mut self,
        state: &Mutex<ServerState>,
        mut frames: UnboundedReceiver<opcua_core::UaResult<Frame>>,
        connection: u64,
        kill: CancellationToken,
    ) -> Result<()> {
        let (outbound_tx, mut outbound) = mpsc::unbounded_channel();
        let mut assembler = MessageAssembler::new(0, 0);
        loop {
            let (request_id, reply) = tokio::select! {
                _ = kill.cancelled() => return Ok(()),
                Some(reply) = outbound.recv() => reply,
                frame = frames.recv() => {
                    let Some(Ok(Frame::Chunk(chunk))) = frame else {
                        return Ok(());
                    };
                    let opened = self.context.open_chunk(&chunk)?;
                    let AssemblyOutcome::Complete(message) = assembler.push(opened)? else {
                        continue;
                    };
                    match message.message_type {
                        MessageType::OpenSecureChannel => {
                            self.open(state, message).await?;
                            continue;
                        }
                        MessageType::CloseSecureChannel => return Ok(()),
                        _ => {
                            let reply = lock(state).handle(&message.body, message.request_id, connection, &outbound_tx)?;
                            (message.request_id, reply)
                        }
                    }
                }
            };
            self.write_reply(request_id, reply).await?;
        }
    }

    async fn open(&mut self, state: &Mutex<ServerState>, message: AssembledMessage) -> Result<()> {
        let request: OpenSecureChannelRequest = decode_message(&message.body, DecodingOptions::default())?;
        let channel_id = if request.request_type == SecurityTokenRequestType::Renew {
            self.context.channel_id()
        } else {
            let mut state = lock(state);
            state.next_channel_id += 1;
            state.next_channel_id
        };
        self.token_id += 1;
        let security_token = ChannelSecurityToken {
            channel_id,
            token_id: self.token_id,
            created_at: DateTime::now(),
            revised_lifetime: request.requested_lifetime,
        };
        self.context.install_token(
            SecurityToken::new(channel_id, self.token_id, DateTime::now(), request.requested_lifetime),
            &[],
        )?;
        let response = OpenSecureChannelResponse {
            response_header: ResponseHeader::good(request.request_header.request_handle),
            server_protocol_version: PROTOCOL_VERSION,
            security_token,
            server_nonce: ByteString::null(),
        };
        let chunks = Chunker::encode(
            &mut self.context,
            &self.limits,
            MessageType::OpenSecureChannel,
            message.request_id,
            &encode_message(&response)?,
        )?;
        for chunk in chunks {
            write_frame(&mut self.writer, &chunk).await?;
        }
        Ok(())
    }

    async fn write_reply(&mut self, request_id: u32, reply: Reply) -> Result<()> {
        let chunks = match reply {
            Reply::Parked | Reply::Silent => return Ok(()),
            Reply::Response(body) => {
                Chunker::encode(&mut self.context, &self.limits, MessageType::Message, request_id, &body)?
            }
            Reply::Abort(status) => vec![
                self.context
                    .secure_chunk(MessageType::Message, ChunkType::Intermediate, request_id, &[0u8; 16])?,
                Chunker::abort(&mut self.context, MessageType::Message, request_id, status, "response too large")?,
            ],
        };
        for chunk in chunks {
            write_frame(&mut self.writer, &chunk).await?;
        }
        Ok(())
    }
}
