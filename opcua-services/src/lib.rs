//! OPC UA service messages
//!
//! Request and response structures of the secure channel, session,
//! subscription, monitored item and read services, with the typed
//! request/response pairing used by the client's generic request primitive.
//!
//! ```rust
//! use opcua_services::{decode_message, encode_message, ReadRequest, ReadValueId};
//! use opcua_binary::DecodingOptions;
//! use opcua_core::NodeId;
//!
//! let request = ReadRequest {
//!     nodes_to_read: vec![ReadValueId::value_of(NodeId::numeric(0, 2258))],
//!     ..Default::default()
//! };
//! let body = encode_message(&request).unwrap();
//! let decoded: ReadRequest = decode_message(&body, DecodingOptions::default()).unwrap();
//! assert_eq!(decoded, request);
//! ```

pub mod attribute;
pub mod endpoint;
pub mod enums;
pub mod header;
pub mod identity;
pub mod monitored_item;
pub mod notification;
pub mod secure_channel;
pub mod service;
pub mod session;
pub mod subscription;

pub use attribute::{ReadRequest, ReadResponse, ReadValueId, VALUE_ATTRIBUTE_ID};
pub use endpoint::{
    ApplicationDescription, EndpointDescription, SignatureData, SignedSoftwareCertificate, UserTokenPolicy,
    UATCP_BINARY_PROFILE,
};
pub use enums::{ApplicationType, MonitoringMode, SecurityMode, SecurityTokenRequestType, TimestampsToReturn, UserTokenType};
pub use header::{RequestHeader, ResponseHeader, ServiceFault};
pub use identity::{AnonymousIdentityToken, UserNameIdentityToken, X509IdentityToken};
pub use monitored_item::{
    CreateMonitoredItemsRequest, CreateMonitoredItemsResponse, DeleteMonitoredItemsRequest,
    DeleteMonitoredItemsResponse, ModifyMonitoredItemsRequest, ModifyMonitoredItemsResponse,
    MonitoredItemCreateRequest, MonitoredItemCreateResult, MonitoredItemModifyRequest, MonitoredItemModifyResult,
    MonitoringParameters, SetMonitoringModeRequest, SetMonitoringModeResponse,
};
pub use notification::{
    register_service_types, DataChangeNotification, EventFieldList, EventNotificationList,
    MonitoredItemNotification, Notification, StatusChangeNotification,
};
pub use secure_channel::{
    ChannelSecurityToken, CloseSecureChannelRequest, CloseSecureChannelResponse, OpenSecureChannelRequest,
    OpenSecureChannelResponse,
};
pub use service::{decode_message, decode_response, encode_message, peek_type_id, ServiceRequest, ServiceResponse};
pub use session::{
    ActivateSessionRequest, ActivateSessionResponse, CancelRequest, CancelResponse, CloseSessionRequest,
    CloseSessionResponse, CreateSessionRequest, CreateSessionResponse,
};
pub use subscription::{
    CreateSubscriptionRequest, CreateSubscriptionResponse, DeleteSubscriptionsRequest, DeleteSubscriptionsResponse,
    ModifySubscriptionRequest, ModifySubscriptionResponse, NotificationMessage, PublishRequest, PublishResponse,
    RepublishRequest, RepublishResponse, SetPublishingModeRequest, SetPublishingModeResponse,
    SubscriptionAcknowledgement, TransferResult, TransferSubscriptionsRequest, TransferSubscriptionsResponse,
};
