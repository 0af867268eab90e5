//! OPC UA status codes
//!
//! A status code is a 32-bit value. The top two bits carry the severity
//! (good / uncertain / bad), bits 16..28 the sub code and the low 16 bits
//! informational flags.

use std::fmt;

/// OPC UA status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StatusCode(u32);

macro_rules! status_codes {
    ($($name:ident = $value:literal, $text:literal;)*) => {
        impl StatusCode {
            $(pub const $name: StatusCode = StatusCode($value);)*

            /// Symbolic name of a well-known code, if any
            pub fn name(&self) -> Option<&'static str> {
                match self.0 & 0xFFFF_0000 {
                    $($value => Some($text),)*
                    _ => None,
                }
            }
        }
    };
}

status_codes! {
    GOOD = 0x0000_0000, "Good";
    GOOD_SUBSCRIPTION_TRANSFERRED = 0x002D_0000, "GoodSubscriptionTransferred";
    UNCERTAIN = 0x4000_0000, "Uncertain";
    BAD = 0x8000_0000, "Bad";
    BAD_UNEXPECTED_ERROR = 0x8001_0000, "BadUnexpectedError";
    BAD_INTERNAL_ERROR = 0x8002_0000, "BadInternalError";
    BAD_COMMUNICATION_ERROR = 0x8005_0000, "BadCommunicationError";
    BAD_ENCODING_ERROR = 0x8006_0000, "BadEncodingError";
    BAD_DECODING_ERROR = 0x8007_0000, "BadDecodingError";
    BAD_ENCODING_LIMITS_EXCEEDED = 0x8008_0000, "BadEncodingLimitsExceeded";
    BAD_UNKNOWN_RESPONSE = 0x8009_0000, "BadUnknownResponse";
    BAD_TIMEOUT = 0x800A_0000, "BadTimeout";
    BAD_SERVICE_UNSUPPORTED = 0x800B_0000, "BadServiceUnsupported";
    BAD_SHUTDOWN = 0x800C_0000, "BadShutdown";
    BAD_SERVER_NOT_CONNECTED = 0x800D_0000, "BadServerNotConnected";
    BAD_SERVER_HALTED = 0x800E_0000, "BadServerHalted";
    BAD_NOTHING_TO_DO = 0x800F_0000, "BadNothingToDo";
    BAD_TOO_MANY_OPERATIONS = 0x8010_0000, "BadTooManyOperations";
    BAD_CERTIFICATE_INVALID = 0x8012_0000, "BadCertificateInvalid";
    BAD_SECURITY_CHECKS_FAILED = 0x8013_0000, "BadSecurityChecksFailed";
    BAD_CERTIFICATE_TIME_INVALID = 0x8014_0000, "BadCertificateTimeInvalid";
    BAD_CERTIFICATE_UNTRUSTED = 0x801A_0000, "BadCertificateUntrusted";
    BAD_USER_ACCESS_DENIED = 0x801F_0000, "BadUserAccessDenied";
    BAD_IDENTITY_TOKEN_INVALID = 0x8020_0000, "BadIdentityTokenInvalid";
    BAD_IDENTITY_TOKEN_REJECTED = 0x8021_0000, "BadIdentityTokenRejected";
    BAD_SECURE_CHANNEL_ID_INVALID = 0x8022_0000, "BadSecureChannelIdInvalid";
    BAD_NONCE_INVALID = 0x8024_0000, "BadNonceInvalid";
    BAD_SESSION_ID_INVALID = 0x8025_0000, "BadSessionIdInvalid";
    BAD_SESSION_CLOSED = 0x8026_0000, "BadSessionClosed";
    BAD_SESSION_NOT_ACTIVATED = 0x8027_0000, "BadSessionNotActivated";
    BAD_SUBSCRIPTION_ID_INVALID = 0x8028_0000, "BadSubscriptionIdInvalid";
    BAD_REQUEST_HEADER_INVALID = 0x802A_0000, "BadRequestHeaderInvalid";
    BAD_REQUEST_CANCELLED_BY_CLIENT = 0x802C_0000, "BadRequestCancelledByClient";
    BAD_NODE_ID_INVALID = 0x8033_0000, "BadNodeIdInvalid";
    BAD_NODE_ID_UNKNOWN = 0x8034_0000, "BadNodeIdUnknown";
    BAD_ATTRIBUTE_ID_INVALID = 0x8035_0000, "BadAttributeIdInvalid";
    BAD_MONITORED_ITEM_ID_INVALID = 0x8042_0000, "BadMonitoredItemIdInvalid";
    BAD_SECURITY_POLICY_REJECTED = 0x8055_0000, "BadSecurityPolicyRejected";
    BAD_USER_SIGNATURE_INVALID = 0x8057_0000, "BadUserSignatureInvalid";
    BAD_APPLICATION_SIGNATURE_INVALID = 0x8058_0000, "BadApplicationSignatureInvalid";
    BAD_TOO_MANY_SUBSCRIPTIONS = 0x8077_0000, "BadTooManySubscriptions";
    BAD_TOO_MANY_PUBLISH_REQUESTS = 0x8078_0000, "BadTooManyPublishRequests";
    BAD_NO_SUBSCRIPTION = 0x8079_0000, "BadNoSubscription";
    BAD_SEQUENCE_NUMBER_UNKNOWN = 0x807A_0000, "BadSequenceNumberUnknown";
    BAD_MESSAGE_NOT_AVAILABLE = 0x807B_0000, "BadMessageNotAvailable";
    BAD_TCP_SERVER_TOO_BUSY = 0x807D_0000, "BadTcpServerTooBusy";
    BAD_TCP_MESSAGE_TYPE_INVALID = 0x807E_0000, "BadTcpMessageTypeInvalid";
    BAD_TCP_SECURE_CHANNEL_UNKNOWN = 0x807F_0000, "BadTcpSecureChannelUnknown";
    BAD_TCP_MESSAGE_TOO_LARGE = 0x8080_0000, "BadTcpMessageTooLarge";
    BAD_TCP_NOT_ENOUGH_RESOURCES = 0x8081_0000, "BadTcpNotEnoughResources";
    BAD_TCP_INTERNAL_ERROR = 0x8082_0000, "BadTcpInternalError";
    BAD_TCP_ENDPOINT_URL_INVALID = 0x8083_0000, "BadTcpEndpointUrlInvalid";
    BAD_REQUEST_INTERRUPTED = 0x8084_0000, "BadRequestInterrupted";
    BAD_REQUEST_TIMEOUT = 0x8085_0000, "BadRequestTimeout";
    BAD_SECURE_CHANNEL_CLOSED = 0x8086_0000, "BadSecureChannelClosed";
    BAD_SECURE_CHANNEL_TOKEN_UNKNOWN = 0x8087_0000, "BadSecureChannelTokenUnknown";
    BAD_SEQUENCE_NUMBER_INVALID = 0x8088_0000, "BadSequenceNumberInvalid";
    BAD_INVALID_ARGUMENT = 0x80AB_0000, "BadInvalidArgument";
    BAD_CONNECTION_REJECTED = 0x80AC_0000, "BadConnectionRejected";
    BAD_DISCONNECT = 0x80AD_0000, "BadDisconnect";
    BAD_CONNECTION_CLOSED = 0x80AE_0000, "BadConnectionClosed";
    BAD_INVALID_STATE = 0x80AF_0000, "BadInvalidState";
    BAD_REQUEST_TOO_LARGE = 0x80B8_0000, "BadRequestTooLarge";
    BAD_RESPONSE_TOO_LARGE = 0x80B9_0000, "BadResponseTooLarge";
}

impl StatusCode {
    /// Create a status code from its raw value
    pub const fn from_u32(value: u32) -> Self {
        StatusCode(value)
    }

    /// Raw 32-bit value
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Severity bits are 00
    pub const fn is_good(&self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    /// Severity bits are 01
    pub const fn is_uncertain(&self) -> bool {
        self.0 & 0xC000_0000 == 0x4000_0000
    }

    /// Severity bit 31 is set
    pub const fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Status with the informational low 16 bits cleared
    pub const fn sub_code(&self) -> StatusCode {
        StatusCode(self.0 & 0xFFFF_0000)
    }

    /// Codes that indicate certificate, signature or policy problems
    pub fn is_security_error(&self) -> bool {
        matches!(
            self.sub_code(),
            StatusCode::BAD_SECURITY_CHECKS_FAILED
                | StatusCode::BAD_CERTIFICATE_INVALID
                | StatusCode::BAD_CERTIFICATE_UNTRUSTED
                | StatusCode::BAD_CERTIFICATE_TIME_INVALID
                | StatusCode::BAD_SECURITY_POLICY_REJECTED
                | StatusCode::BAD_APPLICATION_SIGNATURE_INVALID
                | StatusCode::BAD_NONCE_INVALID
        )
    }

    /// Codes with which a server reports the session is gone
    pub fn is_session_error(&self) -> bool {
        matches!(
            self.sub_code(),
            StatusCode::BAD_SESSION_ID_INVALID
                | StatusCode::BAD_SESSION_CLOSED
                | StatusCode::BAD_SESSION_NOT_ACTIVATED
        )
    }
}

impl From<u32> for StatusCode {
    fn from(value: u32) -> Self {
        StatusCode(value)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) if self.0 & 0xFFFF == 0 => write!(f, "{}", name),
            Some(name) => write!(f, "{}(0x{:08X})", name, self.0),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}
