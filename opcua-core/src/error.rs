use crate::status_code::StatusCode;
use thiserror::Error;

/// Main error type for OPC UA client operations
///
/// The variants follow the failure taxonomy of the client stack:
/// transport errors, protocol/decoding errors, security errors, service faults
/// (scoped to one request), session faults and channel aborts.
#[derive(Error, Debug)]
pub enum UaError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Timeout")]
    Timeout,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Decoding error ({status}): {message}")]
    Decoding { status: StatusCode, message: String },

    #[error("Encoding error ({status}): {message}")]
    Encoding { status: StatusCode, message: String },

    #[error("Protocol error ({status}): {message}")]
    Protocol { status: StatusCode, message: String },

    #[error("Security checks failed: {0}")]
    SecurityChecksFailed(String),

    #[error("Identity token rejected: {0}")]
    IdentityTokenRejected(StatusCode),

    #[error("Service fault: {0}")]
    ServiceFault(StatusCode),

    #[error("Session error: {0}")]
    Session(StatusCode),

    #[error("Channel aborted: {0}")]
    ChannelAborted(StatusCode),

    #[error("Server reported error {status}: {reason}")]
    RemoteError { status: StatusCode, reason: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl UaError {
    /// Decoding error with `BadDecodingError`
    pub fn decoding(message: impl Into<String>) -> Self {
        UaError::Decoding {
            status: StatusCode::BAD_DECODING_ERROR,
            message: message.into(),
        }
    }

    /// Decoding error caused by a configured limit
    pub fn decoding_limit(message: impl Into<String>) -> Self {
        UaError::Decoding {
            status: StatusCode::BAD_ENCODING_LIMITS_EXCEEDED,
            message: message.into(),
        }
    }

    /// Encoding error with `BadEncodingError`
    pub fn encoding(message: impl Into<String>) -> Self {
        UaError::Encoding {
            status: StatusCode::BAD_ENCODING_ERROR,
            message: message.into(),
        }
    }

    /// Encoding error caused by a negotiated limit
    pub fn encoding_limit(status: StatusCode, message: impl Into<String>) -> Self {
        UaError::Encoding {
            status,
            message: message.into(),
        }
    }

    /// Protocol violation on the secure channel
    pub fn protocol(status: StatusCode, message: impl Into<String>) -> Self {
        UaError::Protocol {
            status,
            message: message.into(),
        }
    }

    /// Map the error onto an OPC UA status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            UaError::Connection(_) => StatusCode::BAD_COMMUNICATION_ERROR,
            UaError::Timeout => StatusCode::BAD_TIMEOUT,
            UaError::Cancelled => StatusCode::BAD_REQUEST_CANCELLED_BY_CLIENT,
            UaError::Decoding { status, .. }
            | UaError::Encoding { status, .. }
            | UaError::Protocol { status, .. }
            | UaError::RemoteError { status, .. } => *status,
            UaError::SecurityChecksFailed(_) => StatusCode::BAD_SECURITY_CHECKS_FAILED,
            UaError::IdentityTokenRejected(status)
            | UaError::ServiceFault(status)
            | UaError::Session(status)
            | UaError::ChannelAborted(status) => *status,
            UaError::InvalidState(_) => StatusCode::BAD_INVALID_STATE,
            UaError::InvalidData(_) => StatusCode::BAD_INVALID_ARGUMENT,
        }
    }

    /// Whether retrying on a fresh channel or session may succeed
    ///
    /// Transport failures, timeouts, channel aborts and session faults are
    /// retriable. Security and identity failures are not: retrying with the same
    /// credentials yields the same answer.
    pub fn is_retriable(&self) -> bool {
        match self {
            UaError::Connection(_)
            | UaError::Timeout
            | UaError::ChannelAborted(_)
            | UaError::Session(_) => true,
            UaError::RemoteError { status, .. } => !status.is_security_error(),
            UaError::ServiceFault(status) => {
                *status == StatusCode::BAD_TIMEOUT || *status == StatusCode::BAD_TOO_MANY_OPERATIONS
            }
            _ => false,
        }
    }

    /// Whether this error means the channel it happened on is unusable
    pub fn is_channel_fatal(&self) -> bool {
        matches!(
            self,
            UaError::Connection(_)
                | UaError::Protocol { .. }
                | UaError::ChannelAborted(_)
                | UaError::RemoteError { .. }
        )
    }
}

/// Result type alias for OPC UA operations
pub type UaResult<T> = Result<T, UaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(UaError::Timeout.status_code(), StatusCode::BAD_TIMEOUT);
        assert_eq!(
            UaError::decoding("bad length").status_code(),
            StatusCode::BAD_DECODING_ERROR
        );
        assert_eq!(
            UaError::Session(StatusCode::BAD_SESSION_ID_INVALID).status_code(),
            StatusCode::BAD_SESSION_ID_INVALID
        );
    }

    #[test]
    fn test_retriable_classification() {
        assert!(UaError::Timeout.is_retriable());
        assert!(UaError::ChannelAborted(StatusCode::BAD_CONNECTION_CLOSED).is_retriable());
        assert!(!UaError::SecurityChecksFailed("rejected".into()).is_retriable());
        assert!(!UaError::IdentityTokenRejected(StatusCode::BAD_IDENTITY_TOKEN_REJECTED).is_retriable());
    }
}
