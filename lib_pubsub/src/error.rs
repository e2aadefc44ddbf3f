//! # Engine Errors
//!
//! Every failure a request or the session can observe. Errors are `Clone`
//! because the engine both hands them to the waiting caller and broadcasts
//! them on the event channel.

use thiserror::Error;

use crate::auth::AuthError;
use crate::protocol::ErrorResponse;

/// Client side code reported for a request that timed out locally.
pub const CODE_TIMEOUT: u16 = 101;
/// Client side code reported for a record that could not be understood.
pub const CODE_MALFORMED: u16 = 103;

#[derive(Debug, Clone, PartialEq, Error)]
/// # PubSub Error
///
/// The error taxonomy of the session engine.
pub enum PubSubError {
    /// A request was attempted while the transport was not connected.
    #[error("Web socket is disconnected")]
    NotConnected,

    /// An inbound record could not be decoded at all.
    #[error("Malformed record: {0}")]
    Malformed(String),

    /// An inbound record decoded, but misses fields required for its action.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server answered the request with an error status.
    #[error("Server error {}: {} ({})", .0.code, .0.message, .0.details)]
    Server(ErrorResponse),

    /// No response arrived within the per-request deadline.
    #[error("Timeout awaiting response to sequence {sequence}")]
    Timeout {
        /// Sequence number of the request that expired.
        sequence: u64,
    },

    /// The underlying connection reported a fault.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The pending request table is full.
    #[error("Pending request table is full ({limit} live requests)")]
    CapacityExceeded {
        /// The configured table limit.
        limit: usize,
    },

    /// The request was cleared by `close()` or `drop_connection()` before completing.
    #[error("Request abandoned because the connection was closed")]
    Abandoned,

    /// The engine task is no longer running.
    #[error("Session engine has stopped")]
    EngineStopped,

    /// The outbound request could not be serialized.
    #[error("Failed to serialize request: {0}")]
    Serialize(String),

    /// The engine options failed validation.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// The project keys could not produce authentication headers.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl PubSubError {
    /// The numeric status associated with this error, when there is one.
    ///
    /// Server errors carry the server's code, timeouts report 101 and
    /// undecodable records report 103.
    pub fn code(&self) -> Option<u16> {
        match self {
            PubSubError::Server(response) => Some(response.code),
            PubSubError::Timeout { .. } => Some(CODE_TIMEOUT),
            PubSubError::Malformed(_) | PubSubError::Protocol(_) => Some(CODE_MALFORMED),
            _ => None,
        }
    }

    /// The server error response, if this error came from the server.
    pub fn server_response(&self) -> Option<&ErrorResponse> {
        match self {
            PubSubError::Server(response) => Some(response),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for PubSubError {
    fn from(e: serde_json::Error) -> Self {
        PubSubError::Serialize(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_the_error_kind() {
        let server = PubSubError::Server(ErrorResponse::synthetic(404, "Not Found"));
        assert_eq!(server.code(), Some(404));
        assert_eq!(PubSubError::Timeout { sequence: 7 }.code(), Some(101));
        assert_eq!(PubSubError::Malformed("x".into()).code(), Some(103));
        assert_eq!(PubSubError::NotConnected.code(), None);
    }

    #[test]
    fn timeout_message_names_the_sequence() {
        let e = PubSubError::Timeout { sequence: 42 };
        assert_eq!(e.to_string(), "Timeout awaiting response to sequence 42");
    }
}
