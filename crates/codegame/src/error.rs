//! Unified error type for the CodeGame client.

use codegame_api::ApiError;
use codegame_protocol::ProtocolError;
use codegame_session::SessionError;
use codegame_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The first three variants are precondition failures raised by the
/// client itself; the rest wrap the layer that failed. The `#[from]`
/// attributes let `?` convert layer errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// `join`/`connect`/`spectate`/`restore_session` on a client that has
    /// already left the unbound state.
    #[error("the client is already connected to a game")]
    AlreadyConnected,

    /// `send` without a connected player (never connected, spectating,
    /// or closed).
    #[error("the client is not connected to a player")]
    NotConnected,

    /// A handler was registered for an event name with a payload type
    /// other than the one the name is already bound to.
    #[error("event {event:?} is bound to payload type {expected}, not {found}")]
    TypeMismatch {
        event: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A session could not be loaded or is incomplete.
    #[error(transparent)]
    InvalidSession(#[from] SessionError),

    /// Opening, writing to, or closing the message stream failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server's HTTP API answered with an error.
    #[error(transparent)]
    Upstream(#[from] ApiError),

    /// A command could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let client_err: ClientError = err.into();
        assert!(matches!(client_err, ClientError::Transport(_)));
        assert!(client_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let client_err: ClientError = err.into();
        assert!(matches!(client_err, ClientError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::Invalid("incomplete".into());
        let client_err: ClientError = err.into();
        assert!(matches!(client_err, ClientError::InvalidSession(_)));
    }

    #[test]
    fn test_from_api_error() {
        let err = ApiError::Status {
            endpoint: "/api/info".into(),
            status: 500,
        };
        let client_err: ClientError = err.into();
        assert!(matches!(client_err, ClientError::Upstream(_)));
        assert!(client_err.to_string().contains("500"));
    }

    #[test]
    fn test_type_mismatch_message_names_both_types() {
        let err = ClientError::TypeMismatch {
            event: "tick".into(),
            expected: "u32",
            found: "alloc::string::String",
        };
        let msg = err.to_string();
        assert!(msg.contains("tick") && msg.contains("u32") && msg.contains("String"));
    }
}
