//! Unified error type for the IPK24-CHAT server.

use ipk24chat_protocol::ProtocolError;
use ipk24chat_session::SessionError;
use ipk24chat_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, field validation).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (protocol violation, failed connection).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let chat_err: ChatError = err.into();
        assert!(matches!(chat_err, ChatError::Transport(_)));
        assert!(chat_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::Empty;
        let chat_err: ChatError = err.into();
        assert!(matches!(chat_err, ChatError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::Format(ProtocolError::Empty);
        let chat_err: ChatError = err.into();
        assert!(matches!(chat_err, ChatError::Session(_)));
    }

    #[test]
    fn test_config_error_display() {
        let err = ChatError::Config("bad port".into());
        assert_eq!(err.to_string(), "configuration error: bad port");
    }
}
