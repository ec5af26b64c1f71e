//! Error types for the session layer.

use ipk24chat_protocol::{MessageKind, ProtocolError};
use ipk24chat_transport::TransportError;

use crate::SessionState;

/// Why a session stopped processing messages.
///
/// None of these escape the session's own task: the driver logs them and
/// moves the session to Closing.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A well-formed message arrived in a state that doesn't accept it,
    /// e.g. `JOIN` before `AUTH`.
    #[error("{kind} not allowed while {state}")]
    ProtocolViolation {
        /// The state the session was in.
        state: SessionState,
        /// The kind of the offending message.
        kind: MessageKind,
    },

    /// The peer sent bytes that don't decode.
    #[error("format error: {0}")]
    Format(#[from] ProtocolError),

    /// The connection failed underneath the session.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SessionError {
    /// Whether the connection can still carry the closing `BYE`.
    pub fn connection_usable(&self) -> bool {
        match self {
            Self::Transport(error) => error.connection_usable(),
            Self::ProtocolViolation { .. } | Self::Format(_) => true,
        }
    }
}
