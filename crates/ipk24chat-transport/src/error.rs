use ipk24chat_protocol::{MessageId, ProtocolError};

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Binding a listening or per-session socket failed.
    #[error("bind failed: {0}")]
    BindFailed(#[source] std::io::Error),

    /// A stream line exceeded the framer's limit.
    #[error("line exceeds {limit} bytes")]
    LineTooLong {
        /// The configured maximum line length.
        limit: usize,
    },

    /// A datagram went unacknowledged through every retransmission.
    #[error("message {message_id} undeliverable after {attempts} attempts")]
    Undeliverable {
        /// Id of the message that was never confirmed.
        message_id: MessageId,
        /// How many times it was sent.
        attempts: u32,
    },

    /// A message could not be encoded for this transport.
    #[error("encode failed: {0}")]
    Encode(#[from] ProtocolError),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// Whether the underlying connection can still carry a best-effort `BYE`.
    pub fn connection_usable(&self) -> bool {
        matches!(
            self,
            Self::Undeliverable { .. } | Self::Encode(_) | Self::LineTooLong { .. }
        )
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::ReceiveFailed(e)
    }
}
