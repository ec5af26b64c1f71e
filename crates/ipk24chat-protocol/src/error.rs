//! Error types for the protocol layer.
//!
//! Each crate in the workspace defines its own error enum. When you see a
//! `ProtocolError`, you know the problem is in the bytes themselves (or in
//! a codec being asked to do something it must never do), not in
//! networking or channel bookkeeping.

use crate::{MessageKind, TransportKind};

/// Errors that can occur while encoding or decoding messages.
///
/// Every variant except [`ProtocolError::Unencodable`] is a recoverable
/// *format error*: the peer sent something that doesn't follow the grammar,
/// and the caller decides how to react (the session answers with `ERR` and
/// closes). `Unencodable` is a programming error and never reaches a peer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The message was empty.
    #[error("empty message")]
    Empty,

    /// The leading type byte or verb doesn't name a known message kind.
    #[error("unknown message type: expected {expected}, got {got}")]
    UnknownKind {
        /// The accepted set of kind selectors.
        expected: &'static str,
        /// What the peer actually sent.
        got: String,
    },

    /// The message ended before all of its fields were read.
    #[error("truncated {kind} message: missing {missing}")]
    Truncated {
        /// The kind being decoded.
        kind: MessageKind,
        /// The first field that couldn't be read.
        missing: &'static str,
    },

    /// The overall layout doesn't match the grammar for this kind.
    #[error("malformed message: expected {expected}, got {got}")]
    Malformed {
        /// The grammar the message should follow.
        expected: String,
        /// The offending input (lossily rendered).
        got: String,
    },

    /// A single field failed its validator.
    #[error("invalid {field}: expected {expected}, got {got:?}")]
    InvalidField {
        /// Field name, e.g. `"DisplayName"`.
        field: &'static str,
        /// Human-readable description of the accepted format.
        expected: &'static str,
        /// The rejected value.
        got: String,
    },

    /// A kind that may never be encoded on this transport or in the
    /// server→client direction (Auth, Join, Confirm over a stream).
    #[error("{kind} cannot be encoded for {transport} transport")]
    Unencodable {
        /// The kind that was passed to the encoder.
        kind: MessageKind,
        /// The transport the encoder serves.
        transport: TransportKind,
    },
}

impl ProtocolError {
    /// Returns `true` for errors caused by peer input, as opposed to the
    /// programming-error variant.
    pub fn is_format_error(&self) -> bool {
        !matches!(self, Self::Unencodable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_field_display_mentions_expected_and_value() {
        let err = ProtocolError::InvalidField {
            field: "DisplayName",
            expected: "1-20 printable characters without space",
            got: "Bad Name".into(),
        };
        let text = err.to_string();
        assert!(text.contains("DisplayName"));
        assert!(text.contains("without space"));
        assert!(text.contains("Bad Name"));
    }

    #[test]
    fn test_unencodable_is_not_a_format_error() {
        let err = ProtocolError::Unencodable {
            kind: MessageKind::Auth,
            transport: TransportKind::Stream,
        };
        assert!(!err.is_format_error());
        assert!(ProtocolError::Empty.is_format_error());
    }
}
