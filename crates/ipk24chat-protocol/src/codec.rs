//! Codec trait shared by both wire formats.
//!
//! A "codec" converts between [`Message`] values and raw bytes. The session
//! layer doesn't care HOW a message is laid out on the wire; it holds a
//! `&dyn Codec` picked once per connection by [`codec_for`], and the rest of
//! the code is identical for TCP and UDP clients.

use std::fmt;

use crate::{DatagramCodec, Message, ProtocolError, StreamCodec};

/// Which of the two transports a connection uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// TCP: CRLF-terminated text lines.
    Stream,
    /// UDP: one binary message per datagram.
    Datagram,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream => f.write_str("tcp"),
            Self::Datagram => f.write_str("udp"),
        }
    }
}

/// Encodes messages to bytes and decodes bytes back into messages.
///
/// ## Trait bounds
///
/// - `Send + Sync` → a codec is shared by every task serving a connection.
/// - `'static` → codecs are stateless and live for the whole program.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a server→client message.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Unencodable`] for kinds the server never
    /// sends (`AUTH`, `JOIN`) or that this transport has no form for.
    fn encode(&self, message: &Message) -> Result<Vec<u8>, ProtocolError>;

    /// Parses one complete message (a datagram, or a line without its
    /// terminator).
    ///
    /// # Errors
    /// Returns a format error (see [`ProtocolError::is_format_error`]) if
    /// the bytes don't follow the grammar or a field fails validation.
    fn decode(&self, data: &[u8]) -> Result<Message, ProtocolError>;

    /// The transport this codec serves.
    fn transport(&self) -> TransportKind;
}

/// Returns the codec for `kind`.
pub fn codec_for(kind: TransportKind) -> &'static dyn Codec {
    static STREAM: StreamCodec = StreamCodec;
    static DATAGRAM: DatagramCodec = DatagramCodec;
    match kind {
        TransportKind::Stream => &STREAM,
        TransportKind::Datagram => &DATAGRAM,
    }
}
