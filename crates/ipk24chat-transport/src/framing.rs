//! CRLF line framing for the stream transport.
//!
//! TCP delivers a byte stream, not messages: one read may hold several
//! lines, or half of one. [`LineCodec`] plugs into `tokio_util`'s `Framed`
//! machinery and yields one complete line (terminator stripped) at a time.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::TransportError;

/// Longest accepted line, terminator included.
pub const MAX_LINE_LENGTH: usize = 2048;

/// Splits a byte stream into `\r\n`-terminated lines.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_length: usize,
    /// How far the buffer has already been scanned for a terminator.
    scanned: usize,
}

impl LineCodec {
    /// Creates a codec that rejects lines longer than `max_length` bytes.
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            scanned: 0,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(MAX_LINE_LENGTH)
    }
}

impl Decoder for LineCodec {
    type Item = Bytes;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Back up one byte so a `\r` at the end of the previous scan can
        // pair with a `\n` that just arrived.
        let from = self.scanned.saturating_sub(1);
        let terminator = src[from..].windows(2).position(|w| w == b"\r\n");

        match terminator {
            Some(offset) => {
                let end = from + offset;
                self.scanned = 0;
                if end + 2 > self.max_length {
                    src.advance(end + 2);
                    return Err(TransportError::LineTooLong {
                        limit: self.max_length,
                    });
                }
                let line = src.split_to(end).freeze();
                src.advance(2);
                Ok(Some(line))
            }
            None if src.len() > self.max_length => {
                src.clear();
                self.scanned = 0;
                Err(TransportError::LineTooLong {
                    limit: self.max_length,
                })
            }
            None => {
                self.scanned = src.len();
                Ok(None)
            }
        }
    }
}

impl Encoder<Bytes> for LineCodec {
    type Error = TransportError;

    /// Writes an already-terminated line as is.
    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        dst.put(item);
        Ok(())
    }
}
