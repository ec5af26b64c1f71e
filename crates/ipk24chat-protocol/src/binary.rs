//! Binary codec for the datagram (UDP) transport.
//!
//! Every datagram starts with a one-byte type followed by a big-endian
//! 16-bit message id; text fields are NUL-terminated.
//!
//! | Kind | Type | Layout after the type byte |
//! |---|---|---|
//! | CONFIRM | `0x00` | RefMessageID(2) |
//! | REPLY | `0x01` | MessageID(2) Result(1) RefMessageID(2) Content\0 |
//! | AUTH | `0x02` | MessageID(2) Username\0 DisplayName\0 Secret\0 |
//! | JOIN | `0x03` | MessageID(2) ChannelID\0 DisplayName\0 |
//! | MSG | `0x04` | MessageID(2) DisplayName\0 Content\0 |
//! | ERR | `0xFE` | MessageID(2) DisplayName\0 Content\0 |
//! | BYE | `0xFF` | MessageID(2) |

use crate::{
    ChannelId, Codec, Content, DisplayName, Message, MessageId, MessageKind, ProtocolError,
    Secret, TransportKind, Username,
};

/// [`Codec`] for binary datagrams.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatagramCodec;

impl DatagramCodec {
    /// Reads only the type byte and message id of a datagram.
    ///
    /// The receive path uses this to confirm a datagram whose body fails to
    /// decode, so the client stops retransmitting it.
    pub fn peek_header(data: &[u8]) -> Option<(MessageKind, MessageId)> {
        let kind = MessageKind::from_type_byte(*data.first()?)?;
        let id = u16::from_be_bytes([*data.get(1)?, *data.get(2)?]);
        Some((kind, MessageId(id)))
    }
}

impl Codec for DatagramCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>, ProtocolError> {
        let kind = message.kind();
        let mut out = Vec::with_capacity(64);
        out.push(kind.type_byte());

        match message {
            Message::Confirm { ref_id } => put_id(&mut out, *ref_id),
            Message::Reply {
                id,
                result,
                ref_id,
                content,
            } => {
                put_id(&mut out, *id);
                out.push(u8::from(*result));
                put_id(&mut out, *ref_id);
                put_str(&mut out, content.as_str());
            }
            Message::Msg {
                id,
                display_name,
                content,
            }
            | Message::Err {
                id,
                display_name,
                content,
            } => {
                put_id(&mut out, *id);
                put_str(&mut out, display_name.as_str());
                put_str(&mut out, content.as_str());
            }
            Message::Bye { id } => put_id(&mut out, *id),
            Message::Auth { .. } | Message::Join { .. } => {
                return Err(ProtocolError::Unencodable {
                    kind,
                    transport: TransportKind::Datagram,
                });
            }
        }

        Ok(out)
    }

    fn decode(&self, data: &[u8]) -> Result<Message, ProtocolError> {
        let (&type_byte, body) = data.split_first().ok_or(ProtocolError::Empty)?;
        let kind =
            MessageKind::from_type_byte(type_byte).ok_or_else(|| ProtocolError::UnknownKind {
                expected: "type byte 0x00-0x04, 0xFE or 0xFF",
                got: format!("0x{type_byte:02X}"),
            })?;

        let mut reader = Reader { kind, buf: body };

        let message = match kind {
            MessageKind::Confirm => Message::Confirm {
                ref_id: reader.id("RefMessageID")?,
            },
            MessageKind::Reply => {
                let id = reader.id("MessageID")?;
                let result = match reader.byte("Result")? {
                    0 => false,
                    1 => true,
                    other => {
                        return Err(ProtocolError::Malformed {
                            expected: "REPLY Result byte 0 or 1".into(),
                            got: other.to_string(),
                        });
                    }
                };
                let ref_id = reader.id("RefMessageID")?;
                let content = Content::new(reader.text("MessageContent")?)?;
                Message::Reply {
                    id,
                    result,
                    ref_id,
                    content,
                }
            }
            MessageKind::Auth => Message::Auth {
                id: reader.id("MessageID")?,
                username: Username::new(reader.text("Username")?)?,
                display_name: DisplayName::new(reader.text("DisplayName")?)?,
                secret: Secret::new(reader.text("Secret")?)?,
            },
            MessageKind::Join => Message::Join {
                id: reader.id("MessageID")?,
                channel_id: ChannelId::new(reader.text("ChannelID")?)?,
                display_name: DisplayName::new(reader.text("DisplayName")?)?,
            },
            MessageKind::Msg => Message::Msg {
                id: reader.id("MessageID")?,
                display_name: DisplayName::new(reader.text("DisplayName")?)?,
                content: Content::new(reader.text("MessageContent")?)?,
            },
            MessageKind::Err => Message::Err {
                id: reader.id("MessageID")?,
                display_name: DisplayName::new(reader.text("DisplayName")?)?,
                content: Content::new(reader.text("MessageContent")?)?,
            },
            MessageKind::Bye => Message::Bye {
                id: reader.id("MessageID")?,
            },
        };

        reader.finish()?;
        Ok(message)
    }

    fn transport(&self) -> TransportKind {
        TransportKind::Datagram
    }
}

fn put_id(out: &mut Vec<u8>, id: MessageId) {
    out.extend_from_slice(&id.0.to_be_bytes());
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// Forward-only reader over a datagram body.
struct Reader<'a> {
    kind: MessageKind,
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn truncated(&self, missing: &'static str) -> ProtocolError {
        ProtocolError::Truncated {
            kind: self.kind,
            missing,
        }
    }

    fn byte(&mut self, missing: &'static str) -> Result<u8, ProtocolError> {
        let (&b, rest) = self
            .buf
            .split_first()
            .ok_or_else(|| self.truncated(missing))?;
        self.buf = rest;
        Ok(b)
    }

    fn id(&mut self, missing: &'static str) -> Result<MessageId, ProtocolError> {
        if self.buf.len() < 2 {
            return Err(self.truncated(missing));
        }
        let (head, rest) = self.buf.split_at(2);
        self.buf = rest;
        Ok(MessageId(u16::from_be_bytes([head[0], head[1]])))
    }

    /// Reads up to the next NUL; field validators reject any non-ASCII
    /// replacement characters produced by the lossy conversion.
    fn text(&mut self, missing: &'static str) -> Result<String, ProtocolError> {
        let end = self
            .buf
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| self.truncated(missing))?;
        let value = String::from_utf8_lossy(&self.buf[..end]).into_owned();
        self.buf = &self.buf[end + 1..];
        Ok(value)
    }

    fn finish(&self) -> Result<(), ProtocolError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::Malformed {
                expected: format!("{} datagram without trailing bytes", self.kind),
                got: format!("{} extra byte(s)", self.buf.len()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> DisplayName {
        DisplayName::new(s).unwrap()
    }

    fn content(s: &str) -> Content {
        Content::new(s).unwrap()
    }

    // =====================================================================
    // Encoding layout
    // =====================================================================

    #[test]
    fn test_encode_confirm_is_three_bytes_big_endian() {
        let bytes = DatagramCodec.encode(&Message::confirm(MessageId(0x0102))).unwrap();
        assert_eq!(bytes, vec![0x00, 0x01, 0x02]);
    }

    #[test]
    fn test_encode_reply_layout() {
        let reply = Message::reply(true, MessageId(7), content("ok")).with_id(MessageId(2));
        let bytes = DatagramCodec.encode(&reply).unwrap();
        assert_eq!(bytes, vec![0x01, 0, 2, 1, 0, 7, b'o', b'k', 0]);
    }

    #[test]
    fn test_encode_msg_layout() {
        let msg = Message::Msg {
            id: MessageId(256),
            display_name: name("Al"),
            content: content("hi"),
        };
        let bytes = DatagramCodec.encode(&msg).unwrap();
        assert_eq!(bytes, vec![0x04, 1, 0, b'A', b'l', 0, b'h', b'i', 0]);
    }

    #[test]
    fn test_encode_bye_layout() {
        let bytes = DatagramCodec
            .encode(&Message::bye().with_id(MessageId(5)))
            .unwrap();
        assert_eq!(bytes, vec![0xFF, 0, 5]);
    }

    #[test]
    fn test_encode_auth_is_unencodable() {
        let auth = Message::Auth {
            id: MessageId(1),
            username: Username::new("alice").unwrap(),
            display_name: name("Alice"),
            secret: Secret::new("s").unwrap(),
        };
        assert!(matches!(
            DatagramCodec.encode(&auth).unwrap_err(),
            ProtocolError::Unencodable {
                kind: MessageKind::Auth,
                transport: TransportKind::Datagram,
            }
        ));
    }

    // =====================================================================
    // Decoding
    // =====================================================================

    #[test]
    fn test_decode_auth_datagram() {
        let mut data = vec![0x02, 0, 1];
        data.extend_from_slice(b"alice\0Alice\0secret\0");
        let msg = DatagramCodec.decode(&data).unwrap();
        assert_eq!(
            msg,
            Message::Auth {
                id: MessageId(1),
                username: Username::new("alice").unwrap(),
                display_name: name("Alice"),
                secret: Secret::new("secret").unwrap(),
            }
        );
    }

    #[test]
    fn test_decode_join_datagram() {
        let mut data = vec![0x03, 0x12, 0x34];
        data.extend_from_slice(b"dev\0Bob\0");
        let msg = DatagramCodec.decode(&data).unwrap();
        assert_eq!(msg.id(), Some(MessageId(0x1234)));
        assert_eq!(msg.kind(), MessageKind::Join);
    }

    #[test]
    fn test_decode_confirm_datagram() {
        let msg = DatagramCodec.decode(&[0x00, 0xFF, 0xFE]).unwrap();
        assert_eq!(msg, Message::confirm(MessageId(0xFFFE)));
    }

    #[test]
    fn test_decode_empty_is_empty_error() {
        assert_eq!(DatagramCodec.decode(&[]).unwrap_err(), ProtocolError::Empty);
    }

    #[test]
    fn test_decode_unknown_type_byte() {
        let err = DatagramCodec.decode(&[0x42, 0, 0]).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownKind { ref got, .. } if got == "0x42"));
    }

    #[test]
    fn test_decode_missing_terminator_is_truncated() {
        let mut data = vec![0x04, 0, 1];
        data.extend_from_slice(b"Bob\0no terminator");
        assert_eq!(
            DatagramCodec.decode(&data).unwrap_err(),
            ProtocolError::Truncated {
                kind: MessageKind::Msg,
                missing: "MessageContent",
            }
        );
    }

    #[test]
    fn test_decode_short_id_is_truncated() {
        assert!(matches!(
            DatagramCodec.decode(&[0xFF, 0]).unwrap_err(),
            ProtocolError::Truncated { kind: MessageKind::Bye, .. }
        ));
    }

    #[test]
    fn test_decode_trailing_bytes_is_malformed() {
        assert!(matches!(
            DatagramCodec.decode(&[0xFF, 0, 1, 9]).unwrap_err(),
            ProtocolError::Malformed { .. }
        ));
    }

    #[test]
    fn test_decode_reply_result_must_be_zero_or_one() {
        let mut data = vec![0x01, 0, 1, 2, 0, 0];
        data.extend_from_slice(b"x\0");
        assert!(matches!(
            DatagramCodec.decode(&data).unwrap_err(),
            ProtocolError::Malformed { .. }
        ));
    }

    #[test]
    fn test_decode_invalid_field_value() {
        let mut data = vec![0x04, 0, 1];
        data.extend_from_slice(b"Bad Name\0hello\0");
        assert!(matches!(
            DatagramCodec.decode(&data).unwrap_err(),
            ProtocolError::InvalidField { field: "DisplayName", .. }
        ));
    }

    #[test]
    fn test_decode_of_encoded_err_restores_fields() {
        let original = Message::Err {
            id: MessageId(65535),
            display_name: name("Server"),
            content: content("something went wrong"),
        };
        let bytes = DatagramCodec.encode(&original).unwrap();
        assert_eq!(DatagramCodec.decode(&bytes).unwrap(), original);
    }

    fn round_trip(original: &Message) {
        let bytes = DatagramCodec.encode(original).unwrap();
        assert_eq!(&DatagramCodec.decode(&bytes).unwrap(), original);
    }

    fn longest_content() -> Content {
        let text = format!("{}abcde", "x IS ".repeat(279));
        assert_eq!(text.len(), 1400);
        content(&text)
    }

    #[test]
    fn test_decode_of_encoded_confirm_and_bye_restores_ids() {
        round_trip(&Message::confirm(MessageId(0)));
        round_trip(&Message::confirm(MessageId(0xABCD)));
        round_trip(&Message::bye().with_id(MessageId(65535)));
    }

    #[test]
    fn test_decode_of_encoded_reply_restores_verdict_and_ref() {
        round_trip(&Message::reply(true, MessageId(3), content("ok")).with_id(MessageId(1)));
        round_trip(&Message::reply(false, MessageId(65535), longest_content()).with_id(MessageId(9)));
    }

    #[test]
    fn test_decode_of_encoded_msg_at_field_limits() {
        round_trip(&Message::Msg {
            id: MessageId(300),
            display_name: name("Abcdefghij0123456789"),
            content: longest_content(),
        });
    }

    #[test]
    fn test_peek_header_reads_kind_and_id() {
        let mut data = vec![0x04, 0, 9];
        data.extend_from_slice(b"Bad Name\0x\0");
        assert_eq!(
            DatagramCodec::peek_header(&data),
            Some((MessageKind::Msg, MessageId(9)))
        );
        assert_eq!(DatagramCodec::peek_header(&[0x04, 0]), None);
    }
}
