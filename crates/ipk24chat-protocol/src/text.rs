//! Text codec for the stream (TCP) transport.
//!
//! One message per CRLF-terminated ASCII line:
//!
//! ```text
//! AUTH {Username} AS {DisplayName} USING {Secret}
//! JOIN {ChannelID} AS {DisplayName}
//! MSG FROM {DisplayName} IS {MessageContent}
//! ERR FROM {DisplayName} IS {MessageContent}
//! REPLY {OK|NOK} IS {MessageContent}
//! BYE
//! ```
//!
//! Keywords match ASCII-case-insensitively. The last field of a line is
//! always taken verbatim up to the end of the line, so message content can
//! hold spaces and words like ` IS ` without confusing the parser.

use crate::{
    ChannelId, Codec, Content, DisplayName, Message, MessageId, MessageKind, ProtocolError,
    Secret, TransportKind, Username,
};

const LINE_END: &str = "\r\n";

const AUTH_GRAMMAR: &str = "AUTH {Username} AS {DisplayName} USING {Secret}";
const JOIN_GRAMMAR: &str = "JOIN {ChannelID} AS {DisplayName}";
const MSG_GRAMMAR: &str = "MSG FROM {DisplayName} IS {MessageContent}";
const ERR_GRAMMAR: &str = "ERR FROM {DisplayName} IS {MessageContent}";
const REPLY_GRAMMAR: &str = "REPLY {OK|NOK} IS {MessageContent}";
const BYE_GRAMMAR: &str = "BYE";

const KNOWN_VERBS: &str = "one of AUTH, JOIN, MSG, ERR, REPLY, BYE";

/// [`Codec`] for CRLF-terminated text lines.
///
/// `encode` output includes the trailing `\r\n`. `decode` accepts a line with
/// or without it (the line framer strips terminators before decoding).
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamCodec;

impl Codec for StreamCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>, ProtocolError> {
        let line = match message {
            Message::Reply {
                result, content, ..
            } => {
                let verdict = if *result { "OK" } else { "NOK" };
                format!("REPLY {verdict} IS {content}")
            }
            Message::Msg {
                display_name,
                content,
                ..
            } => format!("MSG FROM {display_name} IS {content}"),
            Message::Err {
                display_name,
                content,
                ..
            } => format!("ERR FROM {display_name} IS {content}"),
            Message::Bye { .. } => "BYE".to_string(),
            Message::Confirm { .. } | Message::Auth { .. } | Message::Join { .. } => {
                return Err(ProtocolError::Unencodable {
                    kind: message.kind(),
                    transport: TransportKind::Stream,
                });
            }
        };

        let mut bytes = line.into_bytes();
        bytes.extend_from_slice(LINE_END.as_bytes());
        Ok(bytes)
    }

    fn decode(&self, data: &[u8]) -> Result<Message, ProtocolError> {
        let line = std::str::from_utf8(data).map_err(|_| ProtocolError::Malformed {
            expected: "an ASCII text line".into(),
            got: String::from_utf8_lossy(data).into_owned(),
        })?;
        let line = line
            .strip_suffix(LINE_END)
            .or_else(|| line.strip_suffix('\n'))
            .unwrap_or(line);

        if line.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let (verb, rest) = split_token(line);

        if verb.eq_ignore_ascii_case("AUTH") {
            let mut fields = Fields::new(line, rest, MessageKind::Auth, AUTH_GRAMMAR);
            let username = Username::new(fields.token("Username")?)?;
            fields.keyword("AS")?;
            let display_name = DisplayName::new(fields.token("DisplayName")?)?;
            fields.keyword("USING")?;
            let secret = Secret::new(fields.rest("Secret")?)?;
            Ok(Message::Auth {
                id: MessageId::default(),
                username,
                display_name,
                secret,
            })
        } else if verb.eq_ignore_ascii_case("JOIN") {
            let mut fields = Fields::new(line, rest, MessageKind::Join, JOIN_GRAMMAR);
            let channel_id = ChannelId::new(fields.token("ChannelID")?)?;
            fields.keyword("AS")?;
            let display_name = DisplayName::new(fields.rest("DisplayName")?)?;
            Ok(Message::Join {
                id: MessageId::default(),
                channel_id,
                display_name,
            })
        } else if verb.eq_ignore_ascii_case("MSG") {
            let mut fields = Fields::new(line, rest, MessageKind::Msg, MSG_GRAMMAR);
            let (display_name, content) = fields.from_is()?;
            Ok(Message::Msg {
                id: MessageId::default(),
                display_name,
                content,
            })
        } else if verb.eq_ignore_ascii_case("ERR") {
            let mut fields = Fields::new(line, rest, MessageKind::Err, ERR_GRAMMAR);
            let (display_name, content) = fields.from_is()?;
            Ok(Message::Err {
                id: MessageId::default(),
                display_name,
                content,
            })
        } else if verb.eq_ignore_ascii_case("REPLY") {
            let mut fields = Fields::new(line, rest, MessageKind::Reply, REPLY_GRAMMAR);
            let verdict = fields.token("Result")?;
            let result = if verdict.eq_ignore_ascii_case("OK") {
                true
            } else if verdict.eq_ignore_ascii_case("NOK") {
                false
            } else {
                return Err(fields.malformed());
            };
            fields.keyword("IS")?;
            let content = Content::new(fields.rest("MessageContent")?)?;
            Ok(Message::Reply {
                id: MessageId::default(),
                result,
                ref_id: MessageId::default(),
                content,
            })
        } else if verb.eq_ignore_ascii_case("BYE") {
            if !rest.is_empty() {
                return Err(ProtocolError::Malformed {
                    expected: BYE_GRAMMAR.into(),
                    got: line.into(),
                });
            }
            Ok(Message::bye())
        } else {
            Err(ProtocolError::UnknownKind {
                expected: KNOWN_VERBS,
                got: verb.into(),
            })
        }
    }

    fn transport(&self) -> TransportKind {
        TransportKind::Stream
    }
}

/// Splits at the first space: `("MSG", "FROM a IS b")`.
fn split_token(s: &str) -> (&str, &str) {
    match s.split_once(' ') {
        Some((head, tail)) => (head, tail),
        None => (s, ""),
    }
}

/// Cursor over the fields following the verb.
struct Fields<'a> {
    line: &'a str,
    rest: &'a str,
    kind: MessageKind,
    grammar: &'static str,
}

impl<'a> Fields<'a> {
    fn new(line: &'a str, rest: &'a str, kind: MessageKind, grammar: &'static str) -> Self {
        Self {
            line,
            rest,
            kind,
            grammar,
        }
    }

    fn malformed(&self) -> ProtocolError {
        ProtocolError::Malformed {
            expected: self.grammar.into(),
            got: self.line.into(),
        }
    }

    /// Next space-delimited token.
    fn token(&mut self, missing: &'static str) -> Result<&'a str, ProtocolError> {
        if self.rest.is_empty() {
            return Err(ProtocolError::Truncated {
                kind: self.kind,
                missing,
            });
        }
        let (token, rest) = split_token(self.rest);
        if token.is_empty() {
            return Err(self.malformed());
        }
        self.rest = rest;
        Ok(token)
    }

    /// Next token, which must equal `keyword` ignoring ASCII case.
    fn keyword(&mut self, keyword: &'static str) -> Result<(), ProtocolError> {
        let token = self.token(keyword)?;
        if token.eq_ignore_ascii_case(keyword) {
            Ok(())
        } else {
            Err(self.malformed())
        }
    }

    /// Everything left on the line.
    fn rest(&mut self, missing: &'static str) -> Result<&'a str, ProtocolError> {
        if self.rest.is_empty() {
            return Err(ProtocolError::Truncated {
                kind: self.kind,
                missing,
            });
        }
        Ok(std::mem::take(&mut self.rest))
    }

    /// `FROM {DisplayName} IS {MessageContent}`, shared by MSG and ERR.
    fn from_is(&mut self) -> Result<(DisplayName, Content), ProtocolError> {
        self.keyword("FROM")?;
        let display_name = DisplayName::new(self.token("DisplayName")?)?;
        self.keyword("IS")?;
        let content = Content::new(self.rest("MessageContent")?)?;
        Ok((display_name, content))
    }
}
