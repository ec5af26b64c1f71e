//! Core protocol types for the IPK24-CHAT wire format.
//!
//! This module defines every message that travels "on the wire". The
//! [`Message`] enum is a tagged union: each variant carries exactly the
//! fields its kind allows, so a `Join` with a secret or a `Bye` with a
//! display name simply can't be built.

use std::fmt;

use crate::{ChannelId, Content, DisplayName, Secret, Username};

// ---------------------------------------------------------------------------
// MessageId
// ---------------------------------------------------------------------------

/// A 16-bit message identifier.
///
/// On the datagram transport every message except `CONFIRM` carries one,
/// and the receiver echoes it back as the reference id of its `CONFIRM`
/// (and of a `REPLY`). The stream transport has no ids; messages decoded
/// from a stream carry `MessageId(0)`, which encoders ignore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct MessageId(pub u16);

impl MessageId {
    /// Returns the id following this one, wrapping modulo 2^16.
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// The seven message kinds, without their fields.
///
/// Useful for logging and for error values that need to name a kind
/// without holding a whole message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Confirm,
    Reply,
    Auth,
    Join,
    Msg,
    Err,
    Bye,
}

impl MessageKind {
    /// The datagram type byte for this kind.
    pub fn type_byte(self) -> u8 {
        match self {
            Self::Confirm => 0x00,
            Self::Reply => 0x01,
            Self::Auth => 0x02,
            Self::Join => 0x03,
            Self::Msg => 0x04,
            Self::Err => 0xFE,
            Self::Bye => 0xFF,
        }
    }

    /// Looks up a kind by its datagram type byte.
    pub fn from_type_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Confirm),
            0x01 => Some(Self::Reply),
            0x02 => Some(Self::Auth),
            0x03 => Some(Self::Join),
            0x04 => Some(Self::Msg),
            0xFE => Some(Self::Err),
            0xFF => Some(Self::Bye),
            _ => None,
        }
    }

    /// Whether a datagram of this kind must be acknowledged with `CONFIRM`.
    pub fn requires_confirm(self) -> bool {
        !matches!(self, Self::Confirm)
    }

    /// Whether the server awaits a `CONFIRM` after sending this kind.
    ///
    /// `CONFIRM` and `BYE` are fire-and-forget on the way out.
    pub fn awaits_confirm(self) -> bool {
        !matches!(self, Self::Confirm | Self::Bye)
    }

    /// Whether the server may send this kind to a client.
    pub fn is_server_to_client(self) -> bool {
        !matches!(self, Self::Auth | Self::Join)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Confirm => "CONFIRM",
            Self::Reply => "REPLY",
            Self::Auth => "AUTH",
            Self::Join => "JOIN",
            Self::Msg => "MSG",
            Self::Err => "ERR",
            Self::Bye => "BYE",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single IPK24-CHAT message.
///
/// Directions:
/// - client → server: `Auth`, `Join`, `Msg`, `Err`, `Bye`, `Confirm`
/// - server → client: `Reply`, `Msg`, `Err`, `Bye`, `Confirm`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Datagram-only acknowledgment of the message with id `ref_id`.
    Confirm { ref_id: MessageId },

    /// The server's answer to an `Auth` or `Join`.
    Reply {
        id: MessageId,
        result: bool,
        ref_id: MessageId,
        content: Content,
    },

    /// Login request.
    Auth {
        id: MessageId,
        username: Username,
        display_name: DisplayName,
        secret: Secret,
    },

    /// Request to switch to another channel.
    Join {
        id: MessageId,
        channel_id: ChannelId,
        display_name: DisplayName,
    },

    /// A chat line.
    Msg {
        id: MessageId,
        display_name: DisplayName,
        content: Content,
    },

    /// An error report; the sender closes the conversation after it.
    Err {
        id: MessageId,
        display_name: DisplayName,
        content: Content,
    },

    /// End of conversation.
    Bye { id: MessageId },
}

impl Message {
    /// Returns the kind of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Confirm { .. } => MessageKind::Confirm,
            Self::Reply { .. } => MessageKind::Reply,
            Self::Auth { .. } => MessageKind::Auth,
            Self::Join { .. } => MessageKind::Join,
            Self::Msg { .. } => MessageKind::Msg,
            Self::Err { .. } => MessageKind::Err,
            Self::Bye { .. } => MessageKind::Bye,
        }
    }

    /// Returns the message id, or `None` for `Confirm`.
    pub fn id(&self) -> Option<MessageId> {
        match self {
            Self::Confirm { .. } => None,
            Self::Reply { id, .. }
            | Self::Auth { id, .. }
            | Self::Join { id, .. }
            | Self::Msg { id, .. }
            | Self::Err { id, .. }
            | Self::Bye { id } => Some(*id),
        }
    }

    /// Returns a copy of this message carrying `new_id`.
    ///
    /// `Confirm` has no id of its own and is returned unchanged.
    pub fn with_id(mut self, new_id: MessageId) -> Self {
        match &mut self {
            Self::Confirm { .. } => {}
            Self::Reply { id, .. }
            | Self::Auth { id, .. }
            | Self::Join { id, .. }
            | Self::Msg { id, .. }
            | Self::Err { id, .. }
            | Self::Bye { id } => *id = new_id,
        }
        self
    }

    /// Builds a `Msg` from the server (display name `Server`).
    pub fn server_msg(content: Content) -> Self {
        Self::Msg {
            id: MessageId::default(),
            display_name: DisplayName::server(),
            content,
        }
    }

    /// Builds an `Err` from the server (display name `Server`).
    pub fn server_err(content: Content) -> Self {
        Self::Err {
            id: MessageId::default(),
            display_name: DisplayName::server(),
            content,
        }
    }

    /// Builds a `Reply` answering the message with id `ref_id`.
    pub fn reply(result: bool, ref_id: MessageId, content: Content) -> Self {
        Self::Reply {
            id: MessageId::default(),
            result,
            ref_id,
            content,
        }
    }

    /// Builds a `Bye`.
    pub fn bye() -> Self {
        Self::Bye {
            id: MessageId::default(),
        }
    }

    /// Builds a `Confirm` acknowledging `ref_id`.
    pub fn confirm(ref_id: MessageId) -> Self {
        Self::Confirm { ref_id }
    }
}

/// Renders the message as `KIND Field=value ...`, the layout used in the
/// server's RECV/SENT log lines.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())?;
        match self {
            Self::Confirm { ref_id } => write!(f, " RefMessageId={ref_id}"),
            Self::Reply {
                id,
                result,
                ref_id,
                content,
            } => write!(
                f,
                " MessageId={id} RefMessageId={ref_id} Result={result} MessageContent={content}"
            ),
            Self::Auth {
                id,
                username,
                display_name,
                secret,
            } => write!(
                f,
                " MessageId={id} Username={username} DisplayName={display_name} Secret={secret}"
            ),
            Self::Join {
                id,
                channel_id,
                display_name,
            } => write!(
                f,
                " MessageId={id} ChannelId={channel_id} DisplayName={display_name}"
            ),
            Self::Msg {
                id,
                display_name,
                content,
            }
            | Self::Err {
                id,
                display_name,
                content,
            } => write!(
                f,
                " MessageId={id} DisplayName={display_name} MessageContent={content}"
            ),
            Self::Bye { id } => write!(f, " MessageId={id}"),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
