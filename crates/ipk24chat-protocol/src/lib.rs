//! Wire protocol for IPK24-CHAT.
//!
//! This crate defines the "language" that chat clients and the server speak,
//! on both transports:
//!
//! - **Types** ([`Message`], [`MessageKind`], validated field newtypes such
//!   as [`DisplayName`] and [`Content`]): one variant per message kind, so a
//!   message can never carry a field combination its kind doesn't allow.
//! - **Codecs** ([`Codec`] trait, [`StreamCodec`], [`DatagramCodec`]): how
//!   messages become CRLF-terminated text lines or binary datagrams.
//! - **Errors** ([`ProtocolError`]): malformed input and forbidden encodes.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and session
//! (per-connection state machine). It doesn't know about sockets or
//! channels; it only turns bytes into messages and back.
//!
//! ```text
//! Transport (bytes) → Protocol (Message) → Session (state machine)
//! ```

mod binary;
mod codec;
mod error;
mod fields;
mod text;
mod types;

pub use binary::DatagramCodec;
pub use codec::{Codec, TransportKind, codec_for};
pub use error::ProtocolError;
pub use fields::{ChannelId, Content, DisplayName, Secret, Username};
pub use text::StreamCodec;
pub use types::{Message, MessageId, MessageKind};

/// Display name used for every message the server itself originates.
pub const SERVER_DISPLAY_NAME: &str = "Server";

/// Id of the channel every user lands in after logging in.
pub const DEFAULT_CHANNEL: &str = "general";
