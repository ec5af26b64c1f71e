//! The per-connection protocol state machine.
//!
//! The same [`Session`] drives both transports; it only ever sees decoded
//! [`Message`]s and hands replies to its [`Peer`].
//!
//! ```text
//!   New ──start──→ Authenticating ──AUTH ok──→ Open
//!                    │    ↑                      │
//!                    │    └──AUTH rejected       │
//!                    ▼                           ▼
//!                 Closing ←──ERR/BYE/violation───┘
//!                    │
//!                    ▼
//!                  Closed
//! ```

use std::fmt;

use ipk24chat_channel::{ChannelUser, MemberLink};
use ipk24chat_protocol::{
    ChannelId, Content, DisplayName, Message, MessageId, MessageKind, ProtocolError, Username,
};
use ipk24chat_transport::{Connection, Decoded, Peer};

use crate::{ChatContext, SessionError};

const AUTH_SUCCESS: &str = "Authentication is successful. Welcome to the server!";
const DUPLICATE_LOGIN: &str = "User with that username is already on the server";
const ALREADY_IN_CHANNEL: &str = "You are already on this channel";
const AUTH_REQUIRED: &str = "Authentication message was required, session will be terminated";
const UNEXPECTED_MESSAGE: &str = "Unexpected type of message, session will be terminated";

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Created, not yet started.
    New,
    /// Waiting for a successful `AUTH`.
    Authenticating,
    /// Logged in and a member of a channel.
    Open,
    /// Winding down; no further messages are processed.
    Closing,
    /// Terminal. Channel membership and login are released.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::New => "new",
            Self::Authenticating => "authenticating",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        })
    }
}

/// The logged-in user behind an open session.
#[derive(Debug)]
struct Member {
    username: Username,
    display_name: DisplayName,
    channel: ChannelId,
    link: MemberLink,
}

/// One client's protocol state.
///
/// Not shared: the driver task owns it and feeds it one message at a
/// time, which is what keeps transitions for a client in order.
#[derive(Debug)]
pub struct Session {
    peer: Peer,
    ctx: ChatContext,
    state: SessionState,
    member: Option<Member>,
    bye_allowed: bool,
}

impl Session {
    /// Creates a session in [`SessionState::New`].
    pub fn new(peer: Peer, ctx: ChatContext) -> Self {
        Self {
            peer,
            ctx,
            state: SessionState::New,
            member: None,
            bye_allowed: true,
        }
    }

    /// Moves a new session to Authenticating.
    pub fn start(&mut self) {
        if self.state == SessionState::New {
            self.state = SessionState::Authenticating;
            tracing::info!(
                peer = %self.peer.peer_addr(),
                conn_id = %self.peer.id(),
                transport = %self.peer.kind(),
                "session started"
            );
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session still processes messages.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            SessionState::New | SessionState::Authenticating | SessionState::Open
        )
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    pub fn username(&self) -> Option<&Username> {
        self.member.as_ref().map(|m| &m.username)
    }

    pub fn display_name(&self) -> Option<&DisplayName> {
        self.member.as_ref().map(|m| &m.display_name)
    }

    /// The channel the user is currently in.
    pub fn channel(&self) -> Option<&ChannelId> {
        self.member.as_ref().map(|m| &m.channel)
    }

    /// Records that the connection can no longer carry the closing `BYE`.
    pub fn mark_connection_lost(&mut self) {
        self.bye_allowed = false;
    }

    /// Processes one inbound item.
    ///
    /// Any error moves the session to Closing; the peer has already been
    /// sent an `ERR` where one applies. Items arriving once the session is
    /// no longer active are ignored.
    ///
    /// # Errors
    /// Returns the reason the session must close.
    pub async fn handle(&mut self, decoded: Decoded) -> Result<(), SessionError> {
        self.start();
        if !self.is_active() {
            return Ok(());
        }
        let result = self.dispatch(decoded).await;
        if let Err(error) = &result {
            self.bye_allowed &= error.connection_usable();
            self.state = SessionState::Closing;
        }
        result
    }

    async fn dispatch(&mut self, decoded: Decoded) -> Result<(), SessionError> {
        let message = match decoded {
            Ok(message) => message,
            Err(error) => {
                self.send(Message::server_err(Content::lossy(&describe(&error))))
                    .await?;
                return Err(error.into());
            }
        };

        match (self.state, message) {
            (_, Message::Err { .. } | Message::Bye { .. }) => {
                tracing::info!(peer = %self.peer.peer_addr(), "client ended the session");
                self.state = SessionState::Closing;
                Ok(())
            }
            (
                SessionState::Authenticating,
                Message::Auth {
                    id,
                    username,
                    display_name,
                    ..
                },
            ) => self.authenticate(id, username, display_name).await,
            (
                SessionState::Open,
                Message::Join {
                    id,
                    channel_id,
                    display_name,
                },
            ) => self.join(id, channel_id, display_name).await,
            (
                SessionState::Open,
                Message::Msg {
                    display_name,
                    content,
                    ..
                },
            ) => self.chat(display_name, content).await,
            (state, message) => {
                let text = if state == SessionState::Authenticating {
                    AUTH_REQUIRED
                } else {
                    UNEXPECTED_MESSAGE
                };
                self.send(Message::server_err(Content::lossy(text))).await?;
                Err(SessionError::ProtocolViolation {
                    state,
                    kind: message.kind(),
                })
            }
        }
    }

    async fn authenticate(
        &mut self,
        id: MessageId,
        username: Username,
        display_name: DisplayName,
    ) -> Result<(), SessionError> {
        if !self.ctx.logins.try_login(&username).await {
            tracing::info!(peer = %self.peer.peer_addr(), %username, "login rejected, user already active");
            return self
                .send(Message::reply(false, id, Content::lossy(DUPLICATE_LOGIN)))
                .await;
        }

        let link = self.ctx.peers().register(self.peer.clone()).await;
        let channel = ChannelId::general();
        self.state = SessionState::Open;
        self.member = Some(Member {
            username: username.clone(),
            display_name: display_name.clone(),
            channel: channel.clone(),
            link,
        });
        tracing::info!(peer = %self.peer.peer_addr(), %username, "user authenticated");

        self.ctx
            .channels
            .join(&channel, username, ChannelUser::new(display_name, link))
            .await;
        self.send(Message::reply(true, id, Content::lossy(AUTH_SUCCESS)))
            .await
    }

    async fn join(
        &mut self,
        id: MessageId,
        channel_id: ChannelId,
        display_name: DisplayName,
    ) -> Result<(), SessionError> {
        self.update_display_name(display_name).await;
        let member = self.member.as_mut().ok_or(SessionError::ProtocolViolation {
            state: self.state,
            kind: MessageKind::Join,
        })?;

        if member.channel == channel_id {
            return self
                .send(Message::reply(false, id, Content::lossy(ALREADY_IN_CHANNEL)))
                .await;
        }

        self.ctx.channels.leave(&member.channel, &member.username).await;
        let user = ChannelUser::new(member.display_name.clone(), member.link);
        self.ctx
            .channels
            .join(&channel_id, member.username.clone(), user)
            .await;
        tracing::info!(
            peer = %self.peer.peer_addr(),
            username = %member.username,
            from = %member.channel,
            channel = %channel_id,
            "user switched channel"
        );
        member.channel = channel_id;

        let text = format!("You have successfully joined \"{}\" channel", member.channel);
        self.send(Message::reply(true, id, Content::lossy(&text)))
            .await
    }

    async fn chat(
        &mut self,
        display_name: DisplayName,
        content: Content,
    ) -> Result<(), SessionError> {
        self.rename_if_changed(display_name).await;
        let member = self.member.as_ref().ok_or(SessionError::ProtocolViolation {
            state: self.state,
            kind: MessageKind::Msg,
        })?;

        let message = Message::Msg {
            id: MessageId::default(),
            display_name: member.display_name.clone(),
            content,
        };
        let delivered = self
            .ctx
            .channels
            .broadcast(&member.channel, message, &member.username)
            .await;
        tracing::debug!(channel = %member.channel, delivered, "message broadcast");
        Ok(())
    }

    /// Takes the display name carried by `JOIN` without a notice; the
    /// channel hears the new name in the following leave notice.
    async fn update_display_name(&mut self, display_name: DisplayName) {
        let Some(member) = self.member.as_mut() else {
            return;
        };
        if member.display_name == display_name {
            return;
        }
        self.ctx
            .channels
            .set_display_name(&member.channel, &member.username, display_name.clone())
            .await;
        member.display_name = display_name;
    }

    /// Propagates a display name carried by `MSG` to the current channel.
    async fn rename_if_changed(&mut self, display_name: DisplayName) {
        let Some(member) = self.member.as_mut() else {
            return;
        };
        if member.display_name == display_name {
            return;
        }
        self.ctx
            .channels
            .rename(&member.channel, &member.username, display_name.clone())
            .await;
        member.display_name = display_name;
    }

    /// Runs the Closing path once: best-effort `BYE`, then releases the
    /// channel membership, the login and the connection.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closing;

        if self.bye_allowed {
            if let Err(error) = self.peer.send(Message::bye()).await {
                tracing::debug!(peer = %self.peer.peer_addr(), %error, "BYE not delivered");
            }
        }

        if let Some(member) = self.member.take() {
            self.ctx
                .channels
                .leave(&member.channel, &member.username)
                .await;
            self.ctx.logins.logout(&member.username).await;
        }
        self.ctx.peers().unregister(self.peer.id()).await;
        if let Err(error) = self.peer.close().await {
            tracing::debug!(peer = %self.peer.peer_addr(), %error, "close failed");
        }

        self.state = SessionState::Closed;
        tracing::info!(peer = %self.peer.peer_addr(), conn_id = %self.peer.id(), "session closed");
    }

    async fn send(&self, message: Message) -> Result<(), SessionError> {
        self.peer.send(message).await.map_err(SessionError::from)
    }
}

/// The text of the `ERR` answering a format error.
fn describe(error: &ProtocolError) -> String {
    let (expected, got) = match error {
        ProtocolError::Empty => ("a message".to_string(), "an empty line".to_string()),
        ProtocolError::UnknownKind { expected, got } => (expected.to_string(), got.clone()),
        ProtocolError::Truncated { kind, missing } => {
            (format!("{kind} with {missing}"), "end of message".to_string())
        }
        ProtocolError::Malformed { expected, got } => (expected.clone(), got.clone()),
        ProtocolError::InvalidField {
            field,
            expected,
            got,
        } => (format!("{field} of {expected}"), got.clone()),
        ProtocolError::Unencodable { kind, transport } => {
            (format!("a {transport} message"), kind.to_string())
        }
    };
    format!("Invalid message format: expected {expected}, got {got}")
}
