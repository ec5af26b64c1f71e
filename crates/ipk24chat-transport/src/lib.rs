//! Transport layer for IPK24-CHAT.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the two network flavours the server speaks:
//!
//! - **Stream** ([`TcpTransport`], [`StreamConnection`]): one TCP connection
//!   per client, CRLF-framed text lines.
//! - **Datagram** ([`UdpTransport`], [`DatagramConnection`]): one logical
//!   connection per client endpoint, with the reliability sublayer
//!   (confirmations, retransmission, duplicate suppression) built in.
//!
//! Both connection types hand out decoded [`Message`]s and accept
//! [`Message`]s to send, so the session layer above never touches bytes.

mod datagram;
mod error;
mod framing;
mod reliability;
mod stream;

pub use datagram::{DatagramConnection, Handshake, UdpTransport};
pub use error::TransportError;
pub use framing::{LineCodec, MAX_LINE_LENGTH};
pub use ipk24chat_protocol::TransportKind;
pub use reliability::ReliabilitySettings;
pub use stream::{StreamConnection, StreamReader, TcpTransport};

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ipk24chat_protocol::{Message, ProtocolError};
use tokio_util::sync::CancellationToken;

/// One inbound item: a decoded message, or the format error that stopped
/// the bytes from decoding.
pub type Decoded = Result<Message, ProtocolError>;

/// Counter for generating unique connection IDs across both transports.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-wide unique id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming clients.
pub trait Transport: Send + 'static {
    /// What a successful accept yields.
    type Accepted: Send + 'static;

    /// Waits for and accepts the next client.
    fn accept(&mut self) -> impl Future<Output = Result<Self::Accepted, TransportError>> + Send;

    /// The address the transport listens on.
    fn local_addr(&self) -> Result<SocketAddr, TransportError>;
}

/// The sending half of a client connection.
///
/// Futures are spelled out as `impl Future + Send` so that generic callers
/// can still hand them to `tokio::spawn`.
pub trait Connection: Send + Sync + 'static {
    /// Sends one message to the client.
    ///
    /// On the datagram transport this allocates a fresh message id and, for
    /// every kind except `CONFIRM` and `BYE`, waits until the client
    /// confirms it.
    fn send(&self, message: Message) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Closes the connection. Further sends fail.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Returns the client's address.
    fn peer_addr(&self) -> SocketAddr;

    /// Which transport this connection runs over.
    fn kind(&self) -> TransportKind;

    /// Cancelled once the connection hits a fatal error, from whichever
    /// task was sending at the time.
    fn fault(&self) -> &CancellationToken;
}

/// A shareable handle to either kind of connection.
///
/// Channels keep one of these per member so they can fan out messages
/// without knowing which transport the member uses.
#[derive(Debug, Clone)]
pub enum Peer {
    /// A TCP client.
    Stream(Arc<StreamConnection>),
    /// A UDP client.
    Datagram(Arc<DatagramConnection>),
}

impl Connection for Peer {
    async fn send(&self, message: Message) -> Result<(), TransportError> {
        match self {
            Self::Stream(conn) => conn.send(message).await,
            Self::Datagram(conn) => conn.send(message).await,
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        match self {
            Self::Stream(conn) => conn.close().await,
            Self::Datagram(conn) => conn.close().await,
        }
    }

    fn id(&self) -> ConnectionId {
        match self {
            Self::Stream(conn) => conn.id(),
            Self::Datagram(conn) => conn.id(),
        }
    }

    fn peer_addr(&self) -> SocketAddr {
        match self {
            Self::Stream(conn) => conn.peer_addr(),
            Self::Datagram(conn) => conn.peer_addr(),
        }
    }

    fn kind(&self) -> TransportKind {
        match self {
            Self::Stream(_) => TransportKind::Stream,
            Self::Datagram(_) => TransportKind::Datagram,
        }
    }

    fn fault(&self) -> &CancellationToken {
        match self {
            Self::Stream(conn) => conn.fault(),
            Self::Datagram(conn) => conn.fault(),
        }
    }
}

impl From<Arc<StreamConnection>> for Peer {
    fn from(conn: Arc<StreamConnection>) -> Self {
        Self::Stream(conn)
    }
}

impl From<Arc<DatagramConnection>> for Peer {
    fn from(conn: Arc<DatagramConnection>) -> Self {
        Self::Datagram(conn)
    }
}
