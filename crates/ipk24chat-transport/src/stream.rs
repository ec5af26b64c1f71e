//! Stream transport: TCP connections carrying CRLF-terminated text lines.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use ipk24chat_protocol::{Codec, Message, ProtocolError, StreamCodec};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::{Connection, ConnectionId, Decoded, LineCodec, Transport, TransportError, TransportKind};

/// A TCP [`Transport`] that listens for incoming clients.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Binds a new TCP transport to the given address.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::BindFailed)?;
        tracing::info!(%addr, "TCP transport listening");
        Ok(Self { listener })
    }
}

impl Transport for TcpTransport {
    type Accepted = (Arc<StreamConnection>, StreamReader);

    async fn accept(&mut self) -> Result<Self::Accepted, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        let accepted = StreamConnection::split(stream, addr);
        tracing::debug!(id = %accepted.0.id(), %addr, "accepted TCP connection");
        Ok(accepted)
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener
            .local_addr()
            .map_err(TransportError::BindFailed)
    }
}

/// The writing half of one TCP client connection.
///
/// Shared (behind an `Arc`) between the client's own session and every
/// channel broadcast that targets it; writes are serialized by a mutex so
/// lines never interleave.
pub struct StreamConnection {
    id: ConnectionId,
    peer: SocketAddr,
    writer: Mutex<FramedWrite<OwnedWriteHalf, LineCodec>>,
    fault: CancellationToken,
    closed: AtomicBool,
}

impl StreamConnection {
    /// Splits an accepted socket into the shared writing half and the
    /// reader owned by the session's receive loop.
    pub fn split(stream: TcpStream, peer: SocketAddr) -> (Arc<Self>, StreamReader) {
        let (read, write) = stream.into_split();
        let connection = Arc::new(Self {
            id: ConnectionId::next(),
            peer,
            writer: Mutex::new(FramedWrite::new(write, LineCodec::default())),
            fault: CancellationToken::new(),
            closed: AtomicBool::new(false),
        });
        let reader = StreamReader {
            peer,
            inner: FramedRead::new(read, LineCodec::default()),
        };
        (connection, reader)
    }
}

impl fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConnection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl Connection for StreamConnection {
    async fn send(&self, message: Message) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed(self.peer.to_string()));
        }
        let bytes = StreamCodec.encode(&message)?;
        tracing::debug!(peer = %self.peer, %message, "SENT");

        let result = self.writer.lock().await.send(Bytes::from(bytes)).await;
        result.map_err(|e| {
            self.fault.cancel();
            match e {
                // FramedWrite reports I/O failures through `From<io::Error>`.
                TransportError::ReceiveFailed(io) => TransportError::SendFailed(io),
                other => other,
            }
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.writer
            .lock()
            .await
            .get_mut()
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Stream
    }

    fn fault(&self) -> &CancellationToken {
        &self.fault
    }
}

/// The reading half of one TCP client connection.
pub struct StreamReader {
    peer: SocketAddr,
    inner: FramedRead<OwnedReadHalf, LineCodec>,
}

impl StreamReader {
    /// Waits for the next line and decodes it.
    ///
    /// Returns `Ok(None)` when the client closed the connection. A line
    /// that fails to decode, or is too long, comes back as `Some(Err(..))`
    /// so the session can answer it with `ERR`.
    pub async fn recv(&mut self) -> Result<Option<Decoded>, TransportError> {
        match self.inner.next().await {
            None => Ok(None),
            Some(Ok(line)) => {
                let decoded = StreamCodec.decode(&line);
                match &decoded {
                    Ok(message) => tracing::debug!(peer = %self.peer, %message, "RECV"),
                    Err(error) => tracing::debug!(peer = %self.peer, %error, "RECV malformed"),
                }
                Ok(Some(decoded))
            }
            Some(Err(TransportError::LineTooLong { limit })) => {
                Ok(Some(Err(ProtocolError::Malformed {
                    expected: format!("a line of at most {limit} bytes"),
                    got: "a longer line".into(),
                })))
            }
            Some(Err(e)) => Err(e),
        }
    }

    /// Returns the client's address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl fmt::Debug for StreamReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamReader")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}
