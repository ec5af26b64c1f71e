//! Datagram transport: UDP clients over the reliability sublayer.
//!
//! Clients first talk to the *welcome* socket ([`UdpTransport`]). The
//! welcome socket confirms that first datagram and opens a dedicated,
//! connected socket per client endpoint ([`DatagramConnection`]); from then
//! on the server answers from that socket and the client follows the new
//! port.

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use ipk24chat_protocol::{Codec, DatagramCodec, Message, MessageId, MessageKind};
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::reliability::{ConfirmTable, SeenIds};
use crate::{
    Connection, ConnectionId, Decoded, ReliabilitySettings, Transport, TransportError,
    TransportKind,
};

/// Largest UDP payload we read.
const MAX_DATAGRAM_SIZE: usize = 65_507;

/// A client accepted by the welcome socket, with the message that opened it.
///
/// `first` has already been confirmed by the welcome socket.
#[derive(Debug)]
pub struct Handshake {
    pub connection: Arc<DatagramConnection>,
    pub first: Message,
}

/// The UDP welcome socket.
pub struct UdpTransport {
    socket: UdpSocket,
    settings: ReliabilitySettings,
    /// Live connections by client endpoint, for datagrams that a client
    /// retransmits to the welcome port after its `CONFIRM` was lost.
    sessions: HashMap<SocketAddr, Weak<DatagramConnection>>,
    buf: Vec<u8>,
}

impl UdpTransport {
    /// Binds the welcome socket.
    pub async fn bind(
        addr: SocketAddr,
        settings: ReliabilitySettings,
    ) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(TransportError::BindFailed)?;
        tracing::info!(%addr, "UDP transport listening");
        Ok(Self {
            socket,
            settings,
            sessions: HashMap::new(),
            buf: vec![0u8; MAX_DATAGRAM_SIZE],
        })
    }

    async fn send_confirm(&self, to: SocketAddr, ref_id: MessageId) {
        let confirm = Message::confirm(ref_id);
        let sent = match DatagramCodec.encode(&confirm) {
            Ok(bytes) => self.socket.send_to(&bytes, to).await.map(|_| ()),
            Err(e) => Err(std::io::Error::other(e)),
        };
        match sent {
            Ok(()) => tracing::debug!(peer = %to, message = %confirm, "SENT"),
            Err(error) => tracing::warn!(peer = %to, %error, "failed to confirm on welcome port"),
        }
    }

    fn live_session(&self, from: &SocketAddr) -> Option<Arc<DatagramConnection>> {
        self.sessions
            .get(from)
            .and_then(Weak::upgrade)
            .filter(|conn| !conn.is_closed())
    }
}

impl Transport for UdpTransport {
    type Accepted = Handshake;

    async fn accept(&mut self) -> Result<Handshake, TransportError> {
        loop {
            let (len, from) = self
                .socket
                .recv_from(&mut self.buf)
                .await
                .map_err(TransportError::AcceptFailed)?;

            let message = match DatagramCodec.decode(&self.buf[..len]) {
                Ok(message) => message,
                Err(error) => {
                    tracing::warn!(peer = %from, %error, "dropping undecodable datagram on welcome port");
                    continue;
                }
            };
            tracing::debug!(peer = %from, %message, "RECV");

            let Some(id) = message.id() else {
                tracing::debug!(peer = %from, "ignoring CONFIRM on welcome port");
                continue;
            };
            self.send_confirm(from, id).await;

            if let Some(existing) = self.live_session(&from) {
                existing.forward(message);
                continue;
            }

            let local_ip = self
                .socket
                .local_addr()
                .map_err(TransportError::BindFailed)?
                .ip();
            let connection = DatagramConnection::open(local_ip, from, self.settings, id).await?;
            self.sessions.retain(|_, weak| weak.strong_count() > 0);
            self.sessions.insert(from, Arc::downgrade(&connection));
            tracing::debug!(id = %connection.id(), %from, "accepted UDP client");

            return Ok(Handshake {
                connection,
                first: message,
            });
        }
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::BindFailed)
    }
}

/// One UDP client, reached through its own connected socket.
///
/// Outbound messages get ids from a per-connection counter and, except for
/// `CONFIRM` and `BYE`, are retransmitted until confirmed. The counter's
/// mutex is held for the whole send, so there is at most one unconfirmed
/// message per client at any time and ids go out in order.
pub struct DatagramConnection {
    id: ConnectionId,
    peer: SocketAddr,
    socket: UdpSocket,
    settings: ReliabilitySettings,
    next_id: Mutex<MessageId>,
    confirms: ConfirmTable,
    seen: SeenIds,
    forwarded_tx: mpsc::UnboundedSender<Message>,
    inbox: Mutex<Inbox>,
    fault: CancellationToken,
    closed: AtomicBool,
}

/// Receive-side state, only touched by the session's receive loop.
struct Inbox {
    forwarded: mpsc::UnboundedReceiver<Message>,
    buf: Vec<u8>,
}

impl DatagramConnection {
    /// Opens a socket on `local_ip` connected to `peer`.
    ///
    /// `first_id` is the id of the already-confirmed handshake message; it
    /// is recorded as seen so a retransmitted copy isn't processed twice.
    pub async fn open(
        local_ip: IpAddr,
        peer: SocketAddr,
        settings: ReliabilitySettings,
        first_id: MessageId,
    ) -> Result<Arc<Self>, TransportError> {
        let socket = UdpSocket::bind(SocketAddr::new(local_ip, 0))
            .await
            .map_err(TransportError::BindFailed)?;
        socket
            .connect(peer)
            .await
            .map_err(TransportError::BindFailed)?;

        let (forwarded_tx, forwarded_rx) = mpsc::unbounded_channel();
        let connection = Self {
            id: ConnectionId::next(),
            peer,
            socket,
            settings,
            next_id: Mutex::new(MessageId(0)),
            confirms: ConfirmTable::default(),
            seen: SeenIds::default(),
            forwarded_tx,
            inbox: Mutex::new(Inbox {
                forwarded: forwarded_rx,
                buf: vec![0u8; MAX_DATAGRAM_SIZE],
            }),
            fault: CancellationToken::new(),
            closed: AtomicBool::new(false),
        };
        connection.seen.first_sighting(first_id).await;
        Ok(Arc::new(connection))
    }

    /// The session socket's local address (the port the client moves to).
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::BindFailed)
    }

    /// Whether the connection was closed or faulted.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.fault.is_cancelled()
    }

    /// Hands a message that reached the welcome port to this connection's
    /// inbound path.
    pub fn forward(&self, message: Message) {
        // The receiver lives as long as `self`.
        let _ = self.forwarded_tx.send(message);
    }

    /// Waits for the next message the session should process.
    ///
    /// Confirms every non-`CONFIRM` datagram (duplicates included), resolves
    /// pending waits on `CONFIRM`, and skips ids that were already
    /// delivered. Only the session's receive loop may call this.
    pub async fn recv(&self) -> Result<Decoded, TransportError> {
        let mut inbox = self.inbox.lock().await;
        let Inbox { forwarded, buf } = &mut *inbox;
        loop {
            tokio::select! {
                received = self.socket.recv(buf) => {
                    let len = received.map_err(|e| {
                        self.fault.cancel();
                        TransportError::ReceiveFailed(e)
                    })?;
                    if let Some(decoded) = self.on_datagram(&buf[..len]).await? {
                        return Ok(decoded);
                    }
                }
                Some(message) = forwarded.recv() => {
                    let fresh = match message.id() {
                        Some(id) => self.seen.first_sighting(id).await,
                        None => false,
                    };
                    if fresh {
                        return Ok(Ok(message));
                    }
                }
            }
        }
    }

    async fn on_datagram(&self, data: &[u8]) -> Result<Option<Decoded>, TransportError> {
        let decoded = DatagramCodec.decode(data);
        let id = match &decoded {
            Ok(Message::Confirm { ref_id }) => {
                tracing::debug!(peer = %self.peer, message = %Message::confirm(*ref_id), "RECV");
                if !self.confirms.resolve(*ref_id).await {
                    tracing::debug!(peer = %self.peer, ref_id = %ref_id, "CONFIRM matches no pending message");
                }
                return Ok(None);
            }
            Ok(message) => {
                tracing::debug!(peer = %self.peer, %message, "RECV");
                message.id()
            }
            Err(error) => {
                tracing::debug!(peer = %self.peer, %error, "RECV malformed");
                // Confirm what we can so the client stops retransmitting.
                DatagramCodec::peek_header(data)
                    .filter(|(kind, _)| *kind != MessageKind::Confirm)
                    .map(|(_, id)| id)
            }
        };

        let Some(id) = id else {
            return Ok(Some(decoded));
        };
        self.send(Message::confirm(id)).await?;
        if self.seen.first_sighting(id).await {
            Ok(Some(decoded))
        } else {
            tracing::debug!(peer = %self.peer, message_id = %id, "duplicate datagram, not reprocessing");
            Ok(None)
        }
    }

    async fn transmit(&self, bytes: &[u8]) -> Result<(), TransportError> {
        self.socket.send(bytes).await.map(|_| ()).map_err(|e| {
            self.fault.cancel();
            TransportError::SendFailed(e)
        })
    }
}

impl fmt::Debug for DatagramConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatagramConnection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl Connection for DatagramConnection {
    async fn send(&self, message: Message) -> Result<(), TransportError> {
        let kind = message.kind();

        if kind == MessageKind::Confirm {
            let bytes = DatagramCodec.encode(&message)?;
            tracing::debug!(peer = %self.peer, %message, "SENT");
            return self.transmit(&bytes).await;
        }

        // A faulted connection still gets its best-effort BYE.
        if self.closed.load(Ordering::Acquire)
            || (kind.awaits_confirm() && self.fault.is_cancelled())
        {
            return Err(TransportError::ConnectionClosed(self.peer.to_string()));
        }

        let mut next_id = self.next_id.lock().await;
        let id = *next_id;
        *next_id = id.next();

        let message = message.with_id(id);
        let bytes = DatagramCodec.encode(&message)?;
        tracing::debug!(peer = %self.peer, %message, "SENT");

        if !kind.awaits_confirm() {
            return self.transmit(&bytes).await;
        }

        let mut confirmed = self.confirms.register(id).await;
        let attempts = self.settings.attempts();
        for attempt in 1..=attempts {
            if let Err(e) = self.transmit(&bytes).await {
                self.confirms.abandon(id).await;
                return Err(e);
            }
            match tokio::time::timeout(self.settings.timeout, &mut confirmed).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(_)) => break,
                Err(_) => {
                    tracing::debug!(peer = %self.peer, message_id = %id, attempt, "no CONFIRM in time");
                }
            }
        }

        self.confirms.abandon(id).await;
        self.fault.cancel();
        tracing::warn!(peer = %self.peer, message_id = %id, attempts, "message undeliverable");
        Err(TransportError::Undeliverable {
            message_id: id,
            attempts,
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Datagram
    }

    fn fault(&self) -> &CancellationToken {
        &self.fault
    }
}
