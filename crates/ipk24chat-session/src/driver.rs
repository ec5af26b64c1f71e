//! Tasks that run a [`Session`] over a live connection.
//!
//! Each connection gets a receive task that pushes decoded items into a
//! queue, and a processing loop that feeds them to the session one at a
//! time. The queue is unbounded: the receive task must keep reading the
//! socket while a reply waits for its `CONFIRM`, however far the session
//! has fallen behind.

use std::sync::Arc;

use ipk24chat_transport::{
    Connection, Decoded, Handshake, Peer, StreamConnection, StreamReader, TransportError,
    TransportKind,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{ChatContext, Session};

enum Inbound {
    Message(Decoded),
    Lost(TransportError),
}

/// Runs the session for one accepted TCP client until it closes or
/// `shutdown` fires.
pub async fn run_stream(
    connection: Arc<StreamConnection>,
    mut reader: StreamReader,
    ctx: ChatContext,
    shutdown: CancellationToken,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let receiver = tokio::spawn(async move {
        loop {
            let item = match reader.recv().await {
                Ok(Some(decoded)) => Inbound::Message(decoded),
                Ok(None) => Inbound::Lost(TransportError::ConnectionClosed(
                    reader.peer_addr().to_string(),
                )),
                Err(error) => Inbound::Lost(error),
            };
            if !forward(&tx, item) {
                break;
            }
        }
    });

    drive(Session::new(Peer::from(connection), ctx), rx, shutdown).await;
    receiver.abort();
}

/// Runs the session for one UDP client, starting from its handshake
/// message (already confirmed by the listener).
pub async fn run_datagram(handshake: Handshake, ctx: ChatContext, shutdown: CancellationToken) {
    let Handshake { connection, first } = handshake;
    let (tx, rx) = mpsc::unbounded_channel();
    if tx.send(Inbound::Message(Ok(first))).is_err() {
        return;
    }

    let socket = Arc::clone(&connection);
    let receiver = tokio::spawn(async move {
        loop {
            let item = match socket.recv().await {
                Ok(decoded) => Inbound::Message(decoded),
                Err(error) => Inbound::Lost(error),
            };
            if !forward(&tx, item) {
                break;
            }
        }
    });

    drive(Session::new(Peer::from(connection), ctx), rx, shutdown).await;
    receiver.abort();
}

/// Queues `item`; returns `false` once the receive task should stop.
fn forward(tx: &mpsc::UnboundedSender<Inbound>, item: Inbound) -> bool {
    let last = matches!(item, Inbound::Lost(_));
    tx.send(item).is_ok() && !last
}

async fn drive(
    mut session: Session,
    mut inbound: mpsc::UnboundedReceiver<Inbound>,
    shutdown: CancellationToken,
) {
    let fault = session.peer().fault().clone();
    let peer = session.peer().peer_addr();
    session.start();

    while session.is_active() {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                tracing::info!(%peer, "server shutting down, closing session");
                break;
            }
            _ = fault.cancelled() => {
                tracing::warn!(%peer, "connection faulted");
                // A faulted stream has a broken write half.
                if session.peer().kind() == TransportKind::Stream {
                    session.mark_connection_lost();
                }
                break;
            }
            item = inbound.recv() => match item {
                Some(Inbound::Message(decoded)) => {
                    if let Err(error) = session.handle(decoded).await {
                        tracing::warn!(%peer, state = %session.state(), %error, "session failed");
                    }
                }
                Some(Inbound::Lost(error)) => {
                    tracing::info!(%peer, %error, "connection lost");
                    if !error.connection_usable() {
                        session.mark_connection_lost();
                    }
                    break;
                }
                None => {
                    session.mark_connection_lost();
                    break;
                }
            },
        }
    }

    session.close().await;
}
