//! Lookup from channel members to their live connections.

use std::collections::HashMap;

use ipk24chat_transport::{Connection, ConnectionId, Peer, TransportKind};
use tokio::sync::Mutex;

/// A channel member's reference to its connection.
///
/// Channels store links, not connections, so being a member never keeps a
/// closed connection alive. The link is resolved through the
/// [`PeerTable`] at fan-out time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberLink {
    pub connection: ConnectionId,
    pub kind: TransportKind,
}

/// Live connections by id.
///
/// Sessions register their connection on login and unregister it when
/// they close; a link whose connection is gone resolves to `None`.
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: Mutex<HashMap<ConnectionId, Peer>>,
}

impl PeerTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection and returns the link members use to reach it.
    pub async fn register(&self, peer: Peer) -> MemberLink {
        let link = MemberLink {
            connection: peer.id(),
            kind: peer.kind(),
        };
        self.peers.lock().await.insert(link.connection, peer);
        link
    }

    /// Removes a connection.
    pub async fn unregister(&self, id: ConnectionId) {
        self.peers.lock().await.remove(&id);
    }

    /// Resolves a link to its connection, if it is still registered.
    pub async fn resolve(&self, link: MemberLink) -> Option<Peer> {
        self.peers.lock().await.get(&link.connection).cloned()
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.peers.lock().await.len()
    }

    /// Returns `true` if no connection is registered.
    pub async fn is_empty(&self) -> bool {
        self.peers.lock().await.is_empty()
    }
}
