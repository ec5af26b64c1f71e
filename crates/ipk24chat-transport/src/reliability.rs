//! Reliability sublayer for the datagram transport.
//!
//! UDP may drop, duplicate or reorder datagrams. IPK24-CHAT makes delivery
//! reliable at the application level:
//!
//! - every message except `CONFIRM` must be acknowledged by a `CONFIRM`
//!   carrying its id ([`ConfirmTable`] tracks the ones the server waits for);
//! - an unacknowledged message is re-sent after a timeout, up to
//!   [`ReliabilitySettings::attempts`] times in total;
//! - the receiver confirms every copy it gets, but processes each id only
//!   once ([`SeenIds`]).

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use ipk24chat_protocol::MessageId;
use tokio::sync::{Mutex, oneshot};

/// Timeout and retry budget for confirmed sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReliabilitySettings {
    /// How long to wait for a `CONFIRM` after each transmission.
    pub timeout: Duration,
    /// How many times to re-send after the first transmission.
    pub max_retransmissions: u8,
}

impl ReliabilitySettings {
    /// Total transmissions per message: the first send plus retransmissions.
    pub fn attempts(&self) -> u32 {
        1 + u32::from(self.max_retransmissions)
    }
}

impl Default for ReliabilitySettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(250),
            max_retransmissions: 3,
        }
    }
}

/// Pending confirmations, keyed by the id of the message awaiting one.
#[derive(Debug, Default)]
pub(crate) struct ConfirmTable {
    pending: Mutex<HashMap<MessageId, oneshot::Sender<()>>>,
}

impl ConfirmTable {
    /// Registers a wait for `id` and returns the handle that fires when a
    /// matching `CONFIRM` arrives.
    pub(crate) async fn register(&self, id: MessageId) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        rx
    }

    /// Signals the wait for `ref_id`. Returns `false` if nothing was waiting.
    pub(crate) async fn resolve(&self, ref_id: MessageId) -> bool {
        match self.pending.lock().await.remove(&ref_id) {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Drops the wait for `id` after its retry budget ran out.
    pub(crate) async fn abandon(&self, id: MessageId) {
        self.pending.lock().await.remove(&id);
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }
}

/// Ids of every message already handed to the session.
#[derive(Debug, Default)]
pub(crate) struct SeenIds {
    ids: Mutex<HashSet<MessageId>>,
}

impl SeenIds {
    /// Records `id`; returns `true` the first time it is seen.
    pub(crate) async fn first_sighting(&self, id: MessageId) -> bool {
        self.ids.lock().await.insert(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempts_counts_first_send() {
        let settings = ReliabilitySettings {
            timeout: Duration::from_millis(10),
            max_retransmissions: 0,
        };
        assert_eq!(settings.attempts(), 1);
        assert_eq!(ReliabilitySettings::default().attempts(), 4);
    }

    #[tokio::test]
    async fn test_resolve_fires_registered_wait() {
        let table = ConfirmTable::default();
        let rx = table.register(MessageId(5)).await;
        assert!(table.resolve(MessageId(5)).await);
        assert!(rx.await.is_ok());
        assert_eq!(table.len().await, 0);
    }

    #[tokio::test]
    async fn test_resolve_unknown_id_returns_false() {
        let table = ConfirmTable::default();
        let _rx = table.register(MessageId(1)).await;
        assert!(!table.resolve(MessageId(2)).await);
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn test_resolve_twice_only_fires_once() {
        let table = ConfirmTable::default();
        let _rx = table.register(MessageId(1)).await;
        assert!(table.resolve(MessageId(1)).await);
        assert!(!table.resolve(MessageId(1)).await);
    }

    #[tokio::test]
    async fn test_abandon_removes_wait() {
        let table = ConfirmTable::default();
        let rx = table.register(MessageId(3)).await;
        table.abandon(MessageId(3)).await;
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_first_sighting_rejects_duplicates() {
        let seen = SeenIds::default();
        assert!(seen.first_sighting(MessageId(7)).await);
        assert!(!seen.first_sighting(MessageId(7)).await);
        assert!(seen.first_sighting(MessageId(8)).await);
    }
}
