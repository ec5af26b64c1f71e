//! Shared state handed to every session.

use std::sync::Arc;

use ipk24chat_channel::{ChannelRegistry, PeerTable};

use crate::LoginRegistry;

/// Handles to the server-wide registries.
///
/// Cloning is cheap; every session gets its own clone at construction.
#[derive(Debug, Clone)]
pub struct ChatContext {
    pub channels: Arc<ChannelRegistry>,
    pub logins: Arc<LoginRegistry>,
}

impl ChatContext {
    /// Fresh registries holding only the default channel.
    pub fn new() -> Self {
        Self {
            channels: Arc::new(ChannelRegistry::new(Arc::new(PeerTable::new()))),
            logins: Arc::new(LoginRegistry::new()),
        }
    }

    /// Live connections of logged-in users.
    pub fn peers(&self) -> &Arc<PeerTable> {
        self.channels.peers()
    }
}

impl Default for ChatContext {
    fn default() -> Self {
        Self::new()
    }
}
