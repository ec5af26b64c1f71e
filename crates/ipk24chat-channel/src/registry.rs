//! The channel registry: every live channel, keyed by id.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use ipk24chat_protocol::{ChannelId, Content, DisplayName, Message, Username};
use ipk24chat_transport::Connection;
use tokio::sync::Mutex;

use crate::channel::ChannelState;
use crate::{Channel, ChannelUser, MemberLink, PeerTable};

/// All live channels.
///
/// Starts out holding only the persistent default channel. Other channels
/// are created by their first joiner and evicted when their last member
/// leaves.
#[derive(Debug)]
pub struct ChannelRegistry {
    channels: Mutex<HashMap<ChannelId, Arc<Channel>>>,
    peers: Arc<PeerTable>,
}

impl ChannelRegistry {
    /// Creates a registry holding the default channel. Members are reached
    /// through `peers`.
    pub fn new(peers: Arc<PeerTable>) -> Self {
        let general = ChannelId::general();
        let mut channels = HashMap::new();
        channels.insert(general.clone(), Arc::new(Channel::new(general, true)));
        Self {
            channels: Mutex::new(channels),
            peers,
        }
    }

    /// The table members' links resolve through.
    pub fn peers(&self) -> &Arc<PeerTable> {
        &self.peers
    }

    /// Returns the channel with `id`, creating it if it doesn't exist.
    ///
    /// The check and the insert happen under one lock, so two callers never
    /// create two channels with the same id.
    pub async fn get_or_create(&self, id: &ChannelId) -> Arc<Channel> {
        let mut channels = self.channels.lock().await;
        if let Some(channel) = channels.get(id) {
            return Arc::clone(channel);
        }
        let channel = Arc::new(Channel::new(id.clone(), false));
        channels.insert(id.clone(), Arc::clone(&channel));
        tracing::info!(channel = %id, "channel created");
        channel
    }

    /// Adds `username` to channel `id` (creating it if needed) and tells the
    /// other members.
    pub async fn join(&self, id: &ChannelId, username: Username, user: ChannelUser) {
        let display_name = user.display_name().clone();
        let mut user = Some(user);

        let recipients = loop {
            let channel = self.get_or_create(id).await;
            let mut state = channel.lock().await;
            if state.evicted {
                // Lost the race with the last member leaving; fetch again.
                continue;
            }
            if let Some(user) = user.take() {
                state.members.insert(username.clone(), user);
            }
            break others(&state, &username);
        };

        tracing::info!(channel = %id, %username, "joined channel");
        self.notify(recipients, format!("{display_name} has joined the channel"))
            .await;
    }

    /// Removes `username` from channel `id` and tells the remaining members.
    ///
    /// A non-persistent channel left empty is evicted in the same critical
    /// section, so no joiner can attach to it afterwards.
    pub async fn leave(&self, id: &ChannelId, username: &Username) {
        let Some(channel) = self.channel(id).await else {
            return;
        };

        let mut state = channel.lock().await;
        let Some(user) = state.members.remove(username) else {
            return;
        };
        tracing::info!(channel = %id, %username, "left channel");

        if state.members.is_empty() && !channel.is_persistent() {
            state.evicted = true;
            let mut channels = self.channels.lock().await;
            if channels
                .get(id)
                .is_some_and(|current| Arc::ptr_eq(current, &channel))
            {
                channels.remove(id);
            }
            tracing::info!(channel = %id, "channel evicted");
            return;
        }

        let recipients = others(&state, username);
        drop(state);
        self.notify(
            recipients,
            format!("{} has left the channel", user.display_name()),
        )
        .await;
    }

    /// Changes the display name `username` shows in channel `id` and tells
    /// the other members.
    pub async fn rename(&self, id: &ChannelId, username: &Username, new_name: DisplayName) {
        let Some(channel) = self.channel(id).await else {
            return;
        };

        let mut state = channel.lock().await;
        let Some(user) = state.members.get_mut(username) else {
            return;
        };
        let old_name = user.display_name().clone();
        if old_name == new_name {
            return;
        }
        user.set_display_name(new_name.clone());

        let recipients = others(&state, username);
        drop(state);
        self.notify(
            recipients,
            format!("{old_name} has changed his display name to {new_name}"),
        )
        .await;
    }

    /// Changes the display name `username` shows in channel `id` without
    /// a notice. Returns whether the name changed.
    pub async fn set_display_name(
        &self,
        id: &ChannelId,
        username: &Username,
        new_name: DisplayName,
    ) -> bool {
        let Some(channel) = self.channel(id).await else {
            return false;
        };

        let mut state = channel.lock().await;
        match state.members.get_mut(username) {
            Some(user) if *user.display_name() != new_name => {
                user.set_display_name(new_name);
                true
            }
            _ => false,
        }
    }

    /// Sends `message` to every member of channel `id` except `exclude`.
    ///
    /// Waits until every delivery finished. A member whose delivery fails
    /// is logged and skipped (its own session notices the fault); the
    /// return value is the number of members that got the message.
    pub async fn broadcast(&self, id: &ChannelId, message: Message, exclude: &Username) -> usize {
        let Some(channel) = self.channel(id).await else {
            return 0;
        };
        let recipients = {
            let state = channel.lock().await;
            others(&state, exclude)
        };
        self.deliver(recipients, message).await
    }

    /// Returns the channel with `id`, if it exists.
    pub async fn channel(&self, id: &ChannelId) -> Option<Arc<Channel>> {
        self.channels.lock().await.get(id).cloned()
    }

    /// Whether a channel with `id` exists.
    pub async fn contains(&self, id: &ChannelId) -> bool {
        self.channels.lock().await.contains_key(id)
    }

    /// Members of channel `id` with their display names, sorted by username.
    pub async fn members(&self, id: &ChannelId) -> Vec<(Username, DisplayName)> {
        let Some(channel) = self.channel(id).await else {
            return Vec::new();
        };
        let state = channel.lock().await;
        let mut members: Vec<_> = state
            .members
            .iter()
            .map(|(username, user)| (username.clone(), user.display_name().clone()))
            .collect();
        members.sort();
        members
    }

    /// Number of live channels, the default one included.
    pub async fn channel_count(&self) -> usize {
        self.channels.lock().await.len()
    }

    async fn notify(&self, recipients: Vec<MemberLink>, text: String) {
        if recipients.is_empty() {
            return;
        }
        match Content::new(text) {
            Ok(content) => {
                self.deliver(recipients, Message::server_msg(content)).await;
            }
            Err(error) => tracing::warn!(%error, "cannot build channel notice"),
        }
    }

    async fn deliver(&self, recipients: Vec<MemberLink>, message: Message) -> usize {
        let mut peers = Vec::with_capacity(recipients.len());
        for link in recipients {
            match self.peers.resolve(link).await {
                Some(peer) => peers.push(peer),
                None => tracing::debug!(connection = %link.connection, "member has no live connection"),
            }
        }

        let sends = peers.iter().map(|peer| {
            let message = message.clone();
            async move { (peer, peer.send(message).await) }
        });

        let mut delivered = 0;
        for (peer, result) in join_all(sends).await {
            match result {
                Ok(()) => delivered += 1,
                Err(error) => {
                    tracing::warn!(peer = %peer.peer_addr(), %error, "channel delivery failed");
                }
            }
        }
        delivered
    }
}

/// Links of every member except `exclude`.
fn others(state: &ChannelState, exclude: &Username) -> Vec<MemberLink> {
    state
        .members
        .iter()
        .filter(|(username, _)| *username != exclude)
        .map(|(_, user)| user.link())
        .collect()
}
