//! A single channel and its members.

use std::collections::HashMap;

use ipk24chat_protocol::{ChannelId, DisplayName, Username};
use tokio::sync::{Mutex, MutexGuard};

use crate::MemberLink;

/// One member's channel-facing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelUser {
    display_name: DisplayName,
    link: MemberLink,
}

impl ChannelUser {
    pub fn new(display_name: DisplayName, link: MemberLink) -> Self {
        Self { display_name, link }
    }

    pub fn display_name(&self) -> &DisplayName {
        &self.display_name
    }

    pub fn link(&self) -> MemberLink {
        self.link
    }

    pub(crate) fn set_display_name(&mut self, display_name: DisplayName) {
        self.display_name = display_name;
    }
}

/// Membership plus the eviction flag, guarded together.
#[derive(Debug, Default)]
pub(crate) struct ChannelState {
    pub(crate) members: HashMap<Username, ChannelUser>,
    /// Set once the channel has been removed from the registry. A joiner
    /// that finds this set must fetch the channel again.
    pub(crate) evicted: bool,
}

/// A named broadcast group.
///
/// Only [`ChannelRegistry`](crate::ChannelRegistry) mutates membership;
/// the accessors here are for inspection.
#[derive(Debug)]
pub struct Channel {
    id: ChannelId,
    persistent: bool,
    state: Mutex<ChannelState>,
}

impl Channel {
    pub(crate) fn new(id: ChannelId, persistent: bool) -> Self {
        Self {
            id,
            persistent,
            state: Mutex::new(ChannelState::default()),
        }
    }

    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    /// Persistent channels stay registered when their last member leaves.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub async fn member_count(&self) -> usize {
        self.state.lock().await.members.len()
    }

    /// The current display name of `username`, if it is a member.
    pub async fn display_name_of(&self, username: &Username) -> Option<DisplayName> {
        self.state
            .lock()
            .await
            .members
            .get(username)
            .map(|user| user.display_name().clone())
    }

    /// Whether the channel has been removed from its registry.
    pub async fn is_evicted(&self) -> bool {
        self.state.lock().await.evicted
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().await
    }
}
