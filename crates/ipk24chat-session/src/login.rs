//! The logged-in-user registry.

use std::collections::HashMap;

use ipk24chat_protocol::Username;
use tokio::sync::Mutex;

/// Which usernames currently have an open session.
///
/// Used only to turn away a second concurrent login under the same name.
/// Logging out clears the flag but keeps the entry.
#[derive(Debug, Default)]
pub struct LoginRegistry {
    users: Mutex<HashMap<Username, bool>>,
}

impl LoginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `username` active. Returns `false` if it already was.
    ///
    /// The check and the update happen under one lock, so of two racing
    /// logins exactly one wins.
    pub async fn try_login(&self, username: &Username) -> bool {
        let mut users = self.users.lock().await;
        let active = users.entry(username.clone()).or_insert(false);
        if *active {
            return false;
        }
        *active = true;
        tracing::debug!(%username, "user logged in");
        true
    }

    /// Marks `username` inactive.
    pub async fn logout(&self, username: &Username) {
        if let Some(active) = self.users.lock().await.get_mut(username) {
            *active = false;
            tracing::debug!(%username, "user logged out");
        }
    }

    /// Whether `username` currently has an open session.
    pub async fn is_active(&self, username: &Username) -> bool {
        self.users
            .lock()
            .await
            .get(username)
            .copied()
            .unwrap_or(false)
    }

    /// Number of active users.
    pub async fn active_count(&self) -> usize {
        self.users
            .lock()
            .await
            .values()
            .filter(|active| **active)
            .count()
    }
}
