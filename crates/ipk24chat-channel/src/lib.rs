//! Channel membership and broadcast for IPK24-CHAT.
//!
//! Every logged-in user is a member of exactly one channel. Members of a
//! channel see each other's messages plus server notices when someone
//! joins, leaves, or changes display name.
//!
//! # Key types
//!
//! - [`ChannelRegistry`]: all live channels; join/leave/rename/broadcast
//! - [`Channel`]: one named channel and its members
//! - [`ChannelUser`]: a member's display name and link to its connection
//! - [`PeerTable`]: resolves a member's [`MemberLink`] to a live connection
//!
//! # Locking
//!
//! Each channel has its own lock; the registry lock only guards the
//! id → channel map. When both are needed (evicting an emptied channel),
//! the channel lock is taken first. No message is sent while holding
//! either lock.

mod channel;
mod peers;
mod registry;

pub use channel::{Channel, ChannelUser};
pub use peers::{MemberLink, PeerTable};
pub use ipk24chat_protocol::DEFAULT_CHANNEL;
pub use registry::ChannelRegistry;
