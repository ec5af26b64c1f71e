//! Per-connection sessions for the IPK24-CHAT server.
//!
//! This crate turns a live connection into a chat participant:
//!
//! 1. **State machine**: [`Session`] walks a client through
//!    Authenticating, Open and Closing, answering each message.
//! 2. **Logins**: [`LoginRegistry`] rejects a second concurrent login
//!    under the same username.
//! 3. **Drivers**: [`run_stream`] and [`run_datagram`] feed a session from
//!    its connection, one message at a time.
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)       ← accepts clients, spawns a driver per client
//!     ↕
//! Session (this crate) ← protocol states, login bookkeeping
//!     ↕
//! Channel / Transport  ← membership and broadcast / framed connections
//! ```
//!
//! Shared registries are injected through [`ChatContext`]; nothing here
//! is a process-wide singleton.

mod context;
mod driver;
mod error;
mod login;
mod session;

pub use context::ChatContext;
pub use driver::{run_datagram, run_stream};
pub use error::SessionError;
pub use login::LoginRegistry;
pub use session::{Session, SessionState};
