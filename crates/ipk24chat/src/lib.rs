//! # IPK24-CHAT server
//!
//! A multi-user chat server speaking the IPK24-CHAT protocol over TCP
//! (CRLF text lines) and UDP (binary datagrams with confirmations and
//! retransmission) on the same port.
//!
//! Users authenticate, land in the `general` channel, and can join other
//! channels and broadcast messages to everyone in their current one. TCP
//! and UDP clients share the same channels.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ipk24chat::{ChatServer, ServerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), ipk24chat::ChatError> {
//! let shutdown = CancellationToken::new();
//! let server = ChatServer::builder()
//!     .config(ServerConfig::default())
//!     .build()
//!     .await?;
//! server.run_until(shutdown).await;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod server;

pub use config::ServerConfig;
pub use error::ChatError;
pub use server::{ChatServer, ChatServerBuilder};

pub use ipk24chat_session::ChatContext;
