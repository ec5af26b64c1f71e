//! `ChatServer` builder and accept loops.
//!
//! This is the entry point for running an IPK24-CHAT server. It ties
//! together all the layers: transport → protocol → session → channel.

use std::future::Future;
use std::net::SocketAddr;

use ipk24chat_session::{ChatContext, run_datagram, run_stream};
use ipk24chat_transport::{TcpTransport, Transport, UdpTransport};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{ChatError, ServerConfig};

/// Builder for configuring and starting a chat server.
///
/// # Example
///
/// ```rust,no_run
/// # async fn start() -> Result<(), ipk24chat::ChatError> {
/// use ipk24chat::{ChatServer, ServerConfig};
/// use tokio_util::sync::CancellationToken;
///
/// let server = ChatServer::builder()
///     .config(ServerConfig::default())
///     .build()
///     .await?;
/// server.run_until(CancellationToken::new()).await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ChatServerBuilder {
    config: ServerConfig,
    context: Option<ChatContext>,
}

impl ChatServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the listening address and reliability settings.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses existing shared registries instead of fresh ones.
    pub fn context(mut self, context: ChatContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Binds the TCP listener and the UDP welcome socket.
    ///
    /// Both use the configured address; with port 0 the UDP socket takes
    /// whatever port the TCP listener got.
    ///
    /// # Errors
    /// Returns [`ChatError::Transport`] if either bind fails.
    pub async fn build(self) -> Result<ChatServer, ChatError> {
        let tcp = TcpTransport::bind(self.config.listen_addr()).await?;
        let udp_addr = SocketAddr::new(self.config.listen_ip, tcp.local_addr()?.port());
        let udp = UdpTransport::bind(udp_addr, self.config.reliability()).await?;

        Ok(ChatServer {
            tcp,
            udp,
            context: self.context.unwrap_or_default(),
        })
    }
}

/// A bound chat server.
///
/// Call [`run_until()`](Self::run_until) to start accepting clients.
pub struct ChatServer {
    tcp: TcpTransport,
    udp: UdpTransport,
    context: ChatContext,
}

impl ChatServer {
    /// Creates a new builder.
    pub fn builder() -> ChatServerBuilder {
        ChatServerBuilder::new()
    }

    /// Address of the TCP listener.
    ///
    /// # Errors
    /// Returns [`ChatError::Transport`] if the socket has no local address.
    pub fn tcp_addr(&self) -> Result<SocketAddr, ChatError> {
        Ok(self.tcp.local_addr()?)
    }

    /// Address of the UDP welcome socket.
    ///
    /// # Errors
    /// Returns [`ChatError::Transport`] if the socket has no local address.
    pub fn udp_addr(&self) -> Result<SocketAddr, ChatError> {
        Ok(self.udp.local_addr()?)
    }

    /// The registries shared by every session.
    pub fn context(&self) -> &ChatContext {
        &self.context
    }

    /// Accepts clients on both transports until `shutdown` is cancelled,
    /// then waits for every session to finish closing.
    pub async fn run_until(self, shutdown: CancellationToken) {
        let Self { tcp, udp, context } = self;
        tracing::info!(
            tcp = ?tcp.local_addr().ok(),
            udp = ?udp.local_addr().ok(),
            "IPK24-CHAT server running"
        );

        let streams = serve(tcp, &shutdown, |(connection, reader), token| {
            run_stream(connection, reader, context.clone(), token)
        });
        let datagrams = serve(udp, &shutdown, |handshake, token| {
            run_datagram(handshake, context.clone(), token)
        });
        tokio::join!(streams, datagrams);

        tracing::info!("IPK24-CHAT server stopped");
    }
}

/// One listener's accept loop. Each accepted client becomes a session task
/// with a child of `shutdown`, and the loop only returns once all of them
/// are done.
///
/// Accepting runs in its own task: a UDP accept confirms the client's first
/// datagram before it returns, so it must never be dropped halfway.
async fn serve<T, F, Fut>(mut transport: T, shutdown: &CancellationToken, start: F)
where
    T: Transport,
    F: Fn(T::Accepted, CancellationToken) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let local = transport.local_addr().ok();
    let (tx, mut accepted) = mpsc::channel(1);
    let acceptor = tokio::spawn(async move {
        loop {
            let result = transport.accept().await;
            if tx.send(result).await.is_err() {
                break;
            }
        }
    });
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = accepted.recv() => match result {
                Some(Ok(client)) => {
                    sessions.spawn(start(client, shutdown.child_token()));
                }
                Some(Err(error)) => {
                    tracing::error!(listener = ?local, %error, "accept failed");
                }
                None => break,
            },
            Some(finished) = sessions.join_next(), if !sessions.is_empty() => reap(finished),
        }
    }
    acceptor.abort();

    tracing::info!(listener = ?local, sessions = sessions.len(), "draining sessions");
    while let Some(finished) = sessions.join_next().await {
        reap(finished);
    }
}

fn reap(finished: Result<(), JoinError>) {
    if let Err(error) = finished {
        tracing::error!(%error, "session task failed");
    }
}
