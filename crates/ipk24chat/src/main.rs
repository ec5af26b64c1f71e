//! The `ipk24chat-server` binary.
//!
//! Usage:
//!   ipk24chat-server [-l 0.0.0.0] [-p 4567] [-d 250] [-r 3] [-c config.json]
//!
//! Values from `-c` are the base; explicit flags override them. Log
//! verbosity follows `RUST_LOG` (default `info`).

use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use ipk24chat::{ChatError, ChatServer, ServerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ipk24chat-server", version, about = "IPK24-CHAT server over TCP and UDP")]
struct Cli {
    /// Address to listen on.
    #[arg(short = 'l', long = "listen", value_name = "IP")]
    listen_ip: Option<IpAddr>,

    /// Port for both the TCP listener and the UDP welcome socket.
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,

    /// UDP confirmation timeout in milliseconds.
    #[arg(short = 'd', long = "timeout", value_name = "MS")]
    udp_timeout_ms: Option<u64>,

    /// Maximum number of UDP retransmissions.
    #[arg(short = 'r', long = "retransmissions", value_name = "COUNT")]
    max_retransmissions: Option<u8>,

    /// JSON config file used as the base configuration.
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Result<ServerConfig, ChatError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_json_file(path)?,
            None => ServerConfig::default(),
        };
        if let Some(ip) = self.listen_ip {
            config.listen_ip = ip;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(ms) = self.udp_timeout_ms {
            config.udp_timeout_ms = ms;
        }
        if let Some(count) = self.max_retransmissions {
            config.max_retransmissions = count;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), ChatError> {
    let config = cli.into_config()?;
    let server = ChatServer::builder().config(config).build().await?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("interrupt received, shutting down"),
            Err(error) => tracing::error!(%error, "cannot listen for interrupt, shutting down"),
        }
        trigger.cancel();
    });

    server.run_until(shutdown).await;
    Ok(())
}
