//! Server configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use ipk24chat_transport::ReliabilitySettings;
use serde::{Deserialize, Serialize};

use crate::ChatError;

/// Listening address and datagram reliability knobs.
///
/// Every field has a default, so a JSON file only needs the values it
/// changes:
///
/// ```json
/// { "port": 5000, "udp_timeout_ms": 100 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address both listeners bind to.
    pub listen_ip: IpAddr,
    /// Port shared by the TCP listener and the UDP welcome socket.
    pub port: u16,
    /// How long a datagram waits for its `CONFIRM` before it is resent.
    pub udp_timeout_ms: u64,
    /// Resends after the first attempt before a client is given up on.
    pub max_retransmissions: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 4567,
            udp_timeout_ms: 250,
            max_retransmissions: 3,
        }
    }
}

impl ServerConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns [`ChatError::Config`] if the file can't be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ChatError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ChatError::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| ChatError::Config(format!("invalid config {}: {e}", path.display())))
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_ip, self.port)
    }

    pub fn udp_timeout(&self) -> Duration {
        Duration::from_millis(self.udp_timeout_ms)
    }

    /// Total sends per datagram, the first one included.
    pub fn attempts(&self) -> u32 {
        self.reliability().attempts()
    }

    pub fn reliability(&self) -> ReliabilitySettings {
        ReliabilitySettings {
            timeout: self.udp_timeout(),
            max_retransmissions: self.max_retransmissions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_protocol_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr(), "0.0.0.0:4567".parse().unwrap());
        assert_eq!(config.udp_timeout(), Duration::from_millis(250));
        assert_eq!(config.attempts(), 4);
    }

    #[test]
    fn test_deserialize_partial_json_fills_defaults() {
        let config: ServerConfig =
            serde_json::from_str(r#"{ "port": 5000, "max_retransmissions": 0 }"#).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.attempts(), 1);
        assert_eq!(config.udp_timeout_ms, 250);
        assert_eq!(config.listen_ip, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn test_from_json_file_missing_file_is_config_error() {
        let err = ServerConfig::from_json_file("/nonexistent/ipk24chat.json").unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }

    #[test]
    fn test_from_json_file_reads_values() {
        let path = std::env::temp_dir().join(format!("ipk24chat-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "listen_ip": "127.0.0.1", "udp_timeout_ms": 100 }"#).unwrap();

        let config = ServerConfig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.listen_addr(), "127.0.0.1:4567".parse().unwrap());
        assert_eq!(config.udp_timeout(), Duration::from_millis(100));
    }

    #[test]
    fn test_from_json_file_rejects_bad_json() {
        let path = std::env::temp_dir().join(format!("ipk24chat-bad-{}.json", std::process::id()));
        std::fs::write(&path, "{ port: ").unwrap();

        let err = ServerConfig::from_json_file(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(err.to_string().contains("invalid config"));
    }
}
