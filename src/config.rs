//! Server configuration.
//!
//! Defaults suit a worker behind a single trusted front end. The
//! conventional `FCGI_WEB_SERVER_ADDRS` environment variable can restrict
//! which front-end addresses may connect over TCP:
//!
//! ```text
//! FCGI_WEB_SERVER_ADDRS=127.0.0.1,10.0.0.5
//! ```

use std::net::IpAddr;

use crate::emitter::DEFAULT_STREAM_CHUNK_SIZE;
use crate::error::{FcgiError, Result};
use crate::protocol::{Role, MAX_CONTENT_LENGTH};

/// Environment variable listing allowed front-end addresses.
pub const WEB_SERVER_ADDRS_ENV: &str = "FCGI_WEB_SERVER_ADDRS";

/// Configuration shared by every connection of a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Maximum content bytes per STDOUT/STDERR record (1..=65535).
    pub stream_chunk_size: usize,
    /// Roles this worker accepts; others get UNKNOWN_ROLE.
    pub roles: Vec<Role>,
    /// Front-end addresses allowed to connect over TCP; `None` allows all.
    pub allowed_peers: Option<Vec<IpAddr>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            stream_chunk_size: DEFAULT_STREAM_CHUNK_SIZE,
            roles: Role::ALL.to_vec(),
            allowed_peers: None,
        }
    }
}

impl ServerConfig {
    /// Defaults, with `allowed_peers` taken from `FCGI_WEB_SERVER_ADDRS`.
    ///
    /// An unset or empty variable allows every peer.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(value) = std::env::var(WEB_SERVER_ADDRS_ENV) {
            config.allowed_peers = parse_allowed_peers(&value)?;
        }
        Ok(config)
    }

    /// Check the configuration for values the protocol cannot carry.
    pub fn validate(&self) -> Result<()> {
        if self.stream_chunk_size == 0 || self.stream_chunk_size > MAX_CONTENT_LENGTH {
            return Err(FcgiError::Config(format!(
                "stream_chunk_size must be within 1..={}, got {}",
                MAX_CONTENT_LENGTH, self.stream_chunk_size
            )));
        }
        if self.roles.is_empty() {
            return Err(FcgiError::Config("at least one role must be accepted".to_string()));
        }
        Ok(())
    }

    /// Check if a TCP peer may connect.
    pub fn is_peer_allowed(&self, ip: IpAddr) -> bool {
        match &self.allowed_peers {
            Some(allowed) => allowed.contains(&ip),
            None => true,
        }
    }
}

/// Parse a comma-separated address list.
///
/// Returns `None` for a blank list.
pub fn parse_allowed_peers(value: &str) -> Result<Option<Vec<IpAddr>>> {
    let mut peers = Vec::new();
    for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let ip = entry.parse::<IpAddr>().map_err(|e| {
            FcgiError::Config(format!("invalid address {:?} in {}: {}", entry, WEB_SERVER_ADDRS_ENV, e))
        })?;
        peers.push(ip);
    }
    Ok(if peers.is_empty() { None } else { Some(peers) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.stream_chunk_size, 8192);
        assert_eq!(config.roles.len(), 3);
        assert!(config.allowed_peers.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_allowed_peers() {
        let peers = parse_allowed_peers(" 127.0.0.1, ::1 ,,").unwrap().unwrap();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0], "127.0.0.1".parse::<IpAddr>().unwrap());
        assert!(peers[1].is_loopback());
    }

    #[test]
    fn test_parse_blank_list() {
        assert_eq!(parse_allowed_peers("").unwrap(), None);
        assert_eq!(parse_allowed_peers(" , ").unwrap(), None);
    }

    #[test]
    fn test_parse_invalid_address() {
        let err = parse_allowed_peers("127.0.0.1,frontend.local").unwrap_err();
        assert!(err.to_string().contains("frontend.local"));
    }

    #[test]
    fn test_peer_filter() {
        let config = ServerConfig {
            allowed_peers: Some(vec!["10.0.0.5".parse().unwrap()]),
            ..ServerConfig::default()
        };
        assert!(config.is_peer_allowed("10.0.0.5".parse().unwrap()));
        assert!(!config.is_peer_allowed("10.0.0.6".parse().unwrap()));
        assert!(ServerConfig::default().is_peer_allowed("8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ServerConfig {
            stream_chunk_size: 70_000,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            roles: vec![],
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
