//! Configuration for statekv
//!
//! Centralized client configuration with sensible defaults, plus parsing of
//! the store connection URL.

use std::time::Duration;

use redis::{ConnectionAddr, ConnectionInfo, IntoConnectionInfo};

use crate::error::{KvError, Result};

/// Port used when the URL does not name one
pub const DEFAULT_PORT: u16 = 6379;

/// Main configuration for a statekv client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -------------------------------------------------------------------------
    // Connection Configuration
    // -------------------------------------------------------------------------
    /// Store URL: `redis://[[user]:password@]host[:port][/db]` or `host:port`
    pub url: String,

    /// TCP connect timeout (milliseconds)
    pub connect_timeout_ms: u64,

    /// Socket read timeout per request (milliseconds)
    pub read_timeout_ms: u64,

    /// Socket write timeout per request (milliseconds)
    pub write_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Topology Configuration
    // -------------------------------------------------------------------------
    /// Fail initialization when the replica count in the topology report
    /// cannot be parsed, instead of assuming zero replicas.
    pub strict_topology: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: format!("redis://127.0.0.1:{}", DEFAULT_PORT),
            connect_timeout_ms: 5000,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
            strict_topology: false,
        }
    }
}

impl ClientConfig {
    /// Create a new config builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_millis(self.connect_timeout_ms),
            read: Duration::from_millis(self.read_timeout_ms),
            write: Duration::from_millis(self.write_timeout_ms),
        }
    }
}

/// Builder for ClientConfig
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the store URL
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Reject unparseable replica counts at connect time
    pub fn strict_topology(mut self, strict: bool) -> Self {
        self.config.strict_topology = strict;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// Socket timeouts derived from [`ClientConfig`]
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
}

// =============================================================================
// Connection URL
// =============================================================================

/// Parse a store URL
///
/// Accepts `redis://[[user]:password@]host[:port][/db]` and a bare
/// `host:port`, which is read as `redis://host:port`. TLS (`rediss://`) is
/// not supported.
pub fn parse_url(url: &str) -> Result<ConnectionInfo> {
    let url = url.trim();
    if url.is_empty() {
        return Err(KvError::Config("empty connection URL".to_string()));
    }

    let normalized = if url.contains("://") {
        url.to_string()
    } else {
        format!("redis://{}", url)
    };

    let info = normalized
        .as_str()
        .into_connection_info()
        .map_err(|e| KvError::Config(format!("invalid store URL '{}': {}", url, e)))?;

    match &info.addr {
        ConnectionAddr::Tcp(host, _) if host.is_empty() => {
            Err(KvError::Config(format!("missing host in '{}'", url)))
        }
        ConnectionAddr::Tcp(_, 0) => Err(KvError::Config(format!("invalid port in '{}'", url))),
        ConnectionAddr::TcpTls { .. } => Err(KvError::Config(format!(
            "TLS connections are not supported: {}",
            url
        ))),
        _ => Ok(info),
    }
}
