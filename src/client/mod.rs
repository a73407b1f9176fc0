//! Client Module
//!
//! The versioned key-value client.
//!
//! ## Responsibilities
//! - Connect, probe liveness and discover replicas once
//! - Versioned reads with legacy fallback
//! - Optimistic-concurrency writes and deletes via server-side scripts
//! - Optional replica acknowledgment after writes
//!
//! ## Operation Flow
//! ```text
//!  get ──► read::read_entry ──► HGETALL ─(rejected/timeout)─► GET
//!
//!  set ──► cas::compare_and_set ──► EVAL SET_SCRIPT
//!                 │
//!                 └─(strong, replicas > 0)─► consistency::await_replicas ──► WAIT
//!
//!  delete ──► cas::compare_and_delete ──► EVAL DELETE_SCRIPT
//! ```

mod cas;
mod consistency;
mod options;
mod read;
pub mod topology;

pub use cas::{DELETE_SCRIPT, SET_SCRIPT};
pub use consistency::REPLICA_ACK_TIMEOUT;
pub use options::{Concurrency, Consistency, DeleteOptions, GetOptions, SetOptions};

use bytes::Bytes;

use crate::config::{self, ClientConfig};
use crate::error::{KvError, Result};
use crate::network::Session;

/// A stored value and its version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub data: Bytes,

    /// `None` for legacy plain values, which cannot be used for CAS
    pub version: Option<u64>,
}

impl Entry {
    /// Etag to pass back on the next write; 0 (unconditional) for legacy values
    pub fn etag(&self) -> u64 {
        self.version.unwrap_or(0)
    }
}

/// Versioned key-value client
///
/// ## Concurrency:
/// - `Client` is `Send + Sync`; share it behind an `Arc` or by reference
/// - No per-entry locks: the CAS scripts are the only check-and-mutate
///   mechanism
/// - `replica_count` is written once during `connect` and never again
pub struct Client {
    /// Client configuration
    config: ClientConfig,

    /// Connection to the store
    session: Session,

    /// Replicas connected when the client was created
    replica_count: usize,
}

impl Client {
    /// Connect with default settings
    pub fn connect(url: &str) -> Result<Self> {
        Self::connect_with(ClientConfig::builder().url(url).build())
    }

    /// Connect with the given config
    ///
    /// On startup:
    /// 1. Parse the URL
    /// 2. Open the connection, authenticate and PING
    /// 3. Discover the replica count
    pub fn connect_with(config: ClientConfig) -> Result<Self> {
        // Step 1: Parse the URL
        let info = config::parse_url(&config.url)?;
        let addr = info.addr.to_string();

        // Step 2: Connect and probe liveness
        let session = Session::establish(info, config.timeouts()).map_err(|e| {
            KvError::Connection {
                addr: addr.clone(),
                source: Box::new(e),
            }
        })?;

        // Step 3: One-time topology discovery
        let replica_count =
            topology::discover_replica_count(&session, config.strict_topology, None).map_err(
                |e| KvError::Initialization {
                    source: Box::new(e),
                },
            )?;

        tracing::info!(
            "Connected to {} ({} replicas connected)",
            addr,
            replica_count
        );

        Ok(Self {
            config,
            session,
            replica_count,
        })
    }

    /// Read the entry stored at `key`
    pub fn get(&self, key: &str, options: &GetOptions) -> Result<Entry> {
        validate_key(key)?;
        read::read_entry(&self.session, key, options.deadline)
    }

    /// Write `data` to `key` if the etag check passes; returns the new version
    ///
    /// A [`KvError::ConsistencyTimeout`] means the write is committed on the
    /// primary at the version it carries, but not confirmed on replicas.
    pub fn set(&self, key: &str, data: &[u8], options: &SetOptions) -> Result<u64> {
        validate_key(key)?;

        let etag = options.effective_etag();
        let deadline = options.deadline;
        let wait = options.consistency == Consistency::Strong && self.replica_count > 0;

        // The script and its WAIT share one connection
        self.session
            .with_connection(deadline, |link| {
                let version = cas::compare_and_set(link, key, data, etag, deadline)?;
                if wait {
                    consistency::await_replicas(link, key, version, self.replica_count, deadline)?;
                }
                Ok(version)
            })
            .map_err(|e| match e {
                // Raised before the script was sent
                KvError::DeadlineExceeded | KvError::Connection { .. } => {
                    KvError::store("set", key, e)
                }
                other => other,
            })
    }

    /// Delete `key` if the etag check passes; deleting a missing key succeeds
    pub fn delete(&self, key: &str, options: &DeleteOptions) -> Result<()> {
        validate_key(key)?;
        cas::compare_and_delete(&self.session, key, options.etag, options.deadline)?;
        Ok(())
    }

    /// Round-trip a PING to the store
    pub fn ping(&self) -> Result<()> {
        self.session
            .ping(None)
            .map_err(|e| KvError::store("ping", "", e))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Replicas connected at connect time
    pub fn replica_count(&self) -> usize {
        self.replica_count
    }

    /// Address of the store
    pub fn addr(&self) -> String {
        self.session.addr()
    }

    /// Get the configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(KvError::InvalidArgument("key must not be empty".to_string()));
    }
    Ok(())
}
