//! Error types for statekv
//!
//! Provides a unified error type for all client operations.

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for statekv operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // Transport Errors
    // -------------------------------------------------------------------------
    /// Transport failure or error reply, as reported by the redis client
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Reply of an unexpected shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Deadline exceeded before the request was sent")]
    DeadlineExceeded,

    /// The connection was dropped part way through a multi-step exchange
    #[error("Connection lost during the exchange")]
    ConnectionLost,

    // -------------------------------------------------------------------------
    // Startup Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to connect to {addr}: {source}")]
    Connection {
        addr: String,
        #[source]
        source: Box<KvError>,
    },

    #[error("Client initialization failed: {source}")]
    Initialization {
        #[source]
        source: Box<KvError>,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Entry Errors
    // -------------------------------------------------------------------------
    /// Version check failed on the server; re-read and retry with a fresh etag
    #[error("Version conflict on key {key}")]
    Conflict { key: String },

    #[error("Key not found: {key}")]
    NotFound { key: String },

    #[error("Corrupt entry at key {key}: {reason}")]
    CorruptEntry { key: String, reason: String },

    /// The write committed on the primary at `version`, but fewer than
    /// `required` replicas acknowledged it in time.
    #[error("Write to {key} committed at version {version} but only {acked}/{required} replicas acknowledged")]
    ConsistencyTimeout {
        key: String,
        version: u64,
        acked: u64,
        required: usize,
    },

    // -------------------------------------------------------------------------
    // Operation Context
    // -------------------------------------------------------------------------
    #[error("{operation} on key {key} failed: {source}")]
    Store {
        operation: &'static str,
        key: String,
        #[source]
        source: Box<KvError>,
    },
}

impl KvError {
    /// Wrap a lower-level failure with the operation and key it happened on
    pub fn store(operation: &'static str, key: &str, source: KvError) -> Self {
        KvError::Store {
            operation,
            key: key.to_string(),
            source: Box::new(source),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, KvError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::NotFound { .. })
    }

    /// True for socket timeouts and expired deadlines, looking through
    /// context wrappers.
    pub fn is_timeout(&self) -> bool {
        match self {
            KvError::Redis(e) => e.is_timeout(),
            KvError::DeadlineExceeded => true,
            KvError::Store { source, .. } | KvError::Connection { source, .. } => {
                source.is_timeout()
            }
            _ => false,
        }
    }

    /// True when the store answered with an error reply, as opposed to a
    /// transport failure. The connection is still usable afterwards.
    pub fn is_reply_error(&self) -> bool {
        matches!(self, KvError::Redis(e) if e.code().is_some())
    }
}
