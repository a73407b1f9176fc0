//! Request policy
//!
//! Per-operation options. Nothing here is persisted.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::KvError;

/// How a write treats the caller's etag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Concurrency {
    /// Enforce the etag check
    #[default]
    FirstWrite,

    /// Ignore the etag and overwrite
    LastWrite,
}

/// How long a write waits before reporting success
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Consistency {
    /// Return once the primary has applied the write
    #[default]
    Eventual,

    /// Also wait for every connected replica to acknowledge
    Strong,
}

impl FromStr for Concurrency {
    type Err = KvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first-write" => Ok(Concurrency::FirstWrite),
            "last-write" => Ok(Concurrency::LastWrite),
            other => Err(KvError::InvalidArgument(format!(
                "unknown concurrency mode '{}' (expected first-write or last-write)",
                other
            ))),
        }
    }
}

impl FromStr for Consistency {
    type Err = KvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eventual" => Ok(Consistency::Eventual),
            "strong" => Ok(Consistency::Strong),
            other => Err(KvError::InvalidArgument(format!(
                "unknown consistency level '{}' (expected eventual or strong)",
                other
            ))),
        }
    }
}

impl fmt::Display for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Concurrency::FirstWrite => f.write_str("first-write"),
            Concurrency::LastWrite => f.write_str("last-write"),
        }
    }
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Consistency::Eventual => f.write_str("eventual"),
            Consistency::Strong => f.write_str("strong"),
        }
    }
}

// =============================================================================
// Operation Options
// =============================================================================

/// Options for [`Client::get`](super::Client::get)
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    pub deadline: Option<Instant>,
}

impl GetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up once `timeout` has elapsed from now
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Options for [`Client::set`](super::Client::set)
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Version the caller believes is current; 0 skips the check
    pub etag: u64,

    pub concurrency: Concurrency,

    pub consistency: Consistency,

    pub deadline: Option<Instant>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn etag(mut self, etag: u64) -> Self {
        self.etag = etag;
        self
    }

    pub fn concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }

    /// Give up once `timeout` has elapsed from now
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Etag actually sent to the server
    pub fn effective_etag(&self) -> u64 {
        match self.concurrency {
            Concurrency::FirstWrite => self.etag,
            Concurrency::LastWrite => 0,
        }
    }
}

/// Options for [`Client::delete`](super::Client::delete)
///
/// Deletes never wait for replica acknowledgment.
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    /// Version the caller believes is current; 0 skips the check
    pub etag: u64,

    pub deadline: Option<Instant>,
}

impl DeleteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn etag(mut self, etag: u64) -> Self {
        self.etag = etag;
        self
    }

    /// Give up once `timeout` has elapsed from now
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}
