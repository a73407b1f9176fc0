//! Replica topology
//!
//! Reads the number of connected replicas from the store's replication
//! report.

use std::time::Instant;

use redis::Value;

use crate::error::{KvError, Result};
use crate::network::Session;

/// Line prefix carrying the connected replica count
pub const CONNECTED_REPLICAS_PREFIX: &str = "connected_slaves:";

/// Outcome of scanning a replication report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicaCount {
    /// The report named a count
    Reported(usize),

    /// No count line was present (empty report, or a store without
    /// replication)
    Absent,

    /// A count line was present but its value is not a number
    Unparseable(String),
}

impl ReplicaCount {
    /// Count to use when leniency is acceptable
    pub fn or_zero(&self) -> usize {
        match self {
            ReplicaCount::Reported(n) => *n,
            ReplicaCount::Absent | ReplicaCount::Unparseable(_) => 0,
        }
    }
}

/// Scan a free-text replication report for the connected replica count
pub fn parse_connected_replicas(report: &str) -> ReplicaCount {
    for line in report.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(value) = line.strip_prefix(CONNECTED_REPLICAS_PREFIX) {
            return match value.trim().parse::<usize>() {
                Ok(n) => ReplicaCount::Reported(n),
                Err(_) => ReplicaCount::Unparseable(value.to_string()),
            };
        }
    }

    ReplicaCount::Absent
}

/// Ask the store how many replicas are connected
///
/// An unparseable count degrades to 0 with a warning unless `strict` is
/// set, in which case it is a protocol error.
pub fn discover_replica_count(
    session: &Session,
    strict: bool,
    deadline: Option<Instant>,
) -> Result<usize> {
    let reply = session.call(redis::cmd("INFO").arg("replication"), deadline)?;

    let report = match reply {
        Value::Data(data) => String::from_utf8_lossy(&data).into_owned(),
        Value::Status(text) => text,
        Value::Nil => String::new(),
        other => {
            return Err(KvError::Protocol(format!(
                "Unexpected reply to INFO: {:?}",
                other
            )))
        }
    };

    let count = parse_connected_replicas(&report);
    match &count {
        ReplicaCount::Reported(_) => {}
        ReplicaCount::Absent => {
            tracing::debug!("No replica count in replication report, assuming 0");
        }
        ReplicaCount::Unparseable(raw) if strict => {
            return Err(KvError::Protocol(format!(
                "Unparseable replica count '{}'",
                raw
            )))
        }
        ReplicaCount::Unparseable(raw) => {
            tracing::warn!(
                "Unparseable replica count '{}', assuming 0 (strong consistency will not wait)",
                raw
            );
        }
    }

    Ok(count.or_zero())
}
