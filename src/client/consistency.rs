//! Consistency coordinator
//!
//! Blocks a committed write until the connected replicas acknowledge it.

use std::time::{Duration, Instant};

use redis::Value;

use crate::error::{KvError, Result};
use crate::network::Link;

/// Longest the store is asked to hold a write for replica acknowledgment
pub const REPLICA_ACK_TIMEOUT: Duration = Duration::from_millis(1000);

/// Wait for `replicas` acknowledgments of the write that produced `version`
///
/// `WAIT` only counts writes sent on its own connection, so `link` must be
/// the one the write went out on. Every failure here reports the write as
/// committed but unconfirmed.
pub fn await_replicas(
    link: &mut Link<'_>,
    key: &str,
    version: u64,
    replicas: usize,
    deadline: Option<Instant>,
) -> Result<()> {
    let unconfirmed = |acked: u64| KvError::ConsistencyTimeout {
        key: key.to_string(),
        version,
        acked,
        required: replicas,
    };

    let mut budget = REPLICA_ACK_TIMEOUT;
    if let Some(deadline) = deadline {
        budget = budget.min(deadline.saturating_duration_since(Instant::now()));
    }

    // WAIT treats a zero timeout as "block forever"
    let timeout_ms = budget.as_millis() as u64;
    if timeout_ms == 0 {
        tracing::warn!(
            "No time left to confirm {} at version {} on {} replicas",
            key,
            version,
            replicas
        );
        return Err(unconfirmed(0));
    }

    let mut command = redis::cmd("WAIT");
    command.arg(replicas).arg(timeout_ms);

    match link.query(&command, budget, deadline) {
        Ok(Value::Int(acked)) if acked >= 0 && acked as usize >= replicas => {
            tracing::debug!("{} replicas acknowledged {} at version {}", acked, key, version);
            Ok(())
        }
        Ok(Value::Int(acked)) => {
            let acked = acked.max(0) as u64;
            tracing::warn!(
                "Only {}/{} replicas acknowledged {} at version {}",
                acked,
                replicas,
                key,
                version
            );
            Err(unconfirmed(acked))
        }
        Ok(other) => {
            tracing::warn!(
                "Unexpected reply {:?} while confirming {} at version {}",
                other,
                key,
                version
            );
            Err(unconfirmed(0))
        }
        Err(e) => {
            tracing::warn!(
                "Could not confirm {} at version {}: {}",
                key,
                version,
                e
            );
            Err(unconfirmed(0))
        }
    }
}
