//! Compare-and-swap engine
//!
//! Versioned writes and deletes executed as single server-side scripts, so
//! the version check and the mutation are one atomic step on the store.
//!
//! ## Entry Layout
//! ```text
//! key ──► hash { data: <payload>, version: <counter> }
//! ```
//!
//! An etag of `0` disables the version check.

use std::time::{Duration, Instant};

use redis::{RedisError, Value};

use crate::error::{KvError, Result};
use crate::network::{Link, Session};

/// Conditional write
///
/// `KEYS[1]` key, `ARGV[1]` etag, `ARGV[2]` payload. A version field that
/// cannot be read (the key holds another type) is repaired by deleting the
/// key. Replies with the new version.
pub const SET_SCRIPT: &str = r#"local current = redis.pcall("HGET", KEYS[1], "version")
if type(current) == "table" then
  redis.call("DEL", KEYS[1])
  current = false
end
if not current or current == "" or current == ARGV[1] or ARGV[1] == "0" then
  redis.call("HSET", KEYS[1], "data", ARGV[2])
  return redis.call("HINCRBY", KEYS[1], "version", 1)
end
return redis.error_reply("failed to set key " .. KEYS[1])"#;

/// Conditional delete
///
/// `KEYS[1]` key, `ARGV[1]` etag. Replies with the number of keys removed.
pub const DELETE_SCRIPT: &str = r#"local current = redis.pcall("HGET", KEYS[1], "version")
if type(current) == "table" then
  current = false
end
if not current or current == "" or current == ARGV[1] or ARGV[1] == "0" then
  return redis.call("DEL", KEYS[1])
end
return redis.error_reply("failed to delete " .. KEYS[1])"#;

/// Marker in the reply of a rejected write
pub const SET_CONFLICT_MARKER: &str = "failed to set key";

/// Marker in the reply of a rejected delete
pub const DELETE_CONFLICT_MARKER: &str = "failed to delete";

/// Run the conditional write; returns the version now stored
///
/// Runs on `link` so a following `WAIT` covers this write.
pub fn compare_and_set(
    link: &mut Link<'_>,
    key: &str,
    data: &[u8],
    etag: u64,
    deadline: Option<Instant>,
) -> Result<u64> {
    let mut command = redis::cmd("EVAL");
    command.arg(SET_SCRIPT).arg(1).arg(key).arg(etag).arg(data);

    let reply = match link.query(&command, Duration::ZERO, deadline) {
        Ok(reply) => reply,
        Err(KvError::Redis(e)) if is_conflict(&e, SET_CONFLICT_MARKER) => {
            tracing::debug!("Set {} rejected: etag {} is stale", key, etag);
            return Err(KvError::Conflict {
                key: key.to_string(),
            });
        }
        Err(e) => return Err(KvError::store("set", key, e)),
    };

    match reply {
        Value::Int(version) if version > 0 => {
            tracing::debug!("Set {} at version {}", key, version);
            Ok(version as u64)
        }
        Value::Int(version) => {
            // The write is applied; only the counter it started from was bad
            tracing::warn!(
                "Set {} committed with non-positive version {}",
                key,
                version
            );
            Err(KvError::CorruptEntry {
                key: key.to_string(),
                reason: format!("version counter is {} after write", version),
            })
        }
        other => Err(KvError::store(
            "set",
            key,
            KvError::Protocol(format!("Unexpected reply to set script: {:?}", other)),
        )),
    }
}

/// Run the conditional delete
///
/// Returns whether a key was actually removed; a missing key is not an error.
pub fn compare_and_delete(
    session: &Session,
    key: &str,
    etag: u64,
    deadline: Option<Instant>,
) -> Result<bool> {
    let mut command = redis::cmd("EVAL");
    command.arg(DELETE_SCRIPT).arg(1).arg(key).arg(etag);

    let reply = match session.call(&command, deadline) {
        Ok(reply) => reply,
        Err(KvError::Redis(e)) if is_conflict(&e, DELETE_CONFLICT_MARKER) => {
            tracing::debug!("Delete {} rejected: etag {} is stale", key, etag);
            return Err(KvError::Conflict {
                key: key.to_string(),
            });
        }
        Err(e) => return Err(KvError::store("delete", key, e)),
    };

    match reply {
        Value::Int(removed) => {
            tracing::debug!("Deleted {} ({} removed)", key, removed);
            Ok(removed > 0)
        }
        other => Err(KvError::store(
            "delete",
            key,
            KvError::Protocol(format!("Unexpected reply to delete script: {:?}", other)),
        )),
    }
}

/// True when `error` is the script's own rejection
///
/// Depending on the server version the reply carries an `ERR` prefix or
/// none, in which case the first word is parsed as the error code.
fn is_conflict(error: &RedisError, marker: &str) -> bool {
    let Some(code) = error.code() else {
        return false;
    };
    let message = match error.detail() {
        Some(detail) => format!("{} {}", code, detail),
        None => code.to_string(),
    };
    message.contains(marker)
}
