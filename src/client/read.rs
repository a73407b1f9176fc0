//! Read path
//!
//! Versioned reads with a fallback for keys stored as plain values.

use std::time::Instant;

use bytes::Bytes;
use redis::Value;

use super::Entry;
use crate::error::{KvError, Result};
use crate::network::Session;

const DATA_FIELD: &[u8] = b"data";
const VERSION_FIELD: &[u8] = b"version";

/// Read an entry
///
/// Search order:
/// 1. Hash form (`HGETALL`), which carries the version
/// 2. Plain value (`GET`) when the hash read is rejected or its socket read
///    times out. A failed redial or an expired deadline is returned as is.
pub fn read_entry(session: &Session, key: &str, deadline: Option<Instant>) -> Result<Entry> {
    let reply = match session.call(redis::cmd("HGETALL").arg(key), deadline) {
        Ok(value) => value,
        Err(e) if e.is_reply_error() => {
            tracing::debug!("Hash read of {} rejected ({}), trying plain value", key, e);
            return read_legacy(session, key, deadline);
        }
        Err(KvError::Redis(e)) if e.is_timeout() => {
            tracing::debug!("Hash read of {} timed out, trying plain value", key);
            return read_legacy(session, key, deadline);
        }
        Err(e) => return Err(KvError::store("get", key, e)),
    };

    let items = match reply {
        Value::Bulk(items) => items,
        Value::Nil => Vec::new(),
        other => {
            return Err(KvError::store(
                "get",
                key,
                KvError::Protocol(format!("Unexpected reply to HGETALL: {:?}", other)),
            ))
        }
    };

    if items.is_empty() {
        return Err(KvError::NotFound {
            key: key.to_string(),
        });
    }

    parse_hash(key, items)
}

/// Turn an interleaved field/value list into an entry
fn parse_hash(key: &str, items: Vec<Value>) -> Result<Entry> {
    let corrupt = |reason: String| KvError::CorruptEntry {
        key: key.to_string(),
        reason,
    };

    if items.len() % 2 != 0 {
        return Err(corrupt(format!("odd field/value count {}", items.len())));
    }

    let mut data: Option<Vec<u8>> = None;
    let mut version: Option<Vec<u8>> = None;

    let mut iter = items.into_iter();
    while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
        let (Value::Data(field), Value::Data(value)) = (field, value) else {
            return Err(corrupt("non-string field or value".to_string()));
        };
        if field == DATA_FIELD {
            data = Some(value);
        } else if field == VERSION_FIELD {
            version = Some(value);
        }
    }

    let data = data.ok_or_else(|| corrupt("missing data field".to_string()))?;
    let version = version.ok_or_else(|| corrupt("missing version field".to_string()))?;

    let version = std::str::from_utf8(&version)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| {
            corrupt(format!(
                "version {:?} is not a number",
                String::from_utf8_lossy(&version)
            ))
        })?;

    Ok(Entry {
        data: Bytes::from(data),
        version: Some(version),
    })
}

/// Read a plain value; it never carries a version
fn read_legacy(session: &Session, key: &str, deadline: Option<Instant>) -> Result<Entry> {
    let reply = session
        .call(redis::cmd("GET").arg(key), deadline)
        .map_err(|e| KvError::store("get", key, e))?;

    match reply {
        Value::Data(data) => Ok(Entry {
            data: Bytes::from(data),
            version: None,
        }),
        Value::Nil => Err(KvError::NotFound {
            key: key.to_string(),
        }),
        other => Err(KvError::store(
            "get",
            key,
            KvError::Protocol(format!("Unexpected reply to GET: {:?}", other)),
        )),
    }
}
