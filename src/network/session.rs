//! Session
//!
//! Owns the client's single connection and applies per-call deadlines.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use redis::{Cmd, Connection, ConnectionInfo, RedisConnectionInfo, Value};

use crate::config::Timeouts;
use crate::error::{KvError, Result};

/// OS socket timeouts cannot be zero
const MIN_SOCKET_TIMEOUT: Duration = Duration::from_millis(1);

/// Shared, lazily reconnecting connection to the store
///
/// ## Concurrency:
/// - `conn`: Protected by Mutex (one request on the wire at a time)
/// - After any transport error the connection is dropped, since a late
///   reply would otherwise be read as the answer to the next request. The
///   next call dials again, within that call's deadline.
/// - [`Session::with_connection`] holds the lock across several requests,
///   so a write and its `WAIT` go out on the same connection.
pub struct Session {
    /// Dials the bare TCP connection (no credentials, db 0)
    client: redis::Client,

    /// Credentials and db, applied by the session's own handshake
    login: RedisConnectionInfo,

    /// `host:port` for logging and errors
    addr: String,

    /// Base socket timeouts
    timeouts: Timeouts,

    /// Current connection, `None` after a transport failure
    conn: Mutex<Option<Connection>>,
}

impl Session {
    /// Connect, authenticate, select the database and probe liveness
    pub fn establish(info: ConnectionInfo, timeouts: Timeouts) -> Result<Self> {
        let addr = info.addr.to_string();
        let login = info.redis.clone();

        // The handshake runs here rather than inside the redis client, so
        // every step of it is bounded by socket timeouts
        let client = redis::Client::open(ConnectionInfo {
            addr: info.addr,
            redis: RedisConnectionInfo {
                db: 0,
                username: None,
                password: None,
                ..info.redis
            },
        })?;

        let session = Self {
            client,
            login,
            addr,
            timeouts,
            conn: Mutex::new(None),
        };

        let conn = session.dial(None)?;
        *session.conn.lock() = Some(conn);

        tracing::debug!("Session established with {}", session.addr);
        Ok(session)
    }

    /// Open a connection and run the handshake on it
    ///
    /// Steps:
    /// 1. TCP connect
    /// 2. AUTH (when a password is configured)
    /// 3. SELECT (when db != 0)
    /// 4. PING
    ///
    /// Each step's timeout is capped by what is left of `deadline`.
    fn dial(&self, deadline: Option<Instant>) -> Result<Connection> {
        let connect = match remaining(deadline)? {
            Some(left) => self.timeouts.connect.min(left),
            None => self.timeouts.connect,
        };
        let mut conn = self
            .client
            .get_connection_with_timeout(connect.max(MIN_SOCKET_TIMEOUT))?;

        if let Some(password) = &self.login.password {
            apply_timeouts(&conn, &self.timeouts, Duration::ZERO, deadline)?;
            let mut auth = redis::cmd("AUTH");
            if let Some(username) = &self.login.username {
                auth.arg(username);
            }
            auth.arg(password).query::<()>(&mut conn)?;
        }

        if self.login.db != 0 {
            apply_timeouts(&conn, &self.timeouts, Duration::ZERO, deadline)?;
            redis::cmd("SELECT")
                .arg(self.login.db)
                .query::<()>(&mut conn)?;
        }

        apply_timeouts(&conn, &self.timeouts, Duration::ZERO, deadline)?;
        let pong: String = redis::cmd("PING").query(&mut conn)?;
        if pong != "PONG" {
            return Err(KvError::Protocol(format!("Unexpected reply to PING: {}", pong)));
        }

        Ok(conn)
    }

    /// Run `exchange` on the live connection under one lock hold
    ///
    /// Redials first when the previous connection was dropped; a failed
    /// redial is reported as [`KvError::Connection`].
    pub fn with_connection<T>(
        &self,
        deadline: Option<Instant>,
        exchange: impl FnOnce(&mut Link<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut slot = self.conn.lock();

        // Checked after the lock so queueing time counts against the deadline
        remaining(deadline)?;

        if slot.is_none() {
            tracing::debug!("Reconnecting to {}", self.addr);
            let conn = self.dial(deadline).map_err(|e| KvError::Connection {
                addr: self.addr.clone(),
                source: Box::new(e),
            })?;
            *slot = Some(conn);
        }

        let mut link = Link {
            slot: &mut *slot,
            timeouts: &self.timeouts,
            addr: &self.addr,
        };
        exchange(&mut link)
    }

    /// Issue a single command
    pub fn call(&self, command: &Cmd, deadline: Option<Instant>) -> Result<Value> {
        self.with_connection(deadline, |link| link.query(command, Duration::ZERO, deadline))
    }

    /// Round-trip a PING
    pub fn ping(&self, deadline: Option<Instant>) -> Result<()> {
        match self.call(&redis::cmd("PING"), deadline)? {
            Value::Status(ref s) if s == "PONG" => Ok(()),
            other => Err(KvError::Protocol(format!(
                "Unexpected reply to PING: {:?}",
                other
            ))),
        }
    }

    /// Address this session connects to
    pub fn addr(&self) -> String {
        self.addr.clone()
    }
}

/// The connection as seen from inside [`Session::with_connection`]
///
/// Never redials: once a request fails at the transport level the rest of
/// the exchange gets [`KvError::ConnectionLost`].
pub struct Link<'a> {
    slot: &'a mut Option<Connection>,
    timeouts: &'a Timeouts,
    addr: &'a str,
}

impl Link<'_> {
    /// Send a command the server may hold for up to `blocks_for` before
    /// replying; the read timeout is extended accordingly.
    pub fn query(
        &mut self,
        command: &Cmd,
        blocks_for: Duration,
        deadline: Option<Instant>,
    ) -> Result<Value> {
        let Some(conn) = self.slot.as_mut() else {
            return Err(KvError::ConnectionLost);
        };

        apply_timeouts(conn, self.timeouts, blocks_for, deadline)?;

        match command.query::<Value>(conn) {
            Ok(value) => Ok(value),
            Err(e) if e.code().is_some() => Err(KvError::Redis(e)),
            Err(e) => {
                tracing::debug!("Dropping connection to {}: {}", self.addr, e);
                *self.slot = None;
                Err(KvError::Redis(e))
            }
        }
    }
}

/// Time left before `deadline`; `DeadlineExceeded` once it has passed
fn remaining(deadline: Option<Instant>) -> Result<Option<Duration>> {
    match deadline {
        None => Ok(None),
        Some(deadline) => {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                Err(KvError::DeadlineExceeded)
            } else {
                Ok(Some(left))
            }
        }
    }
}

/// Set the socket timeouts for the next request
fn apply_timeouts(
    conn: &Connection,
    timeouts: &Timeouts,
    blocks_for: Duration,
    deadline: Option<Instant>,
) -> Result<()> {
    let mut read = timeouts.read + blocks_for;
    let mut write = timeouts.write;
    if let Some(left) = remaining(deadline)? {
        read = read.min(left);
        write = write.min(left);
    }

    conn.set_read_timeout(Some(read.max(MIN_SOCKET_TIMEOUT)))?;
    conn.set_write_timeout(Some(write.max(MIN_SOCKET_TIMEOUT)))?;
    Ok(())
}
