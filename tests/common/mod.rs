//! In-process mock store
//!
//! A threaded TCP server speaking enough RESP2 for the client. It emulates
//! the handful of commands the client issues, including the two CAS
//! scripts, which it recognizes by their exact text and applies under a
//! single lock. The scripts themselves run under Lua in `script_tests`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use statekv::client::{DELETE_SCRIPT, SET_SCRIPT};

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

/// A stored value
#[derive(Debug, Clone, PartialEq)]
pub enum Stored {
    Plain(Bytes),
    Hash(HashMap<String, Bytes>),
}

/// Mutable state shared by every connection
#[derive(Debug, Default)]
pub struct StoreState {
    pub entries: HashMap<String, Stored>,

    /// Replica count reported by INFO (unless `replication_report` is set)
    pub replicas: usize,

    /// Replicas that acknowledge a WAIT after a write on that connection.
    /// A connection that wrote nothing is always fully acknowledged, as on a
    /// real server.
    pub acked_replicas: usize,

    /// Verbatim INFO replication body
    pub replication_report: Option<String>,

    /// Reply to INFO with an error
    pub fail_info: bool,

    /// Require AUTH with this password
    pub password: Option<String>,

    /// Delay applied before answering HGETALL
    pub hgetall_delay: Option<Duration>,

    /// Delay applied before answering PING
    pub ping_delay: Option<Duration>,

    /// Close the connection right after answering an EVAL
    pub close_after_eval: bool,

    /// Every command verb received, in order
    pub commands: Vec<String>,

    /// Arguments of every WAIT received
    pub waits: Vec<(u64, u64)>,

    /// Database selected by the last SELECT
    pub selected_db: u32,
}

/// A reply frame
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Array(Vec<Reply>),
    Null,
}

impl Reply {
    fn ok() -> Self {
        Reply::Simple("OK".to_string())
    }

    fn error(msg: impl Into<String>) -> Self {
        Reply::Error(msg.into())
    }

    fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(data.into())
    }

    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Reply::Simple(s) => out.extend_from_slice(format!("+{}\r\n", s).as_bytes()),
            Reply::Error(s) => out.extend_from_slice(format!("-{}\r\n", s).as_bytes()),
            Reply::Integer(n) => out.extend_from_slice(format!(":{}\r\n", n).as_bytes()),
            Reply::Bulk(data) => {
                out.extend_from_slice(format!("${}\r\n", data.len()).as_bytes());
                out.extend_from_slice(data);
                out.extend_from_slice(b"\r\n");
            }
            Reply::Array(items) => {
                out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    item.encode(out);
                }
            }
            Reply::Null => out.extend_from_slice(b"$-1\r\n"),
        }
    }
}

/// Handle to a running mock store; shuts down on drop
pub struct MockStore {
    addr: SocketAddr,
    state: Arc<Mutex<StoreState>>,
    shutdown: Arc<AtomicBool>,
}

impl MockStore {
    pub fn start() -> Self {
        Self::start_with(StoreState::default())
    }

    pub fn start_with(state: StoreState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(state));
        let shutdown = Arc::new(AtomicBool::new(false));

        let accept_state = Arc::clone(&state);
        let accept_shutdown = Arc::clone(&shutdown);
        thread::spawn(move || {
            for stream in listener.incoming() {
                if accept_shutdown.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(stream) = stream else { continue };
                let state = Arc::clone(&accept_state);
                thread::spawn(move || serve(stream, state));
            }
        });

        Self {
            addr,
            state,
            shutdown,
        }
    }

    pub fn url(&self) -> String {
        format!("redis://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock()
    }

    /// Store a plain (legacy) value
    pub fn seed_plain(&self, key: &str, value: &[u8]) {
        self.state
            .lock()
            .entries
            .insert(key.to_string(), Stored::Plain(Bytes::copy_from_slice(value)));
    }

    /// Store a hash with the given fields
    pub fn seed_hash(&self, key: &str, fields: &[(&str, &[u8])]) {
        let hash = fields
            .iter()
            .map(|(f, v)| (f.to_string(), Bytes::copy_from_slice(v)))
            .collect();
        self.state
            .lock()
            .entries
            .insert(key.to_string(), Stored::Hash(hash));
    }

    pub fn stored(&self, key: &str) -> Option<Stored> {
        self.state.lock().entries.get(key).cloned()
    }

    pub fn command_count(&self, verb: &str) -> usize {
        self.state
            .lock()
            .commands
            .iter()
            .filter(|c| c.as_str() == verb)
            .count()
    }
}

impl Drop for MockStore {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Wake the accept loop
        let _ = TcpStream::connect(self.addr);
    }
}

// =============================================================================
// Connection Handling
// =============================================================================

/// Per-connection state
#[derive(Default)]
struct Peer {
    authed: bool,

    /// A script ran on this connection
    wrote: bool,

    /// Hang up after the current reply
    closing: bool,
}

/// Serve one connection until it closes
fn serve(stream: TcpStream, state: Arc<Mutex<StoreState>>) {
    let Ok(read_stream) = stream.try_clone() else { return };
    let mut reader = BufReader::new(read_stream);
    let mut writer = BufWriter::new(stream);
    let mut peer = Peer::default();

    while let Ok(args) = read_request(&mut reader) {
        if args.is_empty() {
            return;
        }

        let reply = dispatch(&state, &args, &mut peer);
        let mut out = Vec::new();
        reply.encode(&mut out);
        if writer.write_all(&out).and_then(|_| writer.flush()).is_err() {
            return;
        }

        if peer.closing {
            return;
        }
    }
}

/// Read one command as an array of bulk strings
fn read_request(reader: &mut impl BufRead) -> io::Result<Vec<Bytes>> {
    let count = read_length(reader, '*')?;
    let mut args = Vec::with_capacity(count);

    for _ in 0..count {
        let len = read_length(reader, '$')?;
        let mut buf = vec![0; len + 2];
        reader.read_exact(&mut buf)?;
        buf.truncate(len);
        args.push(Bytes::from(buf));
    }

    Ok(args)
}

fn read_length(reader: &mut impl BufRead, tag: char) -> io::Result<usize> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }

    line.trim_end_matches(&['\r', '\n'][..])
        .strip_prefix(tag)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, line.clone()))
}

fn dispatch(state: &Mutex<StoreState>, args: &[Bytes], peer: &mut Peer) -> Reply {
    let verb = String::from_utf8_lossy(&args[0]).to_uppercase();
    let arg = |i: usize| -> String {
        args.get(i)
            .map(|a| String::from_utf8_lossy(a).into_owned())
            .unwrap_or_default()
    };

    let mut guard = state.lock();
    guard.commands.push(verb.clone());

    // Connection metadata the redis client may send while connecting
    if verb == "CLIENT" {
        return Reply::ok();
    }

    if verb == "AUTH" {
        let supplied = arg(args.len() - 1);
        return match &guard.password {
            Some(password) if *password == supplied => {
                peer.authed = true;
                Reply::ok()
            }
            Some(_) => Reply::error("WRONGPASS invalid username-password pair"),
            None => Reply::error("ERR AUTH called without any password configured"),
        };
    }

    if guard.password.is_some() && !peer.authed {
        return Reply::error("NOAUTH Authentication required.");
    }

    match verb.as_str() {
        "PING" => {
            let delay = guard.ping_delay;
            drop(guard);
            if let Some(delay) = delay {
                thread::sleep(delay);
            }
            Reply::Simple("PONG".to_string())
        }
        "SELECT" => {
            guard.selected_db = arg(1).parse().unwrap_or(0);
            Reply::ok()
        }
        "INFO" => {
            if guard.fail_info {
                return Reply::error("ERR INFO is disabled");
            }
            let report = guard.replication_report.clone().unwrap_or_else(|| {
                format!(
                    "# Replication\r\nrole:master\r\nconnected_slaves:{}\r\nmaster_repl_offset:0\r\n",
                    guard.replicas
                )
            });
            Reply::bulk(report)
        }
        "WAIT" => {
            let requested: u64 = arg(1).parse().unwrap_or(0);
            let timeout: u64 = arg(2).parse().unwrap_or(0);
            guard.waits.push((requested, timeout));
            let acked = if peer.wrote {
                guard.acked_replicas
            } else {
                guard.replicas
            };
            Reply::Integer(acked as i64)
        }
        "GET" => match guard.entries.get(&arg(1)) {
            None => Reply::Null,
            Some(Stored::Plain(value)) => Reply::Bulk(value.clone()),
            Some(Stored::Hash(_)) => Reply::error(WRONGTYPE),
        },
        "HGETALL" => {
            let reply = match guard.entries.get(&arg(1)) {
                None => Reply::Array(Vec::new()),
                Some(Stored::Plain(_)) => Reply::error(WRONGTYPE),
                Some(Stored::Hash(fields)) => {
                    let mut names: Vec<&String> = fields.keys().collect();
                    names.sort();
                    Reply::Array(
                        names
                            .into_iter()
                            .flat_map(|name| {
                                [Reply::bulk(name.clone()), Reply::Bulk(fields[name].clone())]
                            })
                            .collect(),
                    )
                }
            };
            let delay = guard.hgetall_delay;
            drop(guard);
            if let Some(delay) = delay {
                thread::sleep(delay);
            }
            reply
        }
        "EVAL" => {
            peer.wrote = true;
            peer.closing = guard.close_after_eval;

            let script = arg(1);
            let key = arg(3);
            let etag = arg(4);
            if script == SET_SCRIPT {
                eval_set(&mut guard.entries, &key, &etag, args.get(5).cloned().unwrap_or_default())
            } else if script == DELETE_SCRIPT {
                eval_delete(&mut guard.entries, &key, &etag)
            } else {
                Reply::error("NOSCRIPT unknown script")
            }
        }
        _ => Reply::error(format!("ERR unknown command '{}'", verb)),
    }
}

// =============================================================================
// Script Emulation
// =============================================================================

/// Current version field, or `Err` when the key is not a hash
fn read_version(entries: &HashMap<String, Stored>, key: &str) -> Result<Option<Bytes>, ()> {
    match entries.get(key) {
        None => Ok(None),
        Some(Stored::Plain(_)) => Err(()),
        Some(Stored::Hash(fields)) => Ok(fields.get("version").cloned()),
    }
}

fn permitted(current: &Option<Bytes>, etag: &str) -> bool {
    match current {
        None => true,
        Some(v) => v.is_empty() || v.as_ref() == etag.as_bytes() || etag == "0",
    }
}

fn eval_set(entries: &mut HashMap<String, Stored>, key: &str, etag: &str, data: Bytes) -> Reply {
    let current = match read_version(entries, key) {
        Ok(current) => current,
        Err(()) => {
            entries.remove(key);
            None
        }
    };

    // Error replies from scripts carry no code prefix
    if !permitted(&current, etag) {
        return Reply::error(format!("failed to set key {}", key));
    }

    let entry = entries
        .entry(key.to_string())
        .or_insert_with(|| Stored::Hash(HashMap::new()));
    let Stored::Hash(fields) = entry else {
        return Reply::error(WRONGTYPE);
    };

    // Like the real script, the data write is not rolled back if the
    // increment fails
    fields.insert("data".to_string(), data);
    let next = match fields.get("version") {
        None => 1,
        Some(v) => match std::str::from_utf8(v).ok().and_then(|v| v.parse::<i64>().ok()) {
            Some(n) => n + 1,
            None => {
                return Reply::error("ERR Error running script: hash value is not an integer")
            }
        },
    };
    fields.insert("version".to_string(), Bytes::from(next.to_string()));
    Reply::Integer(next)
}

fn eval_delete(entries: &mut HashMap<String, Stored>, key: &str, etag: &str) -> Reply {
    let current = read_version(entries, key).unwrap_or(None);

    if !permitted(&current, etag) {
        return Reply::error(format!("ERR failed to delete {}", key));
    }

    Reply::Integer(if entries.remove(key).is_some() { 1 } else { 0 })
}
