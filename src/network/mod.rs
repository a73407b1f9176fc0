//! Network Module
//!
//! Connection handling on top of the `redis` crate's sync client.
//!
//! ## Architecture
//! - One `redis::Connection` per client
//! - [`Session`] owns the connection slot, performs the handshake and
//!   re-establishes the connection lazily after a transport failure
//! - Requests are serialized on the single connection; [`Link`] keeps a
//!   multi-request exchange on one connection

mod session;

pub use session::{Link, Session};
