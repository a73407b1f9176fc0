//! # statekv
//!
//! A versioned key-value client for replicated in-memory stores with:
//! - Optimistic concurrency control through per-entry version counters
//! - Atomic server-side check-and-mutate scripts (no client-side locking)
//! - Tunable write consistency via replica acknowledgment
//! - Read-only support for legacy plain values
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Client                              │
//! │           get / set / delete (shared across threads)         │
//! └──────┬───────────────────┬───────────────────┬──────────────┘
//!        │                   │                   │
//!        ▼                   ▼                   ▼
//!  ┌───────────┐      ┌─────────────┐     ┌──────────────┐
//!  │ Read Path │      │ CAS Engine  │     │ Consistency  │
//!  │ HGETALL / │      │ EVAL set /  │     │    WAIT      │
//!  │   GET     │      │ EVAL delete │     │              │
//!  └─────┬─────┘      └──────┬──────┘     └──────┬───────┘
//!        └───────────────────┼───────────────────┘
//!                            ▼
//!                   ┌─────────────────┐
//!                   │     Session     │
//!                   │ (one connection)│
//!                   └────────┬────────┘
//!                            ▼
//!                   ┌─────────────────┐
//!                   │ redis (sync API)│
//!                   └─────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use statekv::{Client, SetOptions, GetOptions};
//!
//! let client = Client::connect("redis://127.0.0.1:6379")?;
//! let version = client.set("user:1", b"alice", &SetOptions::new())?;
//! let entry = client.get("user:1", &GetOptions::new())?;
//! assert_eq!(entry.version, Some(version));
//! # Ok::<(), statekv::KvError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod network;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvError, Result};
pub use config::{parse_url, ClientConfig};
pub use client::{
    Client, Concurrency, Consistency, DeleteOptions, Entry, GetOptions, SetOptions,
};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of statekv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
