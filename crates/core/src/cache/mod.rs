//! SQLite-backed store for cache generations.
//!
//! This module persists request/response pairs grouped into named
//! generations, using async access via tokio-rusqlite. It supports:
//!
//! - Entry keys addressed by SHA-256 over request identity
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Purging every generation that is not part of the current deployment

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::CachedEntry;
