//! Core types and shared functionality for cachette.
//!
//! This crate provides:
//! - Request model and pure classification
//! - Generation naming for versioned cache buckets
//! - SQLite-backed entry store
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod generation;

pub use cache::{CacheDb, CachedEntry};
pub use classify::{Destination, RequestClass, RequestInfo, RequestMode, classify};
pub use config::WorkerConfig;
pub use error::Error;
pub use generation::Generations;
