//! The cachette worker runtime.
//!
//! This crate ties the pieces together: the cache manager itself (the
//! lifecycle state machine and per-class strategies), the event loop that
//! serializes lifecycle, control, and fetch events, and the axum gateway
//! that feeds intercepted requests into it.

pub mod control;
pub mod error;
pub mod gateway;
pub mod worker;

pub use control::{ControlMessage, WorkerHandle, spawn};
pub use error::WorkerError;
pub use worker::{InstallFailure, InstallReport, Outcome, ResponseSource, ServedResponse, Worker, WorkerState};
