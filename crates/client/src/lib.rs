//! Network client for cachette.
//!
//! This crate provides the upstream fetch seam used by the worker: a
//! [`Fetch`] trait plus the reqwest-backed [`HttpFetcher`].

pub mod fetch;

pub use fetch::{Fetch, FetchConfig, FetchError, FetchResponse, HttpFetcher};
pub use fetch::url::join_origin;
