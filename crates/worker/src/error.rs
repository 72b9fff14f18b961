//! Structured errors for the worker runtime.

use crate::worker::WorkerState;
use cachette_client::FetchError;

/// Errors surfaced while handling a request or driving the lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The entry store failed.
    #[error("cache error: {0}")]
    Cache(#[from] cachette_core::Error),

    /// The upstream fetch failed and no cached fallback applied.
    ///
    /// Transparent on purpose: the strategy table says these are surfaced
    /// to the caller unchanged.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A request arrived before activation or after supersession.
    #[error("worker is not active (state: {state:?})")]
    NotActive { state: WorkerState },

    /// Install was requested after the worker already left the
    /// installing state.
    #[error("worker already installed (state: {state:?})")]
    AlreadyInstalled { state: WorkerState },

    /// The worker origin from configuration could not be parsed.
    #[error("invalid origin: {0}")]
    InvalidOrigin(String),

    /// The worker event loop is gone.
    #[error("worker channel closed")]
    ChannelClosed,
}
