//! The worker event loop and control channel.
//!
//! A single task owns the [`Worker`] and drains one channel of lifecycle,
//! control, and fetch events in order. That serialization is what makes
//! the activation guarantee hold: the purge-then-claim sequence finishes
//! before the loop picks up the next fetch event, and no two strategies
//! ever run concurrently for the same worker.
//!
//! The control messages are the page-facing protocol: "activate now" to
//! skip the waiting state (update-available prompts) and "report version"
//! answered over a oneshot reply port.

use cachette_core::RequestInfo;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::WorkerError;
use crate::worker::{Outcome, Worker, WorkerState};

/// Messages a page can send the worker.
#[derive(Debug)]
pub enum ControlMessage {
    /// Activate immediately instead of staying in the waiting state.
    SkipWaiting,
    /// Reply with the static generation's identifier.
    GetVersion { reply: oneshot::Sender<String> },
}

enum Event {
    Fetch {
        request: RequestInfo,
        reply: oneshot::Sender<Result<Outcome, WorkerError>>,
    },
    Control(ControlMessage),
    State {
        reply: oneshot::Sender<WorkerState>,
    },
    Shutdown,
}

/// Cloneable handle for talking to the worker task.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<Event>,
}

impl WorkerHandle {
    /// Hand an intercepted request to the worker and await its outcome.
    pub async fn fetch(&self, request: RequestInfo) -> Result<Outcome, WorkerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Event::Fetch { request, reply: reply_tx })
            .await
            .map_err(|_| WorkerError::ChannelClosed)?;
        reply_rx.await.map_err(|_| WorkerError::ChannelClosed)?
    }

    /// Send the "activate now" control message.
    pub async fn skip_waiting(&self) -> Result<(), WorkerError> {
        self.tx
            .send(Event::Control(ControlMessage::SkipWaiting))
            .await
            .map_err(|_| WorkerError::ChannelClosed)
    }

    /// Ask the worker for its version identifier.
    pub async fn version(&self) -> Result<String, WorkerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Event::Control(ControlMessage::GetVersion { reply: reply_tx }))
            .await
            .map_err(|_| WorkerError::ChannelClosed)?;
        reply_rx.await.map_err(|_| WorkerError::ChannelClosed)
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> Result<WorkerState, WorkerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Event::State { reply: reply_tx })
            .await
            .map_err(|_| WorkerError::ChannelClosed)?;
        reply_rx.await.map_err(|_| WorkerError::ChannelClosed)
    }

    /// Supersede the worker and stop the event loop.
    pub async fn shutdown(&self) -> Result<(), WorkerError> {
        self.tx
            .send(Event::Shutdown)
            .await
            .map_err(|_| WorkerError::ChannelClosed)
    }
}

/// Spawn the event loop that owns the worker.
pub fn spawn(worker: Worker) -> (WorkerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(64);
    let task = tokio::spawn(run(worker, rx));
    (WorkerHandle { tx }, task)
}

async fn run(mut worker: Worker, mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        match event {
            Event::Fetch { request, reply } => {
                let result = worker.handle_request(&request).await;
                let _ = reply.send(result);
            }
            Event::Control(ControlMessage::SkipWaiting) => {
                if worker.state() == WorkerState::Waiting {
                    if let Err(e) = worker.activate().await {
                        tracing::error!(error = %e, "activation failed");
                    }
                } else {
                    tracing::debug!(state = worker.state().as_str(), "skip-waiting ignored");
                }
            }
            Event::Control(ControlMessage::GetVersion { reply }) => {
                let _ = reply.send(worker.version().to_string());
            }
            Event::State { reply } => {
                let _ = reply.send(worker.state());
            }
            Event::Shutdown => {
                worker.supersede();
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cachette_client::{Fetch, FetchError, FetchResponse};
    use cachette_core::{CacheDb, WorkerConfig};
    use std::sync::Arc;

    struct OfflineFetcher;

    #[async_trait]
    impl Fetch for OfflineFetcher {
        async fn fetch(&self, _request: &RequestInfo) -> Result<FetchResponse, FetchError> {
            Err(FetchError::Network("offline".to_string()))
        }
    }

    async fn spawn_installed() -> (WorkerHandle, JoinHandle<()>) {
        let config = WorkerConfig {
            origin: "http://origin.test".to_string(),
            cache_prefix: "parkzen".to_string(),
            version: "v1".to_string(),
            precache: vec![],
            ..Default::default()
        };
        let cache = CacheDb::open_in_memory().await.unwrap();
        let mut worker = Worker::new(config, cache, Arc::new(OfflineFetcher)).unwrap();
        worker.install().await.unwrap();
        spawn(worker)
    }

    #[tokio::test]
    async fn test_skip_waiting_activates() {
        let (handle, task) = spawn_installed().await;
        assert_eq!(handle.state().await.unwrap(), WorkerState::Waiting);

        handle.skip_waiting().await.unwrap();
        assert_eq!(handle.state().await.unwrap(), WorkerState::Active);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_skip_waiting_noop_when_active() {
        let (handle, task) = spawn_installed().await;
        handle.skip_waiting().await.unwrap();
        handle.skip_waiting().await.unwrap();
        assert_eq!(handle.state().await.unwrap(), WorkerState::Active);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_get_version_reply() {
        let (handle, task) = spawn_installed().await;
        let version = handle.version().await.unwrap();
        assert_eq!(version, "parkzen-static-v1");

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_supersedes() {
        let (handle, task) = spawn_installed().await;
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        let result = handle.state().await;
        assert!(matches!(result, Err(WorkerError::ChannelClosed)));
    }
}
