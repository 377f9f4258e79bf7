//! Background worker that keeps a [`ConfigurationStore`] in sync with its
//! source.
//!
//! The worker polls the source on a fixed interval and republishes only when
//! the loaded tree differs from the active one. Push-style sources submit
//! [`ReloadTask::Apply`] with a complete new tree instead. Failed rebuilds are
//! logged and the store keeps serving its last good snapshot.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tenancy_core::ConfigError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::configuration::ConfigurationStore;
use crate::traits::ConfigSource;

/// Reply channel for an on-demand reload: the published version, or `None`
/// when nothing changed.
pub type ReloadReply = oneshot::Sender<Result<Option<u64>, ConfigError>>;

/// Work items accepted by the reload worker.
#[derive(Debug)]
pub enum ReloadTask {
    /// Load the source now instead of waiting for the next tick.
    Reload { reply: Option<ReloadReply> },
    /// Rebuild from a tree delivered by a change notification.
    Apply {
        tree: Value,
        reply: Option<ReloadReply>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ReloadWorkerError {
    #[error("reload worker is not running")]
    Stopped,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// ReloadWorker
// ---------------------------------------------------------------------------

/// Shortest poll interval the worker accepts.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to the spawned reload loop.
pub struct ReloadWorker {
    tx: Option<mpsc::Sender<ReloadTask>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl ReloadWorker {
    /// Spawns the reload loop. The first poll happens one `interval` after
    /// start; the store is expected to have been built already. A zero
    /// interval is raised to [`MIN_INTERVAL`].
    pub fn start<O>(
        store: Arc<ConfigurationStore<O>>,
        source: Arc<dyn ConfigSource>,
        interval: Duration,
    ) -> Self
    where
        O: DeserializeOwned + Send + Sync + 'static,
    {
        let interval = interval.max(MIN_INTERVAL);
        let (tx, mut rx) = mpsc::channel::<ReloadTask>(16);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let mut runner = Runner {
            store,
            source,
            last_rejected: None,
        };

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    task = rx.recv() => {
                        match task {
                            Some(ReloadTask::Reload { reply }) => {
                                let result = runner.poll(true).await;
                                respond(reply, result);
                            }
                            Some(ReloadTask::Apply { tree, reply }) => {
                                let result = runner.apply(&tree, true);
                                respond(reply, result);
                            }
                            None => break,
                        }
                    }
                    _ = ticker.tick() => {
                        let _ = runner.poll(false).await;
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
            debug!(source = runner.source.name(), "reload worker stopped");
        });

        Self {
            tx: Some(tx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Queue a task without waiting for its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`ReloadWorkerError::Stopped`] once the worker has stopped.
    pub async fn submit(&self, task: ReloadTask) -> Result<(), ReloadWorkerError> {
        match &self.tx {
            Some(tx) => tx.send(task).await.map_err(|_| ReloadWorkerError::Stopped),
            None => Err(ReloadWorkerError::Stopped),
        }
    }

    /// Reload from the source and wait for the outcome.
    ///
    /// # Errors
    ///
    /// Returns the build error, or [`ReloadWorkerError::Stopped`].
    pub async fn reload_now(&self) -> Result<Option<u64>, ReloadWorkerError> {
        let (reply, rx) = oneshot::channel();
        self.submit(ReloadTask::Reload { reply: Some(reply) }).await?;
        Ok(rx.await.map_err(|_| ReloadWorkerError::Stopped)??)
    }

    /// Rebuild from `tree` and wait for the outcome.
    ///
    /// # Errors
    ///
    /// Returns the build error, or [`ReloadWorkerError::Stopped`].
    pub async fn apply(&self, tree: Value) -> Result<Option<u64>, ReloadWorkerError> {
        let (reply, rx) = oneshot::channel();
        self.submit(ReloadTask::Apply {
            tree,
            reply: Some(reply),
        })
        .await?;
        Ok(rx.await.map_err(|_| ReloadWorkerError::Stopped)??)
    }

    /// Stop the loop and wait for it to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

fn respond(reply: Option<ReloadReply>, result: Result<Option<u64>, ConfigError>) {
    if let Some(reply) = reply {
        let _ = reply.send(result);
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

struct Runner<O> {
    store: Arc<ConfigurationStore<O>>,
    source: Arc<dyn ConfigSource>,
    /// Last tree that failed to build; not retried until it changes.
    last_rejected: Option<Value>,
}

impl<O> Runner<O>
where
    O: DeserializeOwned + Send + Sync + 'static,
{
    async fn poll(&mut self, explicit: bool) -> Result<Option<u64>, ConfigError> {
        match self.source.load().await {
            Ok(tree) => self.apply(&tree, explicit),
            Err(e) => {
                warn!(
                    source = self.source.name(),
                    error = %e,
                    "configuration source failed; keeping previous snapshot"
                );
                Err(e)
            }
        }
    }

    fn apply(&mut self, tree: &Value, explicit: bool) -> Result<Option<u64>, ConfigError> {
        if !explicit && self.last_rejected.as_ref() == Some(tree) {
            return Ok(None);
        }
        match self.store.reload_if_changed(tree) {
            Ok(version) => {
                self.last_rejected = None;
                Ok(version)
            }
            Err(e) => {
                self.last_rejected = Some(tree.clone());
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
