//! WorkerManager — starts, reconfigures and stops control loops.
//!
//! Every loop shares one shutdown flag owned by the manager. Loops are
//! tracked by join handle so `wait_for_all` can await their exit, and by
//! an outstanding counter that each loop decrements when it ends, panics
//! included.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use pidscale_core::{TargetConfig, TargetKey};
use pidscale_state::{ChangeMask, ControlRegistry, StateError, TargetState};

use crate::worker::{Worker, WorkerContext};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManagerError {
    #[error("no control loop registered for {0}")]
    NotRunning(String),

    #[error("control loop for {0} has exited")]
    WorkerGone(String),

    #[error("manager is shutting down")]
    ShuttingDown,
}

pub type ManagerResult<T> = Result<T, ManagerError>;

impl From<StateError> for ManagerError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::NotFound(key) => ManagerError::NotRunning(key),
            StateError::ChannelClosed(key) => ManagerError::WorkerGone(key),
        }
    }
}

/// What [`WorkerManager::apply`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    Started,
    Updated(ChangeMask),
    Unchanged,
}

/// Decrements the outstanding-loop counter when the loop task ends.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Owns the set of running control loops.
pub struct WorkerManager {
    ctx: WorkerContext,
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    active: Arc<AtomicUsize>,
}

impl WorkerManager {
    pub fn new(ctx: WorkerContext) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            ctx,
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn registry(&self) -> &ControlRegistry {
        &self.ctx.registry
    }

    /// Register `key` and spawn its control loop.
    ///
    /// An existing entry for `key` is replaced; its loop sees the closed
    /// channel and exits.
    pub async fn start(&self, key: &str, config: TargetConfig) -> ManagerResult<()> {
        if self.is_shutting_down() {
            return Err(ManagerError::ShuttingDown);
        }

        let (state, control) = TargetState::new(config.clone());
        let generation = state.generation();
        if self.ctx.registry.add_or_update(key, state).await {
            warn!(key = %key, "control loop replaced");
        }

        self.active.fetch_add(1, Ordering::SeqCst);
        let guard = ActiveGuard(self.active.clone());
        let worker = Worker::new(key.to_string(), generation, config, self.ctx.clone());
        let shutdown = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            worker.run(control, shutdown).await;
        });

        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.retain(|h| !h.is_finished());
        handles.push(handle);

        info!(key = %key, "control loop spawned");
        Ok(())
    }

    /// Commit `next` for a running loop and signal what changed.
    pub async fn update(&self, key: &str, next: &TargetConfig) -> ManagerResult<ChangeMask> {
        let applied = self.ctx.registry.apply(key, next).await?;
        if !applied.mask.is_empty() {
            info!(key = %key, mask = %applied.mask, "configuration change signalled");
        }
        Ok(applied.mask)
    }

    /// Start `key` if unknown, update it otherwise. A loop that exited on
    /// its own is started again.
    pub async fn apply(&self, key: &str, config: TargetConfig) -> ManagerResult<Reconciled> {
        if !self.ctx.registry.contains(key).await {
            self.start(key, config).await?;
            return Ok(Reconciled::Started);
        }

        match self.update(key, &config).await {
            Ok(mask) if mask.is_empty() => Ok(Reconciled::Unchanged),
            Ok(mask) => Ok(Reconciled::Updated(mask)),
            Err(ManagerError::NotRunning(_)) | Err(ManagerError::WorkerGone(_)) => {
                warn!(key = %key, "control loop missing, restarting");
                self.start(key, config).await?;
                Ok(Reconciled::Started)
            }
            Err(e) => Err(e),
        }
    }

    /// Remove `key`; its loop exits once it sees the closed channel and
    /// drops the target's gauges after its last write. Returns false if
    /// `key` was not registered.
    pub async fn stop(&self, key: &str) -> bool {
        let existed = self.ctx.registry.delete(key).await;
        if existed {
            info!(key = %key, "control loop stop requested");
        }
        existed
    }

    /// Signal every loop to exit.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        info!(active = self.active_workers(), "shutdown signalled");
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Await every spawned loop.
    pub async fn wait_for_all(&self) {
        loop {
            let pending: Vec<JoinHandle<()>> = {
                let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut *handles)
            };
            if pending.is_empty() {
                break;
            }
            for handle in pending {
                if let Err(e) = handle.await {
                    error!(error = %e, "control loop task failed");
                }
            }
        }
    }

    /// Loops started and not yet exited.
    pub fn active_workers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Keys currently registered.
    pub async fn targets(&self) -> Vec<TargetKey> {
        self.ctx.registry.keys().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_errors_map_to_manager_errors() {
        assert_eq!(
            ManagerError::from(StateError::NotFound("a/b".into())),
            ManagerError::NotRunning("a/b".into())
        );
        assert_eq!(
            ManagerError::from(StateError::ChannelClosed("a/b".into())),
            ManagerError::WorkerGone("a/b".into())
        );
    }
}
