//! File-backed definition source.
//!
//! Re-reads the definitions file on a fixed interval and drives the
//! worker manager: new keys are started, changed keys updated, keys no
//! longer in the file stopped. A file that fails to parse or validate is
//! reported and skipped, so the last good set keeps running.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use pidscale_autoscale::{Reconciled, WorkerManager};
use pidscale_core::{DefinitionsFile, TargetKey};
use pidscale_state::ChangeMask;

/// What one reconcile pass did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub started: Vec<TargetKey>,
    pub updated: Vec<(TargetKey, ChangeMask)>,
    pub stopped: Vec<TargetKey>,
    pub unchanged: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.started.is_empty() && self.updated.is_empty() && self.stopped.is_empty()
    }
}

pub struct DefinitionSource {
    path: PathBuf,
    manager: Arc<WorkerManager>,
}

impl DefinitionSource {
    pub fn new(path: impl Into<PathBuf>, manager: Arc<WorkerManager>) -> Self {
        Self {
            path: path.into(),
            manager,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the file and bring the manager in line with it.
    pub async fn reconcile(&self) -> anyhow::Result<ReconcileReport> {
        let desired = DefinitionsFile::from_file(&self.path)?.targets()?;
        let mut report = ReconcileReport::default();

        for (key, config) in &desired {
            match self.manager.apply(key, config.clone()).await? {
                Reconciled::Started => report.started.push(key.clone()),
                Reconciled::Updated(mask) => report.updated.push((key.clone(), mask)),
                Reconciled::Unchanged => report.unchanged += 1,
            }
        }

        let wanted: BTreeSet<&TargetKey> = desired.keys().collect();
        for key in self.manager.targets().await {
            if !wanted.contains(&key) && self.manager.stop(&key).await {
                report.stopped.push(key);
            }
        }

        Ok(report)
    }

    /// Reconcile every `interval` until shutdown.
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            path = %self.path.display(),
            interval_secs = interval.as_secs(),
            "definition source started"
        );
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        // The first tick completes immediately; the caller already did the
        // initial pass.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.reconcile().await {
                        Ok(report) if report.is_noop() => {
                            debug!(unchanged = report.unchanged, "definitions unchanged");
                        }
                        Ok(report) => {
                            info!(
                                started = report.started.len(),
                                updated = report.updated.len(),
                                stopped = report.stopped.len(),
                                "definitions reconciled"
                            );
                        }
                        Err(e) => {
                            warn!(
                                path = %self.path.display(),
                                error = %e,
                                "definitions reload failed, keeping current set"
                            );
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("definition source shutting down");
                    break;
                }
            }
        }
    }
}
