//! Decision sink seam and the in-memory replica ledger.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::info;

use pidscale_core::TargetBounds;

use crate::sampler::BoxFuture;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("workload {0} not found")]
    WorkloadNotFound(String),

    #[error("scaling rejected: {0}")]
    Rejected(String),
}

pub type SinkResult<T> = Result<T, SinkError>;

/// Receives the replica counts a control loop decided on.
pub trait DecisionSink: Send + Sync {
    /// Hand off a desired replica count for `target`.
    fn apply_desired_replicas<'a>(
        &'a self,
        target: &'a TargetBounds,
        replicas: u32,
    ) -> BoxFuture<'a, SinkResult<()>>;

    /// Replica count currently observed on the workload, if known.
    fn observed_replicas<'a>(&'a self, _target: &'a TargetBounds) -> BoxFuture<'a, Option<u32>> {
        Box::pin(async { None })
    }
}

/// Last desired replica count recorded for a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DesiredReplicas {
    pub replicas: u32,
    /// Unix seconds of the update.
    pub updated_at: u64,
}

/// In-memory [`DecisionSink`] keyed by `{namespace}/{deployment}`.
///
/// Holds what an external reconciler would apply to the workload. The
/// recorded value is also reported back as the observed count.
#[derive(Clone, Default)]
pub struct ReplicaLedger {
    entries: Arc<RwLock<HashMap<String, DesiredReplicas>>>,
}

impl ReplicaLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, workload: &str) -> Option<DesiredReplicas> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(workload).copied()
    }

    /// All workloads, sorted.
    pub fn snapshot(&self) -> Vec<(String, DesiredReplicas)> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<_> = entries.iter().map(|(k, v)| (k.clone(), *v)).collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    fn record(&self, workload: String, replicas: u32) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            workload,
            DesiredReplicas {
                replicas,
                updated_at: epoch_secs(),
            },
        );
    }
}

impl DecisionSink for ReplicaLedger {
    fn apply_desired_replicas<'a>(
        &'a self,
        target: &'a TargetBounds,
        replicas: u32,
    ) -> BoxFuture<'a, SinkResult<()>> {
        Box::pin(async move {
            let workload = target.workload();
            info!(%workload, replicas, "desired replicas recorded");
            self.record(workload, replicas);
            Ok(())
        })
    }

    fn observed_replicas<'a>(&'a self, target: &'a TargetBounds) -> BoxFuture<'a, Option<u32>> {
        Box::pin(async move { self.get(&target.workload()).map(|d| d.replicas) })
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
