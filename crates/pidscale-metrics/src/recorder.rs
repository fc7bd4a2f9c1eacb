//! Per-target gauge storage.
//!
//! Writes happen once per loop tick per target, so a `std::sync::RwLock`
//! held for a single map operation is enough. Lock poisoning is ignored:
//! a gauge write that panicked leaves at worst a stale value.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tracing::debug;

use pidscale_core::{TargetBounds, TargetConfig};

/// Sink for control-loop observability signals. Fire-and-forget.
pub trait ScalerMetrics: Send + Sync {
    /// A successful lag sample and the PID output it produced.
    fn record_sample(&self, key: &str, config: &TargetConfig, lag: i64, output: f64);

    /// A replica count handed to the decision sink.
    fn record_replicas(&self, key: &str, bounds: &TargetBounds, replicas: u32);

    fn record_sample_error(&self, key: &str);

    fn record_decision_error(&self, key: &str);

    /// Drop everything recorded for `key`.
    fn forget(&self, key: &str);
}

/// Latest values for one target.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TargetMetrics {
    pub key: String,
    pub topic: String,
    pub group: String,
    pub namespace: String,
    pub deployment: String,
    /// `None` until the first successful sample.
    pub lag: Option<f64>,
    pub reference_signal: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub min_output: f64,
    pub max_output: f64,
    pub pid_output: f64,
    /// `None` until the first applied decision.
    pub replicas: Option<f64>,
    pub sample_errors: u64,
    pub decision_errors: u64,
}

impl TargetMetrics {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            ..Default::default()
        }
    }
}

/// In-process [`ScalerMetrics`] implementation.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    targets: Arc<RwLock<HashMap<String, TargetMetrics>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest values for `key`.
    pub fn get(&self, key: &str) -> Option<TargetMetrics> {
        let targets = self.targets.read().unwrap_or_else(PoisonError::into_inner);
        targets.get(key).cloned()
    }

    /// All targets, sorted by key.
    pub fn snapshot(&self) -> Vec<TargetMetrics> {
        let targets = self.targets.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<_> = targets.values().cloned().collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    /// Prometheus text for every tracked target.
    pub fn render(&self) -> String {
        crate::prometheus::render_prometheus(&self.snapshot())
    }

    fn with_target(&self, key: &str, f: impl FnOnce(&mut TargetMetrics)) {
        let mut targets = self.targets.write().unwrap_or_else(PoisonError::into_inner);
        f(targets
            .entry(key.to_string())
            .or_insert_with(|| TargetMetrics::new(key)));
    }
}

impl ScalerMetrics for MetricsRegistry {
    fn record_sample(&self, key: &str, config: &TargetConfig, lag: i64, output: f64) {
        self.with_target(key, |m| {
            m.topic = config.kafka.topic.clone();
            m.group = config.kafka.group.clone();
            m.namespace = config.target.namespace.clone();
            m.deployment = config.target.deployment.clone();
            m.lag = Some(lag as f64);
            m.reference_signal = config.pid.reference_signal as f64;
            m.kp = config.pid.kp;
            m.ki = config.pid.ki;
            m.kd = config.pid.kd;
            m.min_output = f64::from(config.target.min_replicas);
            m.max_output = f64::from(config.target.max_replicas);
            m.pid_output = output;
        });
    }

    fn record_replicas(&self, key: &str, bounds: &TargetBounds, replicas: u32) {
        self.with_target(key, |m| {
            m.namespace = bounds.namespace.clone();
            m.deployment = bounds.deployment.clone();
            m.replicas = Some(f64::from(replicas));
        });
    }

    fn record_sample_error(&self, key: &str) {
        self.with_target(key, |m| m.sample_errors += 1);
    }

    fn record_decision_error(&self, key: &str) {
        self.with_target(key, |m| m.decision_errors += 1);
    }

    fn forget(&self, key: &str) {
        let mut targets = self.targets.write().unwrap_or_else(PoisonError::into_inner);
        if targets.remove(key).is_some() {
            debug!(%key, "metrics dropped");
        }
    }
}
