//! Control loop for a single target.
//!
//! Each loop owns its PID controller and lag sampler. It waits on three
//! things at once: the shared shutdown flag, its control inbox and the
//! next tick. Shutdown is polled first so a stopping daemon never starts
//! another sample.
//!
//! A loop whose control channel closes mid-tick writes nothing further: no
//! gauges, no decision. It drops its target's gauges itself on the way
//! out, after its last write, unless the key was registered again.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use pidscale_core::{TargetConfig, TargetKey};
use pidscale_metrics::ScalerMetrics;
use pidscale_state::{ChangeMask, ControlReceiver, ControlRegistry};

use crate::pid::{Direction, PidController, PidSettings};
use crate::sampler::{LagSampler, LagSamplerFactory};
use crate::sink::DecisionSink;

/// Collaborators shared by every control loop.
#[derive(Clone)]
pub struct WorkerContext {
    pub registry: ControlRegistry,
    pub samplers: Arc<dyn LagSamplerFactory>,
    pub sink: Arc<dyn DecisionSink>,
    pub metrics: Arc<dyn ScalerMetrics>,
}

/// Where a loop is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Sampling,
    ApplyingChange,
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Starting => "starting",
            WorkerState::Sampling => "sampling",
            WorkerState::ApplyingChange => "applying_change",
            WorkerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// PID settings for a target. Loops always run in reverse so that lag
/// above the reference raises the replica count.
pub fn pid_settings(config: &TargetConfig) -> PidSettings {
    PidSettings {
        kp: config.pid.kp,
        ki: config.pid.ki,
        kd: config.pid.kd,
        min_output: f64::from(config.target.min_replicas),
        max_output: f64::from(config.target.max_replicas),
        direction: Direction::Reverse,
    }
}

/// One control loop.
pub struct Worker {
    key: TargetKey,
    /// Registry entry this loop belongs to.
    generation: u64,
    ctx: WorkerContext,
    config: TargetConfig,
    state: WorkerState,
    pid: Option<PidController>,
    sampler: Option<Box<dyn LagSampler>>,
    last_desired: Option<u32>,
    last_applied: Option<Instant>,
}

impl Worker {
    pub fn new(key: TargetKey, generation: u64, config: TargetConfig, ctx: WorkerContext) -> Self {
        Self {
            key,
            generation,
            ctx,
            config,
            state: WorkerState::Starting,
            pid: None,
            sampler: None,
            last_desired: None,
            last_applied: None,
        }
    }

    /// Run until shutdown, until the control channel closes, or until the
    /// target disappears from the registry.
    pub async fn run(mut self, mut control: ControlReceiver, mut shutdown: watch::Receiver<bool>) {
        info!(
            key = %self.key,
            interval_secs = self.config.interval().as_secs(),
            "control loop started"
        );

        // First sample right away.
        let mut next_tick = Instant::now();

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    // A dropped sender means the manager is gone.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                signal = control.recv() => {
                    let Some(mut mask) = signal else {
                        info!(key = %self.key, "control channel closed");
                        break;
                    };
                    while let Ok(more) = control.try_recv() {
                        mask |= more;
                    }
                    if !self.reconfigure(mask).await {
                        break;
                    }
                    next_tick = Instant::now();
                }
                _ = sleep_until(next_tick) => {
                    self.tick(&shutdown, &control).await;
                    next_tick = Instant::now() + self.config.interval();
                }
            }
        }

        self.transition(WorkerState::Stopped);
        let forgotten = self
            .ctx
            .registry
            .if_vacant(&self.key, || self.ctx.metrics.forget(&self.key))
            .await;
        info!(key = %self.key, gauges_dropped = forgotten, "control loop stopped");
    }

    /// Pick up the committed configuration after a control signal.
    /// Returns false if the target is gone or belongs to a newer loop.
    async fn reconfigure(&mut self, signalled: ChangeMask) -> bool {
        let reloaded = self.ctx.registry.reload(&self.key, self.generation).await;
        let Some((config, deferred)) = reloaded else {
            info!(key = %self.key, "target no longer registered to this loop");
            return false;
        };
        let mask = signalled | deferred;
        self.config = config;

        if mask.intersects(ChangeMask::PID | ChangeMask::TARGET)
            && let Some(pid) = self.pid.as_mut()
        {
            pid.update_config(pid_settings(&self.config));
            info!(
                key = %self.key,
                kp = self.config.pid.kp,
                ki = self.config.pid.ki,
                kd = self.config.pid.kd,
                min_replicas = self.config.target.min_replicas,
                max_replicas = self.config.target.max_replicas,
                "pid controller updated"
            );
        }
        if mask.contains(ChangeMask::KAFKA) && self.sampler.take().is_some() {
            info!(
                key = %self.key,
                brokers = ?self.config.kafka.brokers,
                topic = %self.config.kafka.topic,
                group = %self.config.kafka.group,
                "lag sampler dropped for new kafka settings"
            );
        }

        info!(key = %self.key, %mask, "configuration applied");
        true
    }

    async fn tick(&mut self, shutdown: &watch::Receiver<bool>, control: &ControlReceiver) {
        self.transition(WorkerState::Sampling);

        if self.pid.is_none() {
            self.pid = Some(PidController::new(pid_settings(&self.config)));
        }

        if self.sampler.is_none() {
            match self.ctx.samplers.build(&self.config.kafka) {
                Ok(sampler) => self.sampler = Some(sampler),
                Err(e) => {
                    warn!(key = %self.key, error = %e, "failed to build lag sampler");
                    self.ctx.metrics.record_sample_error(&self.key);
                    return;
                }
            }
        }
        let Some(sampler) = self.sampler.as_ref() else {
            return;
        };

        let kafka = &self.config.kafka;
        let sample = sampler.current_lag(&kafka.group, &kafka.topic).await;
        let lag = match sample {
            Ok(lag) => lag,
            Err(e) if e.is_transient() => {
                debug!(key = %self.key, error = %e, "lag sample skipped");
                return;
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "failed to read kafka lag");
                self.ctx.metrics.record_sample_error(&self.key);
                if e.is_connection() {
                    self.sampler = None;
                }
                return;
            }
        };

        if cancelled(shutdown, control) {
            debug!(key = %self.key, "lag sample discarded, loop is stopping");
            return;
        }

        let Some(pid) = self.pid.as_mut() else {
            return;
        };
        let now = Instant::now();
        let output = pid.update(self.config.pid.reference_signal as f64, lag as f64, now);
        self.ctx
            .metrics
            .record_sample(&self.key, &self.config, lag, output);
        debug!(key = %self.key, lag, output, "lag sampled");

        self.decide(output, now, shutdown, control).await;
    }

    /// Cooldown gate and hand-off to the decision sink.
    async fn decide(
        &mut self,
        output: f64,
        now: Instant,
        shutdown: &watch::Receiver<bool>,
        control: &ControlReceiver,
    ) {
        if let Some(last) = self.last_applied
            && now.saturating_duration_since(last) <= self.config.cooldown()
        {
            debug!(key = %self.key, "cooldown active");
            return;
        }

        // Output is clamped to the u32 replica bounds.
        let desired = output.round() as u32;
        let observed = self.ctx.sink.observed_replicas(&self.config.target).await;
        if self.last_desired == Some(desired) && observed.is_none_or(|o| o == desired) {
            debug!(key = %self.key, replicas = desired, "replicas unchanged");
            return;
        }
        if cancelled(shutdown, control) {
            return;
        }

        self.transition(WorkerState::ApplyingChange);
        let target = &self.config.target;
        match self.ctx.sink.apply_desired_replicas(target, desired).await {
            Ok(()) => {
                self.last_applied = Some(Instant::now());
                self.last_desired = Some(desired);
                self.ctx
                    .metrics
                    .record_replicas(&self.key, target, desired);
                info!(
                    key = %self.key,
                    workload = %target.workload(),
                    replicas = desired,
                    "desired replicas applied"
                );
            }
            Err(e) => {
                warn!(key = %self.key, replicas = desired, error = %e, "scaling decision failed");
                self.ctx.metrics.record_decision_error(&self.key);
            }
        }
    }

    fn transition(&mut self, next: WorkerState) {
        if self.state != next {
            debug!(key = %self.key, from = %self.state, to = %next, "worker state");
            self.state = next;
        }
    }
}

/// Shutdown was signalled, or the target was stopped or replaced.
fn cancelled(shutdown: &watch::Receiver<bool>, control: &ControlReceiver) -> bool {
    *shutdown.borrow() || control.is_closed()
}
