//! pidscale-autoscale — lag-driven PID control loops.
//!
//! One control loop runs per managed target. Each tick it samples the
//! consumer-group lag, feeds it through a [`PidController`] and hands the
//! rounded output to a [`DecisionSink`], at most once per cooldown window.
//!
//! # Control Law
//!
//! ```text
//! err        = lag - reference_signal          (reverse direction)
//! tentative  = integral + err * dt
//! output     = kp * err + ki * tentative + kd * (err - last_err) / dt
//! replicas   = round(clamp(output, min_replicas, max_replicas))
//! ```
//!
//! The integral is only committed when it would not be clamped away at
//! once. `dt` falls back to one second on the first update.
//!
//! # Lifecycle
//!
//! ```text
//! WorkerManager::apply(key, config)
//!   ├── unknown key → start(): register TargetState, spawn Worker
//!   └── known key   → update(): diff, commit, signal the loop
//! WorkerManager::stop(key)     → registry delete closes the channel
//! WorkerManager::shutdown()    → shared watch flag, every loop exits
//! WorkerManager::wait_for_all()
//! ```

pub mod manager;
pub mod pid;
pub mod sampler;
pub mod sink;
pub mod worker;

pub use manager::{ManagerError, ManagerResult, Reconciled, WorkerManager};
pub use pid::{Direction, PidController, PidSettings};
pub use sampler::{BoxFuture, LagError, LagSampler, LagSamplerFactory};
pub use sink::{DecisionSink, DesiredReplicas, ReplicaLedger, SinkError, SinkResult};
pub use worker::{Worker, WorkerContext, WorkerState, pid_settings};
