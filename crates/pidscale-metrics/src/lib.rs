//! pidscale-metrics — observability for pidscale control loops.
//!
//! Control loops publish point-in-time gauges through the
//! [`ScalerMetrics`] trait. [`MetricsRegistry`] is the in-process
//! implementation; it keeps the latest values per target and renders them
//! in the Prometheus text format.
//!
//! # Architecture
//!
//! ```text
//! worker loop
//!   ├── record_sample()   ← lag, reference, gains, bounds, PID output
//!   ├── record_replicas() ← after an applied decision
//!   └── record_*_error()  ← counters
//!
//! MetricsRegistry::snapshot() → render_prometheus() → /metrics
//! ```

pub mod prometheus;
pub mod recorder;

pub use prometheus::render_prometheus;
pub use recorder::{MetricsRegistry, ScalerMetrics, TargetMetrics};
