//! pidscaled — wiring for the pidscale daemon.
//!
//! The binary in `main.rs` parses the command line and calls into these
//! modules; they live in a library so the reload logic can be tested.

pub mod definitions;
pub mod telemetry;

pub use definitions::{DefinitionSource, ReconcileReport};
pub use telemetry::LogFormat;
