//! pidscale-core — shared types for the pidscale workspace.
//!
//! Holds the per-target configuration snapshot consumed by the control
//! loops and the parser for the TOML definitions file the daemon reads
//! targets from.

pub mod config;
pub mod error;
pub mod types;

pub use config::{ClusterRoute, DefinitionsFile, SamplerConfig, SamplerKind, TargetDefinition};
pub use error::{ConfigError, ConfigResult, RouteError};
pub use types::*;
