//! Errors raised while loading or validating target definitions.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::SaslMechanism;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse definitions: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("target {key}: missing {field}")]
    Missing { key: String, field: &'static str },

    #[error("target {key}: min_replicas {min} is greater than max_replicas {max}")]
    InvertedBounds { key: String, min: u32, max: u32 },

    #[error("target {key}: invalid {gain} gain {value:?}")]
    InvalidGain {
        key: String,
        gain: &'static str,
        value: String,
    },

    #[error("target {0} is defined more than once")]
    DuplicateTarget(String),

    #[error("sampler: {0}")]
    Sampler(String),

    #[error("target {key}: {source}")]
    Unroutable {
        key: String,
        #[source]
        source: RouteError,
    },
}

/// Why a target's Kafka settings map to no sampler cluster.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("brokers {0:?} match no sampler cluster")]
    NoCluster(Vec<String>),

    #[error("brokers {brokers:?} match both {first} and {second}")]
    Ambiguous {
        brokers: Vec<String>,
        first: String,
        second: String,
    },

    #[error("cluster {cluster} is read with sasl {expected:?}, target uses {actual:?}")]
    SaslMismatch {
        cluster: String,
        expected: Option<SaslMechanism>,
        actual: Option<SaslMechanism>,
    },
}
