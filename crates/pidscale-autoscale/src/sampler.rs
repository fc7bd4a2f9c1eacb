//! Lag sampling seam.
//!
//! A [`LagSamplerFactory`] turns a target's Kafka settings into a
//! [`LagSampler`]. Loops build samplers lazily and drop them when the Kafka
//! settings change or the connection is lost.

use std::future::Future;
use std::pin::Pin;

use pidscale_core::KafkaSettings;

/// Boxed future returned by the sampling and decision traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Failure to read consumer-group lag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LagError {
    /// The group is rebalancing or its offsets are not settled yet.
    #[error("consumer group is not stable")]
    GroupNotStable,

    #[error("consumer group not found")]
    GroupNotFound,

    #[error("topic not found")]
    TopicNotFound,

    #[error("no connection: {0}")]
    NoConnection(String),

    #[error("lag query failed: {0}")]
    Query(String),
}

impl LagError {
    /// Expected during normal operation; skipped without counting.
    pub fn is_transient(&self) -> bool {
        matches!(self, LagError::GroupNotStable)
    }

    /// The sampler should be rebuilt before the next query.
    pub fn is_connection(&self) -> bool {
        matches!(self, LagError::NoConnection(_))
    }
}

/// Reads total lag of a consumer group on one topic.
pub trait LagSampler: Send + Sync {
    fn current_lag<'a>(&'a self, group: &'a str, topic: &'a str)
    -> BoxFuture<'a, Result<i64, LagError>>;
}

/// Builds a [`LagSampler`] for a target's Kafka settings.
pub trait LagSamplerFactory: Send + Sync {
    fn build(&self, settings: &KafkaSettings) -> Result<Box<dyn LagSampler>, LagError>;
}
