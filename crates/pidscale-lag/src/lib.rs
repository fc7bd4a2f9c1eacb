//! pidscale-lag — consumer-group lag samplers.
//!
//! The only backend today is [Burrow](https://github.com/linkedin/Burrow),
//! queried over plain HTTP/1 with hyper. Burrow already tracks committed
//! and log-end offsets per partition, so the daemon never speaks the Kafka
//! protocol itself.

pub mod burrow;
pub mod client;

pub use burrow::{BurrowSampler, BurrowSamplerFactory, parse_lag};
pub use client::Endpoint;
