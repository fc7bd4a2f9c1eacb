//! Lag sampler backed by Burrow's consumer lag endpoint.
//!
//! `GET {url}/v3/kafka/{cluster}/consumer/{group}/lag` returns the
//! evaluated status of a group including every partition it consumes.
//! Topic lag is the sum of `current_lag` over the partitions of that topic.

use std::time::Duration;

use http::StatusCode;
use serde::Deserialize;
use tracing::debug;

use pidscale_autoscale::{BoxFuture, LagError, LagSampler, LagSamplerFactory};
use pidscale_core::{KafkaSettings, SamplerConfig};

use crate::client::Endpoint;

/// Burrow's status for a group it has no offsets for.
const STATUS_NOT_FOUND: &str = "NOTFOUND";

#[derive(Debug, Deserialize)]
struct LagResponse {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    message: String,
    status: Option<GroupStatus>,
}

#[derive(Debug, Deserialize)]
struct GroupStatus {
    status: String,
    /// Fraction of partitions with a full offset window.
    #[serde(default)]
    complete: f64,
    #[serde(default)]
    partitions: Vec<PartitionStatus>,
}

#[derive(Debug, Deserialize)]
struct PartitionStatus {
    topic: String,
    #[serde(default)]
    current_lag: u64,
}

/// Turn a Burrow lag response into total lag for `topic`.
pub fn parse_lag(status: StatusCode, body: &[u8], topic: &str) -> Result<i64, LagError> {
    if status == StatusCode::NOT_FOUND {
        return Err(LagError::GroupNotFound);
    }
    if !status.is_success() {
        return Err(LagError::Query(format!("burrow returned {status}")));
    }

    let resp: LagResponse = serde_json::from_slice(body)
        .map_err(|e| LagError::Query(format!("invalid burrow response: {e}")))?;
    if resp.error {
        if resp.message.contains("not found") {
            return Err(LagError::GroupNotFound);
        }
        return Err(LagError::Query(resp.message));
    }

    let group = resp
        .status
        .ok_or_else(|| LagError::Query("burrow response has no status".to_string()))?;
    if group.status == STATUS_NOT_FOUND {
        return Err(LagError::GroupNotFound);
    }
    if group.complete < 1.0 {
        return Err(LagError::GroupNotStable);
    }

    let mut found = false;
    let mut total: u64 = 0;
    for p in group.partitions.iter().filter(|p| p.topic == topic) {
        found = true;
        total = total.saturating_add(p.current_lag);
    }
    if !found {
        return Err(LagError::TopicNotFound);
    }
    Ok(i64::try_from(total).unwrap_or(i64::MAX))
}

/// Samples one Kafka cluster through Burrow.
pub struct BurrowSampler {
    endpoint: Endpoint,
    cluster: String,
    timeout: Duration,
}

impl BurrowSampler {
    fn lag_path(&self, group: &str) -> String {
        format!("/v3/kafka/{}/consumer/{group}/lag", self.cluster)
    }
}

impl LagSampler for BurrowSampler {
    fn current_lag<'a>(
        &'a self,
        group: &'a str,
        topic: &'a str,
    ) -> BoxFuture<'a, Result<i64, LagError>> {
        Box::pin(async move {
            let (status, body) = self.endpoint.get(&self.lag_path(group), self.timeout).await?;
            let lag = parse_lag(status, &body, topic)?;
            debug!(cluster = %self.cluster, group, topic, lag, "burrow lag read");
            Ok(lag)
        })
    }
}

/// Builds a [`BurrowSampler`] per target, pointed at the Burrow cluster
/// that serves the target's brokers. Burrow holds the broker connections,
/// so the factory only checks that the target's SASL mechanism is the one
/// that cluster is read with.
#[derive(Debug, Clone)]
pub struct BurrowSamplerFactory {
    endpoint: Endpoint,
    config: SamplerConfig,
    timeout: Duration,
}

impl BurrowSamplerFactory {
    pub fn new(config: &SamplerConfig) -> Result<Self, LagError> {
        Ok(Self {
            endpoint: Endpoint::parse(&config.url)?,
            config: config.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }
}

impl LagSamplerFactory for BurrowSamplerFactory {
    fn build(&self, settings: &KafkaSettings) -> Result<Box<dyn LagSampler>, LagError> {
        if settings.group.is_empty() {
            return Err(LagError::Query("consumer group must not be empty".to_string()));
        }
        let cluster = self
            .config
            .resolve_cluster(settings)
            .map_err(|e| LagError::Query(e.to_string()))?;
        debug!(
            cluster = %cluster,
            brokers = ?settings.brokers,
            group = %settings.group,
            topic = %settings.topic,
            "burrow sampler built"
        );
        Ok(Box::new(BurrowSampler {
            endpoint: self.endpoint.clone(),
            cluster: cluster.to_string(),
            timeout: self.timeout,
        }))
    }
}
