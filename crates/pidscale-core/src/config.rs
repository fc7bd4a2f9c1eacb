//! Definitions file parser.
//!
//! The daemon reads its managed targets from a TOML file:
//!
//! ```toml
//! [sampler]
//! kind = "burrow"
//! url = "http://burrow:8000"
//! cluster = "main"
//!
//! [[sampler.clusters]]
//! name = "eu"
//! brokers = ["kafka-eu-0:9092"]
//! sasl = "scram_sha512"
//!
//! [[target]]
//! name = "orders"
//! namespace = "shop"
//! interval = 10
//! cooldown = 60
//!
//! [target.scale]
//! deployment = "orders-consumer"
//! min_replicas = 1
//! max_replicas = 20
//!
//! [target.pid]
//! kp = "0.01"
//! ki = 0.001
//! kd = 0
//! reference_signal = 1000
//!
//! [target.kafka]
//! brokers = ["kafka-0:9092", "kafka-1:9092"]
//! topic = "orders"
//! group = "orders-consumer"
//! ```
//!
//! Gains are accepted either as numbers or as numeric strings. Every
//! definition is validated before it is turned into a [`TargetConfig`];
//! inverted replica bounds are rejected here rather than inside the
//! control loop.
//!
//! Burrow reads each Kafka cluster with its own connection settings, so a
//! target is routed to a Burrow cluster by its brokers. Targets whose
//! brokers or SASL mechanism match no configured cluster are rejected.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult, RouteError};
use crate::types::*;

const DEFAULT_BURROW_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefinitionsFile {
    pub sampler: Option<SamplerConfig>,
    #[serde(default, rename = "target")]
    pub targets: Vec<TargetDefinition>,
}

/// Which lag backend the daemon builds samplers from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerConfig {
    pub kind: SamplerKind,
    pub url: String,
    /// Cluster for targets whose brokers match no entry in `clusters`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    /// SASL mechanism Burrow uses for the default cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sasl: Option<SaslMechanism>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clusters: Vec<ClusterRoute>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// A Burrow cluster and the brokers it reads offsets from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRoute {
    pub name: String,
    pub brokers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sasl: Option<SaslMechanism>,
}

impl ClusterRoute {
    /// True if the route shares at least one broker with `brokers`.
    fn serves(&self, brokers: &[String]) -> bool {
        brokers
            .iter()
            .any(|b| self.brokers.iter().any(|own| same_broker(own, b)))
    }
}

fn same_broker(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerKind {
    Burrow,
}

/// One `[[target]]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetDefinition {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default = "default_cooldown")]
    pub cooldown: u32,
    pub scale: ScaleSection,
    pub pid: PidSection,
    pub kafka: KafkaSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleSection {
    pub deployment: String,
    /// Defaults to the definition's own namespace.
    pub namespace: Option<String>,
    pub min_replicas: u32,
    pub max_replicas: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidSection {
    pub kp: GainValue,
    pub ki: GainValue,
    pub kd: GainValue,
    pub reference_signal: i64,
}

/// A gain written either as a TOML number or as a numeric string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GainValue {
    Number(f64),
    Text(String),
}

impl GainValue {
    fn resolve(&self, key: &str, gain: &'static str) -> ConfigResult<f64> {
        let value = match self {
            GainValue::Number(v) => Some(*v),
            GainValue::Text(s) => s.trim().parse::<f64>().ok(),
        };
        match value {
            Some(v) if v.is_finite() => Ok(v),
            _ => Err(ConfigError::InvalidGain {
                key: key.to_string(),
                gain,
                value: self.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for GainValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GainValue::Number(v) => write!(f, "{v}"),
            GainValue::Text(s) => f.write_str(s),
        }
    }
}

impl TargetDefinition {
    pub fn key(&self) -> TargetKey {
        target_key(&self.namespace, &self.name)
    }

    /// Validate the definition and build the snapshot handed to the manager.
    pub fn to_config(&self) -> ConfigResult<TargetConfig> {
        let key = self.key();
        let missing = |field| ConfigError::Missing {
            key: key.clone(),
            field,
        };

        if self.name.trim().is_empty() {
            return Err(missing("name"));
        }
        if self.scale.deployment.trim().is_empty() {
            return Err(missing("scale.deployment"));
        }
        if self.kafka.brokers.iter().all(|b| b.trim().is_empty()) {
            return Err(missing("kafka.brokers"));
        }
        if self.kafka.topic.trim().is_empty() {
            return Err(missing("kafka.topic"));
        }
        if self.kafka.group.trim().is_empty() {
            return Err(missing("kafka.group"));
        }
        if self.scale.min_replicas > self.scale.max_replicas {
            return Err(ConfigError::InvertedBounds {
                key,
                min: self.scale.min_replicas,
                max: self.scale.max_replicas,
            });
        }

        let pid = PidGains {
            kp: self.pid.kp.resolve(&key, "kp")?,
            ki: self.pid.ki.resolve(&key, "ki")?,
            kd: self.pid.kd.resolve(&key, "kd")?,
            reference_signal: self.pid.reference_signal,
        };

        Ok(TargetConfig {
            target: TargetBounds {
                deployment: self.scale.deployment.clone(),
                namespace: self
                    .scale
                    .namespace
                    .clone()
                    .unwrap_or_else(|| self.namespace.clone()),
                min_replicas: self.scale.min_replicas,
                max_replicas: self.scale.max_replicas,
            },
            pid,
            kafka: self.kafka.clone(),
            interval: self.interval,
            cooldown: self.cooldown,
        })
    }
}

impl DefinitionsFile {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validate every definition and return the snapshots keyed by target.
    pub fn targets(&self) -> ConfigResult<BTreeMap<TargetKey, TargetConfig>> {
        if let Some(sampler) = &self.sampler {
            sampler.validate()?;
        }

        let mut out = BTreeMap::new();
        for def in &self.targets {
            let config = def.to_config()?;
            if let Some(sampler) = &self.sampler {
                sampler
                    .resolve_cluster(&config.kafka)
                    .map_err(|source| ConfigError::Unroutable {
                        key: def.key(),
                        source,
                    })?;
            }
            if out.insert(def.key(), config).is_some() {
                return Err(ConfigError::DuplicateTarget(def.key()));
            }
        }
        Ok(out)
    }
}

impl SamplerConfig {
    /// Burrow cluster that holds the offsets for `kafka`.
    ///
    /// The route sharing a broker with the target wins; a target matching
    /// none falls back to `cluster`. The SASL mechanism of the chosen
    /// cluster must be the target's own.
    pub fn resolve_cluster(&self, kafka: &KafkaSettings) -> Result<&str, RouteError> {
        let mut matched: Option<&ClusterRoute> = None;
        for route in self.clusters.iter().filter(|r| r.serves(&kafka.brokers)) {
            if let Some(first) = matched {
                return Err(RouteError::Ambiguous {
                    brokers: kafka.brokers.clone(),
                    first: first.name.clone(),
                    second: route.name.clone(),
                });
            }
            matched = Some(route);
        }

        let (cluster, expected) = match (matched, &self.cluster) {
            (Some(route), _) => (route.name.as_str(), route.sasl),
            (None, Some(default)) => (default.as_str(), self.sasl),
            (None, None) => return Err(RouteError::NoCluster(kafka.brokers.clone())),
        };
        let actual = kafka.sasl.as_ref().map(|s| s.mechanism);
        if expected != actual {
            return Err(RouteError::SaslMismatch {
                cluster: cluster.to_string(),
                expected,
                actual,
            });
        }
        Ok(cluster)
    }

    fn validate(&self) -> ConfigResult<()> {
        let invalid = |msg: &str| Err(ConfigError::Sampler(msg.to_string()));
        if self.url.trim().is_empty() {
            return invalid("url must not be empty");
        }
        if self.cluster.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return invalid("cluster must not be empty");
        }
        if self.cluster.is_none() && self.clusters.is_empty() {
            return invalid("either cluster or clusters must be set");
        }
        for (i, route) in self.clusters.iter().enumerate() {
            if route.name.trim().is_empty() {
                return invalid("cluster route without a name");
            }
            if route.brokers.iter().all(|b| b.trim().is_empty()) {
                return Err(ConfigError::Sampler(format!(
                    "cluster {} has no brokers",
                    route.name
                )));
            }
            if self.clusters[..i].iter().any(|r| r.name == route.name) {
                return Err(ConfigError::Sampler(format!(
                    "cluster {} is listed more than once",
                    route.name
                )));
            }
        }
        Ok(())
    }
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_interval() -> u32 {
    10
}

fn default_cooldown() -> u32 {
    30
}

fn default_timeout_ms() -> u64 {
    DEFAULT_BURROW_TIMEOUT_MS
}
