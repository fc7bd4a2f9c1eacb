//! Configuration snapshot types shared across pidscale crates.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identity of a managed target, `{namespace}/{name}`.
pub type TargetKey = String;

/// Shortest tick a control loop is allowed to run at.
pub const MIN_INTERVAL_SECS: u32 = 1;

/// Build the composite key used by the registry and metrics labels.
pub fn target_key(namespace: &str, name: &str) -> TargetKey {
    format!("{namespace}/{name}")
}

// ── Snapshot ──────────────────────────────────────────────────────

/// Immutable configuration snapshot for one managed target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub target: TargetBounds,
    pub pid: PidGains,
    pub kafka: KafkaSettings,
    /// Sampling period in seconds.
    pub interval: u32,
    /// Minimum seconds between two applied scaling decisions.
    pub cooldown: u32,
}

impl TargetConfig {
    /// Sampling period, never shorter than [`MIN_INTERVAL_SECS`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval.max(MIN_INTERVAL_SECS)))
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(u64::from(self.cooldown))
    }
}

/// The workload being scaled and its replica bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetBounds {
    pub deployment: String,
    pub namespace: String,
    pub min_replicas: u32,
    pub max_replicas: u32,
}

impl TargetBounds {
    /// `{namespace}/{deployment}` of the scaled workload.
    pub fn workload(&self) -> String {
        format!("{}/{}", self.namespace, self.deployment)
    }
}

/// PID gains and the lag setpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Desired lag.
    pub reference_signal: i64,
}

/// Where to read consumer-group lag from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KafkaSettings {
    pub brokers: Vec<String>,
    pub topic: String,
    pub group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sasl: Option<SaslSettings>,
}

/// SASL credentials for the Kafka connection.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaslSettings {
    pub mechanism: SaslMechanism,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl fmt::Debug for SaslSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslSettings")
            .field("mechanism", &self.mechanism)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaslMechanism {
    Plain,
    ScramSha256,
    ScramSha512,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(interval: u32) -> TargetConfig {
        TargetConfig {
            target: TargetBounds {
                deployment: "consumer".to_string(),
                namespace: "default".to_string(),
                min_replicas: 1,
                max_replicas: 10,
            },
            pid: PidGains {
                kp: 1.0,
                ki: 0.5,
                kd: 0.1,
                reference_signal: 100,
            },
            kafka: KafkaSettings {
                brokers: vec!["kafka:9092".to_string()],
                topic: "events".to_string(),
                group: "consumer".to_string(),
                sasl: None,
            },
            interval,
            cooldown: 30,
        }
    }

    #[test]
    fn zero_interval_uses_minimum_tick() {
        assert_eq!(test_config(0).interval(), Duration::from_secs(1));
        assert_eq!(test_config(15).interval(), Duration::from_secs(15));
    }

    #[test]
    fn sasl_debug_hides_password() {
        let sasl = SaslSettings {
            mechanism: SaslMechanism::ScramSha512,
            username: "svc".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{sasl:?}");
        assert!(rendered.contains("svc"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn sasl_password_is_not_serialized() {
        let mut config = test_config(10);
        config.kafka.sasl = Some(SaslSettings {
            mechanism: SaslMechanism::Plain,
            username: "svc".to_string(),
            password: "hunter2".to_string(),
        });
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"mechanism\":\"plain\""));
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn workload_and_key_format() {
        assert_eq!(target_key("team-a", "orders"), "team-a/orders");
        assert_eq!(test_config(10).target.workload(), "default/consumer");
    }
}
