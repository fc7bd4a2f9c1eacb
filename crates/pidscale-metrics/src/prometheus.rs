//! Prometheus text exposition format.
//!
//! Renders per-target metrics into the Prometheus text exposition format
//! for scraping by a Prometheus server or compatible agent. Every series
//! carries a `namespaced_name` label holding the target key.

use std::fmt::Write;

use crate::recorder::TargetMetrics;

/// Which extra labels a family carries.
#[derive(Clone, Copy)]
enum Labels {
    /// `namespaced_name` only.
    Key,
    /// `namespaced_name`, `topic`, `group`.
    Kafka,
    /// `namespaced_name`, `namespace`, `deployment`.
    Workload,
}

/// One metric family: name, help text, type, label set and value accessor.
///
/// The accessor returns `None` when the target has no value for the family
/// yet, in which case no series is emitted for it.
struct Family {
    name: &'static str,
    help: &'static str,
    kind: &'static str,
    labels: Labels,
    value: fn(&TargetMetrics) -> Option<f64>,
}

/// Gauges fed by a lag sample only exist once the target has been sampled.
fn sampled(t: &TargetMetrics, value: f64) -> Option<f64> {
    t.lag.map(|_| value)
}

const FAMILIES: &[Family] = &[
    Family {
        name: "kafka_lag",
        help: "Kafka lag per namespaced name.",
        kind: "gauge",
        labels: Labels::Kafka,
        value: |t| t.lag,
    },
    Family {
        name: "reference_signal",
        help: "Reference signal per namespaced name.",
        kind: "gauge",
        labels: Labels::Kafka,
        value: |t| sampled(t, t.reference_signal),
    },
    Family {
        name: "pid_kp",
        help: "Kp value of PID controller per namespaced name.",
        kind: "gauge",
        labels: Labels::Key,
        value: |t| sampled(t, t.kp),
    },
    Family {
        name: "pid_ki",
        help: "Ki value of PID controller per namespaced name.",
        kind: "gauge",
        labels: Labels::Key,
        value: |t| sampled(t, t.ki),
    },
    Family {
        name: "pid_kd",
        help: "Kd value of PID controller per namespaced name.",
        kind: "gauge",
        labels: Labels::Key,
        value: |t| sampled(t, t.kd),
    },
    Family {
        name: "pid_min_output",
        help: "Minimum output of PID controller per namespaced name.",
        kind: "gauge",
        labels: Labels::Workload,
        value: |t| sampled(t, t.min_output),
    },
    Family {
        name: "pid_max_output",
        help: "Maximum output of PID controller per namespaced name.",
        kind: "gauge",
        labels: Labels::Workload,
        value: |t| sampled(t, t.max_output),
    },
    Family {
        name: "pid_actual_output",
        help: "Actual output of PID controller per namespaced name.",
        kind: "gauge",
        labels: Labels::Workload,
        value: |t| sampled(t, t.pid_output),
    },
    Family {
        name: "replicas",
        help: "Desired replicas per namespaced name.",
        kind: "gauge",
        labels: Labels::Workload,
        value: |t| t.replicas,
    },
    Family {
        name: "sample_errors_total",
        help: "Failed lag samples per namespaced name.",
        kind: "counter",
        labels: Labels::Key,
        value: |t| Some(t.sample_errors as f64),
    },
    Family {
        name: "decision_errors_total",
        help: "Failed scaling decisions per namespaced name.",
        kind: "counter",
        labels: Labels::Key,
        value: |t| Some(t.decision_errors as f64),
    },
];

/// Render a list of target metrics into Prometheus text format.
///
/// Gauges fed by a lag sample are omitted for targets that have not been
/// sampled yet; `replicas` is omitted until a decision was applied.
pub fn render_prometheus(targets: &[TargetMetrics]) -> String {
    let mut out = String::new();

    // Writing to a String cannot fail.
    for family in FAMILIES {
        let _ = writeln!(out, "# HELP {} {}", family.name, family.help);
        let _ = writeln!(out, "# TYPE {} {}", family.name, family.kind);
        for t in targets {
            if let Some(value) = (family.value)(t) {
                let _ = writeln!(
                    out,
                    "{}{{{}}} {value}",
                    family.name,
                    label_set(t, family.labels)
                );
            }
        }
    }

    out
}

fn label_set(t: &TargetMetrics, labels: Labels) -> String {
    let key = format!("namespaced_name=\"{}\"", escape(&t.key));
    match labels {
        Labels::Key => key,
        Labels::Kafka => format!(
            "{key},topic=\"{}\",group=\"{}\"",
            escape(&t.topic),
            escape(&t.group)
        ),
        Labels::Workload => format!(
            "{key},namespace=\"{}\",deployment=\"{}\"",
            escape(&t.namespace),
            escape(&t.deployment)
        ),
    }
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
