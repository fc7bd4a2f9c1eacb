//! Definitions file reconciliation against a live worker manager.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use pidscale_autoscale::*;
use pidscale_core::KafkaSettings;
use pidscale_metrics::MetricsRegistry;
use pidscale_state::{ChangeMask, ControlRegistry};
use pidscaled::DefinitionSource;

/// Loops stay registered but never sample.
struct Offline;

impl LagSamplerFactory for Offline {
    fn build(&self, _settings: &KafkaSettings) -> Result<Box<dyn LagSampler>, LagError> {
        Err(LagError::NoConnection("offline".into()))
    }
}

fn manager() -> Arc<WorkerManager> {
    Arc::new(WorkerManager::new(WorkerContext {
        registry: ControlRegistry::new(),
        samplers: Arc::new(Offline),
        sink: Arc::new(ReplicaLedger::new()),
        metrics: Arc::new(MetricsRegistry::new()),
    }))
}

fn target(name: &str, kp: f64, min: u32, max: u32) -> String {
    format!(
        r#"
[[target]]
name = "{name}"
namespace = "shop"
interval = 10
cooldown = 30

[target.scale]
deployment = "{name}-consumer"
min_replicas = {min}
max_replicas = {max}

[target.pid]
kp = {kp:?}
ki = 0.0
kd = 0.0
reference_signal = 100

[target.kafka]
brokers = ["kafka:9092"]
topic = "{name}"
group = "{name}-consumer"
"#
    )
}

fn write(path: &Path, targets: &[String]) {
    let mut content = String::from(
        "[sampler]\nkind = \"burrow\"\nurl = \"http://burrow:8000\"\ncluster = \"main\"\n",
    );
    for t in targets {
        content.push_str(t);
    }
    std::fs::write(path, content).unwrap();
}

#[tokio::test(start_paused = true)]
async fn reconcile_starts_updates_and_stops() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("targets.toml");
    let manager = manager();
    let source = DefinitionSource::new(&path, manager.clone());

    write(&path, &[target("orders", 0.01, 1, 10), target("billing", 0.02, 1, 4)]);
    let report = source.reconcile().await.unwrap();
    assert_eq!(report.started, vec!["shop/billing", "shop/orders"]);
    assert_eq!(manager.active_workers(), 2);

    let report = source.reconcile().await.unwrap();
    assert!(report.is_noop());
    assert_eq!(report.unchanged, 2);

    write(&path, &[target("orders", 0.05, 1, 10)]);
    let report = source.reconcile().await.unwrap();
    assert_eq!(
        report.updated,
        vec![("shop/orders".to_string(), ChangeMask::PID)]
    );
    assert_eq!(report.stopped, vec!["shop/billing"]);
    assert_eq!(manager.targets().await, vec!["shop/orders"]);
    assert_eq!(manager.registry().get("shop/orders").await.unwrap().pid.kp, 0.05);

    manager.shutdown();
    manager.wait_for_all().await;
    assert_eq!(manager.active_workers(), 0);
}

#[tokio::test(start_paused = true)]
async fn invalid_file_keeps_last_good_set() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("targets.toml");
    let manager = manager();
    let source = DefinitionSource::new(&path, manager.clone());

    write(&path, &[target("orders", 0.01, 1, 10)]);
    source.reconcile().await.unwrap();

    // Inverted bounds are rejected before anything is touched.
    write(&path, &[target("orders", 0.01, 10, 1)]);
    assert!(source.reconcile().await.is_err());

    // The default Burrow cluster is not read over SASL.
    let with_sasl = format!(
        "{}\n[target.kafka.sasl]\nmechanism = \"plain\"\nusername = \"svc\"\npassword = \"pw\"\n",
        target("orders", 0.05, 1, 10)
    );
    write(&path, &[with_sasl]);
    assert!(source.reconcile().await.is_err());

    std::fs::write(&path, "[[target]\nname = ").unwrap();
    assert!(source.reconcile().await.is_err());

    assert_eq!(manager.targets().await, vec!["shop/orders"]);
    let config = manager.registry().get("shop/orders").await.unwrap();
    assert_eq!(config.pid.kp, 0.01);
    assert_eq!(config.target.min_replicas, 1);
    assert_eq!(config.target.max_replicas, 10);
}

#[tokio::test(start_paused = true)]
async fn run_loop_picks_up_changes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("targets.toml");
    let manager = manager();
    let source = DefinitionSource::new(&path, manager.clone());

    write(&path, &[target("orders", 0.01, 1, 10)]);
    source.reconcile().await.unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(source.run(Duration::from_secs(30), shutdown_rx));

    write(
        &path,
        &[target("orders", 0.01, 1, 10), target("payments", 0.01, 2, 6)],
    );
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(manager.targets().await, vec!["shop/orders", "shop/payments"]);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}
