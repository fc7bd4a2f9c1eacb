//! Router-level tests through `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use pidscale_api::{ApiState, build_router};
use pidscale_autoscale::*;
use pidscale_core::*;
use pidscale_metrics::MetricsRegistry;
use pidscale_state::ControlRegistry;

struct FixedLag(i64);

impl LagSampler for FixedLag {
    fn current_lag<'a>(
        &'a self,
        _group: &'a str,
        _topic: &'a str,
    ) -> BoxFuture<'a, Result<i64, LagError>> {
        let lag = self.0;
        Box::pin(async move { Ok(lag) })
    }
}

struct FixedFactory;

impl LagSamplerFactory for FixedFactory {
    fn build(&self, _settings: &KafkaSettings) -> Result<Box<dyn LagSampler>, LagError> {
        Ok(Box::new(FixedLag(1500)))
    }
}

fn test_state() -> ApiState {
    let metrics = MetricsRegistry::new();
    let ledger = ReplicaLedger::new();
    let manager = WorkerManager::new(WorkerContext {
        registry: ControlRegistry::new(),
        samplers: Arc::new(FixedFactory),
        sink: Arc::new(ledger.clone()),
        metrics: Arc::new(metrics.clone()),
    });
    ApiState {
        manager: Arc::new(manager),
        metrics,
        ledger,
    }
}

fn test_config() -> TargetConfig {
    TargetConfig {
        target: TargetBounds {
            deployment: "orders-consumer".to_string(),
            namespace: "shop".to_string(),
            min_replicas: 1,
            max_replicas: 10,
        },
        pid: PidGains {
            kp: 0.002,
            ki: 0.0,
            kd: 0.0,
            reference_signal: 500,
        },
        kafka: KafkaSettings {
            brokers: vec!["kafka:9092".to_string()],
            topic: "orders".to_string(),
            group: "orders-consumer".to_string(),
            sasl: Some(SaslSettings {
                mechanism: SaslMechanism::ScramSha512,
                username: "scaler".to_string(),
                password: "hunter2".to_string(),
            }),
        },
        interval: 30,
        cooldown: 0,
    }
}

async fn get(state: &ApiState, uri: &str) -> (StatusCode, String) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = build_router(state.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

/// Start one target and let its first tick run.
async fn running_state() -> ApiState {
    let state = test_state();
    state
        .manager
        .start("shop/orders", test_config())
        .await
        .unwrap();
    for _ in 0..50 {
        if state.ledger.get("shop/orders-consumer").is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    state
}

#[tokio::test]
async fn list_targets() {
    let state = running_state().await;
    let (status, body) = get(&state, "/api/v1/targets").await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["success"], true);
    let targets = json["data"].as_array().unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0]["key"], "shop/orders");
    assert_eq!(targets[0]["workload"], "shop/orders-consumer");
    // err = 1500 - 500 = 1000, 0.002 * 1000 = 2
    assert_eq!(targets[0]["desired_replicas"], 2);
}

#[tokio::test]
async fn target_detail_hides_password() {
    let state = running_state().await;
    let (status, body) = get(&state, "/api/v1/targets/shop%2Forders").await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body.contains("hunter2"));

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    let data = &json["data"];
    assert_eq!(data["config"]["kafka"]["sasl"]["username"], "scaler");
    assert_eq!(data["metrics"]["lag"], 1500.0);
    assert_eq!(data["desired"]["replicas"], 2);
}

#[tokio::test]
async fn unknown_target_is_404() {
    let state = test_state();
    let (status, body) = get(&state, "/api/v1/targets/shop%2Fnope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("target not found"));
}

#[tokio::test]
async fn prometheus_endpoint() {
    let state = running_state().await;
    let (status, body) = get(&state, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("# TYPE kafka_lag gauge"));
    assert!(body.contains(
        "kafka_lag{namespaced_name=\"shop/orders\",topic=\"orders\",group=\"orders-consumer\"} 1500"
    ));
    assert!(body.contains("replicas{namespaced_name=\"shop/orders\""));
}

#[tokio::test]
async fn healthz() {
    let state = running_state().await;
    let (status, body) = get(&state, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["data"]["active_workers"], 1);
    assert_eq!(json["data"]["targets"], 1);
}
