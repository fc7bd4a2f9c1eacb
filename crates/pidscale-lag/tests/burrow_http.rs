//! BurrowSampler against a local HTTP stand-in for Burrow.

use axum::Router;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;

use pidscale_autoscale::{LagError, LagSampler, LagSamplerFactory};
use pidscale_core::{
    ClusterRoute, KafkaSettings, SamplerConfig, SamplerKind, SaslMechanism, SaslSettings,
};
use pidscale_lag::BurrowSamplerFactory;

/// Serves two clusters: `main` with 42 messages of lag on `orders`, `eu`
/// with 7.
async fn consumer_lag(Path((cluster, group)): Path<(String, String)>) -> impl IntoResponse {
    let partition_lag = match cluster.as_str() {
        "main" => Some([40, 2]),
        "eu" => Some([7, 0]),
        _ => None,
    };
    let Some([p0, p1]) = partition_lag.filter(|_| group != "ghost") else {
        return (
            StatusCode::NOT_FOUND,
            r#"{"error":true,"message":"cluster or consumer not found"}"#.to_string(),
        );
    };
    let complete = if group == "rebalancing" { 0.5 } else { 1.0 };
    let body = format!(
        r#"{{"error":false,"message":"consumer status returned","status":{{
            "status":"OK","complete":{complete},"partitions":[
                {{"topic":"orders","partition":0,"current_lag":{p0}}},
                {{"topic":"orders","partition":1,"current_lag":{p1}}}
            ]}}}}"#
    );
    (StatusCode::OK, body)
}

async fn serve() -> String {
    let app = Router::new().route(
        "/burrow/v3/kafka/{cluster}/consumer/{group}/lag",
        get(consumer_lag),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/burrow")
}

fn factory(url: String, cluster: &str) -> BurrowSamplerFactory {
    BurrowSamplerFactory::new(&SamplerConfig {
        kind: SamplerKind::Burrow,
        url,
        cluster: Some(cluster.to_string()),
        sasl: None,
        clusters: Vec::new(),
        timeout_ms: 2000,
    })
    .unwrap()
}

/// `main` by default, `eu` for the European brokers over SCRAM-SHA-512.
fn routed_factory(url: String) -> BurrowSamplerFactory {
    BurrowSamplerFactory::new(&SamplerConfig {
        kind: SamplerKind::Burrow,
        url,
        cluster: Some("main".to_string()),
        sasl: None,
        clusters: vec![ClusterRoute {
            name: "eu".to_string(),
            brokers: vec!["kafka-eu-0:9092".to_string(), "kafka-eu-1:9092".to_string()],
            sasl: Some(SaslMechanism::ScramSha512),
        }],
        timeout_ms: 2000,
    })
    .unwrap()
}

fn kafka(group: &str) -> KafkaSettings {
    KafkaSettings {
        brokers: vec!["kafka:9092".to_string()],
        topic: "orders".to_string(),
        group: group.to_string(),
        sasl: None,
    }
}

#[tokio::test]
async fn reads_topic_lag() {
    let url = serve().await;
    let sampler = factory(url, "main").build(&kafka("orders-consumer")).unwrap();

    assert_eq!(sampler.current_lag("orders-consumer", "orders").await, Ok(42));
    assert_eq!(
        sampler.current_lag("orders-consumer", "payments").await,
        Err(LagError::TopicNotFound)
    );
}

#[tokio::test]
async fn maps_burrow_states() {
    let url = serve().await;
    let sampler = factory(url.clone(), "main").build(&kafka("x")).unwrap();

    assert_eq!(
        sampler.current_lag("ghost", "orders").await,
        Err(LagError::GroupNotFound)
    );
    assert_eq!(
        sampler.current_lag("rebalancing", "orders").await,
        Err(LagError::GroupNotStable)
    );

    let other = factory(url, "other").build(&kafka("x")).unwrap();
    assert_eq!(
        other.current_lag("orders-consumer", "orders").await,
        Err(LagError::GroupNotFound)
    );
}

#[test]
fn empty_group_fails_build() {
    let f = factory("http://127.0.0.1:1".to_string(), "main");
    assert!(matches!(f.build(&kafka("")), Err(LagError::Query(_))));
}

#[tokio::test]
async fn targets_on_different_brokers_read_their_own_cluster() {
    let url = serve().await;
    let samplers = routed_factory(url);

    let us = samplers.build(&kafka("orders-consumer")).unwrap();
    assert_eq!(us.current_lag("orders-consumer", "orders").await, Ok(42));

    let eu_settings = KafkaSettings {
        brokers: vec!["kafka-eu-1:9092".to_string()],
        sasl: Some(SaslSettings {
            mechanism: SaslMechanism::ScramSha512,
            username: "svc".to_string(),
            password: "secret".to_string(),
        }),
        ..kafka("orders-consumer")
    };
    let eu = samplers.build(&eu_settings).unwrap();
    assert_eq!(eu.current_lag("orders-consumer", "orders").await, Ok(7));
}

#[test]
fn sasl_mismatch_fails_build() {
    let samplers = routed_factory("http://127.0.0.1:1".to_string());
    let plain_eu = KafkaSettings {
        brokers: vec!["kafka-eu-0:9092".to_string()],
        ..kafka("orders-consumer")
    };
    assert!(matches!(samplers.build(&plain_eu), Err(LagError::Query(_))));
}
