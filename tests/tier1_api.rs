//! Integration tests for the Tier1 API over a real socket
//!
//! Each test binds the broker to an ephemeral port, registers cloudlets
//! through heartbeats and asks for matches the way a client would.

use std::net::SocketAddr;

use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use uuid::Uuid;

use cloudlet_broker::cluster::CloudletRegistry;
use cloudlet_broker::config::{parse_config, resolve_pipelines, BrokerConfig};
use cloudlet_broker::matcher::StageRegistry;
use cloudlet_broker::server::{self, AppState};

struct TestBroker {
    addr: SocketAddr,
    registry: CloudletRegistry,
    stop: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl TestBroker {
    async fn start(config: BrokerConfig) -> Self {
        let pipelines = resolve_pipelines(&config, &StageRegistry::with_builtins())
            .expect("pipelines should resolve");
        let registry = CloudletRegistry::new();
        let state = AppState::new(registry.clone(), pipelines, config.max_results);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to address");
        let addr = listener.local_addr().expect("Failed to get local address");

        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(server::serve(listener, state, async move {
            let _ = stopped.await;
        }));

        Self {
            addr,
            registry,
            stop: Some(stop),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn heartbeat(&self, body: Value) -> reqwest::StatusCode {
        reqwest::Client::new()
            .post(self.url("/api/v1/cloudlets/"))
            .json(&body)
            .send()
            .await
            .expect("heartbeat request")
            .status()
    }

    async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.handle
            .await
            .expect("server task")
            .expect("server exited cleanly");
    }
}

fn heartbeat(uuid: Uuid, name: &str, extra: Value) -> Value {
    let mut body = json!({
        "uuid": uuid,
        "name": name,
        "endpoint": format!("http://{}.edge:5000/api/v1/deploy", name),
        "resources": {"cpu_avail": 8.0, "mem_avail": 8.0e9},
    });
    if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            body.insert(k.clone(), v.clone());
        }
    }
    body
}

fn names(matches: &Value) -> Vec<String> {
    matches
        .as_array()
        .expect("match response is a list")
        .iter()
        .map(|c| c["name"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn test_heartbeat_then_list() {
    let broker = TestBroker::start(BrokerConfig::default()).await;
    let uuid = Uuid::new_v4();

    let status = broker.heartbeat(heartbeat(uuid, "edge-a", json!({}))).await;
    assert_eq!(status, reqwest::StatusCode::NO_CONTENT);
    assert_eq!(broker.registry.len().await, 1);

    let listed: Value = reqwest::get(broker.url("/api/v1/cloudlets/"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed[0]["uuid"], json!(uuid));
    assert_eq!(listed[0]["name"], "edge-a");
    assert!(listed[0]["lastUpdate"].is_string());

    broker.shutdown().await;
}

#[tokio::test]
async fn test_repeated_heartbeat_updates_in_place() {
    let broker = TestBroker::start(BrokerConfig::default()).await;
    let uuid = Uuid::new_v4();

    broker.heartbeat(heartbeat(uuid, "edge-a", json!({}))).await;
    broker
        .heartbeat(heartbeat(
            uuid,
            "edge-a",
            json!({"resources": {"cpu_avail": 2.0, "cpu_used": 1.5}}),
        ))
        .await;

    assert_eq!(broker.registry.len().await, 1);
    let cloudlet = broker.registry.get(&uuid).await.unwrap();
    assert_eq!(cloudlet.resources.cpu_avail, 2.0);
    assert_eq!(cloudlet.resources.cpu_used, 1.5);
    // resources are replaced wholesale
    assert_eq!(cloudlet.resources.mem_avail, 0.0);

    broker.shutdown().await;
}

#[tokio::test]
async fn test_invalid_heartbeat_rejected() {
    let broker = TestBroker::start(BrokerConfig::default()).await;

    let status = broker.heartbeat(json!({"endpoint": "http://x"})).await;
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
    assert!(broker.registry.is_empty().await);

    broker.shutdown().await;
}

#[tokio::test]
async fn test_match_prefers_local_network_then_distance() {
    let broker = TestBroker::start(BrokerConfig::default()).await;

    // Pittsburgh client, one cloudlet on its LAN, one nearby, one far away
    broker
        .heartbeat(heartbeat(
            Uuid::new_v4(),
            "far",
            json!({"location": {"latitude": 37.77, "longitude": -122.42}}),
        ))
        .await;
    broker
        .heartbeat(heartbeat(
            Uuid::new_v4(),
            "near",
            json!({"location": {"latitude": 40.0, "longitude": -80.0}}),
        ))
        .await;
    broker
        .heartbeat(heartbeat(
            Uuid::new_v4(),
            "lan",
            json!({"local_networks": ["10.1.0.0/16"]}),
        ))
        .await;

    let request = json!({
        "client": {
            "publickey": "client-key",
            "ipaddress": "10.1.2.3",
            "location": {"latitude": 40.44, "longitude": -79.94},
        },
        "recipe": {"name": "openrtist", "version": "1.0"},
        "results": 3,
    });
    let response = reqwest::Client::new()
        .post(broker.url("/api/v1/match"))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let matches: Value = response.json().await.unwrap();

    assert_eq!(names(&matches), vec!["lan", "near", "far"]);

    broker.shutdown().await;
}

#[tokio::test]
async fn test_match_uses_client_ip_header() {
    let broker = TestBroker::start(BrokerConfig::default()).await;
    broker
        .heartbeat(heartbeat(
            Uuid::new_v4(),
            "blocked",
            json!({"rejected_clients": ["192.168.0.0/16"]}),
        ))
        .await;

    let response = reqwest::Client::new()
        .post(broker.url("/api/v1/match"))
        .header("X-ClientIP", "192.168.1.20")
        .json(&json!({"recipe": {"name": "openrtist", "version": "1.0"}}))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let matches: Value = response.json().await.unwrap();

    assert!(names(&matches).is_empty());

    broker.shutdown().await;
}

#[tokio::test]
async fn test_match_falls_back_to_connection_peer() {
    let broker = TestBroker::start(BrokerConfig::default()).await;
    broker
        .heartbeat(heartbeat(
            Uuid::new_v4(),
            "remote-only",
            json!({"accepted_clients": ["203.0.113.0/24"]}),
        ))
        .await;
    broker
        .heartbeat(heartbeat(
            Uuid::new_v4(),
            "loopback",
            json!({"local_networks": ["127.0.0.0/8"]}),
        ))
        .await;

    let response = reqwest::Client::new()
        .post(broker.url("/api/v1/match"))
        .json(&json!({
            "client": {"publickey": "client-key"},
            "recipe": {"name": "openrtist", "version": "1.0"},
            "results": 3,
        }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let matches: Value = response.json().await.unwrap();

    assert_eq!(names(&matches), vec!["loopback"]);

    broker.shutdown().await;
}

#[tokio::test]
async fn test_resource_class_reports_no_eligible_cloudlet() {
    let config = parse_config(
        r#"
matchers:
  default: [network, location, random]
  heavy: [network, resource-rank-cpu]
"#,
    )
    .unwrap();
    let broker = TestBroker::start(config).await;
    broker
        .heartbeat(heartbeat(Uuid::new_v4(), "small", json!({})))
        .await;

    let request = json!({
        "client": {
            "publickey": "client-key",
            "ipaddress": "10.1.2.3",
            "resourceReqs": {"cpu": 64.0},
        },
        "recipe": {"name": "openrtist", "version": "1.0"},
        "class": "heavy",
    });
    let response = reqwest::Client::new()
        .post(broker.url("/api/v1/match"))
        .json(&request)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("resource-rank-cpu"));

    broker.shutdown().await;
}

#[tokio::test]
async fn test_list_matchers() {
    let broker = TestBroker::start(BrokerConfig::default()).await;

    let matchers: Value = reqwest::get(broker.url("/api/v1/matchers"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(matchers[0]["class"], "default");
    assert_eq!(
        matchers[0]["stages"],
        json!(["network", "location", "random"])
    );

    broker.shutdown().await;
}
