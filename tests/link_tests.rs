//! Device-link integration tests against a mocked station.

use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use windrose::link::{lease, poller};
use windrose::station::data::DataSource;
use windrose::{Broadcaster, DeviceHandle, LinkConfig, Supervisor};

fn handle_for(server: &MockServer) -> DeviceHandle {
    let addr = server.address();
    DeviceHandle {
        name: "weatherlink-test".to_string(),
        address: addr.ip().to_string(),
        port: addr.port(),
    }
}

fn test_supervisor(broadcaster: Broadcaster) -> std::sync::Arc<Supervisor> {
    let config = LinkConfig::default()
        .with_poll_interval(Duration::from_millis(50))
        .with_realtime(Duration::from_secs(10), Duration::from_secs(5));
    Supervisor::new(config, broadcaster).expect("Should build supervisor")
}

#[tokio::test]
async fn test_lease_activation_wrapped_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/real_time"))
        .and(query_param("duration", "3600"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"broadcast_port": 22222, "duration": 3600},
            "error": null
        })))
        .mount(&server)
        .await;

    let client = reqwest::Client::new();
    let port = lease::activate(&client, &handle_for(&server), Duration::from_secs(3600))
        .await
        .expect("Should activate lease");
    assert_eq!(port, 22222);
}

#[tokio::test]
async fn test_lease_activation_bare_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/real_time"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"broadcast_port": 22223})),
        )
        .mount(&server)
        .await;

    let client = reqwest::Client::new();
    let port = lease::activate(&client, &handle_for(&server), Duration::from_secs(3600))
        .await
        .expect("Should activate lease");
    assert_eq!(port, 22223);
}

#[tokio::test]
async fn test_lease_activation_missing_port_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/real_time"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
        .mount(&server)
        .await;

    let client = reqwest::Client::new();
    let result = lease::activate(&client, &handle_for(&server), Duration::from_secs(3600)).await;
    assert!(result.is_err());
    assert!(format!("{}", result.unwrap_err()).contains("broadcast_port"));
}

#[tokio::test]
async fn test_poll_fetch_and_http_ingestion() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/current_conditions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "did": "001D0A710B77",
                "ts": 1700000000,
                "conditions": [{
                    "lsid": 48308,
                    "rain_size": 1,
                    "rain_24_hr": 14,
                    "wind_speed_last": 3
                }]
            },
            "error": null
        })))
        .mount(&server)
        .await;

    let broadcaster = Broadcaster::new(8);
    let mut rx = broadcaster.subscribe();
    let supervisor = test_supervisor(broadcaster);
    let handle = handle_for(&server);

    let client = reqwest::Client::new();
    let reading = poller::fetch_conditions(&client, &handle)
        .await
        .expect("Should fetch conditions");
    assert_eq!(reading.did.as_deref(), Some("001D0A710B77"));

    let generation = supervisor.state().generation();
    assert!(supervisor.ingest_http(generation, &handle, reading).await);

    // Rain counts converted at ingestion, before the snapshot is stored
    let base = supervisor.state().base.read().await.clone().unwrap();
    assert_eq!(base.conditions[0].number("rain_24_hr"), Some(0.14));

    let envelope = rx.recv().await.expect("Should publish merged state");
    assert_eq!(envelope.data_source, DataSource::Http);
    assert_eq!(envelope.source, handle.http_source());
    assert_eq!(envelope.data.conditions[0].number("rain_24_hr"), Some(0.14));
}

#[tokio::test]
async fn test_stale_generation_is_ignored() {
    let broadcaster = Broadcaster::new(8);
    let supervisor = test_supervisor(broadcaster);
    let handle = DeviceHandle {
        name: "weatherlink-test".to_string(),
        address: "192.0.2.1".to_string(),
        port: 80,
    };

    let generation = supervisor.state().generation();
    supervisor.on_device_lost().await;

    let reading =
        serde_json::from_value(json!({"conditions": [{"wind_speed_last": 5}]})).unwrap();
    assert!(!supervisor.ingest_http(generation, &handle, reading).await);
    assert!(supervisor.state().base.read().await.is_none());

    assert!(!supervisor.store_lease(generation, 22222).await);
    assert!(supervisor.state().lease.read().await.is_none());

    // The current generation is still accepted
    let generation = supervisor.state().generation();
    let reading =
        serde_json::from_value(json!({"conditions": [{"wind_speed_last": 5}]})).unwrap();
    assert!(supervisor.ingest_http(generation, &handle, reading).await);
    assert!(supervisor.state().base.read().await.is_some());
}

#[tokio::test]
async fn test_stale_udp_datagram_is_ignored_after_device_loss() {
    let broadcaster = Broadcaster::new(8);
    let mut rx = broadcaster.subscribe();
    let supervisor = test_supervisor(broadcaster);
    let peer: std::net::SocketAddr = "127.0.0.1:49612".parse().unwrap();

    // A datagram received before the loss completes its ingestion after it.
    let generation = supervisor.state().generation();
    supervisor.on_device_lost().await;

    let reading =
        serde_json::from_value(json!({"conditions": [{"wind_speed_last": 5.2}]})).unwrap();
    assert!(!supervisor.ingest_udp(generation, reading, peer).await);
    assert!(
        supervisor.state().overlay.read().await.is_none(),
        "stale datagram must not repopulate the overlay"
    );
    let nothing = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(nothing.is_err(), "stale datagram must not publish");

    // The current generation is still accepted
    let generation = supervisor.state().generation();
    let reading =
        serde_json::from_value(json!({"conditions": [{"wind_speed_last": 5.2}]})).unwrap();
    assert!(supervisor.ingest_udp(generation, reading, peer).await);
    assert!(supervisor.state().overlay.read().await.is_some());
    let envelope = rx.recv().await.expect("Should publish merged state");
    assert_eq!(envelope.data_source, DataSource::Udp);
}

#[tokio::test]
async fn test_device_loss_clears_all_state() {
    let broadcaster = Broadcaster::new(8);
    let supervisor = test_supervisor(broadcaster);
    let handle = DeviceHandle {
        name: "weatherlink-test".to_string(),
        address: "192.0.2.1".to_string(),
        port: 80,
    };

    let generation = supervisor.state().generation();
    *supervisor.state().device.write().await = Some(handle.clone());
    assert!(supervisor.store_lease(generation, 22222).await);
    let reading =
        serde_json::from_value(json!({"conditions": [{"wind_speed_last": 5}]})).unwrap();
    assert!(supervisor.ingest_http(generation, &handle, reading).await);

    supervisor.on_device_lost().await;

    let state = supervisor.state();
    assert!(state.device.read().await.is_none());
    assert!(state.lease.read().await.is_none());
    assert!(state.base.read().await.is_none());
    assert!(state.overlay.read().await.is_none());
    assert_eq!(state.generation(), generation + 1);
}

fn free_udp_port() -> u16 {
    let probe = std::net::UdpSocket::bind("127.0.0.1:0").expect("Should bind probe socket");
    probe.local_addr().expect("Should read local addr").port()
}

async fn send_datagram(port: u16, payload: &serde_json::Value) {
    let sender = tokio::net::UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("Should bind sender socket");
    sender
        .send_to(payload.to_string().as_bytes(), ("127.0.0.1", port))
        .await
        .expect("Should send datagram");
}

#[tokio::test]
async fn test_udp_listener_follows_port_instructions() {
    let broadcaster = Broadcaster::new(8);
    let mut rx = broadcaster.subscribe();
    let supervisor = test_supervisor(broadcaster);
    std::sync::Arc::clone(&supervisor).spawn_udp_listener();

    let port_a = free_udp_port();
    supervisor.set_udp_port(Some(port_a));
    tokio::time::sleep(Duration::from_millis(200)).await;

    let payload = json!({"did": "001D0A710B77", "conditions": [{"wind_speed_last": 5.2}]});
    send_datagram(port_a, &payload).await;

    let envelope = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("Should receive within timeout")
        .expect("Should receive envelope");
    assert_eq!(envelope.data_source, DataSource::Udp);
    assert_eq!(envelope.data.conditions[0].number("wind_speed_last"), Some(5.2));

    // Rebind to a new port; the old one must go silent
    let port_b = free_udp_port();
    supervisor.set_udp_port(Some(port_b));
    tokio::time::sleep(Duration::from_millis(200)).await;

    send_datagram(port_a, &payload).await;
    let stale = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
    assert!(stale.is_err(), "datagram to the released port must be dropped");

    send_datagram(port_b, &payload).await;
    let envelope = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("Should receive within timeout")
        .expect("Should receive envelope");
    assert_eq!(envelope.data_source, DataSource::Udp);
}

#[tokio::test]
async fn test_malformed_datagram_leaves_overlay_untouched() {
    let broadcaster = Broadcaster::new(8);
    let mut rx = broadcaster.subscribe();
    let supervisor = test_supervisor(broadcaster);
    std::sync::Arc::clone(&supervisor).spawn_udp_listener();

    let port = free_udp_port();
    supervisor.set_udp_port(Some(port));
    tokio::time::sleep(Duration::from_millis(200)).await;

    let sender = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender
        .send_to(b"not json at all", ("127.0.0.1", port))
        .await
        .unwrap();

    let nothing = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
    assert!(nothing.is_err(), "malformed payload must not publish");
    assert!(supervisor.state().overlay.read().await.is_none());
}
