//! Client against the reference server over loopback.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use serde_json::json;

use inferlink_client::config::{ConnectionSettings, ReconnectPolicy, parse_endpoint};
use inferlink_client::{ClientError, ConnectionState, InferenceClient};
use inferlink_core::{
    FusionQuality, ModelType, ObjectDetectionInput, SensorReading, TrajectoryInput,
    TrajectoryPoint,
};
use inferlink_server::{ServerConfig, WsServer};

async fn start_server(echo_request_id: bool) -> String {
    let config = ServerConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)))
        .with_echo_request_id(echo_request_id);
    let server = WsServer::bind(config).await.unwrap();
    let endpoint = server.endpoint().unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    endpoint
}

fn settings(endpoint: &str) -> ConnectionSettings {
    ConnectionSettings::new(parse_endpoint(endpoint).unwrap())
        .with_request_timeout(Duration::from_secs(5))
        .with_heartbeat_interval(None)
}

#[tokio::test]
async fn every_model_over_websocket() {
    let endpoint = start_server(true).await;
    let client = InferenceClient::new(settings(&endpoint));
    client.connect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    let (trajectory, anomaly, objects, fusion) = tokio::join!(
        client.predict_trajectory(
            TrajectoryInput::new(vec![
                TrajectoryPoint::new(0.0, 0.0),
                TrajectoryPoint::new(1.0, 1.0),
            ])
            .with_horizon(5)
        ),
        client.detect_anomaly(vec![SensorReading::new("lidar", vec![2.0, 2.0, 2.0])]),
        client.detect_objects(ObjectDetectionInput::new("frame-1")),
        client.fuse_sensors(BTreeMap::from([
            ("lidar".to_string(), true),
            ("camera".to_string(), true),
            ("radar".to_string(), true),
        ])),
    );

    let trajectory = trajectory.unwrap();
    assert_eq!(trajectory.predictions.len(), 5);
    assert_eq!(trajectory.predictions[0], TrajectoryPoint::new(2.0, 2.0));

    let anomaly = anomaly.unwrap();
    assert!(!anomaly.is_anomaly);

    let objects = objects.unwrap();
    assert_eq!(objects.frame_id, "frame-1");
    assert!(!objects.objects.is_empty());

    let fusion = fusion.unwrap();
    assert_eq!(fusion.fusion_quality, FusionQuality::Excellent);

    assert_eq!(client.pending_requests(), 0);
    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn same_model_requests_get_their_own_answers() {
    let endpoint = start_server(true).await;
    let client = InferenceClient::new(settings(&endpoint));
    client.connect().await.unwrap();

    let (a, b) = tokio::join!(
        client.detect_objects(ObjectDetectionInput::new("frame-a")),
        client.detect_objects(ObjectDetectionInput::new("frame-b")),
    );
    assert_eq!(a.unwrap().frame_id, "frame-a");
    assert_eq!(b.unwrap().frame_id, "frame-b");
}

#[tokio::test]
async fn legacy_server_resolves_in_send_order() {
    let endpoint = start_server(false).await;
    let client = InferenceClient::new(settings(&endpoint));
    client.connect().await.unwrap();

    let (flat, noisy) = tokio::join!(
        client.detect_anomaly(vec![SensorReading::new("lidar", vec![1.0, 1.0, 1.0])]),
        client.detect_anomaly(vec![SensorReading::new("radar", vec![0.1, 10.0, 0.1, 10.0])]),
    );

    // Without echoed ids the oldest pending request takes the first answer.
    // The server answers in order, so each caller still gets its own.
    assert_eq!(flat.unwrap().sensor_scores[0].0, "lidar");
    assert_eq!(noisy.unwrap().sensor_scores[0].0, "radar");
}

#[tokio::test]
async fn mismatched_data_reports_server_error() {
    let endpoint = start_server(true).await;
    let client = InferenceClient::new(settings(&endpoint));
    client.connect().await.unwrap();

    let result = client
        .request(ModelType::ObjectDetection, json!({"nope": 1}))
        .await;
    assert!(matches!(result, Err(ClientError::Server(_))));
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn subscribers_see_server_responses() {
    let endpoint = start_server(true).await;
    let client = InferenceClient::new(settings(&endpoint));
    client.connect().await.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    client.subscribe(ModelType::SensorFusion, move |response| {
        let _ = tx.send(response.request_id.clone());
    });

    client
        .fuse_sensors(BTreeMap::from([("lidar".to_string(), false)]))
        .await
        .unwrap();

    let seen = rx.recv().await.unwrap();
    assert!(seen.unwrap().starts_with("sensor_fusion_"));
}

#[tokio::test]
async fn connect_to_closed_port_fails() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let settings = settings(&format!("ws://{}/ws", addr))
        .with_reconnect(ReconnectPolicy::new(Duration::from_millis(10), 0));
    let client = InferenceClient::new(settings);

    let result = client.connect().await;
    assert!(matches!(result, Err(ClientError::Connect(_))));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn unknown_path_is_a_connect_error() {
    let endpoint = start_server(true).await;
    let wrong = endpoint.replace("/ws", "/nope");
    let settings = settings(&wrong).with_reconnect(ReconnectPolicy::new(Duration::from_millis(10), 0));
    let client = InferenceClient::new(settings);

    assert!(matches!(client.connect().await, Err(ClientError::Connect(_))));
}
