//! HTTP listener.
//!
//! Serves the WebSocket endpoint on the configured path next to the REST
//! routes in [`crate::rest`]. Each WebSocket runs on its own task; every
//! inbound text frame is decoded and passed to the [`RequestHandler`] and
//! replies go back on the same socket.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, FromRef, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use inferlink_protocol::{decode, encode};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::RequestHandler;
use crate::rest::{self, HEALTH_PATH, INFERENCE_PREFIX, INFERENCE_ROUTE, MODELS_PATH};

#[derive(Clone)]
struct ServerState {
    handler: Arc<RequestHandler>,
    connections: Arc<Semaphore>,
}

impl FromRef<ServerState> for Arc<RequestHandler> {
    fn from_ref(state: &ServerState) -> Self {
        state.handler.clone()
    }
}

/// Inference server: WebSocket clients plus the REST routes.
pub struct WsServer {
    config: ServerConfig,
    listener: TcpListener,
    state: ServerState,
}

impl WsServer {
    /// Binds to the configured address.
    ///
    /// Port 0 picks a free port; see [`WsServer::local_addr`].
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        validate_ws_path(&config.ws_path)?;

        let listener = match TcpListener::bind(config.bind_addr).await {
            Ok(listener) => listener,
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                return Err(ServerError::addr_in_use(config.bind_addr.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, path = %config.ws_path, "Inference server listening");

        let state = ServerState {
            handler: Arc::new(RequestHandler::new(&config)),
            connections: Arc::new(Semaphore::new(config.max_connections)),
        };

        Ok(Self {
            config,
            listener,
            state,
        })
    }

    /// Returns the address the server is bound to.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns the `ws://` URL clients should connect to.
    pub fn endpoint(&self) -> ServerResult<String> {
        Ok(format!("ws://{}{}", self.local_addr()?, self.config.ws_path))
    }

    fn router(&self) -> Router {
        Router::new()
            .route(&self.config.ws_path, get(upgrade))
            .route(HEALTH_PATH, get(rest::health))
            .route(MODELS_PATH, get(rest::list_models))
            .route(INFERENCE_ROUTE, post(rest::inference))
            .with_state(self.state.clone())
    }

    /// Serves until the process exits.
    pub async fn run(self) -> ServerResult<()> {
        self.run_until_shutdown(std::future::pending()).await
    }

    /// Serves until `shutdown` completes.
    ///
    /// The listener closes first; open WebSockets are not drained.
    pub async fn run_until_shutdown<S>(self, shutdown: S) -> ServerResult<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("Shutdown signal received");
            })
            .await?;
        Ok(())
    }
}

/// Rejects paths the router cannot mount or that shadow a REST route.
fn validate_ws_path(path: &str) -> ServerResult<()> {
    let reserved =
        path == HEALTH_PATH || path == MODELS_PATH || path.starts_with(INFERENCE_PREFIX);
    if !path.starts_with('/') || path.contains([':', '*']) || reserved {
        return Err(ServerError::invalid_ws_path(path));
    }
    Ok(())
}

async fn upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<ServerState>,
) -> Response {
    let Ok(permit) = state.connections.clone().try_acquire_owned() else {
        warn!(peer = %peer, "Connection limit reached, refusing upgrade");
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };
    debug!(peer = %peer, "Accepted WebSocket connection");

    let handler = state.handler;
    ws.on_upgrade(move |socket| async move {
        match serve_socket(socket, &handler).await {
            Ok(()) => debug!(peer = %peer, "Connection closed"),
            Err(e) => warn!(peer = %peer, error = %e, "Connection ended with error"),
        }
        drop(permit);
    })
}

/// Serves frames until the peer goes away.
async fn serve_socket(socket: WebSocket, handler: &RequestHandler) -> ServerResult<()> {
    let (mut sink, mut frames) = socket.split();

    while let Some(frame) = frames.next().await {
        match frame? {
            Message::Text(text) => {
                let envelope = match decode(&text) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!(error = %e, "Dropping malformed frame");
                        continue;
                    }
                };
                if let Some(reply) = handler.handle(envelope) {
                    sink.send(Message::Text(encode(&reply)?)).await?;
                }
            }
            Message::Binary(data) => {
                debug!(len = data.len(), "Ignoring binary frame");
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use inferlink_core::ModelType;
    use inferlink_protocol::{Envelope, InferenceRequest, InferenceResponse};
    use serde_json::json;
    use tokio_tungstenite::tungstenite::{self, Message as Frame};

    async fn spawn_server(config: ServerConfig) -> SocketAddr {
        let server = WsServer::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        addr
    }

    fn loopback() -> ServerConfig {
        ServerConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)))
    }

    fn ws_url(addr: SocketAddr) -> String {
        format!("ws://{}/ws", addr)
    }

    async fn next_envelope<S>(frames: &mut S) -> Envelope
    where
        S: futures_util::Stream<Item = Result<Frame, tungstenite::Error>> + Unpin,
    {
        loop {
            match frames.next().await.unwrap().unwrap() {
                Frame::Text(text) => return decode(&text).unwrap(),
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn bind_reports_local_addr() {
        let server = WsServer::bind(loopback()).await.unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.endpoint().unwrap(), ws_url(addr));
    }

    #[tokio::test]
    async fn bind_rejects_address_in_use() {
        let first = WsServer::bind(loopback()).await.unwrap();
        let taken = first.local_addr().unwrap();
        let result = WsServer::bind(ServerConfig::new(taken)).await;
        assert!(matches!(result, Err(ServerError::AddrInUse { .. })));
    }

    #[tokio::test]
    async fn bind_rejects_unmountable_ws_paths() {
        for path in ["ws", "/health", "/api/models", "/api/inference/x", "/:id", "/*rest"] {
            let result = WsServer::bind(loopback().with_ws_path(path)).await;
            assert!(
                matches!(result, Err(ServerError::InvalidWsPath { .. })),
                "{path} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn inference_roundtrip_over_websocket() {
        let addr = spawn_server(loopback()).await;
        let (ws, _) = tokio_tungstenite::connect_async(ws_url(addr)).await.unwrap();
        let (mut sink, mut frames) = ws.split();

        let request = Envelope::InferenceRequest(
            InferenceRequest::from_value(
                ModelType::SensorFusion,
                json!({"sensor_data": {"lidar": true}, "timestamp": 1}),
            )
            .with_request_id("sensor_fusion_1_a"),
        );
        sink.send(Frame::Text(encode(&request).unwrap()))
            .await
            .unwrap();

        let Envelope::InferenceResponse(response) = next_envelope(&mut frames).await else {
            panic!("expected inference_response");
        };
        assert_eq!(response.model_type, ModelType::SensorFusion);
        assert_eq!(response.request_id.as_deref(), Some("sensor_fusion_1_a"));
        assert_eq!(response.prediction["fusion_quality"], "excellent");
    }

    #[tokio::test]
    async fn malformed_frames_do_not_close_the_socket() {
        let addr = spawn_server(loopback()).await;
        let (ws, _) = tokio_tungstenite::connect_async(ws_url(addr)).await.unwrap();
        let (mut sink, mut frames) = ws.split();

        sink.send(Frame::Text("{garbage".to_string())).await.unwrap();
        sink.send(Frame::Binary(vec![0, 1, 2])).await.unwrap();
        sink.send(Frame::Text(encode(&Envelope::heartbeat()).unwrap()))
            .await
            .unwrap();

        assert!(matches!(
            next_envelope(&mut frames).await,
            Envelope::Heartbeat(_)
        ));
    }

    #[tokio::test]
    async fn oversized_horizon_is_answered_with_error() {
        let addr = spawn_server(loopback()).await;
        let (ws, _) = tokio_tungstenite::connect_async(ws_url(addr)).await.unwrap();
        let (mut sink, mut frames) = ws.split();

        let request = Envelope::InferenceRequest(
            InferenceRequest::from_value(
                ModelType::TrajectoryPrediction,
                json!({
                    "history": [{"x": 0, "y": 0}, {"x": 1, "y": 1}],
                    "prediction_horizon": u64::MAX,
                }),
            )
            .with_request_id("trajectory_prediction_1_z"),
        );
        sink.send(Frame::Text(encode(&request).unwrap()))
            .await
            .unwrap();

        let Envelope::Error(error) = next_envelope(&mut frames).await else {
            panic!("expected error");
        };
        assert_eq!(error.request_id.as_deref(), Some("trajectory_prediction_1_z"));

        // The connection survives and keeps answering.
        sink.send(Frame::Text(encode(&Envelope::heartbeat()).unwrap()))
            .await
            .unwrap();
        assert!(matches!(
            next_envelope(&mut frames).await,
            Envelope::Heartbeat(_)
        ));
    }

    #[tokio::test]
    async fn unknown_path_is_refused() {
        let addr = spawn_server(loopback()).await;
        let result = tokio_tungstenite::connect_async(format!("ws://{}/other", addr)).await;
        match result {
            Err(tungstenite::Error::Http(resp)) => {
                assert_eq!(resp.status(), StatusCode::NOT_FOUND);
            }
            other => panic!("expected HTTP 404, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn connection_limit_refuses_extra_sockets() {
        let addr = spawn_server(loopback().with_max_connections(1)).await;
        let (_held, _) = tokio_tungstenite::connect_async(ws_url(addr)).await.unwrap();

        match tokio_tungstenite::connect_async(ws_url(addr)).await {
            Err(tungstenite::Error::Http(resp)) => {
                assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
            }
            other => panic!("expected HTTP 503, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn health_route() {
        let addr = spawn_server(loopback()).await;
        let resp = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.text().await.unwrap(), "inferlink server is running");
    }

    #[tokio::test]
    async fn models_route_lists_every_model() {
        let addr = spawn_server(loopback()).await;
        let models: Vec<ModelType> = reqwest::get(format!("http://{}/api/models", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(models, ModelType::ALL);
    }

    #[tokio::test]
    async fn rest_inference_roundtrip() {
        let addr = spawn_server(loopback()).await;
        let resp = reqwest::Client::new()
            .post(format!("http://{}/api/inference/trajectory", addr))
            .json(&json!({"history": [{"x": 0, "y": 0}, {"x": 1, "y": 1}], "prediction_horizon": 3}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let response: InferenceResponse = resp.json().await.unwrap();
        assert_eq!(response.model_type, ModelType::TrajectoryPrediction);
        assert_eq!(response.request_id, None);
        assert!(response.latency_ms.is_some());
        assert_eq!(response.prediction["predictions"][0]["x"], 2.0);
    }

    #[tokio::test]
    async fn rest_rejects_bad_requests() {
        let addr = spawn_server(loopback()).await;
        let client = reqwest::Client::new();
        let post = |route: &str, body: serde_json::Value| {
            client
                .post(format!("http://{}/api/inference/{}", addr, route))
                .json(&body)
                .send()
        };

        let unknown = post("teleport", json!({})).await.unwrap();
        assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
        assert!(unknown.text().await.unwrap().contains("Unknown model"));

        let mismatched = post("objects", json!({"nope": 1})).await.unwrap();
        assert_eq!(mismatched.status(), StatusCode::BAD_REQUEST);

        let huge = post(
            "trajectory",
            json!({"history": [{"x": 0, "y": 0}, {"x": 1, "y": 1}], "prediction_horizon": u64::MAX}),
        )
        .await
        .unwrap();
        assert_eq!(huge.status(), StatusCode::BAD_REQUEST);
        assert!(huge.text().await.unwrap().contains("prediction_horizon"));
    }

    #[tokio::test]
    async fn run_until_shutdown_returns() {
        let server = WsServer::bind(loopback()).await.unwrap();
        let result = server.run_until_shutdown(async {}).await;
        assert!(result.is_ok());
    }
}
