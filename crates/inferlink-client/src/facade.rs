//! Inference façade.
//!
//! [`InferenceClient`] is the entry point for applications: one typed call
//! per model, each of which registers a pending request, sends it and waits
//! for the correlated response.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use inferlink_core::{
    AnomalyInput, AnomalyReport, FusionInput, FusionReport, ModelType, ObjectDetectionInput,
    ObjectDetections, SensorReading, TrajectoryInput, TrajectoryPrediction,
};
use inferlink_protocol::{Envelope, InferenceRequest, InferenceResponse, ProtocolError};

use crate::config::ConnectionSettings;
use crate::connection::ConnectionHandle;
use crate::correlator::{Correlator, SubscriptionId};
use crate::error::{ClientError, ClientResult};
use crate::state::ConnectionState;
use crate::transport::{Connector, WsConnector};

/// Client for a remote inference server.
///
/// Must be created inside a tokio runtime. Dropping it closes the connection
/// and fails any request still waiting.
#[derive(Debug)]
pub struct InferenceClient {
    connection: ConnectionHandle,
    correlator: Arc<Correlator>,
    settings: ConnectionSettings,
}

impl InferenceClient {
    /// Creates a client that talks WebSocket to `settings.endpoint`.
    ///
    /// Nothing is opened until [`InferenceClient::connect`].
    pub fn new(settings: ConnectionSettings) -> Self {
        let connector = WsConnector::new(settings.endpoint.clone(), settings.connect_timeout);
        Self::with_connector(Arc::new(connector), settings)
    }

    /// Creates a client over a custom transport.
    pub fn with_connector(connector: Arc<dyn Connector>, settings: ConnectionSettings) -> Self {
        let correlator = Arc::new(Correlator::new(settings.request_timeout));
        let connection = ConnectionHandle::spawn(connector, &settings, Arc::clone(&correlator));
        Self {
            connection,
            correlator,
            settings,
        }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Returns the underlying connection handle.
    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    pub async fn connect(&self) -> ClientResult<()> {
        self.connection.connect().await
    }

    pub async fn disconnect(&self) {
        self.connection.disconnect().await
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Number of requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.correlator.pending_count()
    }

    /// Sends a raw inference request and waits for its response.
    ///
    /// A request that cannot be sent because the connection is down is not
    /// failed immediately; it runs into its timeout instead.
    pub async fn request(
        &self,
        model_type: ModelType,
        data: Value,
    ) -> ClientResult<InferenceResponse> {
        let pending = self.correlator.register(model_type);
        let request =
            InferenceRequest::from_value(model_type, data).with_request_id(pending.request_id());

        match self
            .connection
            .send(&Envelope::InferenceRequest(request))
            .await
        {
            Ok(()) => {
                debug!(request_id = %pending.request_id(), model = %model_type, "Request sent")
            }
            Err(ClientError::SendFailure(reason)) => {
                warn!(
                    request_id = %pending.request_id(),
                    model = %model_type,
                    reason = %reason,
                    "Request not sent"
                );
            }
            Err(other) => return Err(other),
        }

        pending.wait().await
    }

    async fn request_typed<I, O>(&self, model_type: ModelType, input: &I) -> ClientResult<O>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        let data = serde_json::to_value(input).map_err(ProtocolError::Encode)?;
        let response = self.request(model_type, data).await?;
        response
            .decode_prediction()
            .map_err(|e| ClientError::UnexpectedPrediction(e.to_string()))
    }

    /// Predicts future positions from a position history.
    pub async fn predict_trajectory(
        &self,
        input: TrajectoryInput,
    ) -> ClientResult<TrajectoryPrediction> {
        self.request_typed(ModelType::TrajectoryPrediction, &input)
            .await
    }

    /// Scores sensor readings for anomalies.
    pub async fn detect_anomaly(
        &self,
        sensor_readings: Vec<SensorReading>,
    ) -> ClientResult<AnomalyReport> {
        self.request_typed(ModelType::AnomalyDetection, &AnomalyInput { sensor_readings })
            .await
    }

    /// Detects objects in a frame.
    pub async fn detect_objects(
        &self,
        input: ObjectDetectionInput,
    ) -> ClientResult<ObjectDetections> {
        self.request_typed(ModelType::ObjectDetection, &input).await
    }

    /// Fuses sensor liveness into an overall confidence.
    pub async fn fuse_sensors(
        &self,
        sensor_data: BTreeMap<String, bool>,
    ) -> ClientResult<FusionReport> {
        self.request_typed(ModelType::SensorFusion, &FusionInput::new(sensor_data))
            .await
    }

    /// Calls `handler` with every response of `model_type`, including ones
    /// that match no pending request.
    pub fn subscribe<F>(&self, model_type: ModelType, handler: F) -> SubscriptionId
    where
        F: Fn(&InferenceResponse) + Send + Sync + 'static,
    {
        self.correlator.subscribe(model_type, Arc::new(handler))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.correlator.unsubscribe(id)
    }
}
