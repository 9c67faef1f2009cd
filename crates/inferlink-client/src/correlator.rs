//! Request correlation.
//!
//! Each outgoing request is registered under a fresh id and completes when
//! the matching response arrives, when its deadline passes, or when the
//! connection goes away.
//!
//! Matching:
//! - a response that echoes a `request_id` completes exactly that request;
//!   if the id is no longer pending the response is dropped.
//! - a response without an id completes the oldest pending request of the
//!   same model type. Two concurrent requests of one type can therefore
//!   receive each other's answers when the server does not echo ids.
//!
//! Subscribers see every response of their model type, matched or not.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use inferlink_core::{ModelType, now_millis};
use inferlink_protocol::{ErrorPayload, InferenceResponse};

use crate::error::{ClientError, ClientResult};

/// Callback invoked for every response of a model type.
pub type Subscriber = Arc<dyn Fn(&InferenceResponse) + Send + Sync>;

/// Handle returned by [`Correlator::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Completion = oneshot::Sender<ClientResult<InferenceResponse>>;

struct PendingEntry {
    request_id: String,
    model_type: ModelType,
    created_at: Instant,
    tx: Completion,
}

#[derive(Default)]
struct Inner {
    /// Insertion order is the fallback match order.
    pending: Vec<PendingEntry>,
    subscribers: HashMap<ModelType, Vec<(SubscriptionId, Subscriber)>>,
    next_subscription: u64,
}

impl Inner {
    fn take(&mut self, request_id: &str) -> Option<PendingEntry> {
        let pos = self.pending.iter().position(|e| e.request_id == request_id)?;
        Some(self.pending.remove(pos))
    }

    fn take_oldest(&mut self, model_type: ModelType) -> Option<PendingEntry> {
        let pos = self.pending.iter().position(|e| e.model_type == model_type)?;
        Some(self.pending.remove(pos))
    }
}

/// Tracks pending requests and response subscribers.
pub struct Correlator {
    inner: Mutex<Inner>,
    request_timeout: Duration,
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("pending", &self.pending_count())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Correlator {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            request_timeout,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a request and returns its id and completion handle.
    ///
    /// The deadline starts now.
    pub fn register(self: &Arc<Self>, model_type: ModelType) -> PendingResponse {
        let request_id = format!("{}_{}_{}", model_type, now_millis(), Uuid::new_v4().simple());
        let (tx, rx) = oneshot::channel();
        let created_at = Instant::now();

        self.lock().pending.push(PendingEntry {
            request_id: request_id.clone(),
            model_type,
            created_at,
            tx,
        });
        debug!(request_id = %request_id, model = %model_type, "Registered request");

        PendingResponse {
            request_id,
            model_type,
            deadline: created_at + self.request_timeout,
            rx,
            correlator: Arc::clone(self),
        }
    }

    /// Routes an inbound response. Returns true if it completed a request.
    pub fn resolve(&self, response: InferenceResponse) -> bool {
        let subscribers: Vec<Subscriber> = self
            .lock()
            .subscribers
            .get(&response.model_type)
            .map(|subs| subs.iter().map(|(_, s)| Arc::clone(s)).collect())
            .unwrap_or_default();
        for subscriber in &subscribers {
            subscriber(&response);
        }

        let mut inner = self.lock();
        let entry = match response.request_id.as_deref() {
            Some(id) => inner.take(id),
            None => inner.take_oldest(response.model_type),
        };

        match entry {
            Some(entry) => {
                debug!(
                    request_id = %entry.request_id,
                    model = %entry.model_type,
                    elapsed_ms = entry.created_at.elapsed().as_millis() as u64,
                    "Response matched"
                );
                // Completed under the lock so a concurrent timeout always
                // finds either the entry or the value.
                let _ = entry.tx.send(Ok(response));
                true
            }
            None => {
                debug!(
                    model = %response.model_type,
                    request_id = ?response.request_id,
                    "Dropping unmatched response"
                );
                false
            }
        }
    }

    /// Routes an inbound error envelope. Returns true if it failed a request.
    pub fn reject(&self, error: &ErrorPayload) -> bool {
        let entry = error
            .request_id
            .as_deref()
            .and_then(|id| self.lock().take(id));

        match entry {
            Some(entry) => {
                debug!(request_id = %entry.request_id, error = %error, "Request failed on server");
                let _ = entry.tx.send(Err(ClientError::Server(error.to_string())));
                true
            }
            None => {
                warn!(error = %error, request_id = ?error.request_id, "Server error");
                false
            }
        }
    }

    /// Fails every pending request with `DisconnectedWhilePending`.
    pub fn fail_all(&self) -> usize {
        let drained: Vec<PendingEntry> = self.lock().pending.drain(..).collect();
        let count = drained.len();
        for entry in drained {
            let _ = entry.tx.send(Err(ClientError::DisconnectedWhilePending {
                request_id: entry.request_id,
            }));
        }
        if count > 0 {
            debug!(count, "Failed pending requests");
        }
        count
    }

    /// Removes a pending request without completing it.
    fn cancel(&self, request_id: &str) -> bool {
        self.lock().take(request_id).is_some()
    }

    /// Adds a subscriber for every response of `model_type`.
    pub fn subscribe(&self, model_type: ModelType, subscriber: Subscriber) -> SubscriptionId {
        let mut inner = self.lock();
        let id = SubscriptionId(inner.next_subscription);
        inner.next_subscription += 1;
        inner
            .subscribers
            .entry(model_type)
            .or_default()
            .push((id, subscriber));
        id
    }

    /// Removes exactly one subscriber. Returns false if it was not found.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        for subs in inner.subscribers.values_mut() {
            if let Some(pos) = subs.iter().position(|(sid, _)| *sid == id) {
                subs.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_pending(&self, request_id: &str) -> bool {
        self.lock().pending.iter().any(|e| e.request_id == request_id)
    }
}

/// Completion handle for one registered request.
///
/// Dropping it before completion forgets the request.
pub struct PendingResponse {
    request_id: String,
    model_type: ModelType,
    deadline: Instant,
    rx: oneshot::Receiver<ClientResult<InferenceResponse>>,
    correlator: Arc<Correlator>,
}

impl PendingResponse {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn model_type(&self) -> ModelType {
        self.model_type
    }

    /// Waits for the response, the deadline, or a disconnect.
    pub async fn wait(mut self) -> ClientResult<InferenceResponse> {
        match tokio::time::timeout_at(self.deadline, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::DisconnectedWhilePending {
                request_id: self.request_id.clone(),
            }),
            Err(_) => {
                if self.correlator.cancel(&self.request_id) {
                    debug!(request_id = %self.request_id, "Request timed out");
                    Err(ClientError::RequestTimeout {
                        request_id: self.request_id.clone(),
                        model_type: self.model_type,
                        timeout: self.correlator.request_timeout,
                    })
                } else {
                    // Completed just as the deadline passed.
                    self.rx.try_recv().unwrap_or_else(|_| {
                        Err(ClientError::DisconnectedWhilePending {
                            request_id: self.request_id.clone(),
                        })
                    })
                }
            }
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        self.correlator.cancel(&self.request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn correlator() -> Arc<Correlator> {
        Arc::new(Correlator::new(Duration::from_millis(5000)))
    }

    fn response(model: ModelType, id: Option<&str>, tag: i64) -> InferenceResponse {
        InferenceResponse::new(model, json!({ "tag": tag })).with_request_id(id.map(String::from))
    }

    #[test]
    fn request_ids_are_unique_and_prefixed() {
        let c = correlator();
        let a = c.register(ModelType::ObjectDetection);
        let b = c.register(ModelType::ObjectDetection);
        assert_ne!(a.request_id(), b.request_id());
        assert!(a.request_id().starts_with("object_detection_"));
        assert_eq!(c.pending_count(), 2);
    }

    #[tokio::test]
    async fn echoed_id_resolves_that_request() {
        let c = correlator();
        let first = c.register(ModelType::AnomalyDetection);
        let second = c.register(ModelType::AnomalyDetection);

        let second_id = second.request_id().to_string();
        assert!(c.resolve(response(ModelType::AnomalyDetection, Some(&second_id), 2)));
        let got = second.wait().await.unwrap();
        assert_eq!(got.prediction["tag"], 2);

        assert!(c.is_pending(first.request_id()));
        assert_eq!(c.pending_count(), 1);
    }

    #[tokio::test]
    async fn legacy_response_resolves_oldest_of_type() {
        let c = correlator();
        let traj = c.register(ModelType::TrajectoryPrediction);
        let first = c.register(ModelType::AnomalyDetection);
        let second = c.register(ModelType::AnomalyDetection);

        assert!(c.resolve(response(ModelType::AnomalyDetection, None, 1)));
        assert!(c.resolve(response(ModelType::AnomalyDetection, None, 2)));

        assert_eq!(first.wait().await.unwrap().prediction["tag"], 1);
        assert_eq!(second.wait().await.unwrap().prediction["tag"], 2);
        assert!(c.is_pending(traj.request_id()));
    }

    #[tokio::test]
    async fn distinct_model_types_resolve_independently() {
        let c = correlator();
        let traj = c.register(ModelType::TrajectoryPrediction);
        let fusion = c.register(ModelType::SensorFusion);

        c.resolve(response(ModelType::SensorFusion, None, 7));
        c.resolve(response(ModelType::TrajectoryPrediction, None, 3));

        let traj = traj.wait().await.unwrap();
        let fusion = fusion.wait().await.unwrap();
        assert_eq!(traj.model_type, ModelType::TrajectoryPrediction);
        assert_eq!(fusion.model_type, ModelType::SensorFusion);
        assert_eq!(fusion.prediction["tag"], 7);
    }

    #[test]
    fn unmatched_responses_are_dropped() {
        let c = correlator();
        assert!(!c.resolve(response(ModelType::ObjectDetection, None, 0)));

        let _pending = c.register(ModelType::ObjectDetection);
        assert!(!c.resolve(response(ModelType::ObjectDetection, Some("stale"), 0)));
        assert_eq!(c.pending_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_rejects_and_removes() {
        let c = correlator();
        let pending = c.register(ModelType::SensorFusion);
        let id = pending.request_id().to_string();

        let err = pending.wait().await.unwrap_err();
        match err {
            ClientError::RequestTimeout {
                request_id,
                model_type,
                timeout,
            } => {
                assert_eq!(request_id, id);
                assert_eq!(model_type, ModelType::SensorFusion);
                assert_eq!(timeout, Duration::from_millis(5000));
            }
            other => panic!("expected timeout, got {other}"),
        }
        assert_eq!(c.pending_count(), 0);

        // A late answer finds nothing to complete.
        assert!(!c.resolve(response(ModelType::SensorFusion, Some(&id), 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn response_before_deadline_wins() {
        let c = correlator();
        let pending = c.register(ModelType::TrajectoryPrediction);
        let id = pending.request_id().to_string();

        let c2 = Arc::clone(&c);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(4999)).await;
            c2.resolve(response(ModelType::TrajectoryPrediction, Some(&id), 9));
        });

        assert_eq!(pending.wait().await.unwrap().prediction["tag"], 9);
    }

    #[tokio::test]
    async fn fail_all_rejects_every_pending() {
        let c = correlator();
        let handles: Vec<_> = ModelType::ALL.iter().map(|m| c.register(*m)).collect();

        assert_eq!(c.fail_all(), 4);
        assert_eq!(c.pending_count(), 0);

        for handle in handles {
            let id = handle.request_id().to_string();
            match handle.wait().await {
                Err(ClientError::DisconnectedWhilePending { request_id }) => {
                    assert_eq!(request_id, id)
                }
                other => panic!("expected disconnect, got {:?}", other.map(|_| ())),
            }
        }
    }

    #[tokio::test]
    async fn error_envelope_rejects_matching_request() {
        let c = correlator();
        let pending = c.register(ModelType::ObjectDetection);
        let error = ErrorPayload::for_request(
            "missing field `frame_id`",
            ModelType::ObjectDetection,
            Some(pending.request_id().to_string()),
        );

        assert!(c.reject(&error));
        assert!(matches!(
            pending.wait().await,
            Err(ClientError::Server(msg)) if msg.contains("frame_id")
        ));

        assert!(!c.reject(&ErrorPayload::new("unrelated")));
    }

    #[test]
    fn dropping_handle_forgets_request() {
        let c = correlator();
        let pending = c.register(ModelType::AnomalyDetection);
        drop(pending);
        assert_eq!(c.pending_count(), 0);
    }

    #[test]
    fn subscribers_see_matched_and_unmatched() {
        let c = correlator();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let id = c.subscribe(
            ModelType::ObjectDetection,
            Arc::new(move |_resp| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let _pending = c.register(ModelType::ObjectDetection);
        c.resolve(response(ModelType::ObjectDetection, None, 1));
        c.resolve(response(ModelType::ObjectDetection, None, 2));
        c.resolve(response(ModelType::SensorFusion, None, 3));
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        assert!(c.unsubscribe(id));
        assert!(!c.unsubscribe(id));
        c.resolve(response(ModelType::ObjectDetection, None, 4));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let c = correlator();
        let seen = Arc::new(AtomicUsize::new(0));
        let a = Arc::clone(&seen);
        let b = Arc::clone(&seen);
        let first = c.subscribe(
            ModelType::SensorFusion,
            Arc::new(move |_| {
                a.fetch_add(1, Ordering::SeqCst);
            }),
        );
        c.subscribe(
            ModelType::SensorFusion,
            Arc::new(move |_| {
                b.fetch_add(10, Ordering::SeqCst);
            }),
        );

        c.unsubscribe(first);
        c.resolve(response(ModelType::SensorFusion, None, 0));
        assert_eq!(seen.load(Ordering::SeqCst), 10);
    }
}
