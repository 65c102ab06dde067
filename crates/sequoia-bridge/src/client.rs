//! Correlated request/response client for the bridge actor.
//!
//! Each call registers a pending slot under a fresh [`CallId`] before the
//! request is sent. The slot is removed when the response arrives or the
//! call times out, whichever comes first. A router task matches responses
//! to slots; when the actor goes away every pending call resolves to
//! [`BridgeError::ContextInvalidated`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, trace};

use sequoia_core::{DailyLimitStatus, IncrementOutcome, WeeklyGoals};
use sequoia_storage::{CompressionRecord, SettingsSnapshot};

use crate::error::{BridgeError, Result};
use crate::protocol::{
    BridgeEvent, BridgeRequest, BridgeResponse, CallId, CompressionResult, Envelope,
    SavingsReport, ServiceHealth, ServiceStats,
};

type Pending = Arc<Mutex<HashMap<CallId, oneshot::Sender<BridgeResponse>>>>;

macro_rules! expect_response {
    ($response:expr, $variant:ident) => {
        match $response {
            BridgeResponse::$variant(value) => Ok(value),
            _ => Err(BridgeError::UnexpectedResponse(stringify!($variant))),
        }
    };
}

/// Cheap-to-clone handle for calling the bridge actor.
#[derive(Clone)]
pub struct BridgeClient {
    requests: mpsc::Sender<Envelope<BridgeRequest>>,
    pending: Pending,
    events: broadcast::Sender<BridgeEvent>,
    control_timeout: Duration,
}

impl BridgeClient {
    /// Connects to an actor's channels and starts the response router.
    pub fn connect(
        requests: mpsc::Sender<Envelope<BridgeRequest>>,
        responses: mpsc::Receiver<Envelope<BridgeResponse>>,
        events: broadcast::Sender<BridgeEvent>,
        control_timeout: Duration,
    ) -> Self {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        tokio::spawn(route_responses(responses, pending.clone()));

        Self {
            requests,
            pending,
            events,
            control_timeout,
        }
    }

    /// Receives pause updates pushed by the actor.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    /// Number of calls waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.pending.lock().len()
    }

    /// Sends a request and waits up to `timeout` for its response.
    pub async fn call(&self, request: BridgeRequest, timeout: Duration) -> Result<BridgeResponse> {
        let (tx, rx) = oneshot::channel();
        let id = self.register(tx);
        trace!(call = %id, request = request.name(), "Bridge call");

        // Waiting for channel capacity counts against the timeout too.
        let exchange = async {
            self.requests
                .send(Envelope {
                    id,
                    payload: request,
                })
                .await
                .map_err(|_| BridgeError::ContextInvalidated)?;
            rx.await.map_err(|_| BridgeError::ContextInvalidated)
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(BridgeResponse::Failed(message))) => Err(BridgeError::Failed(message)),
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                self.pending.lock().remove(&id);
                Err(e)
            }
            Err(_) => {
                self.pending.lock().remove(&id);
                debug!(call = %id, "Bridge call timed out");
                Err(BridgeError::Timeout(timeout))
            }
        }
    }

    fn register(&self, tx: oneshot::Sender<BridgeResponse>) -> CallId {
        let mut pending = self.pending.lock();
        let mut id = CallId::random();
        while pending.contains_key(&id) {
            id = CallId::random();
        }
        pending.insert(id, tx);
        id
    }

    async fn control(&self, request: BridgeRequest) -> Result<BridgeResponse> {
        self.call(request, self.control_timeout).await
    }

    // === Interception path ===

    pub async fn check_daily_limit(&self, timeout: Duration) -> Result<DailyLimitStatus> {
        let response = self.call(BridgeRequest::DailyLimitCheck, timeout).await?;
        expect_response!(response, DailyLimit)
    }

    pub async fn increment_daily_count(&self, timeout: Duration) -> Result<IncrementOutcome> {
        let response = self.call(BridgeRequest::IncrementDailyCount, timeout).await?;
        expect_response!(response, Increment)
    }

    pub async fn log_message(
        &self,
        message: &str,
        url: &str,
        timeout: Duration,
    ) -> Result<CompressionResult> {
        let request = BridgeRequest::LogMessage {
            message: message.to_string(),
            url: url.to_string(),
        };
        let response = self.call(request, timeout).await?;
        expect_response!(response, Compression)
    }

    // === Control ===

    pub async fn settings(&self) -> Result<SettingsSnapshot> {
        let response = self.control(BridgeRequest::GetSettings).await?;
        expect_response!(response, Settings)
    }

    /// Persists the pause flag; subscribers get a `PauseStateUpdate`.
    pub async fn set_paused(&self, paused: bool) -> Result<bool> {
        let response = self.control(BridgeRequest::SetPaused { paused }).await?;
        expect_response!(response, Paused)
    }

    /// Returns the stored (clamped) limit.
    pub async fn set_daily_limit(&self, limit: i64) -> Result<u32> {
        let response = self.control(BridgeRequest::SetDailyLimit { limit }).await?;
        expect_response!(response, DailyLimitSet)
    }

    pub async fn savings(&self) -> Result<SavingsReport> {
        let response = self.control(BridgeRequest::GetSavings).await?;
        expect_response!(response, Savings)
    }

    pub async fn reset_savings(&self) -> Result<()> {
        match self.control(BridgeRequest::ResetSavings).await? {
            BridgeResponse::Ack => Ok(()),
            _ => Err(BridgeError::UnexpectedResponse("Ack")),
        }
    }

    pub async fn weekly_goals(&self) -> Result<WeeklyGoals> {
        let response = self.control(BridgeRequest::GetWeeklyGoals).await?;
        expect_response!(response, WeeklyGoals)
    }

    pub async fn set_weekly_goals(&self, water_liters: f64, co2_kg: f64) -> Result<WeeklyGoals> {
        let request = BridgeRequest::SetWeeklyGoals {
            water_liters,
            co2_kg,
        };
        let response = self.control(request).await?;
        expect_response!(response, WeeklyGoals)
    }

    pub async fn complete_welcome(&self) -> Result<()> {
        match self.control(BridgeRequest::CompleteWelcome).await? {
            BridgeResponse::Ack => Ok(()),
            _ => Err(BridgeError::UnexpectedResponse("Ack")),
        }
    }

    /// Probes the oracle now.
    pub async fn check_service_health(&self) -> Result<ServiceHealth> {
        let response = self.control(BridgeRequest::CheckServiceHealth).await?;
        expect_response!(response, Health)
    }

    /// Last known oracle health.
    pub async fn service_status(&self) -> Result<ServiceHealth> {
        let response = self.control(BridgeRequest::GetServiceStatus).await?;
        expect_response!(response, Health)
    }

    pub async fn stats(&self) -> Result<ServiceStats> {
        let response = self.control(BridgeRequest::GetStats).await?;
        expect_response!(response, Stats)
    }

    pub async fn recent_compressions(&self, limit: i64, offset: i64) -> Result<Vec<CompressionRecord>> {
        let response = self
            .control(BridgeRequest::RecentCompressions { limit, offset })
            .await?;
        expect_response!(response, Compressions)
    }
}

async fn route_responses(mut responses: mpsc::Receiver<Envelope<BridgeResponse>>, pending: Pending) {
    while let Some(Envelope { id, payload }) = responses.recv().await {
        let slot = pending.lock().remove(&id);
        match slot {
            Some(tx) => {
                let _ = tx.send(payload);
            }
            // The caller already timed out.
            None => trace!(call = %id, "Late bridge response dropped"),
        }
    }

    // Actor gone: dropping the senders wakes every waiter.
    pending.lock().clear();
    debug!("Bridge response router stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A client wired to channels the test drives by hand.
    fn manual() -> (
        BridgeClient,
        mpsc::Receiver<Envelope<BridgeRequest>>,
        mpsc::Sender<Envelope<BridgeResponse>>,
    ) {
        let (req_tx, req_rx) = mpsc::channel(8);
        let (resp_tx, resp_rx) = mpsc::channel(8);
        let (event_tx, _) = broadcast::channel(4);
        let client = BridgeClient::connect(req_tx, resp_rx, event_tx, Duration::from_secs(1));
        (client, req_rx, resp_tx)
    }

    #[tokio::test]
    async fn test_response_is_matched_by_id() {
        let (client, mut req_rx, resp_tx) = manual();

        let caller = {
            let client = client.clone();
            tokio::spawn(async move { client.check_daily_limit(Duration::from_secs(1)).await })
        };

        let request = req_rx.recv().await.unwrap();
        assert_eq!(request.payload, BridgeRequest::DailyLimitCheck);
        assert_eq!(client.pending_calls(), 1);

        // A stray response for another id is ignored.
        resp_tx
            .send(Envelope {
                id: CallId(request.id.0.wrapping_add(1)),
                payload: BridgeResponse::Ack,
            })
            .await
            .unwrap();

        let status = DailyLimitStatus {
            daily_limit: 5,
            daily_message_count: 5,
            is_exceeded: true,
        };
        resp_tx
            .send(Envelope {
                id: request.id,
                payload: BridgeResponse::DailyLimit(status),
            })
            .await
            .unwrap();

        assert_eq!(caller.await.unwrap().unwrap(), status);
        assert_eq!(client.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_timeout_removes_pending_slot() {
        let (client, mut req_rx, _resp_tx) = manual();

        let err = client
            .check_daily_limit(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Timeout(_)));
        assert_eq!(client.pending_calls(), 0);

        // The request was still delivered.
        assert!(req_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_full_request_channel_times_out() {
        let (req_tx, _req_rx) = mpsc::channel(1);
        let (_resp_tx, resp_rx) = mpsc::channel(1);
        let (event_tx, _) = broadcast::channel(4);
        let client = BridgeClient::connect(req_tx, resp_rx, event_tx, Duration::from_secs(1));

        // Nobody drains the requests, so the first call fills the channel.
        let first = client.check_daily_limit(Duration::from_millis(20)).await;
        assert!(matches!(first, Err(BridgeError::Timeout(_))));

        let second = tokio::time::timeout(
            Duration::from_secs(1),
            client.check_daily_limit(Duration::from_millis(20)),
        )
        .await
        .expect("call waited past its own timeout");
        assert!(matches!(second, Err(BridgeError::Timeout(_))));
        assert_eq!(client.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_closed_request_channel_invalidates() {
        let (client, req_rx, _resp_tx) = manual();
        drop(req_rx);

        let err = client.settings().await.unwrap_err();
        assert!(matches!(err, BridgeError::ContextInvalidated));
        assert_eq!(client.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_router_shutdown_invalidates_waiters() {
        let (client, mut req_rx, resp_tx) = manual();

        let caller = {
            let client = client.clone();
            tokio::spawn(async move { client.check_daily_limit(Duration::from_secs(5)).await })
        };
        req_rx.recv().await.unwrap();
        drop(resp_tx);

        let err = caller.await.unwrap().unwrap_err();
        assert!(matches!(err, BridgeError::ContextInvalidated));
    }

    #[tokio::test]
    async fn test_failed_and_unexpected_responses() {
        let (client, mut req_rx, resp_tx) = manual();

        let responder = tokio::spawn(async move {
            let first = req_rx.recv().await.unwrap();
            resp_tx
                .send(Envelope {
                    id: first.id,
                    payload: BridgeResponse::Failed("disk full".into()),
                })
                .await
                .unwrap();
            let second = req_rx.recv().await.unwrap();
            resp_tx
                .send(Envelope {
                    id: second.id,
                    payload: BridgeResponse::Paused(true),
                })
                .await
                .unwrap();
        });

        let err = client.reset_savings().await.unwrap_err();
        assert!(matches!(err, BridgeError::Failed(ref m) if m == "disk full"));

        let err = client.stats().await.unwrap_err();
        assert!(matches!(err, BridgeError::UnexpectedResponse("Stats")));

        responder.await.unwrap();
    }
}
