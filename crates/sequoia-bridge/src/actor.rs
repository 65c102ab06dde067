//! The bridge actor.
//!
//! Owns the database and the oracle client. Requests are handled one at a
//! time in arrival order, so the store only ever sees this task as a
//! writer. Oracle calls run on their own tasks and report back to the actor,
//! which then logs the attempt and credits savings.

use chrono::NaiveDate;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sequoia_core::{DailyLimitStatus, IncrementOutcome};
use sequoia_storage::Database;

use crate::client::BridgeClient;
use crate::config::BridgeConfig;
use crate::error::OracleError;
use crate::monitor::ServiceMonitor;
use crate::oracle::OracleClient;
use crate::protocol::{
    BridgeEvent, BridgeRequest, BridgeResponse, CallId, CompressionResult, Envelope,
    SavingsReport,
};

/// Subscribers that lag further than this miss pause updates.
const EVENT_CAPACITY: usize = 16;

/// An oracle call that finished off the actor task.
#[derive(Debug)]
struct Completion {
    message: String,
    url: String,
    outcome: Result<CompressionResult, String>,
}

/// Handle to a running bridge.
pub struct BridgeHandle {
    shutdown_tx: broadcast::Sender<()>,
    actor: JoinHandle<()>,
    health: JoinHandle<()>,
    monitor: ServiceMonitor,
}

impl BridgeHandle {
    pub fn monitor(&self) -> &ServiceMonitor {
        &self.monitor
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Signal shutdown and wait for the actor to finish.
    pub async fn stop(self) {
        self.shutdown();
        let _ = self.actor.await;
        let _ = self.health.await;
    }
}

/// Starts the actor, its health monitor and a client connected to it.
pub fn spawn(db: Database, config: BridgeConfig) -> Result<(BridgeClient, BridgeHandle), OracleError> {
    spawn_with_clock(db, config, sequoia_core::rate_limit::today)
}

/// Like [`spawn`], with the notion of "today" supplied by the caller.
pub fn spawn_with_clock(
    db: Database,
    config: BridgeConfig,
    today: fn() -> NaiveDate,
) -> Result<(BridgeClient, BridgeHandle), OracleError> {
    let oracle = OracleClient::new(config.oracle.clone())?;
    let monitor = ServiceMonitor::new();

    let (request_tx, request_rx) = mpsc::channel(config.channel_capacity);
    let (response_tx, response_rx) = mpsc::channel(config.channel_capacity);
    let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let actor = BridgeActor {
        db,
        oracle: oracle.clone(),
        monitor: monitor.clone(),
        events: event_tx.clone(),
        responses: response_tx,
        today,
    };
    let actor = tokio::spawn(actor.run(request_rx, shutdown_tx.subscribe()));
    let health = monitor.spawn(oracle, config.health_interval, shutdown_tx.subscribe());

    let client = BridgeClient::connect(request_tx, response_rx, event_tx, config.control_timeout);

    info!(oracle = %config.oracle.base_url, "Bridge started");

    Ok((
        client,
        BridgeHandle {
            shutdown_tx,
            actor,
            health,
            monitor,
        },
    ))
}

struct BridgeActor {
    db: Database,
    oracle: OracleClient,
    monitor: ServiceMonitor,
    events: broadcast::Sender<BridgeEvent>,
    responses: mpsc::Sender<Envelope<BridgeResponse>>,
    today: fn() -> NaiveDate,
}

impl BridgeActor {
    async fn run(
        self,
        mut requests: mpsc::Receiver<Envelope<BridgeRequest>>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();

        loop {
            tokio::select! {
                biased;
                Some(done) = done_rx.recv() => self.finish_compression(done),
                request = requests.recv() => match request {
                    Some(envelope) => self.handle(envelope, &done_tx).await,
                    None => break,
                },
                _ = shutdown.recv() => break,
            }
        }

        // Fold in oracle calls that already returned.
        while let Ok(done) = done_rx.try_recv() {
            self.finish_compression(done);
        }
        debug!("Bridge actor stopped");
    }

    async fn handle(&self, envelope: Envelope<BridgeRequest>, done_tx: &mpsc::UnboundedSender<Completion>) {
        let Envelope { id, payload } = envelope;
        debug!(call = %id, request = payload.name(), "Bridge request");

        let response = match payload {
            BridgeRequest::LogMessage { message, url } => {
                self.start_compression(id, message, url, done_tx.clone());
                return;
            }
            BridgeRequest::CheckServiceHealth => {
                let monitor = self.monitor.clone();
                let oracle = self.oracle.clone();
                let responses = self.responses.clone();
                tokio::spawn(async move {
                    let health = monitor.check(&oracle).await;
                    reply(&responses, id, BridgeResponse::Health(health)).await;
                });
                return;
            }
            BridgeRequest::DailyLimitCheck => self.check_daily_limit(),
            BridgeRequest::IncrementDailyCount => self.increment_daily_count(),
            other => self.handle_control(other),
        };

        reply(&self.responses, id, response).await;
    }

    fn check_daily_limit(&self) -> BridgeResponse {
        let status = self
            .db
            .check_daily_limit((self.today)())
            .unwrap_or_else(|e| {
                warn!("Daily limit check failed, allowing: {}", e);
                DailyLimitStatus::permissive()
            });
        BridgeResponse::DailyLimit(status)
    }

    fn increment_daily_count(&self) -> BridgeResponse {
        let outcome = match self.db.increment_daily_count((self.today)()) {
            Ok(outcome) => {
                if outcome.capped {
                    info!(count = outcome.count, "Daily limit reached, message not counted");
                } else {
                    debug!(count = outcome.count, "Daily message count incremented");
                }
                outcome
            }
            Err(e) => {
                warn!("Failed to increment daily count: {}", e);
                IncrementOutcome {
                    count: 0,
                    capped: false,
                }
            }
        };
        BridgeResponse::Increment(outcome)
    }

    fn handle_control(&self, request: BridgeRequest) -> BridgeResponse {
        let today = (self.today)();
        let result = match request {
            BridgeRequest::GetSettings => self.db.settings_snapshot(today).map(BridgeResponse::Settings),
            BridgeRequest::SetPaused { paused } => self.db.set_paused(paused).map(|_| {
                info!(paused, "Pause state changed");
                let _ = self.events.send(BridgeEvent::PauseStateUpdate { paused });
                BridgeResponse::Paused(paused)
            }),
            BridgeRequest::SetDailyLimit { limit } => {
                self.db.set_daily_limit(limit).map(|stored| {
                    info!(limit = stored, "Daily limit set");
                    BridgeResponse::DailyLimitSet(stored)
                })
            }
            BridgeRequest::GetSavings => self.savings_report(today).map(BridgeResponse::Savings),
            BridgeRequest::ResetSavings => self.db.reset_savings().map(|_| {
                info!("Environmental savings reset");
                BridgeResponse::Ack
            }),
            BridgeRequest::GetWeeklyGoals => self.db.weekly_goals().map(BridgeResponse::WeeklyGoals),
            BridgeRequest::SetWeeklyGoals {
                water_liters,
                co2_kg,
            } => self
                .db
                .set_weekly_goals(water_liters, co2_kg)
                .map(BridgeResponse::WeeklyGoals),
            BridgeRequest::CompleteWelcome => self.db.complete_welcome().map(|_| BridgeResponse::Ack),
            BridgeRequest::GetServiceStatus => Ok(BridgeResponse::Health(self.monitor.health())),
            BridgeRequest::GetStats => Ok(BridgeResponse::Stats(self.monitor.stats())),
            BridgeRequest::RecentCompressions { limit, offset } => self
                .db
                .recent_compressions(limit.clamp(1, 100), offset.max(0))
                .map(BridgeResponse::Compressions),
            BridgeRequest::LogMessage { .. }
            | BridgeRequest::CheckServiceHealth
            | BridgeRequest::DailyLimitCheck
            | BridgeRequest::IncrementDailyCount => {
                return BridgeResponse::Failed("not a control request".to_string())
            }
        };

        result.unwrap_or_else(|e| {
            warn!("Bridge request failed: {}", e);
            BridgeResponse::Failed(e.to_string())
        })
    }

    fn savings_report(&self, today: NaiveDate) -> sequoia_storage::Result<SavingsReport> {
        let total = self.db.savings()?;
        let last_seven_days = self.db.week_savings(today)?;
        let goals = self.db.weekly_goals()?;
        Ok(SavingsReport {
            total,
            last_seven_days,
            goals,
            progress: goals.progress(&last_seven_days),
        })
    }

    fn start_compression(
        &self,
        id: CallId,
        message: String,
        url: String,
        done_tx: mpsc::UnboundedSender<Completion>,
    ) {
        let oracle = self.oracle.clone();
        let responses = self.responses.clone();

        tokio::spawn(async move {
            let outcome = oracle.log_message(&message, &url).await;
            let result = match &outcome {
                Ok(result) => result.clone(),
                Err(e) => {
                    warn!("Compression service call failed: {}", e);
                    CompressionResult::failed()
                }
            };

            let _ = done_tx.send(Completion {
                message,
                url,
                outcome: outcome.map_err(|e| e.to_string()),
            });
            reply(&responses, id, BridgeResponse::Compression(result)).await;
        });
    }

    fn finish_compression(&self, done: Completion) {
        let source = url::Url::parse(&done.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));

        let result = match done.outcome {
            Ok(result) => {
                self.monitor.record_message();
                result
            }
            Err(_) => CompressionResult::failed(),
        };

        if let Err(e) = self.db.record_compression(
            &done.message,
            source,
            result.success,
            result.method.clone(),
            result.original_tokens,
            result.compressed_tokens,
        ) {
            warn!("Failed to log compression: {}", e);
        }

        if let Some(saved) = result.tokens_saved() {
            match self.db.credit_savings((self.today)(), saved) {
                Ok(totals) => info!(tokens_saved = saved, "Savings updated: {}", totals.summary()),
                Err(e) => warn!("Failed to update savings: {}", e),
            }
        }
    }
}

async fn reply(responses: &mpsc::Sender<Envelope<BridgeResponse>>, id: CallId, payload: BridgeResponse) {
    if responses.send(Envelope { id, payload }).await.is_err() {
        debug!(call = %id, "Response dropped, client is gone");
    }
}
