//! Oracle health monitor and service counters.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::OracleError;
use crate::oracle::OracleClient;
use crate::protocol::{ServiceHealth, ServiceStats, ServiceStatus};

#[derive(Debug, Default)]
struct MonitorState {
    health: ServiceHealth,
    messages_processed: u64,
    last_message_time: Option<chrono::DateTime<Utc>>,
}

/// Shared view of oracle health and message counters.
#[derive(Debug, Clone, Default)]
pub struct ServiceMonitor {
    state: Arc<RwLock<MonitorState>>,
}

impl ServiceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest health probe result.
    pub fn health(&self) -> ServiceHealth {
        self.state.read().health.clone()
    }

    pub fn stats(&self) -> ServiceStats {
        let state = self.state.read();
        ServiceStats {
            messages_processed: state.messages_processed,
            last_message_time: state.last_message_time,
            service_status: state.health.status,
            last_check: state.health.last_check,
            oracle_total_messages: state.health.total_messages,
        }
    }

    /// Counts one prompt handed to the oracle.
    pub fn record_message(&self) {
        let mut state = self.state.write();
        state.messages_processed += 1;
        state.last_message_time = Some(Utc::now());
        if let Some(total) = state.health.total_messages.as_mut() {
            *total += 1;
        }
    }

    /// Probes the oracle and stores the outcome.
    pub async fn check(&self, oracle: &OracleClient) -> ServiceHealth {
        let health = match oracle.health().await {
            Ok(reply) => ServiceHealth {
                status: ServiceStatus::Healthy,
                total_messages: reply.total_messages,
                last_check: Some(Utc::now()),
                error: None,
            },
            Err(OracleError::Status(code)) => ServiceHealth {
                status: ServiceStatus::Error,
                total_messages: None,
                last_check: Some(Utc::now()),
                error: Some(format!("HTTP {}", code)),
            },
            Err(e) => ServiceHealth {
                status: ServiceStatus::Unavailable,
                total_messages: None,
                last_check: Some(Utc::now()),
                error: Some(e.to_string()),
            },
        };

        let previous = {
            let mut state = self.state.write();
            std::mem::replace(&mut state.health, health.clone()).status
        };

        if previous != health.status {
            match health.status {
                ServiceStatus::Healthy => info!("Compression service is healthy"),
                status => warn!(
                    status = status.as_str(),
                    error = health.error.as_deref().unwrap_or(""),
                    "Compression service is not healthy"
                ),
            }
        } else {
            debug!(status = health.status.as_str(), "Health check");
        }

        health
    }

    /// Probes the oracle every `interval` until shutdown.
    pub fn spawn(
        &self,
        oracle: OracleClient,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        monitor.check(&oracle).await;
                    }
                    _ = shutdown.recv() => {
                        debug!("Health monitor stopped");
                        break;
                    }
                }
            }
        })
    }
}
