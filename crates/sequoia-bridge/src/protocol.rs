//! Messages exchanged with the bridge actor.
//!
//! Every request travels in an [`Envelope`] tagged with a random [`CallId`];
//! the actor answers with an envelope carrying the same id. Pause changes
//! are pushed to subscribers as one-way [`BridgeEvent`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sequoia_core::savings::GoalProgress;
use sequoia_core::{DailyLimitStatus, EnvironmentalSavings, IncrementOutcome, WeeklyGoals};
use sequoia_storage::{CompressionRecord, SettingsSnapshot};

/// Correlation id for one bridge call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub u64);

impl CallId {
    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A correlated message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub id: CallId,
    pub payload: T,
}

/// Requests the actor understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum BridgeRequest {
    /// Send a prompt to the compression oracle.
    LogMessage { message: String, url: String },
    /// Roll over and read the daily limit status.
    DailyLimitCheck,
    /// Count one message.
    IncrementDailyCount,
    GetSettings,
    SetPaused { paused: bool },
    SetDailyLimit { limit: i64 },
    GetSavings,
    ResetSavings,
    GetWeeklyGoals,
    SetWeeklyGoals { water_liters: f64, co2_kg: f64 },
    CompleteWelcome,
    /// Probe the oracle now.
    CheckServiceHealth,
    /// Last known oracle health, without probing.
    GetServiceStatus,
    GetStats,
    RecentCompressions { limit: i64, offset: i64 },
}

impl BridgeRequest {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LogMessage { .. } => "logMessage",
            Self::DailyLimitCheck => "dailyLimitCheck",
            Self::IncrementDailyCount => "incrementDailyCount",
            Self::GetSettings => "getSettings",
            Self::SetPaused { .. } => "setPaused",
            Self::SetDailyLimit { .. } => "setDailyLimit",
            Self::GetSavings => "getSavings",
            Self::ResetSavings => "resetSavings",
            Self::GetWeeklyGoals => "getWeeklyGoals",
            Self::SetWeeklyGoals { .. } => "setWeeklyGoals",
            Self::CompleteWelcome => "completeWelcome",
            Self::CheckServiceHealth => "checkServiceHealth",
            Self::GetServiceStatus => "getServiceStatus",
            Self::GetStats => "getStats",
            Self::RecentCompressions { .. } => "recentCompressions",
        }
    }
}

/// Responses from the actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum BridgeResponse {
    Compression(CompressionResult),
    DailyLimit(DailyLimitStatus),
    Increment(IncrementOutcome),
    Settings(SettingsSnapshot),
    Paused(bool),
    DailyLimitSet(u32),
    Savings(SavingsReport),
    WeeklyGoals(WeeklyGoals),
    Health(ServiceHealth),
    Stats(ServiceStats),
    Compressions(Vec<CompressionRecord>),
    Ack,
    /// The request could not be served and has no safe default.
    Failed(String),
}

/// One-way notifications pushed to every subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeEvent {
    PauseStateUpdate { paused: bool },
}

/// Compression outcome as reported by the oracle.
///
/// A missing `success` flag reads as a failure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompressionResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub compressed: Option<String>,
    #[serde(default)]
    pub original_tokens: Option<i64>,
    #[serde(default)]
    pub compressed_tokens: Option<i64>,
    #[serde(default)]
    pub compression_ratio: Option<f64>,
    #[serde(default)]
    pub method: Option<String>,
}

impl CompressionResult {
    /// A failed result, used whenever the oracle cannot be used.
    pub fn failed() -> Self {
        Self::default()
    }

    /// The replacement text, if the oracle succeeded with a non-empty one.
    pub fn compressed_text(&self) -> Option<&str> {
        if !self.success {
            return None;
        }
        self.compressed.as_deref().filter(|s| !s.is_empty())
    }

    /// Tokens removed, only when the result succeeded with a positive delta.
    pub fn tokens_saved(&self) -> Option<u64> {
        if !self.success {
            return None;
        }
        let saved = self.original_tokens?.checked_sub(self.compressed_tokens?)?;
        u64::try_from(saved).ok().filter(|saved| *saved > 0)
    }
}

/// Savings totals plus the last seven days against the goals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsReport {
    pub total: EnvironmentalSavings,
    pub last_seven_days: EnvironmentalSavings,
    pub goals: WeeklyGoals,
    pub progress: GoalProgress,
}

/// Oracle reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    #[default]
    Unknown,
    Healthy,
    Error,
    Unavailable,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Error => "error",
            Self::Unavailable => "unavailable",
        }
    }
}

/// Result of the latest health probe.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: ServiceStatus,
    /// Messages the oracle reports having processed.
    pub total_messages: Option<u64>,
    pub last_check: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Counters kept by the actor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Prompts sent to the oracle since start.
    pub messages_processed: u64,
    pub last_message_time: Option<DateTime<Utc>>,
    pub service_status: ServiceStatus,
    pub last_check: Option<DateTime<Utc>>,
    pub oracle_total_messages: Option<u64>,
}
