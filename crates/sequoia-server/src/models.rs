//! API request and response models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use sequoia_bridge::ServiceHealth;
use sequoia_core::{DailyLimitStatus, EnvironmentalSavings, WeeklyGoals};

/// Response body for GET /api/status.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub is_paused: bool,
    pub welcome_completed: bool,
    pub daily_limit: u32,
    pub daily_message_count: u32,
    pub last_reset_date: NaiveDate,
    pub savings: EnvironmentalSavings,
    pub weekly_goals: WeeklyGoals,
    /// Last known health of the compression service.
    pub service: ServiceHealth,
}

/// Response body for the daily limit endpoints.
#[derive(Debug, Serialize)]
pub struct DailyLimitResponse {
    pub daily_limit: u32,
    pub daily_message_count: u32,
    pub is_exceeded: bool,
    /// Messages left today; absent when unlimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
}

impl From<DailyLimitStatus> for DailyLimitResponse {
    fn from(status: DailyLimitStatus) -> Self {
        Self {
            daily_limit: status.daily_limit,
            daily_message_count: status.daily_message_count,
            is_exceeded: status.is_exceeded,
            remaining: status.remaining(),
        }
    }
}

/// Request body for PUT /api/daily-limit.
#[derive(Debug, Deserialize)]
pub struct SetDailyLimitRequest {
    /// Messages per day, 0 for unlimited. Clamped to 0..=100.
    pub limit: i64,
}

/// Response body for POST /api/pause and /api/resume.
#[derive(Debug, Serialize)]
pub struct PauseResponse {
    pub success: bool,
    pub is_paused: bool,
}

/// Request body for PUT /api/goals.
#[derive(Debug, Deserialize)]
pub struct GoalsRequest {
    pub water_liters: f64,
    pub co2_kg: f64,
}

/// Query parameters for GET /api/compressions.
#[derive(Debug, Deserialize)]
pub struct CompressionsQuery {
    /// Maximum number of entries (default: 20, at most 100).
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

/// Compression log entry in the response.
#[derive(Debug, Serialize)]
pub struct CompressionEntry {
    pub id: i64,
    pub preview: String,
    pub source: Option<String>,
    pub success: bool,
    pub method: Option<String>,
    pub original_tokens: Option<i64>,
    pub compressed_tokens: Option<i64>,
    pub tokens_saved: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Response body for GET /api/compressions.
#[derive(Debug, Serialize)]
pub struct CompressionsResponse {
    pub compressions: Vec<CompressionEntry>,
    pub limit: i64,
    pub offset: i64,
}

/// Generic acknowledgement.
#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub success: bool,
}

impl AckResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}
