//! Data models for storage.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use sequoia_core::{EnvironmentalSavings, WeeklyGoals};

/// A stored setting (key + JSON value).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: serde_json::Value,
}

/// Settings keys and their documented defaults.
pub mod keys {
    pub const DAILY_LIMIT: &str = "dailyLimit";
    pub const DAILY_MESSAGE_COUNT: &str = "dailyMessageCount";
    pub const LAST_RESET_DATE: &str = "lastResetDate";
    pub const IS_PAUSED: &str = "isPaused";
    pub const CO2_SAVED: &str = "co2Saved";
    pub const WATER_SAVED: &str = "waterSaved";
    pub const WELCOME_COMPLETED: &str = "welcomeCompleted";
    pub const WEEKLY_WATER_GOAL: &str = "weeklyWaterGoal";
    pub const WEEKLY_CO2_GOAL: &str = "weeklyCo2Goal";
}

/// Every user-facing setting in one read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    pub is_paused: bool,
    pub welcome_completed: bool,
    pub daily_limit: u32,
    pub daily_message_count: u32,
    pub last_reset_date: NaiveDate,
    pub savings: EnvironmentalSavings,
    pub weekly_goals: WeeklyGoals,
}

/// A logged compression attempt (privacy-preserving: hash, not full prompt).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionRecord {
    /// Unique identifier.
    pub id: i64,
    /// SHA-256 hash of the prompt.
    pub prompt_hash: String,
    /// Short preview of the prompt.
    pub preview: String,
    /// Host the prompt was sent to.
    pub source: Option<String>,
    /// Whether the service returned a compressed prompt.
    pub success: bool,
    /// Method reported by the service.
    pub method: Option<String>,
    pub original_tokens: Option<i64>,
    pub compressed_tokens: Option<i64>,
    /// Timestamp.
    pub created_at: DateTime<Utc>,
}

impl CompressionRecord {
    /// Tokens removed, when both counts are known.
    pub fn tokens_saved(&self) -> Option<i64> {
        Some((self.original_tokens? - self.compressed_tokens?).max(0))
    }
}

/// Parameters for logging a compression attempt.
#[derive(Debug, Clone)]
pub struct NewCompressionRecord {
    pub prompt_hash: String,
    pub preview: String,
    pub source: Option<String>,
    pub success: bool,
    pub method: Option<String>,
    pub original_tokens: Option<i64>,
    pub compressed_tokens: Option<i64>,
}

/// Savings credited on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySavings {
    pub date: NaiveDate,
    pub co2_saved: f64,
    pub water_saved: f64,
    pub tokens_saved: i64,
    pub compressions: i64,
}

impl DailySavings {
    pub fn savings(&self) -> EnvironmentalSavings {
        EnvironmentalSavings {
            co2_saved: self.co2_saved,
            water_saved: self.water_saved,
        }
    }
}
