//! High-level database interface.

use std::path::PathBuf;

use chrono::NaiveDate;
use directories::ProjectDirs;
use serde_json::json;
use tracing::info;

use sequoia_core::rate_limit::DATE_FORMAT;
use sequoia_core::{DailyLimitStatus, EnvironmentalSavings, IncrementOutcome, WeeklyGoals};

use crate::error::{Result, StorageError};
use crate::models::{
    keys, CompressionRecord, NewCompressionRecord, Setting, SettingsSnapshot,
};
use crate::pool::ConnectionPool;
use crate::repository::{
    create_preview, hash_prompt, CompressionsRepo, SavingsRepo, SettingsRepo, UsageRepo,
};

/// High-level database interface for Sequoia.
#[derive(Clone)]
pub struct Database {
    pool: ConnectionPool,
}

impl Database {
    /// Create a new database in the default app data directory.
    pub fn new() -> Result<Self> {
        Self::with_path(Self::default_db_path()?)
    }

    /// Create a new database at a specific path.
    pub fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening database at: {:?}", path);
        let pool = ConnectionPool::new(&path)?;

        Ok(Self { pool })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let pool = ConnectionPool::in_memory()?;
        Ok(Self { pool })
    }

    /// Get the default database path.
    pub fn default_db_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "sequoia", "sequoia")
            .ok_or(StorageError::NoDataDir)?;

        Ok(proj_dirs.data_dir().join("sequoia.db"))
    }

    // === Install ===

    /// Writes the install defaults for every key that is not set yet.
    ///
    /// Existing values are left alone, so this is safe on every start.
    /// Returns the number of keys written.
    pub fn initialize_defaults(&self, today: NaiveDate) -> Result<usize> {
        let conn = self.pool.get()?;
        let goals = WeeklyGoals::default();

        let defaults = [
            (keys::IS_PAUSED, json!(false)),
            (keys::DAILY_LIMIT, json!(0)),
            (keys::DAILY_MESSAGE_COUNT, json!(0)),
            (
                keys::LAST_RESET_DATE,
                json!(today.format(DATE_FORMAT).to_string()),
            ),
            (keys::CO2_SAVED, json!(0.0)),
            (keys::WATER_SAVED, json!(0.0)),
            (keys::WELCOME_COMPLETED, json!(false)),
            (keys::WEEKLY_WATER_GOAL, json!(goals.water_liters)),
            (keys::WEEKLY_CO2_GOAL, json!(goals.co2_kg)),
        ];

        let tx = conn.unchecked_transaction()?;
        let mut written = 0;
        for (key, value) in &defaults {
            if SettingsRepo::set_if_missing(&tx, key, value)? {
                written += 1;
            }
        }
        tx.commit()?;

        if written > 0 {
            info!(written, "Initialized default settings");
        }
        Ok(written)
    }

    // === Daily limit ===

    /// Rolls the counter over if the day changed and reports the status.
    pub fn check_daily_limit(&self, today: NaiveDate) -> Result<DailyLimitStatus> {
        let conn = self.pool.get()?;
        UsageRepo::check_and_reset(&conn, today)
    }

    /// Counts one message for `today`.
    pub fn increment_daily_count(&self, today: NaiveDate) -> Result<IncrementOutcome> {
        let conn = self.pool.get()?;
        UsageRepo::increment(&conn, today)
    }

    /// Sets the daily limit (clamped to 0..=100) and returns the stored value.
    pub fn set_daily_limit(&self, limit: i64) -> Result<u32> {
        let conn = self.pool.get()?;
        UsageRepo::set_daily_limit(&conn, limit)
    }

    // === Pause ===

    pub fn is_paused(&self) -> Result<bool> {
        let conn = self.pool.get()?;
        SettingsRepo::get_or_default(&conn, keys::IS_PAUSED, false)
    }

    pub fn set_paused(&self, paused: bool) -> Result<()> {
        let conn = self.pool.get()?;
        SettingsRepo::set(&conn, keys::IS_PAUSED, &json!(paused))
    }

    // === Savings ===

    /// Running savings totals.
    pub fn savings(&self) -> Result<EnvironmentalSavings> {
        let conn = self.pool.get()?;
        SavingsRepo::totals(&conn)
    }

    /// Credits savings for tokens removed today; returns the new totals.
    pub fn credit_savings(&self, today: NaiveDate, tokens_saved: u64) -> Result<EnvironmentalSavings> {
        let conn = self.pool.get()?;
        SavingsRepo::credit(&conn, today, tokens_saved)
    }

    pub fn reset_savings(&self) -> Result<()> {
        let conn = self.pool.get()?;
        SavingsRepo::reset(&conn)
    }

    /// Savings over the seven days ending on `today`.
    pub fn week_savings(&self, today: NaiveDate) -> Result<EnvironmentalSavings> {
        let conn = self.pool.get()?;
        SavingsRepo::last_seven_days(&conn, today)
    }

    // === Goals ===

    pub fn weekly_goals(&self) -> Result<WeeklyGoals> {
        let conn = self.pool.get()?;
        let defaults = WeeklyGoals::default();
        let water = SettingsRepo::get_or_default(&conn, keys::WEEKLY_WATER_GOAL, defaults.water_liters)?;
        let co2 = SettingsRepo::get_or_default(&conn, keys::WEEKLY_CO2_GOAL, defaults.co2_kg)?;
        Ok(WeeklyGoals::clamped(water, co2))
    }

    /// Stores the goals after clamping and returns what was stored.
    pub fn set_weekly_goals(&self, water_liters: f64, co2_kg: f64) -> Result<WeeklyGoals> {
        let goals = WeeklyGoals::clamped(water_liters, co2_kg);
        let conn = self.pool.get()?;
        let tx = conn.unchecked_transaction()?;
        SettingsRepo::set(&tx, keys::WEEKLY_WATER_GOAL, &json!(goals.water_liters))?;
        SettingsRepo::set(&tx, keys::WEEKLY_CO2_GOAL, &json!(goals.co2_kg))?;
        tx.commit()?;
        Ok(goals)
    }

    // === Welcome ===

    pub fn welcome_completed(&self) -> Result<bool> {
        let conn = self.pool.get()?;
        SettingsRepo::get_or_default(&conn, keys::WELCOME_COMPLETED, false)
    }

    pub fn complete_welcome(&self) -> Result<()> {
        let conn = self.pool.get()?;
        SettingsRepo::set(&conn, keys::WELCOME_COMPLETED, &json!(true))
    }

    // === Compression log ===

    /// Log a compression attempt for a prompt.
    ///
    /// Only the hash and a short preview of the prompt are stored.
    pub fn record_compression(
        &self,
        prompt: &str,
        source: Option<String>,
        success: bool,
        method: Option<String>,
        original_tokens: Option<i64>,
        compressed_tokens: Option<i64>,
    ) -> Result<i64> {
        let conn = self.pool.get()?;

        let record = NewCompressionRecord {
            prompt_hash: hash_prompt(prompt),
            preview: create_preview(prompt),
            source,
            success,
            method,
            original_tokens,
            compressed_tokens,
        };

        CompressionsRepo::insert(&conn, record)
    }

    pub fn recent_compressions(&self, limit: i64, offset: i64) -> Result<Vec<CompressionRecord>> {
        let conn = self.pool.get()?;
        CompressionsRepo::get_recent(&conn, limit, offset)
    }

    pub fn count_compressions(&self) -> Result<i64> {
        let conn = self.pool.get()?;
        CompressionsRepo::count(&conn)
    }

    // === Settings ===

    pub fn get_setting(&self, key: &str) -> Result<Option<Setting>> {
        let conn = self.pool.get()?;
        SettingsRepo::get(&conn, key)
    }

    pub fn set_setting(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let conn = self.pool.get()?;
        SettingsRepo::set(&conn, key, value)
    }

    /// Every user-facing setting, with the counter rolled over first.
    pub fn settings_snapshot(&self, today: NaiveDate) -> Result<SettingsSnapshot> {
        let status = self.check_daily_limit(today)?;
        let goals = self.weekly_goals()?;

        let conn = self.pool.get()?;
        let state = UsageRepo::load(&conn, today)?;

        Ok(SettingsSnapshot {
            is_paused: SettingsRepo::get_or_default(&conn, keys::IS_PAUSED, false)?,
            welcome_completed: SettingsRepo::get_or_default(&conn, keys::WELCOME_COMPLETED, false)?,
            daily_limit: status.daily_limit,
            daily_message_count: status.daily_message_count,
            last_reset_date: state.last_reset_date,
            savings: SavingsRepo::totals(&conn)?,
            weekly_goals: goals,
        })
    }
}
