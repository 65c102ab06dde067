//! Daily message usage repository.
//!
//! Persists [`RateLimitState`] across the three settings keys it is made of.
//! Every operation that depends on the counter rolls it over first and runs
//! inside one transaction, so a reader never sees yesterday's count.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;

use sequoia_core::rate_limit::{clamp_daily_limit, DATE_FORMAT};
use sequoia_core::{DailyLimitStatus, IncrementOutcome, RateLimitState};

use crate::error::Result;
use crate::models::keys;
use crate::repository::SettingsRepo;

/// Repository for the daily limit and counter.
pub struct UsageRepo;

impl UsageRepo {
    /// Reads the stored state; missing keys read as install defaults.
    ///
    /// A missing or unreadable reset date is treated as a day that is not
    /// `today`, so the next check resets the counter.
    pub fn load(conn: &Connection, today: NaiveDate) -> Result<RateLimitState> {
        let daily_limit: i64 = SettingsRepo::get_or_default(conn, keys::DAILY_LIMIT, 0)?;
        let daily_message_count: i64 =
            SettingsRepo::get_or_default(conn, keys::DAILY_MESSAGE_COUNT, 0)?;
        let last_reset: Option<String> =
            SettingsRepo::get_or_default(conn, keys::LAST_RESET_DATE, None)?;

        let last_reset_date = last_reset
            .and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok())
            .unwrap_or_else(|| today.pred_opt().unwrap_or(NaiveDate::MIN));

        Ok(RateLimitState {
            daily_limit: clamp_daily_limit(daily_limit),
            daily_message_count: daily_message_count.clamp(0, u32::MAX as i64) as u32,
            last_reset_date,
        })
    }

    /// Writes the counter and reset date.
    pub fn store_counter(conn: &Connection, state: &RateLimitState) -> Result<()> {
        SettingsRepo::set(
            conn,
            keys::DAILY_MESSAGE_COUNT,
            &json!(state.daily_message_count),
        )?;
        SettingsRepo::set(
            conn,
            keys::LAST_RESET_DATE,
            &json!(state.last_reset_date.format(DATE_FORMAT).to_string()),
        )?;
        Ok(())
    }

    /// Rolls over if needed and reports whether the limit is reached.
    pub fn check_and_reset(conn: &Connection, today: NaiveDate) -> Result<DailyLimitStatus> {
        let tx = conn.unchecked_transaction()?;

        let mut state = Self::load(&tx, today)?;
        if state.roll_over(today) {
            Self::store_counter(&tx, &state)?;
            tracing::info!(date = %today, "Daily message count reset");
        }

        tx.commit()?;
        Ok(state.status())
    }

    /// Rolls over if needed and counts one message (capped at the limit).
    pub fn increment(conn: &Connection, today: NaiveDate) -> Result<IncrementOutcome> {
        let tx = conn.unchecked_transaction()?;

        let mut state = Self::load(&tx, today)?;
        let before = state;
        let outcome = state.increment(today);
        if state != before {
            Self::store_counter(&tx, &state)?;
        }

        tx.commit()?;
        Ok(outcome)
    }

    /// Sets the daily limit, clamped to the allowed range.
    ///
    /// Returns the stored value.
    pub fn set_daily_limit(conn: &Connection, limit: i64) -> Result<u32> {
        let limit = clamp_daily_limit(limit);
        SettingsRepo::set(conn, keys::DAILY_LIMIT, &json!(limit))?;
        Ok(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::run_migrations;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn missing_keys_read_as_defaults() {
        let conn = setup_db();
        let today = day(2025, 8, 3);

        let status = UsageRepo::check_and_reset(&conn, today).unwrap();
        assert_eq!(status, DailyLimitStatus::default());

        let state = UsageRepo::load(&conn, today).unwrap();
        assert_eq!(state.last_reset_date, today);
    }

    #[test]
    fn yesterday_count_is_reset_before_evaluation() {
        let conn = setup_db();
        let today = day(2025, 8, 3);

        UsageRepo::set_daily_limit(&conn, 3).unwrap();
        SettingsRepo::set(&conn, keys::DAILY_MESSAGE_COUNT, &json!(5)).unwrap();
        SettingsRepo::set(&conn, keys::LAST_RESET_DATE, &json!("2025-08-02")).unwrap();

        let status = UsageRepo::check_and_reset(&conn, today).unwrap();
        assert_eq!(status.daily_message_count, 0);
        assert!(!status.is_exceeded);

        let stored: String =
            SettingsRepo::get_or_default(&conn, keys::LAST_RESET_DATE, String::new()).unwrap();
        assert_eq!(stored, "2025-08-03");
    }

    #[test]
    fn increment_persists_and_caps() {
        let conn = setup_db();
        let today = day(2025, 8, 3);
        UsageRepo::set_daily_limit(&conn, 2).unwrap();

        assert_eq!(UsageRepo::increment(&conn, today).unwrap().count, 1);
        assert_eq!(UsageRepo::increment(&conn, today).unwrap().count, 2);

        let capped = UsageRepo::increment(&conn, today).unwrap();
        assert!(capped.capped);
        assert_eq!(capped.count, 2);

        let status = UsageRepo::check_and_reset(&conn, today).unwrap();
        assert!(status.is_exceeded);
        assert_eq!(status.daily_message_count, 2);
    }

    #[test]
    fn increment_on_a_new_day_starts_from_one() {
        let conn = setup_db();
        UsageRepo::increment(&conn, day(2025, 8, 2)).unwrap();
        UsageRepo::increment(&conn, day(2025, 8, 2)).unwrap();

        let outcome = UsageRepo::increment(&conn, day(2025, 8, 3)).unwrap();
        assert_eq!(outcome.count, 1);
    }

    #[test]
    fn unreadable_date_resets() {
        let conn = setup_db();
        let today = day(2025, 8, 3);
        SettingsRepo::set(&conn, keys::DAILY_MESSAGE_COUNT, &json!(9)).unwrap();
        SettingsRepo::set(&conn, keys::LAST_RESET_DATE, &json!("Sun Aug 03 2025")).unwrap();

        let status = UsageRepo::check_and_reset(&conn, today).unwrap();
        assert_eq!(status.daily_message_count, 0);
    }

    #[test]
    fn limit_is_clamped() {
        let conn = setup_db();
        assert_eq!(UsageRepo::set_daily_limit(&conn, 500).unwrap(), 100);
        assert_eq!(UsageRepo::set_daily_limit(&conn, -1).unwrap(), 0);
        assert_eq!(UsageRepo::set_daily_limit(&conn, 25).unwrap(), 25);
    }
}
