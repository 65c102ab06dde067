//! Environmental savings repository.
//!
//! The running totals live in the `co2Saved` / `waterSaved` settings keys.
//! Each credit is also added to a per-day row so the last week can be
//! compared against the weekly goals.

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde_json::json;

use sequoia_core::rate_limit::DATE_FORMAT;
use sequoia_core::EnvironmentalSavings;

use crate::error::Result;
use crate::models::{keys, DailySavings};
use crate::repository::SettingsRepo;

/// Repository for savings totals and per-day savings.
pub struct SavingsRepo;

impl SavingsRepo {
    /// Current running totals.
    pub fn totals(conn: &Connection) -> Result<EnvironmentalSavings> {
        Ok(EnvironmentalSavings {
            co2_saved: SettingsRepo::get_or_default(conn, keys::CO2_SAVED, 0.0)?,
            water_saved: SettingsRepo::get_or_default(conn, keys::WATER_SAVED, 0.0)?,
        })
    }

    /// Credits savings for `tokens_saved` tokens on `date`.
    ///
    /// Returns the new totals.
    pub fn credit(
        conn: &Connection,
        date: NaiveDate,
        tokens_saved: u64,
    ) -> Result<EnvironmentalSavings> {
        let delta = EnvironmentalSavings::from_tokens(tokens_saved);
        let tx = conn.unchecked_transaction()?;

        let mut totals = Self::totals(&tx)?;
        totals.add(delta);
        SettingsRepo::set(&tx, keys::CO2_SAVED, &json!(totals.co2_saved))?;
        SettingsRepo::set(&tx, keys::WATER_SAVED, &json!(totals.water_saved))?;

        tx.execute(
            "INSERT INTO daily_savings (date, co2_saved, water_saved, tokens_saved, compressions)
             VALUES (?1, ?2, ?3, ?4, 1)
             ON CONFLICT(date) DO UPDATE SET
                co2_saved = co2_saved + ?2,
                water_saved = water_saved + ?3,
                tokens_saved = tokens_saved + ?4,
                compressions = compressions + 1",
            params![
                date.format(DATE_FORMAT).to_string(),
                delta.co2_saved,
                delta.water_saved,
                i64::try_from(tokens_saved).unwrap_or(i64::MAX)
            ],
        )?;

        tx.commit()?;
        Ok(totals)
    }

    /// Zeroes the totals and forgets the per-day history.
    pub fn reset(conn: &Connection) -> Result<()> {
        let tx = conn.unchecked_transaction()?;
        SettingsRepo::set(&tx, keys::CO2_SAVED, &json!(0.0))?;
        SettingsRepo::set(&tx, keys::WATER_SAVED, &json!(0.0))?;
        tx.execute("DELETE FROM daily_savings", [])?;
        tx.commit()?;
        Ok(())
    }

    /// Per-day savings for a date range (inclusive), oldest first.
    pub fn get_range(
        conn: &Connection,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailySavings>> {
        let start_str = start.format(DATE_FORMAT).to_string();
        let end_str = end.format(DATE_FORMAT).to_string();

        let mut stmt = conn.prepare(
            "SELECT date, co2_saved, water_saved, tokens_saved, compressions
             FROM daily_savings WHERE date >= ?1 AND date <= ?2 ORDER BY date ASC",
        )?;

        let rows = stmt
            .query_map([&start_str, &end_str], map_row)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(rows)
    }

    /// Sum of the seven days ending on `today`.
    pub fn last_seven_days(conn: &Connection, today: NaiveDate) -> Result<EnvironmentalSavings> {
        let start = today - chrono::Duration::days(6);
        let mut week = EnvironmentalSavings::default();
        for day in Self::get_range(conn, start, today)? {
            week.add(day.savings());
        }
        Ok(week)
    }
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DailySavings> {
    let date_str: String = row.get(0)?;
    Ok(DailySavings {
        date: NaiveDate::parse_from_str(&date_str, DATE_FORMAT)
            .unwrap_or_else(|_| Utc::now().date_naive()),
        co2_saved: row.get(1)?,
        water_saved: row.get(2)?,
        tokens_saved: row.get(3)?,
        compressions: row.get(4)?,
    })
}
