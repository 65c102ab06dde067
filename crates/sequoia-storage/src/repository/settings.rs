//! Settings repository.
//!
//! Values are stored as JSON and always written as whole keys.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::models::Setting;

/// Repository for settings operations.
pub struct SettingsRepo;

impl SettingsRepo {
    /// Get a setting.
    pub fn get(conn: &Connection, key: &str) -> Result<Option<Setting>> {
        let setting = conn
            .query_row(
                "SELECT key, value FROM settings WHERE key = ?1",
                [key],
                |row| {
                    let value_str: String = row.get(1)?;
                    Ok(Setting {
                        key: row.get(0)?,
                        value: serde_json::from_str(&value_str)
                            .unwrap_or(serde_json::Value::Null),
                    })
                },
            )
            .optional()?;

        Ok(setting)
    }

    /// Set a setting (insert or replace).
    pub fn set(conn: &Connection, key: &str, value: &serde_json::Value) -> Result<()> {
        let value_json = serde_json::to_string(value)?;

        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value_json],
        )?;

        Ok(())
    }

    /// Set a setting only if the key does not exist yet.
    ///
    /// Returns true if the value was written.
    pub fn set_if_missing(conn: &Connection, key: &str, value: &serde_json::Value) -> Result<bool> {
        let value_json = serde_json::to_string(value)?;

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value_json],
        )?;

        Ok(inserted > 0)
    }

    /// Delete a setting.
    pub fn delete(conn: &Connection, key: &str) -> Result<bool> {
        let deleted = conn.execute("DELETE FROM settings WHERE key = ?1", [key])?;
        Ok(deleted > 0)
    }

    /// Get all settings.
    pub fn get_all(conn: &Connection) -> Result<Vec<Setting>> {
        let mut stmt = conn.prepare("SELECT key, value FROM settings ORDER BY key")?;

        let settings = stmt
            .query_map([], |row| {
                let value_str: String = row.get(1)?;
                Ok(Setting {
                    key: row.get(0)?,
                    value: serde_json::from_str(&value_str).unwrap_or(serde_json::Value::Null),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(settings)
    }

    /// Get a typed setting, falling back to `default` when missing or malformed.
    pub fn get_or_default<T: serde::de::DeserializeOwned>(
        conn: &Connection,
        key: &str,
        default: T,
    ) -> Result<T> {
        match Self::get(conn, key)? {
            Some(setting) => Ok(serde_json::from_value(setting.value).unwrap_or(default)),
            None => Ok(default),
        }
    }
}
