//! Database schema and migrations.

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::Result;

/// Migrations in order; entry `i` brings the schema to version `i + 1`.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "settings and compression log",
        "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- hash and preview only, never the prompt itself
        CREATE TABLE IF NOT EXISTS compression_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            prompt_hash TEXT NOT NULL,
            preview TEXT NOT NULL,
            source TEXT,
            success INTEGER NOT NULL,
            method TEXT,
            original_tokens INTEGER,
            compressed_tokens INTEGER,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_compression_log_created_at
            ON compression_log (created_at);",
    ),
    (
        "daily savings",
        "CREATE TABLE IF NOT EXISTS daily_savings (
            date TEXT PRIMARY KEY,
            co2_saved REAL NOT NULL DEFAULT 0,
            water_saved REAL NOT NULL DEFAULT 0,
            tokens_saved INTEGER NOT NULL DEFAULT 0,
            compressions INTEGER NOT NULL DEFAULT 0
        );",
    ),
];

/// Current schema version.
pub const SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

/// Applies every pending migration in one transaction.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    info!(
        "Running migrations from version {} to {}",
        current_version, SCHEMA_VERSION
    );

    let tx = conn.unchecked_transaction()?;
    let pending = MIGRATIONS.iter().zip(1..).skip(current_version.max(0) as usize);
    for ((name, sql), version) in pending {
        info!("Applying migration v{}: {}", version, name);
        tx.execute_batch(sql)?;
    }
    set_schema_version(&tx, SCHEMA_VERSION)?;
    tx.commit()?;

    info!("Migrations complete");
    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_create_tables() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        for table in ["settings", "compression_log", "daily_savings"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }

        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn upgrade_from_v1_adds_daily_savings() {
        let conn = Connection::open_in_memory().unwrap();
        get_schema_version(&conn).unwrap();
        conn.execute_batch(MIGRATIONS[0].1).unwrap();
        set_schema_version(&conn, 1).unwrap();
        conn.execute(
            "INSERT INTO settings (key, value) VALUES ('dailyLimit', '3')",
            [],
        )
        .unwrap();

        run_migrations(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
        let kept: String = conn
            .query_row("SELECT value FROM settings WHERE key = 'dailyLimit'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(kept, "3");
        let days: i64 = conn
            .query_row("SELECT COUNT(*) FROM daily_savings", [], |row| row.get(0))
            .unwrap();
        assert_eq!(days, 0);
    }
}
