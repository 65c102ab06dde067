//! Compression log repository.
//!
//! Prompts are never stored in full: each row keeps a SHA-256 hash and a
//! short preview.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::models::{CompressionRecord, NewCompressionRecord};

/// Maximum preview length in characters.
const PREVIEW_MAX_LEN: usize = 50;

const SELECT_COLUMNS: &str = "SELECT id, prompt_hash, preview, source, success, method,
        original_tokens, compressed_tokens, created_at FROM compression_log";

/// Repository for compression log operations.
pub struct CompressionsRepo;

impl CompressionsRepo {
    /// Insert a new record.
    pub fn insert(conn: &Connection, record: NewCompressionRecord) -> Result<i64> {
        conn.execute(
            "INSERT INTO compression_log
                (prompt_hash, preview, source, success, method, original_tokens, compressed_tokens)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.prompt_hash,
                record.preview,
                record.source,
                record.success,
                record.method,
                record.original_tokens,
                record.compressed_tokens,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Get recent records, newest first.
    pub fn get_recent(conn: &Connection, limit: i64, offset: i64) -> Result<Vec<CompressionRecord>> {
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} ORDER BY id DESC LIMIT ?1 OFFSET ?2"
        ))?;

        let records = stmt
            .query_map([limit, offset], map_row)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(records)
    }

    /// Count all records.
    pub fn count(conn: &Connection) -> Result<i64> {
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM compression_log", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Count successful compressions.
    pub fn count_successful(conn: &Connection) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM compression_log WHERE success = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Delete records older than a given time.
    pub fn delete_older_than(conn: &Connection, before: DateTime<Utc>) -> Result<i64> {
        let deleted = conn.execute(
            "DELETE FROM compression_log WHERE created_at < ?1",
            [before.format("%Y-%m-%d %H:%M:%S").to_string()],
        )?;
        Ok(deleted as i64)
    }
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CompressionRecord> {
    Ok(CompressionRecord {
        id: row.get(0)?,
        prompt_hash: row.get(1)?,
        preview: row.get(2)?,
        source: row.get(3)?,
        success: row.get(4)?,
        method: row.get(5)?,
        original_tokens: row.get(6)?,
        compressed_tokens: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

/// Hash a prompt using SHA-256 (lowercase hex).
pub fn hash_prompt(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    format!("{:x}", digest)
}

/// Create a preview from a prompt: control characters dropped, cut at
/// 50 characters with a trailing ellipsis.
pub fn create_preview(prompt: &str) -> String {
    let cleaned: String = prompt
        .chars()
        .filter(|c| !c.is_control())
        .take(PREVIEW_MAX_LEN)
        .collect();

    if prompt.chars().count() > PREVIEW_MAX_LEN {
        format!("{}...", cleaned)
    } else {
        cleaned
    }
}

/// Parse a datetime from SQLite format.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}
