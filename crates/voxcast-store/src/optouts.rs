//! Global opt-out store.
//!
//! SQLite has no TTL index, so expiry is enforced at the edges: every read
//! filters on `expires_at`, and writes purge expired rows opportunistically.
//! No background sweeper exists.

use crate::error::StoreError;
use rusqlite::{params, Connection, OptionalExtension};
use voxcast_types::{OptOut, OptOutSource};

/// Default opt-out lifetime: ten years, effectively permanent.
pub const DEFAULT_OPT_OUT_TTL_MS: i64 = 10 * 365 * 24 * 60 * 60 * 1000;

/// Inserts or refreshes an opt-out for a phone number.
///
/// An existing record is overwritten with the new source and expiry, so a
/// manual opt-out can extend one that arrived via keypress.
pub fn upsert_opt_out(
    conn: &Connection,
    phone: &str,
    source: OptOutSource,
    expires_at: i64,
    metadata: &serde_json::Map<String, serde_json::Value>,
    now: i64,
) -> Result<(), StoreError> {
    purge_expired(conn, now)?;

    let metadata_json = serde_json::to_string(metadata)?;
    conn.execute(
        "INSERT INTO opt_outs (phone, source, opted_out_at, expires_at, metadata_json)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (phone) DO UPDATE SET
            source = excluded.source,
            opted_out_at = excluded.opted_out_at,
            expires_at = excluded.expires_at,
            metadata_json = excluded.metadata_json",
        params![phone, source.as_str(), now, expires_at, metadata_json],
    )?;
    Ok(())
}

/// Whether the phone has an active (unexpired) opt-out.
pub fn is_active_opt_out(conn: &Connection, phone: &str, now: i64) -> Result<bool, StoreError> {
    let active: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM opt_outs WHERE phone = ?1 AND expires_at > ?2)",
        params![phone, now],
        |row| row.get(0),
    )?;
    Ok(active)
}

/// Fetches the active record for a phone, if any.
pub fn get_opt_out(conn: &Connection, phone: &str, now: i64) -> Result<Option<OptOut>, StoreError> {
    let row = conn
        .query_row(
            "SELECT phone, source, opted_out_at, expires_at, metadata_json
             FROM opt_outs WHERE phone = ?1 AND expires_at > ?2",
            params![phone, now],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((phone, source_str, opted_out_at, expires_at, metadata_json)) = row else {
        return Ok(None);
    };
    let source = OptOutSource::parse(&source_str).ok_or_else(|| {
        StoreError::NotFound(format!("opt-out source '{source_str}'"))
    })?;
    let metadata = serde_json::from_str(&metadata_json)?;

    Ok(Some(OptOut {
        phone,
        source,
        opted_out_at,
        expires_at,
        metadata,
    }))
}

/// Removes an opt-out (operator action).
pub fn delete_opt_out(conn: &Connection, phone: &str) -> Result<bool, StoreError> {
    let deleted = conn.execute("DELETE FROM opt_outs WHERE phone = ?1", params![phone])?;
    Ok(deleted > 0)
}

fn purge_expired(conn: &Connection, now: i64) -> Result<(), StoreError> {
    let purged = conn.execute("DELETE FROM opt_outs WHERE expires_at <= ?1", params![now])?;
    if purged > 0 {
        tracing::debug!(count = purged, "purged expired opt-outs");
    }
    Ok(())
}
