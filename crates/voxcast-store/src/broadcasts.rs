//! Broadcast campaign persistence: CRUD, lifecycle transitions, audio
//! assets and statistics recomputation.
//!
//! Statistics are always recomputed from the calls table
//! ([`compute_stats`]); nothing incremental is persisted, so readers can
//! never observe drift between counters and rows.

use crate::error::StoreError;
use rusqlite::{params, Connection, OptionalExtension};
use voxcast_types::{
    AudioAsset, Broadcast, BroadcastConfig, BroadcastStats, BroadcastStatus, CallStatus,
    VoiceProfile,
};

/// Parameters for creating a campaign row.
#[derive(Debug, Clone)]
pub struct NewBroadcast {
    pub id: String,
    pub name: String,
    pub message_template: String,
    pub voice: VoiceProfile,
    pub config: BroadcastConfig,
    pub owner_id: String,
    pub created_at: i64,
}

/// Inserts a campaign in `draft` state.
pub fn create_broadcast(conn: &Connection, new: &NewBroadcast) -> Result<(), StoreError> {
    let voice_json = serde_json::to_string(&new.voice)?;
    let config_json = serde_json::to_string(&new.config)?;

    conn.execute(
        "INSERT INTO broadcasts (id, name, message_template, voice_json, status, config_json, owner_id, created_at)
         VALUES (?1, ?2, ?3, ?4, 'draft', ?5, ?6, ?7)",
        params![
            new.id,
            new.name,
            new.message_template,
            voice_json,
            config_json,
            new.owner_id,
            new.created_at,
        ],
    )?;
    Ok(())
}

fn broadcast_from_row(row: &rusqlite::Row<'_>) -> Result<Broadcast, rusqlite::Error> {
    let voice_json: String = row.get(3)?;
    let status_str: String = row.get(4)?;
    let config_json: String = row.get(5)?;

    let voice: VoiceProfile = serde_json::from_str(&voice_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let config: BroadcastConfig = serde_json::from_str(&config_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let status = BroadcastStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown broadcast status '{status_str}'").into(),
        )
    })?;

    Ok(Broadcast {
        id: row.get(0)?,
        name: row.get(1)?,
        message_template: row.get(2)?,
        voice,
        status,
        config,
        owner_id: row.get(6)?,
        created_at: row.get(7)?,
        started_at: row.get(8)?,
        completed_at: row.get(9)?,
    })
}

const BROADCAST_COLUMNS: &str = "id, name, message_template, voice_json, status, config_json, \
                                 owner_id, created_at, started_at, completed_at";

/// Fetches a campaign by id.
pub fn get_broadcast(conn: &Connection, id: &str) -> Result<Broadcast, StoreError> {
    let sql = format!("SELECT {BROADCAST_COLUMNS} FROM broadcasts WHERE id = ?1");
    conn.query_row(&sql, params![id], broadcast_from_row)
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("broadcast {id}")))
}

/// Lists an owner's campaigns, newest first, with an optional status filter.
/// Returns the page plus the unpaged total.
pub fn list_broadcasts(
    conn: &Connection,
    owner_id: &str,
    status: Option<BroadcastStatus>,
    page: u32,
    limit: u32,
) -> Result<(Vec<Broadcast>, u64), StoreError> {
    let offset = u64::from(page.saturating_sub(1)) * u64::from(limit);

    let (rows, total) = match status {
        Some(status) => {
            let sql = format!(
                "SELECT {BROADCAST_COLUMNS} FROM broadcasts
                 WHERE owner_id = ?1 AND status = ?2
                 ORDER BY created_at DESC, id LIMIT ?3 OFFSET ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![owner_id, status.as_str(), limit, offset],
                    broadcast_from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            let total: u64 = conn.query_row(
                "SELECT COUNT(*) FROM broadcasts WHERE owner_id = ?1 AND status = ?2",
                params![owner_id, status.as_str()],
                |row| row.get(0),
            )?;
            (rows, total)
        }
        None => {
            let sql = format!(
                "SELECT {BROADCAST_COLUMNS} FROM broadcasts
                 WHERE owner_id = ?1
                 ORDER BY created_at DESC, id LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![owner_id, limit, offset], broadcast_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            let total: u64 = conn.query_row(
                "SELECT COUNT(*) FROM broadcasts WHERE owner_id = ?1",
                params![owner_id],
                |row| row.get(0),
            )?;
            (rows, total)
        }
    };

    Ok((rows, total))
}

/// Moves a campaign to a new status unless it is already terminal.
/// Returns whether a row changed.
pub fn update_status(
    conn: &Connection,
    id: &str,
    status: BroadcastStatus,
) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE broadcasts SET status = ?2
         WHERE id = ?1 AND status NOT IN ('completed', 'cancelled')",
        params![id, status.as_str()],
    )?;
    Ok(changed > 0)
}

/// `queued → in_progress`, recording `started_at` exactly once.
pub fn mark_started(conn: &Connection, id: &str, now: i64) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE broadcasts
         SET status = 'in_progress', started_at = COALESCE(started_at, ?2)
         WHERE id = ?1 AND status = 'queued'",
        params![id, now],
    )?;
    Ok(changed > 0)
}

/// Terminal `completed` transition; a no-op for already-terminal campaigns,
/// so the drained-population check can fire at most once.
pub fn mark_completed(conn: &Connection, id: &str, now: i64) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE broadcasts SET status = 'completed', completed_at = ?2
         WHERE id = ?1 AND status NOT IN ('completed', 'cancelled')",
        params![id, now],
    )?;
    Ok(changed > 0)
}

/// Terminal `cancelled` transition.
pub fn mark_cancelled(conn: &Connection, id: &str, now: i64) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE broadcasts SET status = 'cancelled', completed_at = ?2
         WHERE id = ?1 AND status NOT IN ('completed', 'cancelled')",
        params![id, now],
    )?;
    Ok(changed > 0)
}

/// Deletes a campaign. Calls and audio assets cascade.
pub fn delete_broadcast(conn: &Connection, id: &str) -> Result<bool, StoreError> {
    let deleted = conn.execute("DELETE FROM broadcasts WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

/// Attaches a synthesized asset to a campaign. Duplicate keys are ignored
/// (the asset is already materialized).
pub fn attach_audio_asset(
    conn: &Connection,
    broadcast_id: &str,
    asset: &AudioAsset,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO audio_assets (broadcast_id, unique_key, text, audio_url, duration_secs, generated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            broadcast_id,
            asset.unique_key,
            asset.text,
            asset.audio_url,
            asset.duration_secs,
            asset.generated_at,
        ],
    )?;
    Ok(())
}

fn asset_from_row(row: &rusqlite::Row<'_>) -> Result<AudioAsset, rusqlite::Error> {
    Ok(AudioAsset {
        unique_key: row.get(0)?,
        text: row.get(1)?,
        audio_url: row.get(2)?,
        duration_secs: row.get(3)?,
        generated_at: row.get(4)?,
    })
}

/// Finds an already-materialized asset by its content key.
pub fn find_audio_asset(
    conn: &Connection,
    broadcast_id: &str,
    unique_key: &str,
) -> Result<Option<AudioAsset>, StoreError> {
    let asset = conn
        .query_row(
            "SELECT unique_key, text, audio_url, duration_secs, generated_at
             FROM audio_assets WHERE broadcast_id = ?1 AND unique_key = ?2",
            params![broadcast_id, unique_key],
            asset_from_row,
        )
        .optional()?;
    Ok(asset)
}

/// All assets attached to a campaign (used for CDN cleanup on delete).
pub fn list_audio_assets(
    conn: &Connection,
    broadcast_id: &str,
) -> Result<Vec<AudioAsset>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT unique_key, text, audio_url, duration_secs, generated_at
         FROM audio_assets WHERE broadcast_id = ?1 ORDER BY id",
    )?;
    let assets = stmt
        .query_map(params![broadcast_id], asset_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(assets)
}

/// Campaigns the dispatch engine should be driving: `queued` or
/// `in_progress`. Used to re-register campaigns after a restart.
pub fn list_dispatchable_ids(conn: &Connection) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id FROM broadcasts WHERE status IN ('queued', 'in_progress') ORDER BY created_at",
    )?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Recomputes campaign statistics from the calls table.
pub fn compute_stats(conn: &Connection, broadcast_id: &str) -> Result<BroadcastStats, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM calls WHERE broadcast_id = ?1 GROUP BY status",
    )?;
    let rows = stmt.query_map(params![broadcast_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
    })?;

    let mut stats = BroadcastStats::default();
    for row in rows {
        let (status_str, count) = row?;
        let Some(status) = CallStatus::parse(&status_str) else {
            tracing::warn!(status = %status_str, "unknown call status in aggregate");
            continue;
        };
        stats.total += count;
        match status {
            CallStatus::Queued => stats.queued += count,
            CallStatus::Calling => stats.calling += count,
            CallStatus::Ringing => stats.ringing += count,
            CallStatus::InProgress => stats.in_progress += count,
            CallStatus::Answered => stats.answered += count,
            CallStatus::Completed => stats.completed += count,
            CallStatus::Failed => stats.failed += count,
            CallStatus::Busy => stats.busy += count,
            CallStatus::NoAnswer => stats.no_answer += count,
            CallStatus::Cancelled => stats.cancelled += count,
            CallStatus::OptedOut => stats.opted_out += count,
        }
    }
    Ok(stats)
}
