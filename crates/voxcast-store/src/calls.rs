//! Call persistence and the atomic per-call state machine.
//!
//! Webhook handlers and dispatch ticks both mutate call rows, concurrently
//! and in either order. Every mutation here is a single UPDATE whose WHERE
//! clause encodes the allowed transition, so whichever writer loses the
//! race becomes a no-op instead of a regression:
//!
//! - terminal states (`completed`, `failed`, `cancelled`, `opted_out`)
//!   accept nothing further;
//! - [`advance_status`] only moves forward along the
//!   `queued → calling → ringing → in_progress → answered` progression;
//! - [`mark_calling`] only claims a row that is still `queued`, while still
//!   backfilling the provider SID and counting the attempt if the webhook
//!   got there first.

use crate::error::StoreError;
use rusqlite::{params, Connection, OptionalExtension};
use voxcast_types::{Call, CallStatus, Contact};

const TERMINAL: &str = "('completed', 'failed', 'cancelled', 'opted_out')";
// Must match CallStatus::ACTIVE / CallStatus::PENDING.
const ACTIVE: &str = "('calling', 'ringing', 'in_progress', 'answered')";
const PENDING: &str = "('queued', 'calling', 'ringing', 'in_progress', 'answered')";

// SQL mirror of CallStatus::rank for the monotonic guard.
const RANK_CASE: &str = "CASE status
    WHEN 'queued' THEN 0
    WHEN 'calling' THEN 1
    WHEN 'ringing' THEN 2
    WHEN 'in_progress' THEN 3
    WHEN 'answered' THEN 4
    ELSE 6 END";

/// Retry policy parameters, taken from the campaign config.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay_ms: i64,
}

/// Parameters for creating one call row.
#[derive(Debug, Clone)]
pub struct NewCall {
    pub id: String,
    pub broadcast_id: String,
    pub contact: Contact,
    pub message_text: String,
    pub created_at: i64,
}

/// Batch-inserts the campaign's call rows inside one transaction.
pub fn create_calls(conn: &mut Connection, calls: &[NewCall]) -> Result<(), StoreError> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO calls (id, broadcast_id, phone, contact_name, custom_fields_json, message_text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for call in calls {
            let custom_fields =
                serde_json::to_string(&call.contact.custom_fields)?;
            stmt.execute(params![
                call.id,
                call.broadcast_id,
                call.contact.phone,
                call.contact.name,
                custom_fields,
                call.message_text,
                call.created_at,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn call_from_row(row: &rusqlite::Row<'_>) -> Result<Call, rusqlite::Error> {
    let custom_fields_json: String = row.get(4)?;
    let status_str: String = row.get(8)?;
    let metadata_json: String = row.get(19)?;

    let custom_fields = serde_json::from_str(&custom_fields_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let metadata = serde_json::from_str(&metadata_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(19, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let status = CallStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            8,
            rusqlite::types::Type::Text,
            format!("unknown call status '{status_str}'").into(),
        )
    })?;

    Ok(Call {
        id: row.get(0)?,
        broadcast_id: row.get(1)?,
        contact: Contact {
            phone: row.get(2)?,
            name: row.get(3)?,
            custom_fields,
        },
        message_text: row.get(5)?,
        audio_url: row.get(6)?,
        provider_sid: row.get(7)?,
        status,
        attempts: row.get(9)?,
        retry_after: row.get(10)?,
        duration_secs: row.get(11)?,
        start_time: row.get(12)?,
        answer_time: row.get(13)?,
        end_time: row.get(14)?,
        error_code: row.get(15)?,
        error_message: row.get(16)?,
        dnd_status: row.get(17)?,
        opted_out: row.get(18)?,
        metadata,
        created_at: row.get(20)?,
    })
}

const CALL_COLUMNS: &str = "id, broadcast_id, phone, contact_name, custom_fields_json, \
                            message_text, audio_url, provider_sid, status, attempts, \
                            retry_after, duration_secs, start_time, answer_time, end_time, \
                            error_code, error_message, dnd_status, opted_out, metadata_json, \
                            created_at";

/// Fetches a call by internal id.
pub fn get_call(conn: &Connection, id: &str) -> Result<Call, StoreError> {
    let sql = format!("SELECT {CALL_COLUMNS} FROM calls WHERE id = ?1");
    conn.query_row(&sql, params![id], call_from_row)
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("call {id}")))
}

/// Fetches a call by provider SID.
pub fn get_call_by_sid(conn: &Connection, sid: &str) -> Result<Option<Call>, StoreError> {
    let sql = format!("SELECT {CALL_COLUMNS} FROM calls WHERE provider_sid = ?1");
    Ok(conn
        .query_row(&sql, params![sid], call_from_row)
        .optional()?)
}

/// Resolves a webhook to its canonical call row.
///
/// Looks up by provider SID first; falls back to the internal id from the
/// callback URL and backfills the SID atomically. The fallback closes the
/// race where the first webhook outruns persistence of the dial response.
pub fn reconcile(
    conn: &Connection,
    internal_id: Option<&str>,
    provider_sid: &str,
) -> Result<Call, StoreError> {
    if let Some(call) = get_call_by_sid(conn, provider_sid)? {
        return Ok(call);
    }

    let id = internal_id
        .ok_or_else(|| StoreError::NotFound(format!("call with sid {provider_sid}")))?;

    let backfilled = conn.execute(
        "UPDATE calls SET provider_sid = ?2 WHERE id = ?1 AND provider_sid IS NULL",
        params![id, provider_sid],
    )?;
    if backfilled > 0 {
        tracing::debug!(call_id = id, sid = provider_sid, "backfilled provider sid");
    }

    get_call(conn, id)
}

/// Calls never dialed: `queued` with zero attempts, FIFO by creation.
pub fn get_fresh(conn: &Connection, broadcast_id: &str, limit: u32) -> Result<Vec<Call>, StoreError> {
    let sql = format!(
        "SELECT {CALL_COLUMNS} FROM calls
         WHERE broadcast_id = ?1 AND status = 'queued' AND attempts = 0
         ORDER BY created_at, id LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let calls = stmt
        .query_map(params![broadcast_id, limit], call_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(calls)
}

/// Calls whose retry delay has elapsed, soonest-due first.
pub fn get_retryable(
    conn: &Connection,
    broadcast_id: &str,
    limit: u32,
    max_retries: u32,
    now: i64,
) -> Result<Vec<Call>, StoreError> {
    let sql = format!(
        "SELECT {CALL_COLUMNS} FROM calls
         WHERE broadcast_id = ?1 AND status = 'queued'
           AND attempts > 0 AND attempts < ?2
           AND retry_after IS NOT NULL AND retry_after <= ?3
         ORDER BY retry_after, id LIMIT ?4"
    );
    let mut stmt = conn.prepare(&sql)?;
    let calls = stmt
        .query_map(
            params![broadcast_id, max_retries + 1, now, limit],
            call_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(calls)
}

/// Calls currently in flight with the provider.
pub fn count_active(conn: &Connection, broadcast_id: &str) -> Result<u64, StoreError> {
    let sql = format!(
        "SELECT COUNT(*) FROM calls WHERE broadcast_id = ?1 AND status IN {ACTIVE}"
    );
    Ok(conn.query_row(&sql, params![broadcast_id], |row| row.get(0))?)
}

/// Calls that keep the campaign from completing: queued or in flight.
pub fn count_pending(conn: &Connection, broadcast_id: &str) -> Result<u64, StoreError> {
    let sql = format!(
        "SELECT COUNT(*) FROM calls WHERE broadcast_id = ?1 AND status IN {PENDING}"
    );
    Ok(conn.query_row(&sql, params![broadcast_id], |row| row.get(0))?)
}

/// Records a successful dial: backfills the SID, counts the attempt, stamps
/// the start time, and moves `queued → calling`. If the first webhook
/// already advanced the row, the status stays where the webhook put it.
pub fn mark_calling(
    conn: &Connection,
    id: &str,
    provider_sid: &str,
    now: i64,
) -> Result<bool, StoreError> {
    let changed = conn.execute(
        &format!(
            "UPDATE calls SET
                provider_sid = COALESCE(provider_sid, ?2),
                attempts = attempts + 1,
                start_time = COALESCE(start_time, ?3),
                retry_after = NULL,
                status = CASE WHEN status = 'queued' THEN 'calling' ELSE status END
             WHERE id = ?1 AND status NOT IN {TERMINAL}"
        ),
        params![id, provider_sid, now],
    )?;
    Ok(changed > 0)
}

/// Applies a forward-only, non-terminal status from a webhook.
///
/// The rank guard makes a stale event (or a late dispatch-side `calling`)
/// a no-op; `answer_time` is stamped the first time the call is answered.
pub fn advance_status(
    conn: &Connection,
    id: &str,
    status: CallStatus,
    now: i64,
) -> Result<bool, StoreError> {
    debug_assert!(!status.is_terminal(), "terminal states have dedicated ops");
    let changed = conn.execute(
        &format!(
            "UPDATE calls SET
                status = ?2,
                answer_time = CASE WHEN ?2 IN ('in_progress', 'answered')
                                   THEN COALESCE(answer_time, ?3)
                                   ELSE answer_time END
             WHERE id = ?1 AND status NOT IN {TERMINAL} AND ({RANK_CASE}) < ?4"
        ),
        params![id, status.as_str(), now, status.rank()],
    )?;
    Ok(changed > 0)
}

/// Terminal `completed` with the provider-reported duration.
pub fn mark_completed(
    conn: &Connection,
    id: &str,
    duration_secs: Option<i64>,
    now: i64,
) -> Result<bool, StoreError> {
    let changed = conn.execute(
        &format!(
            "UPDATE calls SET
                status = 'completed',
                duration_secs = COALESCE(?2, duration_secs),
                end_time = ?3,
                retry_after = NULL
             WHERE id = ?1 AND status NOT IN {TERMINAL}"
        ),
        params![id, duration_secs, now],
    )?;
    Ok(changed > 0)
}

/// Applies the retry policy to a failed call whose attempt was already
/// counted by [`mark_calling`]: back to `queued` with a retry deadline
/// while attempts remain, terminal `failed` otherwise.
pub fn mark_failed(
    conn: &Connection,
    id: &str,
    error_code: Option<&str>,
    error_message: Option<&str>,
    retry: bool,
    policy: RetryPolicy,
    now: i64,
) -> Result<bool, StoreError> {
    let max_attempts = i64::from(policy.max_retries) + 1;
    let changed = conn.execute(
        &format!(
            "UPDATE calls SET
                status = CASE WHEN ?2 AND attempts < ?3 THEN 'queued' ELSE 'failed' END,
                retry_after = CASE WHEN ?2 AND attempts < ?3 THEN ?4 + ?5 ELSE NULL END,
                end_time = CASE WHEN ?2 AND attempts < ?3 THEN end_time ELSE ?4 END,
                error_code = COALESCE(?6, error_code),
                error_message = COALESCE(?7, error_message)
             WHERE id = ?1 AND status NOT IN {TERMINAL}"
        ),
        params![
            id,
            retry,
            max_attempts,
            now,
            policy.retry_delay_ms,
            error_code,
            error_message,
        ],
    )?;
    Ok(changed > 0)
}

/// Like [`mark_failed`], but also counts the attempt: the dial request
/// itself threw, so [`mark_calling`] never ran for this attempt.
pub fn mark_dial_failed(
    conn: &Connection,
    id: &str,
    error_code: Option<&str>,
    error_message: Option<&str>,
    policy: RetryPolicy,
    now: i64,
) -> Result<bool, StoreError> {
    let max_attempts = i64::from(policy.max_retries) + 1;
    let changed = conn.execute(
        &format!(
            "UPDATE calls SET
                attempts = attempts + 1,
                status = CASE WHEN attempts + 1 < ?2 THEN 'queued' ELSE 'failed' END,
                retry_after = CASE WHEN attempts + 1 < ?2 THEN ?3 + ?4 ELSE NULL END,
                end_time = CASE WHEN attempts + 1 < ?2 THEN end_time ELSE ?3 END,
                error_code = ?5,
                error_message = ?6
             WHERE id = ?1 AND status NOT IN {TERMINAL}"
        ),
        params![
            id,
            max_attempts,
            now,
            policy.retry_delay_ms,
            error_code,
            error_message,
        ],
    )?;
    Ok(changed > 0)
}

/// Terminal `opted_out`.
pub fn mark_opted_out(conn: &Connection, id: &str, now: i64) -> Result<bool, StoreError> {
    let changed = conn.execute(
        &format!(
            "UPDATE calls SET status = 'opted_out', opted_out = 1, end_time = ?2, retry_after = NULL
             WHERE id = ?1 AND status NOT IN {TERMINAL}"
        ),
        params![id, now],
    )?;
    Ok(changed > 0)
}

/// Terminal `cancelled` (webhook-reported).
pub fn mark_call_cancelled(conn: &Connection, id: &str, now: i64) -> Result<bool, StoreError> {
    let changed = conn.execute(
        &format!(
            "UPDATE calls SET status = 'cancelled', end_time = ?2, retry_after = NULL
             WHERE id = ?1 AND status NOT IN {TERMINAL}"
        ),
        params![id, now],
    )?;
    Ok(changed > 0)
}

/// Records a do-not-disturb block: terminal `failed`, no retry.
pub fn mark_dnd_blocked(conn: &Connection, id: &str, now: i64) -> Result<bool, StoreError> {
    let changed = conn.execute(
        &format!(
            "UPDATE calls SET
                status = 'failed',
                dnd_status = 'blocked',
                error_message = 'blocked by do-not-disturb registry',
                end_time = ?2,
                retry_after = NULL
             WHERE id = ?1 AND status NOT IN {TERMINAL}"
        ),
        params![id, now],
    )?;
    Ok(changed > 0)
}

/// Records a passed (or skipped) DND check.
pub fn set_dnd_status(conn: &Connection, id: &str, dnd_status: &str) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE calls SET dnd_status = ?2 WHERE id = ?1",
        params![id, dnd_status],
    )?;
    Ok(())
}

/// Bulk-cancels every still-queued call of a campaign. Returns the count.
pub fn cancel_queued(conn: &Connection, broadcast_id: &str, now: i64) -> Result<u64, StoreError> {
    let changed = conn.execute(
        "UPDATE calls SET status = 'cancelled', end_time = ?2, retry_after = NULL
         WHERE broadcast_id = ?1 AND status = 'queued'",
        params![broadcast_id, now],
    )?;
    Ok(changed as u64)
}

/// Stamps the campaign's audio URL onto every call after materialization.
pub fn set_audio_url(
    conn: &Connection,
    broadcast_id: &str,
    audio_url: &str,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE calls SET audio_url = ?2 WHERE broadcast_id = ?1",
        params![broadcast_id, audio_url],
    )?;
    Ok(())
}

/// Merges keys into the call's metadata document.
pub fn merge_metadata(
    conn: &Connection,
    id: &str,
    patch: &serde_json::Map<String, serde_json::Value>,
) -> Result<(), StoreError> {
    if patch.is_empty() {
        return Ok(());
    }
    let existing: String = conn
        .query_row(
            "SELECT metadata_json FROM calls WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("call {id}")))?;

    let mut metadata: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&existing)?;
    for (k, v) in patch {
        metadata.insert(k.clone(), v.clone());
    }
    conn.execute(
        "UPDATE calls SET metadata_json = ?2 WHERE id = ?1",
        params![id, serde_json::to_string(&metadata)?],
    )?;
    Ok(())
}

/// Pages through a campaign's calls, oldest first, with an optional status
/// filter. Returns the page plus the unpaged total.
pub fn list_calls(
    conn: &Connection,
    broadcast_id: &str,
    status: Option<CallStatus>,
    page: u32,
    limit: u32,
) -> Result<(Vec<Call>, u64), StoreError> {
    let offset = u64::from(page.saturating_sub(1)) * u64::from(limit);

    match status {
        Some(status) => {
            let sql = format!(
                "SELECT {CALL_COLUMNS} FROM calls
                 WHERE broadcast_id = ?1 AND status = ?2
                 ORDER BY created_at, id LIMIT ?3 OFFSET ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let calls = stmt
                .query_map(
                    params![broadcast_id, status.as_str(), limit, offset],
                    call_from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            let total: u64 = conn.query_row(
                "SELECT COUNT(*) FROM calls WHERE broadcast_id = ?1 AND status = ?2",
                params![broadcast_id, status.as_str()],
                |row| row.get(0),
            )?;
            Ok((calls, total))
        }
        None => {
            let sql = format!(
                "SELECT {CALL_COLUMNS} FROM calls
                 WHERE broadcast_id = ?1
                 ORDER BY created_at, id LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let calls = stmt
                .query_map(params![broadcast_id, limit, offset], call_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            let total: u64 = conn.query_row(
                "SELECT COUNT(*) FROM calls WHERE broadcast_id = ?1",
                params![broadcast_id],
                |row| row.get(0),
            )?;
            Ok((calls, total))
        }
    }
}
