//! Campaign management API: create-and-start, status, listing, cancel,
//! delete.

use crate::error::ApiError;
use crate::middleware::OwnerContext;
use crate::{now_ms, with_conn, AppState};
use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use voxcast_engine::Publisher;
use voxcast_store::calls::NewCall;
use voxcast_store::{broadcasts, calls};
use voxcast_types::{
    broadcast_room, template, Broadcast, BroadcastEvent, BroadcastStats, BroadcastStatus,
    CallStatus, ComplianceConfig, Contact, VoiceProfile, GLOBAL_ROOM,
};

/// Contact list bounds per campaign.
const MIN_CONTACTS: usize = 1;
const MAX_CONTACTS: usize = 10_000;

/// Pagination bounds.
const DEFAULT_PAGE_LIMIT: u32 = 50;
const MAX_PAGE_LIMIT: u32 = 200;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBroadcastRequest {
    pub name: String,
    pub message_template: String,
    #[serde(default)]
    pub voice: Option<VoiceProfile>,
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub max_concurrent: Option<u32>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub retry_delay_ms: Option<i64>,
    #[serde(default)]
    pub compliance: Option<ComplianceConfig>,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

fn page_bounds(params: &PageParams) -> (u32, u32) {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);
    (page, limit)
}

fn broadcast_json(broadcast: &Broadcast, stats: &BroadcastStats, active: Option<u64>) -> serde_json::Value {
    json!({
        "id": broadcast.id,
        "name": broadcast.name,
        "status": broadcast.status,
        "messageTemplate": broadcast.message_template,
        "voice": broadcast.voice,
        "config": broadcast.config,
        "ownerId": broadcast.owner_id,
        "createdAt": broadcast.created_at,
        "startedAt": broadcast.started_at,
        "completedAt": broadcast.completed_at,
        "stats": stats,
        "activeCalls": active,
    })
}

/// Loads a campaign and enforces that `owner` owns it. Foreign campaigns
/// read as 404 so existence is not leaked across tenants.
async fn load_owned(
    state: &Arc<AppState>,
    id: &str,
    owner: &str,
) -> Result<Broadcast, ApiError> {
    let lookup_id = id.to_string();
    let broadcast = with_conn(&state.pool, move |conn| {
        broadcasts::get_broadcast(conn, &lookup_id)
    })
    .await?;
    if broadcast.owner_id != owner {
        return Err(ApiError::NotFound(format!("broadcast {id}")));
    }
    Ok(broadcast)
}

/// POST /broadcast/start
///
/// Creates the campaign and its call rows, materializes the audio once,
/// flips the campaign to `queued`, and registers it with the dispatch
/// engine. A TTS or CDN failure surfaces to the caller and leaves the
/// campaign in `draft` with nothing enqueued.
pub async fn start_broadcast_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(OwnerContext(owner)): Extension<OwnerContext>,
    Json(payload): Json<StartBroadcastRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::Validation("name cannot be empty".to_string()));
    }
    if payload.contacts.len() < MIN_CONTACTS {
        return Err(ApiError::Validation(
            "contacts cannot be empty".to_string(),
        ));
    }
    if payload.contacts.len() > MAX_CONTACTS {
        return Err(ApiError::Validation(format!(
            "contact list exceeds the limit of {MAX_CONTACTS}"
        )));
    }
    template::validate(&payload.message_template)
        .map_err(|e| ApiError::Validation(format!("invalid message template: {e}")))?;
    if payload.contacts.iter().any(|c| c.phone.trim().is_empty()) {
        return Err(ApiError::Validation(
            "every contact needs a phone number".to_string(),
        ));
    }

    let broadcast_id = uuid::Uuid::new_v4().to_string();
    let voice = payload.voice.unwrap_or_default();
    let mut config = state.default_config.clone();
    if let Some(v) = payload.max_concurrent {
        if v == 0 {
            return Err(ApiError::Validation("maxConcurrent must be at least 1".to_string()));
        }
        config.max_concurrent = v;
    }
    if let Some(v) = payload.max_retries {
        config.max_retries = v;
    }
    if let Some(v) = payload.retry_delay_ms {
        if v < 0 {
            return Err(ApiError::Validation("retryDelayMs cannot be negative".to_string()));
        }
        config.retry_delay_ms = v;
    }
    if let Some(compliance) = payload.compliance {
        config.compliance = compliance;
    }

    let now = now_ms();
    let total = payload.contacts.len();

    // Persist the campaign and one call row per contact, in draft.
    {
        let new_broadcast = broadcasts::NewBroadcast {
            id: broadcast_id.clone(),
            name: payload.name.clone(),
            message_template: payload.message_template.clone(),
            voice: voice.clone(),
            config,
            owner_id: owner,
            created_at: now,
        };
        let rows: Vec<NewCall> = payload
            .contacts
            .iter()
            .map(|contact| NewCall {
                id: uuid::Uuid::new_v4().to_string(),
                broadcast_id: broadcast_id.clone(),
                contact: contact.clone(),
                message_text: template::render(&payload.message_template, contact),
                created_at: now,
            })
            .collect();
        with_conn(&state.pool, move |conn| {
            broadcasts::create_broadcast(conn, &new_broadcast)?;
            calls::create_calls(conn, &rows)
        })
        .await?;
    }

    // Materialize once, reusing a same-key asset if this template was
    // already synthesized for the campaign.
    let key = voxcast_voice::unique_key(&payload.message_template);
    let existing = {
        let id = broadcast_id.clone();
        with_conn(&state.pool, move |conn| {
            broadcasts::find_audio_asset(conn, &id, &key)
        })
        .await?
    };
    let asset = match existing {
        Some(asset) => asset,
        None => {
            state
                .materializer
                .materialize(&payload.message_template, &voice, now)
                .await?
        }
    };

    {
        let id = broadcast_id.clone();
        let asset = asset.clone();
        with_conn(&state.pool, move |conn| {
            broadcasts::attach_audio_asset(conn, &id, &asset)?;
            calls::set_audio_url(conn, &id, &asset.audio_url)?;
            broadcasts::update_status(conn, &id, BroadcastStatus::Queued)?;
            Ok(())
        })
        .await?;
    }

    state.publisher.publish(
        &broadcast_room(&broadcast_id),
        BroadcastEvent::CallsCreated {
            broadcast_id: broadcast_id.clone(),
            timestamp: now_ms(),
        },
    );
    state.publisher.publish(
        GLOBAL_ROOM,
        BroadcastEvent::BroadcastListUpdate { timestamp: now_ms() },
    );

    state.dispatcher.start(&broadcast_id);
    tracing::info!(
        broadcast_id = %broadcast_id,
        contacts = total,
        "campaign created and enqueued"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "id": broadcast_id,
            "name": payload.name,
            "status": BroadcastStatus::Queued,
            "totalContacts": total,
        })),
    ))
}

/// GET /broadcast/status/:id
pub async fn broadcast_status_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(OwnerContext(owner)): Extension<OwnerContext>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    load_owned(&state, &id, &owner).await?;

    let lookup_id = id.clone();
    let (broadcast, stats, active) = with_conn(&state.pool, move |conn| {
        let broadcast = broadcasts::get_broadcast(conn, &lookup_id)?;
        let stats = broadcasts::compute_stats(conn, &lookup_id)?;
        let active = calls::count_active(conn, &lookup_id)?;
        Ok((broadcast, stats, active))
    })
    .await?;

    Ok(Json(json!({
        "success": true,
        "broadcast": broadcast_json(&broadcast, &stats, Some(active)),
    })))
}

/// POST /broadcast/:id/cancel
pub async fn cancel_broadcast_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(OwnerContext(owner)): Extension<OwnerContext>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    load_owned(&state, &id, &owner).await?;

    let cancelled = state.dispatcher.cancel(&id).await?;
    Ok(Json(json!({
        "success": true,
        "id": id,
        "cancelledCalls": cancelled,
    })))
}

/// GET /broadcast/:id/calls
pub async fn list_calls_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(OwnerContext(owner)): Extension<OwnerContext>,
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    load_owned(&state, &id, &owner).await?;

    let status = match params.status.as_deref() {
        Some(s) => Some(
            CallStatus::parse(s)
                .ok_or_else(|| ApiError::Validation(format!("unknown call status '{s}'")))?,
        ),
        None => None,
    };
    let (page, limit) = page_bounds(&params);

    let lookup_id = id.clone();
    let (rows, total) = with_conn(&state.pool, move |conn| {
        calls::list_calls(conn, &lookup_id, status, page, limit)
    })
    .await?;

    Ok(Json(json!({
        "success": true,
        "broadcastId": id,
        "calls": rows,
        "page": page,
        "limit": limit,
        "total": total,
    })))
}

/// GET /broadcast/list
pub async fn list_broadcasts_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(OwnerContext(owner)): Extension<OwnerContext>,
    Query(params): Query<PageParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = match params.status.as_deref() {
        Some(s) => Some(
            BroadcastStatus::parse(s)
                .ok_or_else(|| ApiError::Validation(format!("unknown broadcast status '{s}'")))?,
        ),
        None => None,
    };
    let (page, limit) = page_bounds(&params);

    let items = with_conn(&state.pool, move |conn| {
        let (rows, total) = broadcasts::list_broadcasts(conn, &owner, status, page, limit)?;
        let mut items = Vec::with_capacity(rows.len());
        for broadcast in rows {
            let stats = broadcasts::compute_stats(conn, &broadcast.id)?;
            items.push((broadcast, stats));
        }
        Ok((items, total))
    })
    .await?;
    let (rows, total) = items;

    let broadcasts_json: Vec<serde_json::Value> = rows
        .iter()
        .map(|(b, stats)| broadcast_json(b, stats, None))
        .collect();

    Ok(Json(json!({
        "success": true,
        "broadcasts": broadcasts_json,
        "page": page,
        "limit": limit,
        "total": total,
    })))
}

/// DELETE /broadcast/:id
pub async fn delete_broadcast_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(OwnerContext(owner)): Extension<OwnerContext>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    load_owned(&state, &id, &owner).await?;

    state.dispatcher.delete(&id).await?;
    Ok(Json(json!({ "success": true, "id": id })))
}
