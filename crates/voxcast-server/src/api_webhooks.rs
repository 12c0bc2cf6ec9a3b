//! Webhook sink: provider status callbacks and keypress callbacks.
//!
//! Status callbacks may arrive before the dial response was persisted;
//! reconciliation falls back from the provider SID to the internal call id
//! in the URL and backfills the SID. Unknown calls get a 404 and no local
//! retry — the provider redelivers on its own schedule.

use crate::api_twiml::xml_response;
use crate::error::ApiError;
use crate::{now_ms, with_conn, AppState};
use axum::extract::{Extension, Form, Path};
use axum::response::{Json, Response};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use voxcast_engine::Publisher;
use voxcast_store::calls::{self, RetryPolicy};
use voxcast_store::{broadcasts, optouts, StoreError};
use voxcast_telephony::{map_provider_status, twiml};
use voxcast_types::{
    broadcast_room, Broadcast, BroadcastEvent, BroadcastStats, BroadcastUpdate, Call, CallUpdate,
    OptOutSource,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCallback {
    pub provider_sid: String,
    pub provider_status: String,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub answered_by: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeypressCallback {
    pub provider_sid: String,
    #[serde(default)]
    pub digits: String,
}

/// The digit that opts a callee out.
const OPT_OUT_DIGIT: &str = "9";

fn emit_call_and_broadcast(
    state: &Arc<AppState>,
    call: &Call,
    broadcast: &Broadcast,
    stats: BroadcastStats,
    active: u64,
) {
    let room = broadcast_room(&call.broadcast_id);
    state.publisher.publish(
        &room,
        BroadcastEvent::CallUpdate(CallUpdate {
            broadcast_id: call.broadcast_id.clone(),
            call_id: call.id.clone(),
            call_sid: call.provider_sid.clone(),
            phone: call.contact.phone.clone(),
            status: call.status,
            duration: call.duration_secs,
            timestamp: now_ms(),
        }),
    );
    state.publisher.publish(
        &room,
        BroadcastEvent::BroadcastUpdate(BroadcastUpdate {
            broadcast_id: broadcast.id.clone(),
            status: broadcast.status,
            stats,
            active_calls: Some(active),
            timestamp: now_ms(),
        }),
    );
}

/// POST /broadcast/:id/status
pub async fn status_webhook_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(internal_id): Path<String>,
    Form(body): Form<StatusCallback>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let now = now_ms();
    let (call, broadcast, stats, active) = with_conn(&state.pool, move |conn| {
        let call = calls::reconcile(conn, Some(&internal_id), &body.provider_sid)?;
        let broadcast = broadcasts::get_broadcast(conn, &call.broadcast_id)?;

        match body.provider_status.as_str() {
            "completed" => {
                calls::mark_completed(conn, &call.id, body.duration, now)?;
            }
            "busy" | "no-answer" | "failed" => {
                calls::mark_failed(
                    conn,
                    &call.id,
                    body.error_code.as_deref(),
                    body.error_message.as_deref(),
                    true,
                    RetryPolicy {
                        max_retries: broadcast.config.max_retries,
                        retry_delay_ms: broadcast.config.retry_delay_ms,
                    },
                    now,
                )?;
            }
            "canceled" => {
                calls::mark_call_cancelled(conn, &call.id, now)?;
            }
            other => match map_provider_status(other) {
                Some(status) if !status.is_terminal() => {
                    calls::advance_status(conn, &call.id, status, now)?;
                }
                Some(_) => {}
                None => {
                    tracing::warn!(
                        call_id = %call.id,
                        provider_status = other,
                        "ignoring unknown provider status"
                    );
                }
            },
        }

        let mut patch = serde_json::Map::new();
        if let Some(answered_by) = &body.answered_by {
            patch.insert("answeredBy".to_string(), json!(answered_by));
        }
        if let Some(code) = &body.error_code {
            patch.insert("errorCode".to_string(), json!(code));
        }
        if let Some(message) = &body.error_message {
            patch.insert("errorMessage".to_string(), json!(message));
        }
        calls::merge_metadata(conn, &call.id, &patch)?;

        let refreshed = calls::get_call(conn, &call.id)?;
        let broadcast = broadcasts::get_broadcast(conn, &call.broadcast_id)?;
        let stats = broadcasts::compute_stats(conn, &call.broadcast_id)?;
        let active = calls::count_active(conn, &call.broadcast_id)?;
        Ok((refreshed, broadcast, stats, active))
    })
    .await?;

    emit_call_and_broadcast(&state, &call, &broadcast, stats, active);
    Ok(Json(json!({ "success": true })))
}

/// POST /broadcast/keypress
pub async fn keypress_webhook_handler(
    Extension(state): Extension<Arc<AppState>>,
    Form(body): Form<KeypressCallback>,
) -> Result<Response, ApiError> {
    if body.digits != OPT_OUT_DIGIT {
        tracing::debug!(digits = %body.digits, "ignoring non-opt-out keypress");
        return Ok(xml_response(twiml::keypress_invalid_document()));
    }

    let now = now_ms();
    let sid = body.provider_sid.clone();
    let (call, broadcast, stats, active) = with_conn(&state.pool, move |conn| {
        let call = calls::get_call_by_sid(conn, &sid)?
            .ok_or_else(|| StoreError::NotFound(format!("call with sid {sid}")))?;

        calls::mark_opted_out(conn, &call.id, now)?;

        let mut metadata = serde_json::Map::new();
        metadata.insert("broadcastId".to_string(), json!(call.broadcast_id));
        metadata.insert("callSid".to_string(), json!(sid));
        optouts::upsert_opt_out(
            conn,
            &call.contact.phone,
            OptOutSource::BroadcastKeypress,
            now + optouts::DEFAULT_OPT_OUT_TTL_MS,
            &metadata,
            now,
        )?;

        let refreshed = calls::get_call(conn, &call.id)?;
        let broadcast = broadcasts::get_broadcast(conn, &call.broadcast_id)?;
        let stats = broadcasts::compute_stats(conn, &call.broadcast_id)?;
        let active = calls::count_active(conn, &call.broadcast_id)?;
        Ok((refreshed, broadcast, stats, active))
    })
    .await?;

    tracing::info!(
        call_id = %call.id,
        phone = %call.contact.phone,
        "callee opted out via keypress"
    );
    emit_call_and_broadcast(&state, &call, &broadcast, stats, active);
    Ok(xml_response(twiml::keypress_confirm_document()))
}
