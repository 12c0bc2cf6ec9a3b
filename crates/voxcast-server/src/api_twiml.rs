//! Script generator endpoint.
//!
//! The provider fetches this document at call time. Missing or unusable
//! inputs degrade to the minimal error document — the callee must never
//! hear silence because of a bad query string.

use crate::AppState;
use axum::extract::{Extension, Query};
use axum::http::header;
use axum::response::Response;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use voxcast_telephony::twiml;

/// Timeout for the best-effort audio reachability probe.
const AUDIO_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptParams {
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub disclaimer: Option<String>,
}

/// Builds a `text/xml`, never-cached response.
pub(crate) fn xml_response(document: String) -> Response {
    Response::builder()
        .header(header::CONTENT_TYPE, "text/xml")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(document.into())
        .unwrap_or_else(|_| Response::new(twiml::error_document().into()))
}

/// GET/ANY /broadcast/twiml
pub async fn script_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<ScriptParams>,
) -> Response {
    let audio_url = params.audio_url.unwrap_or_default();
    if audio_url.is_empty() || url::Url::parse(&audio_url).is_err() {
        tracing::warn!(audio_url = %audio_url, "script request without usable audio url");
        return xml_response(twiml::error_document());
    }

    let disclaimer = params
        .disclaimer
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| "This is an automated call.".to_string());

    // Best-effort reachability probe; a failure only logs. The provider is
    // already on the line, so the document is returned regardless.
    {
        let probe_url = audio_url.clone();
        tokio::spawn(async move {
            let client = reqwest::Client::new();
            match client
                .head(&probe_url)
                .timeout(AUDIO_PROBE_TIMEOUT)
                .send()
                .await
            {
                Ok(response) if !response.status().is_success() => {
                    tracing::warn!(url = %probe_url, status = %response.status(), "audio asset probe failed");
                }
                Err(e) => {
                    tracing::warn!(url = %probe_url, error = %e, "audio asset unreachable");
                }
                Ok(_) => {}
            }
        });
    }

    let keypress_url = format!(
        "{}/broadcast/keypress",
        state.public_base_url.trim_end_matches('/')
    );
    xml_response(twiml::script_document(&audio_url, &disclaimer, &keypress_url))
}
