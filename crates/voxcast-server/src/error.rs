//! API error taxonomy and its HTTP mapping.
//!
//! Every error response carries `{"error": <slug>, "message": <detail>}`;
//! success responses carry `{"success": true, …}`. Signature failures are
//! the one exception: a bare 403 with no diagnostic body, handled in the
//! middleware before any handler runs.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;
use voxcast_engine::EngineError;
use voxcast_store::StoreError;
use voxcast_voice::VoiceError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("TTS unavailable: {0}")]
    TtsUnavailable(String),

    #[error("CDN unavailable: {0}")]
    CdnUnavailable(String),

    #[error("internal error")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::TtsUnavailable(_) | Self::CdnUnavailable(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn slug(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::TtsUnavailable(_) => "tts_unavailable",
            Self::CdnUnavailable(_) => "cdn_unavailable",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(ref detail) = self {
            tracing::error!(detail, "internal error");
        }
        let message = match &self {
            // Internal details stay in the log, not the response.
            Self::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        let body = Json(json!({ "error": self.slug(), "message": message }));
        (self.status(), body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::NotFound(what),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Store(StoreError::NotFound(what)) => Self::NotFound(what),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<VoiceError> for ApiError {
    fn from(e: VoiceError) -> Self {
        match e {
            VoiceError::Tts(detail) => Self::TtsUnavailable(detail),
            VoiceError::Cdn(detail) => Self::CdnUnavailable(detail),
            other => Self::Internal(other.to_string()),
        }
    }
}
