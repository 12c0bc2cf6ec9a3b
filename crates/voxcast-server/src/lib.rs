//! Voxcast server library: application state, routing and handlers.

pub mod api_broadcast;
pub mod api_sse;
pub mod api_twiml;
pub mod api_webhooks;
pub mod config;
pub mod error;
pub mod middleware;

use axum::{
    routing::{any, delete, get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use voxcast_db::DbPool;
use voxcast_engine::{ChannelPublisher, Dispatcher};
use voxcast_types::BroadcastConfig;
use voxcast_voice::Materializer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// The dispatch engine.
    pub dispatcher: Dispatcher,
    /// Fan-out bus; SSE subscribers attach here.
    pub publisher: ChannelPublisher,
    /// One-shot audio materialization.
    pub materializer: Arc<Materializer>,
    /// Webhook signature secret.
    pub signing_secret: String,
    /// Publicly reachable base URL.
    pub public_base_url: String,
    /// Campaign defaults applied when a request omits dispatch settings.
    pub default_config: BroadcastConfig,
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Runs a gateway operation on the blocking pool.
pub(crate) async fn with_conn<T, F>(pool: &DbPool, f: F) -> Result<T, error::ApiError>
where
    T: Send + 'static,
    F: FnOnce(&mut rusqlite::Connection) -> Result<T, voxcast_store::StoreError> + Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<T, error::ApiError> {
        let mut conn = pool
            .get()
            .map_err(|e| error::ApiError::Internal(e.to_string()))?;
        Ok(f(&mut conn)?)
    })
    .await
    .map_err(|e| error::ApiError::Internal(e.to_string()))?
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let management_routes = Router::new()
        .route("/broadcast/start", post(api_broadcast::start_broadcast_handler))
        .route(
            "/broadcast/status/{id}",
            get(api_broadcast::broadcast_status_handler),
        )
        .route(
            "/broadcast/{id}/cancel",
            post(api_broadcast::cancel_broadcast_handler),
        )
        .route("/broadcast/{id}/calls", get(api_broadcast::list_calls_handler))
        .route("/broadcast/list", get(api_broadcast::list_broadcasts_handler))
        .route("/broadcast/{id}", delete(api_broadcast::delete_broadcast_handler))
        .layer(axum::middleware::from_fn(middleware::auth_middleware));

    // Provider-facing routes: script generator and webhook sink, all behind
    // the signature check.
    let provider_routes = Router::new()
        .route("/broadcast/twiml", any(api_twiml::script_handler))
        .route(
            "/broadcast/{id}/status",
            post(api_webhooks::status_webhook_handler),
        )
        .route(
            "/broadcast/keypress",
            post(api_webhooks::keypress_webhook_handler),
        )
        .layer(axum::middleware::from_fn(middleware::signature_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/events/broadcasts", get(api_sse::events_stream_handler))
        .merge(management_routes)
        .merge(provider_routes)
        .layer(Extension(Arc::new(state)))
}
