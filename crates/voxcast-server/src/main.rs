//! Voxcast server binary — outbound voice-broadcast orchestration.
//!
//! Starts an axum HTTP server with structured logging, database
//! initialization, dispatch-engine recovery for campaigns that were live
//! at shutdown, and graceful shutdown on SIGTERM/SIGINT.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use voxcast_engine::{ChannelPublisher, Dispatcher, DndChecker, EngineSettings};
use voxcast_server::{app, config, AppState};
use voxcast_telephony::HttpTelephonyProvider;
use voxcast_types::BroadcastConfig;
use voxcast_voice::{HttpAssetStore, Materializer, TtsClient};

/// Capacity of the fan-out bus; slow subscribers past this lag lose events.
const EVENT_BUS_CAPACITY: usize = 256;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("VOXCAST_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration — the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    for warning in config::startup_warnings(&config) {
        tracing::error!(warning = %warning, "critical configuration warning");
    }

    // Initialize database
    let pool = voxcast_db::create_pool(
        &config.database.path,
        voxcast_db::DbRuntimeSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )
    .expect("failed to create database pool — check database.path in config");

    {
        let conn = pool
            .get()
            .expect("failed to get database connection for migrations");
        let applied =
            voxcast_db::run_migrations(&conn).expect("failed to run database migrations");
        if applied > 0 {
            tracing::info!(count = applied, "applied database migrations");
        }
    }

    // Wire up the components
    let publisher = ChannelPublisher::new(EVENT_BUS_CAPACITY);
    let provider = Arc::new(HttpTelephonyProvider::new(config.telephony.clone()));
    let assets = Arc::new(HttpAssetStore::new(config.cdn.clone()));
    let tts = Arc::new(TtsClient::new(config.tts.clone()));
    let materializer = Arc::new(Materializer::new(tts, assets.clone()));

    let dnd: Arc<dyn DndChecker> = match &config.dnd.endpoint {
        Some(endpoint) => Arc::new(voxcast_engine::HttpDndChecker::new(endpoint.clone())),
        None => Arc::new(voxcast_engine::NoopDnd),
    };

    let dispatcher = Dispatcher::new(
        pool.clone(),
        provider,
        Arc::new(publisher.clone()),
        dnd,
        assets,
        EngineSettings {
            poll_interval: Duration::from_secs(config.engine.poll_interval_secs),
            public_base_url: config.public_url.clone(),
        },
    );

    // Re-register campaigns that were live when the previous process died.
    {
        let conn = pool.get().expect("failed to get database connection");
        let dispatchable = voxcast_store::broadcasts::list_dispatchable_ids(&conn)
            .expect("failed to list dispatchable campaigns");
        for broadcast_id in dispatchable {
            tracing::info!(broadcast_id = %broadcast_id, "resuming campaign dispatch");
            dispatcher.start(&broadcast_id);
        }
    }

    let state = AppState {
        pool,
        dispatcher,
        publisher,
        materializer,
        signing_secret: config.telephony.signing_secret.clone(),
        public_base_url: config.public_url.clone(),
        default_config: BroadcastConfig {
            max_concurrent: config.engine.max_concurrent,
            max_retries: config.engine.max_retries,
            retry_delay_ms: config.engine.retry_delay_ms,
            compliance: Default::default(),
        },
    };

    // Build application
    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting voxcast server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address — is another process using this port?");

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("voxcast server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
