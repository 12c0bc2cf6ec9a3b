//! Shared fixture for server API tests: a real router over a file-backed
//! SQLite pool, with the provider, synthesizer and CDN replaced by doubles.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use voxcast_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use voxcast_engine::{ChannelPublisher, Dispatcher, EngineSettings, NoopDnd};
use voxcast_server::{app, AppState};
use voxcast_telephony::{
    compute_signature, PlaceRequest, PlacedCall, TelephonyError, TelephonyProvider,
    SIGNATURE_HEADER,
};
use voxcast_types::{BroadcastConfig, VoiceProfile};
use voxcast_voice::{
    AssetStore, Materializer, MemoryAssetStore, SpeechSynthesizer, VoiceError,
};

pub const SIGNING_SECRET: &str = "test-signing-secret";
pub const PUBLIC_URL: &str = "https://voxcast.example.com";

/// Provider double: every dial succeeds with a generated SID.
#[derive(Default)]
pub struct MockProvider {
    pub placed: Mutex<Vec<PlaceRequest>>,
}

#[async_trait]
impl TelephonyProvider for MockProvider {
    async fn place(&self, request: &PlaceRequest) -> Result<PlacedCall, TelephonyError> {
        let mut placed = self.placed.lock().unwrap();
        placed.push(request.clone());
        Ok(PlacedCall {
            provider_sid: format!("CA{}", placed.len()),
            provider_status: "queued".to_string(),
        })
    }

    async fn terminate(&self, _provider_sid: &str) -> Result<(), TelephonyError> {
        Ok(())
    }

    async fn fetch_status(&self, _provider_sid: &str) -> Result<String, TelephonyError> {
        Ok("completed".to_string())
    }
}

/// Synthesizer double returning a fixed audio blob.
pub struct CannedSynth;

#[async_trait]
impl SpeechSynthesizer for CannedSynth {
    async fn synthesize(&self, _text: &str, _voice: &VoiceProfile) -> Result<Vec<u8>, VoiceError> {
        Ok(vec![0u8; 32])
    }
}

/// Synthesizer double that always fails, for draft-on-failure tests.
pub struct FailingSynth;

#[async_trait]
impl SpeechSynthesizer for FailingSynth {
    async fn synthesize(&self, _text: &str, _voice: &VoiceProfile) -> Result<Vec<u8>, VoiceError> {
        Err(VoiceError::Tts("synthesis backend down".to_string()))
    }
}

pub struct TestApp {
    pub app: axum::Router,
    pub pool: DbPool,
    pub provider: Arc<MockProvider>,
    pub publisher: ChannelPublisher,
    pub assets: Arc<MemoryAssetStore>,
    _dir: tempfile::TempDir,
}

pub fn setup_app() -> TestApp {
    setup_app_with_synth(Arc::new(CannedSynth))
}

pub fn setup_app_with_synth(synth: Arc<dyn SpeechSynthesizer>) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("api.db");
    let pool = create_pool(db_path.to_str().unwrap(), DbRuntimeSettings::default()).unwrap();
    {
        let conn = pool.get().unwrap();
        run_migrations(&conn).unwrap();
    }

    let publisher = ChannelPublisher::new(64);
    let provider = Arc::new(MockProvider::default());
    let assets = Arc::new(MemoryAssetStore::new());
    let materializer = Arc::new(Materializer::new(
        synth,
        assets.clone() as Arc<dyn AssetStore>,
    ));

    let dispatcher = Dispatcher::new(
        pool.clone(),
        provider.clone(),
        Arc::new(publisher.clone()),
        Arc::new(NoopDnd),
        assets.clone(),
        EngineSettings {
            // Long interval: tests drive dispatch explicitly where needed.
            poll_interval: Duration::from_secs(3600),
            public_base_url: PUBLIC_URL.to_string(),
        },
    );

    let state = AppState {
        pool: pool.clone(),
        dispatcher,
        publisher: publisher.clone(),
        materializer,
        signing_secret: SIGNING_SECRET.to_string(),
        public_base_url: PUBLIC_URL.to_string(),
        default_config: BroadcastConfig::default(),
    };

    TestApp {
        app: app(state),
        pool,
        provider,
        publisher,
        assets,
        _dir: dir,
    }
}

/// Sends an authenticated JSON request and returns (status, parsed body).
pub async fn json_request(
    app: &axum::Router,
    method: &str,
    uri: &str,
    owner: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(owner) = owner {
        builder = builder.header("Authorization", format!("Bearer {owner}"));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

/// Sends a provider-signed form POST and returns (status, raw body).
pub async fn signed_form_post(
    app: &axum::Router,
    uri: &str,
    form: &[(&str, &str)],
) -> (StatusCode, String, Option<String>) {
    let params: Vec<(String, String)> = form
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    let signature = compute_signature(SIGNING_SECRET, &format!("{PUBLIC_URL}{uri}"), &params);

    let body: String = form
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(body))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8_lossy(&bytes).into_owned(), content_type)
}

/// Sends a provider-signed GET (signature over the full URL, no form).
pub async fn signed_get(app: &axum::Router, uri: &str) -> (StatusCode, String, Option<String>) {
    let signature = compute_signature(SIGNING_SECRET, &format!("{PUBLIC_URL}{uri}"), &[]);

    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .header(SIGNATURE_HEADER, signature)
        .body(Body::empty())
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8_lossy(&bytes).into_owned(), content_type)
}

pub fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

/// Seeds a queued campaign with one queued call, bypassing the API.
pub fn seed_campaign_with_call(pool: &DbPool, broadcast_id: &str, call_id: &str, phone: &str) {
    use voxcast_store::{broadcasts, calls};
    use voxcast_types::{BroadcastStatus, Contact};

    let mut conn = pool.get().unwrap();
    broadcasts::create_broadcast(
        &conn,
        &broadcasts::NewBroadcast {
            id: broadcast_id.to_string(),
            name: "Seeded".to_string(),
            message_template: "Hi {{name}}".to_string(),
            voice: VoiceProfile::default(),
            config: BroadcastConfig::default(),
            owner_id: "owner-1".to_string(),
            created_at: now_ms(),
        },
    )
    .unwrap();
    calls::create_calls(
        &mut conn,
        &[calls::NewCall {
            id: call_id.to_string(),
            broadcast_id: broadcast_id.to_string(),
            contact: Contact {
                phone: phone.to_string(),
                name: "Seeded Contact".to_string(),
                custom_fields: serde_json::Map::new(),
            },
            message_text: "Hi Seeded Contact".to_string(),
            created_at: now_ms(),
        }],
    )
    .unwrap();
    broadcasts::update_status(&conn, broadcast_id, BroadcastStatus::Queued).unwrap();
    broadcasts::mark_started(&conn, broadcast_id, now_ms()).unwrap();
}
