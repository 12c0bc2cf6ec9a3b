mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;
use voxcast_store::broadcasts;
use voxcast_types::BroadcastStatus;

fn contacts(n: usize) -> serde_json::Value {
    let list: Vec<serde_json::Value> = (0..n)
        .map(|i| json!({ "phone": format!("+1555{i:04}"), "name": format!("C{i}") }))
        .collect();
    json!(list)
}

#[tokio::test]
async fn start_requires_authentication() {
    let t = setup_app();
    let (status, _) = json_request(
        &t.app,
        "POST",
        "/broadcast/start",
        None,
        Some(json!({ "name": "x", "messageTemplate": "hi", "contacts": contacts(1) })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn start_rejects_empty_contact_list() {
    let t = setup_app();
    let (status, body) = json_request(
        &t.app,
        "POST",
        "/broadcast/start",
        Some("owner-1"),
        Some(json!({ "name": "x", "messageTemplate": "hi", "contacts": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn start_rejects_oversized_contact_list() {
    let t = setup_app();
    let (status, body) = json_request(
        &t.app,
        "POST",
        "/broadcast/start",
        Some("owner-1"),
        Some(json!({ "name": "x", "messageTemplate": "hi", "contacts": contacts(10_001) })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    assert!(body["message"].as_str().unwrap().contains("10000"));
}

#[tokio::test]
async fn start_rejects_malformed_template() {
    let t = setup_app();
    let (status, body) = json_request(
        &t.app,
        "POST",
        "/broadcast/start",
        Some("owner-1"),
        Some(json!({
            "name": "x",
            "messageTemplate": "Hi {{name",
            "contacts": contacts(1),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("template"));
}

#[tokio::test]
async fn start_creates_campaign_calls_and_one_audio_asset() {
    let t = setup_app();
    let mut events = t.publisher.subscribe();

    let (status, body) = json_request(
        &t.app,
        "POST",
        "/broadcast/start",
        Some("owner-1"),
        Some(json!({
            "name": "Reminders",
            "messageTemplate": "Hi {{name}}",
            "contacts": [
                { "phone": "+15551", "name": "A" },
                { "phone": "+15552", "name": "B" },
            ],
            "maxConcurrent": 2,
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["totalContacts"], 2);
    let id = body["id"].as_str().unwrap().to_string();

    let conn = t.pool.get().unwrap();
    let broadcast = broadcasts::get_broadcast(&conn, &id).unwrap();
    assert!(matches!(
        broadcast.status,
        BroadcastStatus::Queued | BroadcastStatus::InProgress
    ));
    assert_eq!(broadcast.config.max_concurrent, 2);

    let stats = broadcasts::compute_stats(&conn, &id).unwrap();
    assert_eq!(stats.total, 2);

    // Synthesized exactly once, and every call points at the asset.
    let assets = broadcasts::list_audio_assets(&conn, &id).unwrap();
    assert_eq!(assets.len(), 1);
    assert_eq!(t.assets.len(), 1);
    let (calls, _) = voxcast_store::calls::list_calls(&conn, &id, None, 1, 10).unwrap();
    for call in &calls {
        assert_eq!(call.audio_url.as_deref(), Some(assets[0].audio_url.as_str()));
        assert!(call.message_text.starts_with("Hi "));
    }
    drop(conn);

    // Exactly one calls_created event for the campaign.
    let mut calls_created = 0;
    while let Ok(envelope) = events.try_recv() {
        if let voxcast_types::BroadcastEvent::CallsCreated { broadcast_id, .. } = &envelope.event {
            assert_eq!(broadcast_id, &id);
            calls_created += 1;
        }
    }
    assert_eq!(calls_created, 1);
}

#[tokio::test]
async fn tts_failure_surfaces_and_leaves_campaign_in_draft() {
    let t = setup_app_with_synth(std::sync::Arc::new(FailingSynth));

    let (status, body) = json_request(
        &t.app,
        "POST",
        "/broadcast/start",
        Some("owner-1"),
        Some(json!({
            "name": "Reminders",
            "messageTemplate": "Hi {{name}}",
            "contacts": contacts(2),
        })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "tts_unavailable");

    let conn = t.pool.get().unwrap();
    let (broadcasts_list, total) =
        broadcasts::list_broadcasts(&conn, "owner-1", None, 1, 10).unwrap();
    assert_eq!(total, 1);
    assert_eq!(broadcasts_list[0].status, BroadcastStatus::Draft);
    assert!(t.assets.is_empty(), "nothing was uploaded");
    assert_eq!(t.provider.placed.lock().unwrap().len(), 0, "nothing was dialed");
}

#[tokio::test]
async fn status_of_unknown_campaign_is_404() {
    let t = setup_app();
    let (status, body) =
        json_request(&t.app, "GET", "/broadcast/status/ghost", Some("owner-1"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn foreign_campaigns_read_as_404() {
    let t = setup_app();
    seed_campaign_with_call(&t.pool, "b-1", "c-1", "+15551");

    let (status, _) =
        json_request(&t.app, "GET", "/broadcast/status/b-1", Some("intruder"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) =
        json_request(&t.app, "GET", "/broadcast/status/b-1", Some("owner-1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["broadcast"]["id"], "b-1");
    assert_eq!(body["broadcast"]["stats"]["total"], 1);
}

#[tokio::test]
async fn cancel_flips_queued_calls_and_is_idempotent_on_finished_campaigns() {
    let t = setup_app();
    seed_campaign_with_call(&t.pool, "b-1", "c-1", "+15551");

    let (status, body) =
        json_request(&t.app, "POST", "/broadcast/b-1/cancel", Some("owner-1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelledCalls"], 1);

    // Cancelling an already-terminal campaign succeeds and changes nothing.
    let (status, body) =
        json_request(&t.app, "POST", "/broadcast/b-1/cancel", Some("owner-1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelledCalls"], 0);

    let conn = t.pool.get().unwrap();
    let broadcast = broadcasts::get_broadcast(&conn, "b-1").unwrap();
    assert_eq!(broadcast.status, BroadcastStatus::Cancelled);
}

#[tokio::test]
async fn list_paginates_owned_campaigns() {
    let t = setup_app();
    for i in 0..3 {
        seed_campaign_with_call(&t.pool, &format!("b-{i}"), &format!("c-{i}"), "+15551");
    }

    let (status, body) =
        json_request(&t.app, "GET", "/broadcast/list?limit=2", Some("owner-1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["broadcasts"].as_array().unwrap().len(), 2);

    let (_, body) = json_request(
        &t.app,
        "GET",
        "/broadcast/list?limit=2&page=2",
        Some("owner-1"),
        None,
    )
    .await;
    assert_eq!(body["broadcasts"].as_array().unwrap().len(), 1);

    // Another owner sees nothing.
    let (_, body) = json_request(&t.app, "GET", "/broadcast/list", Some("stranger"), None).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn calls_listing_rejects_unknown_status_filter() {
    let t = setup_app();
    seed_campaign_with_call(&t.pool, "b-1", "c-1", "+15551");

    let (status, _) = json_request(
        &t.app,
        "GET",
        "/broadcast/b-1/calls?status=warp",
        Some("owner-1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = json_request(
        &t.app,
        "GET",
        "/broadcast/b-1/calls?status=queued",
        Some("owner-1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["calls"][0]["id"], "c-1");
}

#[tokio::test]
async fn delete_removes_campaign_and_its_calls() {
    let t = setup_app();
    seed_campaign_with_call(&t.pool, "b-1", "c-1", "+15551");

    let (status, _) = json_request(&t.app, "DELETE", "/broadcast/b-1", Some("owner-1"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) =
        json_request(&t.app, "GET", "/broadcast/status/b-1", Some("owner-1"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let conn = t.pool.get().unwrap();
    let remaining: i64 = conn
        .query_row("SELECT COUNT(*) FROM calls", [], |row| row.get(0))
        .unwrap();
    assert_eq!(remaining, 0);
}
