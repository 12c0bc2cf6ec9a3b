use voxcast_db::{create_pool, run_migrations, DbRuntimeSettings};

#[test]
fn file_backed_pool_migrates_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("voxcast.db");
    let db_path = db_path.to_str().unwrap();

    {
        let pool = create_pool(db_path, DbRuntimeSettings::default()).unwrap();
        let conn = pool.get().unwrap();
        let applied = run_migrations(&conn).unwrap();
        assert!(applied > 0);

        conn.execute(
            "INSERT INTO broadcasts (id, name, message_template, voice_json, config_json, owner_id, created_at)
             VALUES ('b-1', 'Test', 'Hi {{name}}', '{}', '{}', 'owner-1', 0)",
            [],
        )
        .unwrap();
    }

    // Re-open: schema and data survive, migrations are idempotent.
    let pool = create_pool(db_path, DbRuntimeSettings::default()).unwrap();
    let conn = pool.get().unwrap();
    assert_eq!(run_migrations(&conn).unwrap(), 0);

    let name: String = conn
        .query_row("SELECT name FROM broadcasts WHERE id = 'b-1'", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(name, "Test");
}

#[test]
fn cascade_delete_removes_calls_and_assets() {
    let pool = create_pool(":memory:", DbRuntimeSettings::default()).unwrap();
    let conn = pool.get().unwrap();
    run_migrations(&conn).unwrap();

    conn.execute(
        "INSERT INTO broadcasts (id, name, message_template, voice_json, config_json, owner_id, created_at)
         VALUES ('b-1', 'Test', 'Hi', '{}', '{}', 'owner-1', 0)",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO calls (id, broadcast_id, phone, message_text, created_at)
         VALUES ('c-1', 'b-1', '+15550001', 'Hi', 0)",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO audio_assets (broadcast_id, unique_key, text, audio_url, duration_secs, generated_at)
         VALUES ('b-1', 'k', 'Hi', 'http://cdn/x', 3, 0)",
        [],
    )
    .unwrap();

    conn.execute("DELETE FROM broadcasts WHERE id = 'b-1'", [])
        .unwrap();

    let calls: i64 = conn
        .query_row("SELECT COUNT(*) FROM calls", [], |row| row.get(0))
        .unwrap();
    let assets: i64 = conn
        .query_row("SELECT COUNT(*) FROM audio_assets", [], |row| row.get(0))
        .unwrap();
    assert_eq!(calls, 0);
    assert_eq!(assets, 0);
}

#[test]
fn provider_sid_is_unique_once_set() {
    let pool = create_pool(":memory:", DbRuntimeSettings::default()).unwrap();
    let conn = pool.get().unwrap();
    run_migrations(&conn).unwrap();

    conn.execute(
        "INSERT INTO broadcasts (id, name, message_template, voice_json, config_json, owner_id, created_at)
         VALUES ('b-1', 'Test', 'Hi', '{}', '{}', 'owner-1', 0)",
        [],
    )
    .unwrap();
    for id in ["c-1", "c-2", "c-3"] {
        conn.execute(
            "INSERT INTO calls (id, broadcast_id, phone, message_text, created_at)
             VALUES (?1, 'b-1', '+15550001', 'Hi', 0)",
            [id],
        )
        .unwrap();
    }

    // Two NULL sids coexist; duplicating a real sid does not.
    conn.execute("UPDATE calls SET provider_sid = 'CA1' WHERE id = 'c-1'", [])
        .unwrap();
    let dup = conn.execute("UPDATE calls SET provider_sid = 'CA1' WHERE id = 'c-2'", []);
    assert!(dup.is_err());
}
