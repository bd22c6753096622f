use super::*;

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("chat.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn round_trips_json_values_and_overwrites_by_key() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .put_json(StateKey::MessagesWatermark, &1_700_000_000_000_i64)
        .await
        .expect("put");
    storage
        .put_json(StateKey::MessagesWatermark, &1_700_000_900_000_i64)
        .await
        .expect("overwrite");

    let watermark: Option<i64> = storage
        .get_json(StateKey::MessagesWatermark)
        .await
        .expect("get");
    assert_eq!(watermark, Some(1_700_000_900_000));
}

#[tokio::test]
async fn missing_key_reads_as_none() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let value: Option<Vec<String>> = storage.get_json(StateKey::Messages).await.expect("get");
    assert!(value.is_none());
    assert!(storage.load_session_id().await.expect("session").is_none());
}

#[tokio::test]
async fn corrupt_value_is_reported_with_key_name() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .put_json(StateKey::MessagesHasMore, &"not-a-bool")
        .await
        .expect("put");
    let err = storage
        .get_json::<bool>(StateKey::MessagesHasMore)
        .await
        .expect_err("must fail");
    assert!(err.to_string().contains("messages-has-more"));
}

#[tokio::test]
async fn clear_chat_state_keeps_session_id() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .save_session_id(&SessionId::from("session-a"))
        .await
        .expect("session");
    storage
        .put_json(StateKey::Messages, &vec!["m-1", "m-2"])
        .await
        .expect("messages");
    storage
        .put_json(StateKey::Participants, &vec!["p-1"])
        .await
        .expect("participants");
    storage
        .put_json(StateKey::PendingMessages, &vec!["local-1"])
        .await
        .expect("pending");

    storage.clear_chat_state().await.expect("clear");

    assert_eq!(
        storage.load_session_id().await.expect("session"),
        Some(SessionId::from("session-a"))
    );
    for key in [
        StateKey::Messages,
        StateKey::Participants,
        StateKey::PendingMessages,
    ] {
        let value: Option<Vec<String>> = storage.get_json(key).await.expect("get");
        assert!(value.is_none(), "{} should be cleared", key.as_str());
    }
}

#[tokio::test]
async fn clear_all_drops_session_id_too() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .save_session_id(&SessionId::from("session-a"))
        .await
        .expect("session");
    storage
        .put_json(StateKey::Messages, &vec!["m-1"])
        .await
        .expect("messages");

    storage.clear_all().await.expect("clear");

    assert!(storage.load_session_id().await.expect("session").is_none());
    let messages: Option<Vec<String>> = storage.get_json(StateKey::Messages).await.expect("get");
    assert!(messages.is_none());
}

#[test]
fn storage_keys_are_distinct() {
    let mut names: Vec<&str> = StateKey::ALL.iter().map(|key| key.as_str()).collect();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), StateKey::ALL.len());
}

#[test]
fn memory_urls_have_no_parent_dir() {
    assert!(sqlite_path("sqlite::memory:").is_none());
    assert_eq!(
        sqlite_path("sqlite://./data/chat.db?mode=rwc"),
        Some(PathBuf::from("./data/chat.db"))
    );
}
