use super::*;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode as AxumStatus},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct ServerState {
    session_headers: Arc<Mutex<Vec<Option<String>>>>,
    update_since: Arc<Mutex<Vec<String>>>,
    posted: Arc<Mutex<Vec<Value>>>,
}

impl ServerState {
    async fn record(&self, headers: &HeaderMap) {
        let header = headers
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        self.session_headers.lock().await.push(header);
    }
}

async fn info(State(state): State<ServerState>, headers: HeaderMap) -> Json<Value> {
    state.record(&headers).await;
    Json(json!({ "sessionUuid": "s-1", "apiVersion": 2 }))
}

async fn participants(State(state): State<ServerState>, headers: HeaderMap) -> impl IntoResponse {
    state.record(&headers).await;
    if headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) == Some("expired") {
        return (AxumStatus::UNAUTHORIZED, Json(json!({ "error": "expired" }))).into_response();
    }
    Json(json!([{ "uuid": "p-1", "name": "Alice", "updatedAt": 1_700_000_000_000_i64 }]))
        .into_response()
}

async fn latest() -> impl IntoResponse {
    (AxumStatus::INTERNAL_SERVER_ERROR, "boom")
}

async fn older(Path(before): Path<String>) -> impl IntoResponse {
    if before == "garbled" {
        return "not json".into_response();
    }
    Json(json!([])).into_response()
}

async fn updates(State(state): State<ServerState>, Path(since): Path<String>) -> Json<Value> {
    state.update_since.lock().await.push(since);
    Json(json!([{
        "uuid": "m-2",
        "authorUuid": "p-1",
        "text": "edited",
        "sentAt": 1_700_000_000_000_i64,
        "updatedAt": 1_700_000_100_000_i64
    }]))
}

async fn create(State(state): State<ServerState>, Json(body): Json<Value>) -> Json<Value> {
    state.posted.lock().await.push(body.clone());
    Json(json!({
        "uuid": "m-new",
        "authorUuid": "you",
        "text": body["text"],
        "sentAt": 1_700_000_200_000_i64,
        "replyToMessageUuid": body.get("replyTo").cloned().unwrap_or(Value::Null)
    }))
}

async fn spawn_server() -> anyhow::Result<(String, ServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ServerState::default();
    let app = Router::new()
        .route("/api/info", get(info))
        .route("/api/participants/all", get(participants))
        .route("/api/messages/latest", get(latest))
        .route("/api/messages/older/:before", get(older))
        .route("/api/messages/updates/:since", get(updates))
        .route("/api/messages/new", post(create))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/api"), state))
}

fn api_for(base_url: &str, connectivity: Arc<dyn Connectivity>) -> HttpChatApi {
    HttpChatApi::new(base_url, Duration::from_secs(5), connectivity).expect("client")
}

#[tokio::test]
async fn session_header_is_sent_once_known() {
    let (base_url, state) = spawn_server().await.expect("server");
    let api = api_for(&base_url, Arc::new(AlwaysOnline));

    let info = api.info().await.expect("info");
    assert_eq!(info.session_uuid, SessionId::from("s-1"));
    api.set_session_id(Some(info.session_uuid.clone())).await;
    api.all_participants().await.expect("participants");

    let headers = state.session_headers.lock().await.clone();
    assert_eq!(headers, vec![None, Some("s-1".to_string())]);
    assert_eq!(api.session_id().await, Some(SessionId::from("s-1")));
}

#[tokio::test]
async fn unauthorized_response_maps_to_unauthorized() {
    let (base_url, _) = spawn_server().await.expect("server");
    let api = api_for(&base_url, Arc::new(AlwaysOnline));
    api.set_session_id(Some(SessionId::from("expired"))).await;

    let err = api.all_participants().await.expect_err("401");
    assert!(matches!(err, ClientError::Unauthorized));
}

#[tokio::test]
async fn server_errors_carry_status_and_body() {
    let (base_url, _) = spawn_server().await.expect("server");
    let api = api_for(&base_url, Arc::new(AlwaysOnline));

    let err = api.latest_messages().await.expect_err("500");
    match err {
        ClientError::Http { status, body } => {
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let (base_url, _) = spawn_server().await.expect("server");
    let api = api_for(&base_url, Arc::new(AlwaysOnline));

    let err = api
        .older_messages(&MessageId::from("garbled"))
        .await
        .expect_err("decode");
    assert!(matches!(err, ClientError::Decode(_)));
}

#[tokio::test]
async fn updates_are_requested_with_millisecond_watermark() {
    let (base_url, state) = spawn_server().await.expect("server");
    let api = api_for(&base_url, Arc::new(AlwaysOnline));
    let since = DateTime::from_timestamp_millis(1_700_000_000_123).expect("ts");

    let delta = api.message_updates(since).await.expect("updates");

    assert_eq!(delta.len(), 1);
    assert!(delta[0].is_edited());
    assert_eq!(
        state.update_since.lock().await.clone(),
        vec!["1700000000123".to_string()]
    );
}

#[tokio::test]
async fn create_message_posts_text_and_reply_target() {
    let (base_url, state) = spawn_server().await.expect("server");
    let api = api_for(&base_url, Arc::new(AlwaysOnline));

    let created = api
        .create_message(&NewMessageRequest {
            text: "hello".into(),
            reply_to: Some(MessageId::from("m-1")),
        })
        .await
        .expect("create");

    assert_eq!(created.uuid, MessageId::from("m-new"));
    assert_eq!(created.reply_to_message_uuid, Some(MessageId::from("m-1")));
    let posted = state.posted.lock().await.clone();
    assert_eq!(posted, vec![json!({ "text": "hello", "replyTo": "m-1" })]);
}

#[tokio::test]
async fn offline_connectivity_short_circuits_requests() {
    let (base_url, state) = spawn_server().await.expect("server");
    let connectivity = ManualConnectivity::new(false);
    let api = api_for(&base_url, Arc::new(connectivity.clone()));

    let err = api.info().await.expect_err("offline");
    assert!(err.is_offline());
    assert!(state.session_headers.lock().await.is_empty());

    connectivity.set_online(true);
    api.info().await.expect("online again");
}

#[tokio::test]
async fn refused_connection_counts_as_offline() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let api = api_for(&format!("http://{addr}/api"), Arc::new(AlwaysOnline));

    let err = api.info().await.expect_err("refused");
    assert!(err.is_offline(), "unexpected error: {err:?}");
}

#[test]
fn base_url_must_be_http() {
    assert!(parse_base_url("ftp://example.com").is_err());
    assert!(parse_base_url("not a url").is_err());
    let url = parse_base_url(" https://example.com/api/ ").expect("url");
    assert_eq!(url.as_str(), "https://example.com/api/");
}

#[test]
fn endpoints_extend_the_base_path() {
    let api = api_for("https://example.com/api/", Arc::new(AlwaysOnline));
    let url = api.endpoint(&["messages", "older", "m-1"]).expect("url");
    assert_eq!(url.as_str(), "https://example.com/api/messages/older/m-1");
}
