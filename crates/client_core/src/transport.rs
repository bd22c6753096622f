//! HTTP access to the chat server.
//!
//! Every request checks [`Connectivity`] first so that offline failures are
//! tagged before anything is dispatched, attaches `X-Session-ID` once a session
//! is known, and maps a `401` to [`ClientError::Unauthorized`].

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{MessageId, SessionId},
    protocol::{InfoResponse, MessagePayload, NewMessageRequest, ParticipantPayload},
};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ClientError, ClientResult};

pub const SESSION_HEADER: &str = "X-Session-ID";

#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_online(&self) -> bool;
}

pub struct AlwaysOnline;

#[async_trait]
impl Connectivity for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }
}

/// Reachability flag flipped by whoever observes the network.
#[derive(Clone)]
pub struct ManualConnectivity {
    online: Arc<AtomicBool>,
}

impl ManualConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connectivity for ManualConnectivity {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn set_session_id(&self, session_id: Option<SessionId>);
    async fn info(&self) -> ClientResult<InfoResponse>;
    async fn all_participants(&self) -> ClientResult<Vec<ParticipantPayload>>;
    async fn participant_updates(
        &self,
        since: DateTime<Utc>,
    ) -> ClientResult<Vec<ParticipantPayload>>;
    async fn latest_messages(&self) -> ClientResult<Vec<MessagePayload>>;
    async fn older_messages(&self, before: &MessageId) -> ClientResult<Vec<MessagePayload>>;
    async fn message_updates(&self, since: DateTime<Utc>) -> ClientResult<Vec<MessagePayload>>;
    async fn create_message(&self, request: &NewMessageRequest) -> ClientResult<MessagePayload>;
}

pub struct HttpChatApi {
    http: Client,
    base_url: Url,
    session_id: RwLock<Option<SessionId>>,
    connectivity: Arc<dyn Connectivity>,
}

impl HttpChatApi {
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        connectivity: Arc<dyn Connectivity>,
    ) -> ClientResult<Self> {
        let base_url = parse_base_url(base_url)?;
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| ClientError::Transport(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            base_url,
            session_id: RwLock::new(None),
            connectivity,
        })
    }

    pub async fn session_id(&self) -> Option<SessionId> {
        self.session_id.read().await.clone()
    }

    fn endpoint(&self, segments: &[&str]) -> ClientResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ClientError::Validation(format!("base url {} cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn prepare(&self, request: RequestBuilder) -> ClientResult<RequestBuilder> {
        if !self.connectivity.is_online().await {
            return Err(ClientError::Offline(
                "network request failed: offline".to_string(),
            ));
        }
        let request = match self.session_id.read().await.as_ref() {
            Some(session_id) => request.header(SESSION_HEADER, session_id.as_str()),
            None => request,
        };
        Ok(request)
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let response = self.prepare(request).await?.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!("transport: server rejected session (401)");
            return Err(ClientError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Http { status, body });
        }
        response
            .json::<T>()
            .await
            .map_err(|err| ClientError::Decode(err.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> ClientResult<T> {
        let url = self.endpoint(segments)?;
        debug!(%url, "transport: GET");
        self.execute(self.http.get(url)).await
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn set_session_id(&self, session_id: Option<SessionId>) {
        *self.session_id.write().await = session_id;
    }

    async fn info(&self) -> ClientResult<InfoResponse> {
        self.get(&["info"]).await
    }

    async fn all_participants(&self) -> ClientResult<Vec<ParticipantPayload>> {
        self.get(&["participants", "all"]).await
    }

    async fn participant_updates(
        &self,
        since: DateTime<Utc>,
    ) -> ClientResult<Vec<ParticipantPayload>> {
        let since = since.timestamp_millis().to_string();
        self.get(&["participants", "updates", &since]).await
    }

    async fn latest_messages(&self) -> ClientResult<Vec<MessagePayload>> {
        self.get(&["messages", "latest"]).await
    }

    async fn older_messages(&self, before: &MessageId) -> ClientResult<Vec<MessagePayload>> {
        self.get(&["messages", "older", before.as_str()]).await
    }

    async fn message_updates(&self, since: DateTime<Utc>) -> ClientResult<Vec<MessagePayload>> {
        let since = since.timestamp_millis().to_string();
        self.get(&["messages", "updates", &since]).await
    }

    async fn create_message(&self, request: &NewMessageRequest) -> ClientResult<MessagePayload> {
        let url = self.endpoint(&["messages", "new"])?;
        debug!(%url, "transport: POST");
        self.execute(self.http.post(url).json(request)).await
    }
}

fn parse_base_url(raw: &str) -> ClientResult<Url> {
    let raw = raw.trim();
    let url = Url::parse(raw)
        .map_err(|err| ClientError::Validation(format!("invalid base url '{raw}': {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::Validation(format!(
            "base url must start with http:// or https://, got '{raw}'"
        )));
    }
    Ok(url)
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
