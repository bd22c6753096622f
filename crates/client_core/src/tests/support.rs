//! In-memory stand-ins shared by the store tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    domain::{MessageId, ParticipantId, SessionId},
    protocol::{InfoResponse, MessagePayload, NewMessageRequest, ParticipantPayload},
};
use storage::Storage;

use crate::{
    error::{ClientError, ClientResult},
    transport::ChatApi,
};

pub fn ts(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).expect("valid timestamp")
}

pub fn msg(id: &str, sender: &str, text: &str, sent_ms: i64) -> MessagePayload {
    MessagePayload {
        uuid: MessageId::from(id),
        author_uuid: ParticipantId::from(sender),
        text: text.to_string(),
        sent_at: ts(sent_ms),
        edited_at: None,
        reply_to_message_uuid: None,
        attachments: Vec::new(),
        reactions: Vec::new(),
    }
}

pub fn participant(id: &str, name: &str) -> ParticipantPayload {
    ParticipantPayload {
        uuid: ParticipantId::from(id),
        name: name.to_string(),
        avatar_url: None,
        last_seen_at: None,
        updated_at: ts(0),
    }
}

pub async fn memory_storage() -> Storage {
    Storage::new("sqlite::memory:").await.expect("db")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Offline,
    Unauthorized,
    ServerError,
}

impl Failure {
    fn to_error(self) -> ClientError {
        match self {
            Failure::Offline => ClientError::Offline("network request failed: offline".into()),
            Failure::Unauthorized => ClientError::Unauthorized,
            Failure::ServerError => ClientError::Http {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                body: "boom".into(),
            },
        }
    }
}

#[derive(Default)]
pub struct FakeState {
    pub session: Option<SessionId>,
    pub header: Option<SessionId>,
    pub roster: Vec<ParticipantPayload>,
    pub participant_delta: Vec<ParticipantPayload>,
    pub latest: Vec<MessagePayload>,
    pub older: HashMap<MessageId, Vec<MessagePayload>>,
    pub delta: Vec<MessagePayload>,
    pub failure: Option<Failure>,
    pub created: Vec<NewMessageRequest>,
    pub update_requests: Vec<DateTime<Utc>>,
    pub next_server_id: usize,
    /// Number of `create_message` calls seen so far, failed ones included.
    pub create_calls: usize,
    /// Failures keyed by the 1-based `create_message` call they apply to.
    pub create_failures: HashMap<usize, Failure>,
    /// While set, `create_message` never completes.
    pub stall_creates: bool,
}

/// Scriptable [`ChatApi`]. Every call fails with `failure` while it is set;
/// `create_failures` targets single sends.
#[derive(Clone, Default)]
pub struct FakeApi {
    pub state: Arc<Mutex<FakeState>>,
}

impl FakeApi {
    pub fn new(session: &str) -> Self {
        let api = Self::default();
        api.with(|state| state.session = Some(SessionId::from(session)));
        api
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().expect("fake state"))
    }

    pub fn fail(&self, failure: Option<Failure>) {
        self.with(|state| state.failure = failure);
    }

    fn check(&self) -> ClientResult<()> {
        match self.with(|state| state.failure) {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn set_session_id(&self, session_id: Option<SessionId>) {
        self.with(|state| state.header = session_id);
    }

    async fn info(&self) -> ClientResult<InfoResponse> {
        self.check()?;
        let session = self.with(|state| state.session.clone());
        Ok(InfoResponse {
            session_uuid: session.unwrap_or_else(|| SessionId::from("default")),
            api_version: 2,
        })
    }

    async fn all_participants(&self) -> ClientResult<Vec<ParticipantPayload>> {
        self.check()?;
        Ok(self.with(|state| state.roster.clone()))
    }

    async fn participant_updates(
        &self,
        _since: DateTime<Utc>,
    ) -> ClientResult<Vec<ParticipantPayload>> {
        self.check()?;
        Ok(self.with(|state| state.participant_delta.clone()))
    }

    async fn latest_messages(&self) -> ClientResult<Vec<MessagePayload>> {
        self.check()?;
        Ok(self.with(|state| state.latest.clone()))
    }

    async fn older_messages(&self, before: &MessageId) -> ClientResult<Vec<MessagePayload>> {
        self.check()?;
        Ok(self.with(|state| state.older.get(before).cloned().unwrap_or_default()))
    }

    async fn message_updates(&self, since: DateTime<Utc>) -> ClientResult<Vec<MessagePayload>> {
        self.check()?;
        Ok(self.with(|state| {
            state.update_requests.push(since);
            state.delta.clone()
        }))
    }

    async fn create_message(&self, request: &NewMessageRequest) -> ClientResult<MessagePayload> {
        let (scripted, stall) = self.with(|state| {
            state.create_calls += 1;
            let call = state.create_calls;
            (state.create_failures.remove(&call), state.stall_creates)
        });
        if stall {
            std::future::pending::<()>().await;
        }
        self.check()?;
        if let Some(failure) = scripted {
            return Err(failure.to_error());
        }
        Ok(self.with(|state| {
            state.next_server_id += 1;
            state.created.push(request.clone());
            let mut message = msg(
                &format!("srv-{}", state.next_server_id),
                "you",
                &request.text,
                1_700_000_000_000 + state.next_server_id as i64,
            );
            message.reply_to_message_uuid = request.reply_to.clone();
            message
        }))
    }
}
