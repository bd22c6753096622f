use std::{future::Future, sync::Arc, time::Duration};

use chrono::TimeZone;
use shared::{
    domain::{MessageId, SessionId},
    error::{ApiError, ErrorCode},
};
use storage::Storage;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{error, info, warn};

pub mod clock;
pub mod error;
pub mod format;
pub mod grouping;
pub mod messages;
pub mod offline_queue;
pub mod participants;
pub mod poller;
pub mod reconcile;
pub mod session;
pub mod transport;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ClientError, ClientResult};
pub use grouping::{GroupingRule, MessageGroup, TimelineItem};
pub use messages::MessageStore;
pub use participants::ParticipantStore;
pub use reconcile::MergeStats;
pub use session::{SessionCheck, SessionManager};
pub use transport::{AlwaysOnline, ChatApi, Connectivity, HttpChatApi, ManualConnectivity};
pub use types::{Delivery, PendingSend, SendOutcome, TimelineEntry};

pub const DEFAULT_BASE_URL: &str = "https://dummy-chat-server.tribechat.com/api";
pub const DEFAULT_PAGE_SIZE: usize = 25;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    /// Length of a full page from `/messages/latest` and `/messages/older`.
    pub page_size: usize,
    pub poll_interval: Duration,
    pub grouping: GroupingRule,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            page_size: DEFAULT_PAGE_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            grouping: GroupingRule::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    MessagesChanged,
    ParticipantsChanged,
    SessionRotated {
        previous: Option<SessionId>,
        current: SessionId,
    },
    SessionInvalidated,
    MessageQueued {
        temp_id: MessageId,
    },
    MessageDelivered {
        temp_id: MessageId,
        message_id: MessageId,
    },
    SyncFailed(ApiError),
}

/// What one background sync pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub delivered: usize,
    pub still_queued: usize,
    pub participants_updated: usize,
    pub messages: MergeStats,
}

pub struct ChatClient {
    config: ClientConfig,
    session: SessionManager,
    messages: MessageStore,
    participants: ParticipantStore,
    events: broadcast::Sender<ClientEvent>,
}

impl ChatClient {
    /// Builds a client talking HTTP to `config.base_url` and restores
    /// whatever `storage` holds from the previous run.
    pub async fn open(
        config: ClientConfig,
        storage: Storage,
        connectivity: Arc<dyn Connectivity>,
    ) -> ClientResult<Arc<Self>> {
        let api = HttpChatApi::new(&config.base_url, config.request_timeout, connectivity)?;
        Self::with_api(config, storage, Arc::new(api), Arc::new(SystemClock)).await
    }

    pub async fn with_api(
        config: ClientConfig,
        storage: Storage,
        api: Arc<dyn ChatApi>,
        clock: Arc<dyn Clock>,
    ) -> ClientResult<Arc<Self>> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let client = Self {
            session: SessionManager::new(Arc::clone(&api), storage.clone()),
            messages: MessageStore::new(
                Arc::clone(&api),
                storage.clone(),
                Arc::clone(&clock),
                config.page_size,
            ),
            participants: ParticipantStore::new(api, storage, clock),
            config,
            events,
        };

        let session_id = client.session.restore().await?;
        client.messages.restore().await?;
        client.participants.restore().await?;
        info!(
            session = session_id.as_ref().map(SessionId::as_str).unwrap_or("none"),
            "client: local state restored"
        );
        Ok(Arc::new(client))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    pub fn participants(&self) -> &ParticipantStore {
        &self.participants
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Session check, then the full roster, then the newest page of messages.
    /// A rotated session empties the in-memory stores before either fetch.
    pub async fn bootstrap(&self) -> ClientResult<SessionCheck> {
        self.guard(async {
            let check = self.session.check_session().await?;
            if check.rotated {
                self.messages.reset().await;
                self.participants.reset().await;
                self.emit(ClientEvent::SessionRotated {
                    previous: check.previous.clone(),
                    current: check.info.session_uuid.clone(),
                });
            }

            self.participants.fetch_all().await?;
            self.emit(ClientEvent::ParticipantsChanged);
            self.messages.fetch_latest().await?;
            self.emit(ClientEvent::MessagesChanged);
            Ok(check)
        })
        .await
    }

    /// One poll: retry queued sends, then pull participant and message deltas.
    pub async fn sync_once(&self) -> ClientResult<SyncReport> {
        self.guard(async {
            let delivered = self.drain_queue().await?;
            let participants_updated = self.participants.fetch_updates().await?;
            if participants_updated > 0 {
                self.emit(ClientEvent::ParticipantsChanged);
            }
            let messages = self.messages.fetch_updates().await?;
            if messages.changed() {
                self.emit(ClientEvent::MessagesChanged);
            }
            Ok(SyncReport {
                delivered,
                still_queued: self.messages.pending().await.len(),
                participants_updated,
                messages,
            })
        })
        .await
    }

    /// Retries queued sends without polling for updates.
    pub async fn process_queue(&self) -> ClientResult<usize> {
        self.guard(self.drain_queue()).await
    }

    pub async fn send_message(
        &self,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> ClientResult<SendOutcome> {
        self.guard(async {
            let outcome = self.messages.send_message(text, reply_to).await?;
            if let SendOutcome::Queued { temp_id } = &outcome {
                self.emit(ClientEvent::MessageQueued {
                    temp_id: temp_id.clone(),
                });
            }
            self.emit(ClientEvent::MessagesChanged);
            Ok(outcome)
        })
        .await
    }

    pub async fn add_reaction(&self, message_id: &MessageId, value: &str) -> ClientResult<()> {
        self.guard(async {
            self.messages.add_reaction(message_id, value).await?;
            self.emit(ClientEvent::MessagesChanged);
            Ok(())
        })
        .await
    }

    pub async fn load_older(&self) -> ClientResult<usize> {
        self.guard(async {
            let appended = self.messages.load_older().await?;
            if appended > 0 {
                self.emit(ClientEvent::MessagesChanged);
            }
            Ok(appended)
        })
        .await
    }

    /// Current timeline, oldest first, grouped for display with one date
    /// separator per day in `tz`.
    pub async fn grouped_timeline<Tz: TimeZone>(
        &self,
        tz: &Tz,
    ) -> Vec<TimelineItem<TimelineEntry>> {
        let entries = self.messages.chronological().await;
        grouping::group_with_date_separators(&entries, self.config.grouping, tz)
    }

    pub fn spawn_poller(self: &Arc<Self>) -> JoinHandle<()> {
        poller::spawn_poller(Arc::clone(self), self.config.poll_interval)
    }

    async fn drain_queue(&self) -> ClientResult<usize> {
        let report = self.messages.process_queue().await?;
        for (temp_id, confirmed) in &report.delivered {
            self.emit(ClientEvent::MessageDelivered {
                temp_id: temp_id.clone(),
                message_id: confirmed.uuid.clone(),
            });
        }
        if !report.delivered.is_empty() {
            self.emit(ClientEvent::MessagesChanged);
        }
        if report
            .failed
            .iter()
            .any(|(_, err)| matches!(err, ClientError::Unauthorized))
        {
            return Err(ClientError::Unauthorized);
        }
        Ok(report.delivered.len())
    }

    /// Runs `operation` and turns its failure into events. A rejected session
    /// wipes all local state first.
    async fn guard<T>(&self, operation: impl Future<Output = ClientResult<T>>) -> ClientResult<T> {
        let err = match operation.await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if matches!(err, ClientError::Unauthorized) {
            if let Err(wipe_err) = self.session.invalidate().await {
                error!("client: failed to clear local state after 401: {wipe_err}");
            }
            self.messages.reset().await;
            self.participants.reset().await;
            self.emit(ClientEvent::SessionInvalidated);
        }

        if !matches!(err.code(), ErrorCode::Validation | ErrorCode::NotFound) {
            warn!(code = ?err.code(), "client: operation failed: {err}");
            self.emit(ClientEvent::SyncFailed(err.to_api_error()));
        }
        Err(err)
    }

    fn emit(&self, event: ClientEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
