use std::{
    collections::HashSet,
    sync::{Arc, Mutex as StdMutex, PoisonError},
};

use chrono::{DateTime, Utc};
use shared::{
    domain::{MessageId, ParticipantId},
    protocol::{MessagePayload, NewMessageRequest, ReactionPayload},
};
use storage::{StateKey, Storage};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    error::{ClientError, ClientResult},
    offline_queue::{self, QueueReport},
    reconcile::{self, MergeStats},
    transport::ChatApi,
    types::{PendingSend, SendOutcome, TimelineEntry},
};

#[derive(Default)]
struct MessageState {
    /// Newest first. Placeholders for queued sends sit at the head.
    entries: Vec<TimelineEntry>,
    pending: Vec<PendingSend>,
    watermark: Option<DateTime<Utc>>,
    has_more: bool,
}

/// Temp ids with a `create_message` request outstanding.
#[derive(Default)]
struct InFlight(StdMutex<HashSet<MessageId>>);

impl InFlight {
    /// Marks every id not already in flight. The marks are released when the
    /// returned claim drops, including when the owning future is cancelled.
    fn claim<'a>(&'a self, ids: impl IntoIterator<Item = MessageId>) -> InFlightClaim<'a> {
        let mut set = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let ids = ids.into_iter().filter(|id| set.insert(id.clone())).collect();
        InFlightClaim { owner: self, ids }
    }

    fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

struct InFlightClaim<'a> {
    owner: &'a InFlight,
    ids: Vec<MessageId>,
}

impl InFlightClaim<'_> {
    fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        let mut set = self.owner.0.lock().unwrap_or_else(PoisonError::into_inner);
        for id in &self.ids {
            set.remove(id);
        }
    }
}

pub struct MessageStore {
    api: Arc<dyn ChatApi>,
    storage: Storage,
    clock: Arc<dyn Clock>,
    page_size: usize,
    state: Mutex<MessageState>,
    in_flight: InFlight,
}

impl MessageStore {
    pub fn new(
        api: Arc<dyn ChatApi>,
        storage: Storage,
        clock: Arc<dyn Clock>,
        page_size: usize,
    ) -> Self {
        Self {
            api,
            storage,
            clock,
            page_size: page_size.max(1),
            state: Mutex::new(MessageState::default()),
            in_flight: InFlight::default(),
        }
    }

    /// Loads the last persisted timeline, queue and watermark.
    pub async fn restore(&self) -> ClientResult<()> {
        let entries: Vec<TimelineEntry> = self
            .storage
            .get_json(StateKey::Messages)
            .await?
            .unwrap_or_default();
        let pending: Vec<PendingSend> = self
            .storage
            .get_json(StateKey::PendingMessages)
            .await?
            .unwrap_or_default();
        let watermark = self
            .storage
            .get_json::<i64>(StateKey::MessagesWatermark)
            .await?
            .and_then(DateTime::from_timestamp_millis);
        let has_more = self
            .storage
            .get_json::<bool>(StateKey::MessagesHasMore)
            .await?
            .unwrap_or(false);

        let mut state = self.state.lock().await;
        debug!(
            count = entries.len(),
            pending = pending.len(),
            "messages: restored local timeline"
        );
        state.entries = entries;
        state.pending = pending;
        state.watermark = watermark;
        state.has_more = has_more;
        self.in_flight.clear();
        Ok(())
    }

    pub async fn reset(&self) {
        *self.state.lock().await = MessageState::default();
        self.in_flight.clear();
    }

    /// Replaces the timeline with the newest page. Queued sends keep their
    /// placeholders at the head.
    pub async fn fetch_latest(&self) -> ClientResult<usize> {
        let requested_at = self.clock.now();
        let page = self.api.latest_messages().await?;
        let count = page.len();

        let mut state = self.state.lock().await;
        let placeholders: Vec<TimelineEntry> = state
            .entries
            .iter()
            .filter(|entry| entry.is_pending())
            .cloned()
            .collect();
        state.entries = placeholders;
        reconcile::append_older(&mut state.entries, page);
        state.watermark = Some(requested_at);
        state.has_more = count == self.page_size;
        self.persist(&state).await?;
        info!(
            count,
            has_more = state.has_more,
            "messages: loaded latest page"
        );
        Ok(count)
    }

    pub async fn fetch_older(&self, before: &MessageId) -> ClientResult<usize> {
        {
            let state = self.state.lock().await;
            if !state.entries.iter().any(|entry| !entry.is_pending()) {
                return Err(ClientError::EmptyTimeline);
            }
        }

        let page = self.api.older_messages(before).await?;
        let count = page.len();

        let mut state = self.state.lock().await;
        let appended = reconcile::append_older(&mut state.entries, page);
        state.has_more = count > 0 && count == self.page_size;
        self.persist(&state).await?;
        info!(
            before = %before,
            count,
            appended,
            has_more = state.has_more,
            "messages: loaded older page"
        );
        Ok(appended)
    }

    /// Fetches the page before the oldest loaded message, if the last page
    /// suggested there is one.
    pub async fn load_older(&self) -> ClientResult<usize> {
        let oldest = {
            let state = self.state.lock().await;
            if !state.has_more {
                return Ok(0);
            }
            state
                .entries
                .iter()
                .rev()
                .find(|entry| !entry.is_pending())
                .map(|entry| entry.id().clone())
        };
        let oldest = oldest.ok_or(ClientError::EmptyTimeline)?;
        self.fetch_older(&oldest).await
    }

    /// Pulls everything changed since the watermark. Without a watermark
    /// this is a full [`fetch_latest`](Self::fetch_latest).
    pub async fn fetch_updates(&self) -> ClientResult<MergeStats> {
        let since = self.state.lock().await.watermark;
        let Some(since) = since else {
            let inserted = self.fetch_latest().await?;
            return Ok(MergeStats {
                replaced: 0,
                inserted,
            });
        };

        let requested_at = self.clock.now();
        let delta = self.api.message_updates(since).await?;

        let mut state = self.state.lock().await;
        let stats = reconcile::merge_updates(&mut state.entries, delta);
        state.watermark = Some(requested_at);
        self.persist(&state).await?;
        if stats.changed() {
            info!(
                replaced = stats.replaced,
                inserted = stats.inserted,
                watermark_ms = requested_at.timestamp_millis(),
                "messages: merged updates"
            );
        }
        Ok(stats)
    }

    pub async fn send_message(
        &self,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> ClientResult<SendOutcome> {
        if text.trim().is_empty() {
            return Err(ClientError::Validation(
                "message text must not be blank".to_string(),
            ));
        }

        let pending = PendingSend {
            temp_id: MessageId::placeholder(),
            text: text.to_string(),
            reply_to,
            queued_at: self.clock.now(),
        };
        let temp_id = pending.temp_id.clone();
        let claim = self.in_flight.claim([temp_id.clone()]);
        {
            let mut state = self.state.lock().await;
            state.entries.insert(0, pending.placeholder_entry());
            state.pending.push(pending.clone());
            self.persist(&state).await?;
        }

        let request = NewMessageRequest {
            text: pending.text,
            reply_to: pending.reply_to,
        };
        let result = self.api.create_message(&request).await;

        let mut state = self.state.lock().await;
        drop(claim);
        match result {
            Ok(confirmed) => {
                settle_delivered(&mut state, &temp_id, confirmed.clone());
                self.persist(&state).await?;
                info!(temp_id = %temp_id, message_id = %confirmed.uuid, "messages: send confirmed");
                Ok(SendOutcome::Delivered(confirmed))
            }
            Err(err) if err.is_offline() => {
                info!(temp_id = %temp_id, "messages: offline, send queued for retry");
                Ok(SendOutcome::Queued { temp_id })
            }
            Err(err) => {
                reconcile::remove_entry(&mut state.entries, &temp_id);
                state.pending.retain(|queued| queued.temp_id != temp_id);
                self.persist(&state).await?;
                warn!(temp_id = %temp_id, "messages: send failed, placeholder dropped: {err}");
                Err(err)
            }
        }
    }

    /// Records a reaction from the current user. Reactions are kept locally
    /// and never posted.
    pub async fn add_reaction(&self, message_id: &MessageId, value: &str) -> ClientResult<()> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ClientError::Validation(
                "reaction must not be blank".to_string(),
            ));
        }
        let reaction = ReactionPayload {
            uuid: None,
            value: value.to_string(),
            participant_uuid: ParticipantId::current_user(),
            timestamp: Some(self.clock.now()),
        };

        let mut state = self.state.lock().await;
        if !reconcile::push_reaction(&mut state.entries, message_id, reaction) {
            return Err(ClientError::UnknownMessage(message_id.clone()));
        }
        self.persist(&state).await?;
        Ok(())
    }

    /// Retries every queued send. Sends already in flight are skipped.
    pub async fn process_queue(&self) -> ClientResult<QueueReport> {
        let (queued, claim) = {
            let state = self.state.lock().await;
            let claim = self
                .in_flight
                .claim(state.pending.iter().map(|pending| pending.temp_id.clone()));
            let queued: Vec<PendingSend> = state
                .pending
                .iter()
                .filter(|pending| claim.contains(&pending.temp_id))
                .cloned()
                .collect();
            (queued, claim)
        };
        if queued.is_empty() {
            return Ok(QueueReport::default());
        }

        let report = offline_queue::drain(self.api.as_ref(), &queued).await;

        let mut state = self.state.lock().await;
        drop(claim);
        for (temp_id, confirmed) in &report.delivered {
            settle_delivered(&mut state, temp_id, confirmed.clone());
        }
        self.persist(&state).await?;
        info!(
            delivered = report.delivered.len(),
            still_queued = state.pending.len(),
            "messages: processed offline queue"
        );
        Ok(report)
    }

    pub async fn entries(&self) -> Vec<TimelineEntry> {
        self.state.lock().await.entries.clone()
    }

    /// Timeline sorted oldest first, the order grouping expects.
    pub async fn chronological(&self) -> Vec<TimelineEntry> {
        let mut entries = self.entries().await;
        entries.sort_by_key(|entry| entry.message.sent_at);
        entries
    }

    pub async fn get(&self, id: &MessageId) -> Option<TimelineEntry> {
        self.state
            .lock()
            .await
            .entries
            .iter()
            .find(|entry| entry.id() == id)
            .cloned()
    }

    /// The message `message` replies to, when it is loaded.
    pub async fn reply_target(&self, message: &MessagePayload) -> Option<TimelineEntry> {
        let target = message.reply_to_message_uuid.as_ref()?;
        self.get(target).await
    }

    pub async fn pending(&self) -> Vec<PendingSend> {
        self.state.lock().await.pending.clone()
    }

    pub async fn has_more(&self) -> bool {
        self.state.lock().await.has_more
    }

    pub async fn watermark(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.watermark
    }

    async fn persist(&self, state: &MessageState) -> ClientResult<()> {
        self.storage
            .put_json(StateKey::Messages, &state.entries)
            .await?;
        self.storage
            .put_json(StateKey::PendingMessages, &state.pending)
            .await?;
        match state.watermark {
            Some(watermark) => {
                self.storage
                    .put_json(StateKey::MessagesWatermark, &watermark.timestamp_millis())
                    .await?
            }
            None => self.storage.remove(&[StateKey::MessagesWatermark]).await?,
        }
        self.storage
            .put_json(StateKey::MessagesHasMore, &state.has_more)
            .await?;
        Ok(())
    }
}

fn settle_delivered(state: &mut MessageState, temp_id: &MessageId, confirmed: MessagePayload) {
    if !reconcile::confirm_placeholder(&mut state.entries, temp_id, confirmed.clone()) {
        reconcile::merge_updates(&mut state.entries, vec![confirmed]);
    }
    state.pending.retain(|pending| &pending.temp_id != temp_id);
}

#[cfg(test)]
#[path = "tests/messages_tests.rs"]
mod tests;
