use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use shared::{domain::ParticipantId, protocol::ParticipantPayload};
use storage::{StateKey, Storage};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{clock::Clock, error::ClientResult, transport::ChatApi};

#[derive(Default)]
struct ParticipantState {
    participants: HashMap<ParticipantId, ParticipantPayload>,
    watermark: Option<DateTime<Utc>>,
}

pub struct ParticipantStore {
    api: Arc<dyn ChatApi>,
    storage: Storage,
    clock: Arc<dyn Clock>,
    state: Mutex<ParticipantState>,
}

impl ParticipantStore {
    pub fn new(api: Arc<dyn ChatApi>, storage: Storage, clock: Arc<dyn Clock>) -> Self {
        Self {
            api,
            storage,
            clock,
            state: Mutex::new(ParticipantState::default()),
        }
    }

    pub async fn restore(&self) -> ClientResult<()> {
        let participants: Vec<ParticipantPayload> = self
            .storage
            .get_json(StateKey::Participants)
            .await?
            .unwrap_or_default();
        let watermark = self
            .storage
            .get_json::<i64>(StateKey::ParticipantsWatermark)
            .await?
            .and_then(DateTime::from_timestamp_millis);

        let mut state = self.state.lock().await;
        debug!(count = participants.len(), "participants: restored local roster");
        state.participants = participants
            .into_iter()
            .map(|participant| (participant.uuid.clone(), participant))
            .collect();
        state.watermark = watermark;
        Ok(())
    }

    pub async fn reset(&self) {
        *self.state.lock().await = ParticipantState::default();
    }

    pub async fn fetch_all(&self) -> ClientResult<usize> {
        let requested_at = self.clock.now();
        let roster = self.api.all_participants().await?;
        let count = roster.len();

        let mut state = self.state.lock().await;
        state.participants = roster
            .into_iter()
            .map(|participant| (participant.uuid.clone(), participant))
            .collect();
        state.watermark = Some(requested_at);
        self.persist(&state).await?;
        info!(count, "participants: loaded full roster");
        Ok(count)
    }

    /// Merges participants changed since the watermark, falling back to a
    /// full fetch when there is none yet.
    pub async fn fetch_updates(&self) -> ClientResult<usize> {
        let since = self.state.lock().await.watermark;
        let Some(since) = since else {
            return self.fetch_all().await;
        };

        let requested_at = self.clock.now();
        let delta = self.api.participant_updates(since).await?;
        let count = delta.len();

        let mut state = self.state.lock().await;
        for participant in delta {
            state
                .participants
                .insert(participant.uuid.clone(), participant);
        }
        state.watermark = Some(requested_at);
        self.persist(&state).await?;
        if count > 0 {
            info!(
                count,
                watermark_ms = requested_at.timestamp_millis(),
                "participants: merged updates"
            );
        }
        Ok(count)
    }

    pub async fn get(&self, id: &ParticipantId) -> Option<ParticipantPayload> {
        self.state.lock().await.participants.get(id).cloned()
    }

    /// All participants ordered by name, case-insensitively.
    pub async fn list(&self) -> Vec<ParticipantPayload> {
        let state = self.state.lock().await;
        sorted(state.participants.values().cloned().collect())
    }

    /// Mention lookup: participants whose name contains `query`, ignoring
    /// case. A blank query matches everyone.
    pub async fn search(&self, query: &str) -> Vec<ParticipantPayload> {
        let needle = query.trim().to_lowercase();
        let state = self.state.lock().await;
        let matches = state
            .participants
            .values()
            .filter(|participant| {
                needle.is_empty() || participant.name.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        sorted(matches)
    }

    pub async fn display_name(&self, id: &ParticipantId) -> String {
        if id.is_current_user() {
            return "You".to_string();
        }
        self.state
            .lock()
            .await
            .participants
            .get(id)
            .map(|participant| participant.name.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub async fn watermark(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.watermark
    }

    async fn persist(&self, state: &ParticipantState) -> ClientResult<()> {
        let roster = sorted(state.participants.values().cloned().collect());
        self.storage
            .put_json(StateKey::Participants, &roster)
            .await?;
        match state.watermark {
            Some(watermark) => {
                self.storage
                    .put_json(
                        StateKey::ParticipantsWatermark,
                        &watermark.timestamp_millis(),
                    )
                    .await?
            }
            None => self.storage.remove(&[StateKey::ParticipantsWatermark]).await?,
        }
        Ok(())
    }
}

fn sorted(mut participants: Vec<ParticipantPayload>) -> Vec<ParticipantPayload> {
    participants.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.uuid.cmp(&b.uuid))
    });
    participants
}

#[cfg(test)]
#[path = "tests/participants_tests.rs"]
mod tests;
