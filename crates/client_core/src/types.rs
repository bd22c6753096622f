use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{MessageId, ParticipantId},
    protocol::MessagePayload,
};

/// Whether the server has acknowledged a message yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Delivery {
    Confirmed,
    PendingLocal { temp_id: MessageId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub message: MessagePayload,
    pub delivery: Delivery,
}

impl TimelineEntry {
    pub fn confirmed(message: MessagePayload) -> Self {
        Self {
            message,
            delivery: Delivery::Confirmed,
        }
    }

    pub fn id(&self) -> &MessageId {
        &self.message.uuid
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.delivery, Delivery::PendingLocal { .. })
    }
}

/// Outbound message waiting for a successful `POST /messages/new`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSend {
    pub temp_id: MessageId,
    pub text: String,
    pub reply_to: Option<MessageId>,
    pub queued_at: DateTime<Utc>,
}

impl PendingSend {
    pub fn placeholder_message(&self) -> MessagePayload {
        MessagePayload {
            uuid: self.temp_id.clone(),
            author_uuid: ParticipantId::current_user(),
            text: self.text.clone(),
            sent_at: self.queued_at,
            edited_at: None,
            reply_to_message_uuid: self.reply_to.clone(),
            attachments: Vec::new(),
            reactions: Vec::new(),
        }
    }

    pub fn placeholder_entry(&self) -> TimelineEntry {
        TimelineEntry {
            message: self.placeholder_message(),
            delivery: Delivery::PendingLocal {
                temp_id: self.temp_id.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered(MessagePayload),
    Queued { temp_id: MessageId },
}
