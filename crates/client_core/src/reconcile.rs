//! Pure merge rules applied by the stores after a request settles.
//!
//! The timeline is kept newest-first, the order in which pages are served.
//! None of these functions re-sort existing entries.

use std::collections::HashMap;

use shared::{
    domain::MessageId,
    protocol::{MessagePayload, ReactionPayload},
};

use crate::types::TimelineEntry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub replaced: usize,
    pub inserted: usize,
}

impl MergeStats {
    pub fn changed(&self) -> bool {
        self.replaced + self.inserted > 0
    }
}

/// Last-write-wins merge keyed by message id. Known ids are overwritten in
/// place; unseen ids go to the head, newest first. Applying the same delta
/// twice leaves the list unchanged the second time.
pub fn merge_updates(list: &mut Vec<TimelineEntry>, delta: Vec<MessagePayload>) -> MergeStats {
    let mut stats = MergeStats::default();
    let positions: HashMap<MessageId, usize> = list
        .iter()
        .enumerate()
        .map(|(index, entry)| (entry.id().clone(), index))
        .collect();

    let mut fresh: Vec<MessagePayload> = Vec::new();
    for message in delta {
        if let Some(&index) = positions.get(&message.uuid) {
            list[index] = TimelineEntry::confirmed(message);
            stats.replaced += 1;
        } else if let Some(existing) = fresh.iter_mut().find(|m| m.uuid == message.uuid) {
            *existing = message;
        } else {
            fresh.push(message);
        }
    }

    if !fresh.is_empty() {
        fresh.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        stats.inserted = fresh.len();
        list.splice(0..0, fresh.into_iter().map(TimelineEntry::confirmed));
    }
    stats
}

/// Appends an older page to the tail, skipping ids already present.
pub fn append_older(list: &mut Vec<TimelineEntry>, page: Vec<MessagePayload>) -> usize {
    let mut appended = 0;
    for message in page {
        if list.iter().any(|entry| entry.id() == &message.uuid) {
            continue;
        }
        list.push(TimelineEntry::confirmed(message));
        appended += 1;
    }
    appended
}

/// Swaps a placeholder for the server's copy of the message.
///
/// If the canonical id already arrived through an update poll, that entry is
/// overwritten and the placeholder dropped so the id stays unique. Returns
/// `false` when neither entry is present.
pub fn confirm_placeholder(
    list: &mut Vec<TimelineEntry>,
    temp_id: &MessageId,
    confirmed: MessagePayload,
) -> bool {
    let placeholder = list.iter().position(|entry| entry.id() == temp_id);
    let canonical = list
        .iter()
        .position(|entry| entry.id() == &confirmed.uuid);

    match (placeholder, canonical) {
        (Some(placeholder), Some(canonical)) if placeholder != canonical => {
            list[canonical] = TimelineEntry::confirmed(confirmed);
            list.remove(placeholder);
            true
        }
        (Some(index), _) | (None, Some(index)) => {
            list[index] = TimelineEntry::confirmed(confirmed);
            true
        }
        (None, None) => false,
    }
}

pub fn remove_entry(list: &mut Vec<TimelineEntry>, id: &MessageId) -> bool {
    let before = list.len();
    list.retain(|entry| entry.id() != id);
    list.len() != before
}

pub fn push_reaction(
    list: &mut [TimelineEntry],
    message_id: &MessageId,
    reaction: ReactionPayload,
) -> bool {
    match list.iter_mut().find(|entry| entry.id() == message_id) {
        Some(entry) => {
            entry.message.reactions.push(reaction);
            true
        }
        None => false,
    }
}

/// Reaction counts per value, in order of first appearance.
pub fn reaction_summary(reactions: &[ReactionPayload]) -> Vec<(String, usize)> {
    let mut summary: Vec<(String, usize)> = Vec::new();
    for reaction in reactions {
        match summary.iter_mut().find(|(value, _)| *value == reaction.value) {
            Some((_, count)) => *count += 1,
            None => summary.push((reaction.value.clone(), 1)),
        }
    }
    summary
}

#[cfg(test)]
#[path = "tests/reconcile_tests.rs"]
mod tests;
