//! Display grouping for a chronologically sorted message list.
//!
//! Consecutive messages from one sender form a group; the default rule also
//! splits a run when two messages are five minutes or more apart. The dated
//! variant interleaves one separator per calendar day.

use std::mem;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use shared::{domain::ParticipantId, protocol::MessagePayload};

use crate::types::TimelineEntry;

pub const DEFAULT_GROUP_GAP_SECS: i64 = 300;

pub trait Groupable {
    fn sender(&self) -> &ParticipantId;
    fn sent_at(&self) -> DateTime<Utc>;
}

impl Groupable for MessagePayload {
    fn sender(&self) -> &ParticipantId {
        &self.author_uuid
    }

    fn sent_at(&self) -> DateTime<Utc> {
        self.sent_at
    }
}

impl Groupable for TimelineEntry {
    fn sender(&self) -> &ParticipantId {
        &self.message.author_uuid
    }

    fn sent_at(&self) -> DateTime<Utc> {
        self.message.sent_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupingRule {
    SameSender,
    SameSenderWithin(Duration),
}

impl Default for GroupingRule {
    fn default() -> Self {
        GroupingRule::SameSenderWithin(Duration::seconds(DEFAULT_GROUP_GAP_SECS))
    }
}

impl GroupingRule {
    /// Whether `current` continues the group that `previous` belongs to.
    pub fn joins<T: Groupable>(&self, previous: &T, current: &T) -> bool {
        if previous.sender() != current.sender() {
            return false;
        }
        match self {
            GroupingRule::SameSender => true,
            GroupingRule::SameSenderWithin(gap) => current.sent_at() - previous.sent_at() < *gap,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageGroup<T> {
    pub sender: ParticipantId,
    pub items: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineItem<T> {
    DateSeparator(NaiveDate),
    Group(MessageGroup<T>),
}

pub fn group_messages<T: Groupable + Clone>(
    items: &[T],
    rule: GroupingRule,
) -> Vec<MessageGroup<T>> {
    let mut groups: Vec<MessageGroup<T>> = Vec::new();
    let mut previous: Option<&T> = None;
    for item in items {
        match (previous, groups.last_mut()) {
            (Some(prev), Some(group)) if rule.joins(prev, item) => {
                group.items.push(item.clone());
            }
            _ => groups.push(MessageGroup {
                sender: item.sender().clone(),
                items: vec![item.clone()],
            }),
        }
        previous = Some(item);
    }
    groups
}

/// Groups `items` and puts a separator before the first group of each day,
/// with days taken in `tz`. A group never spans two days.
pub fn group_with_date_separators<T, Tz>(
    items: &[T],
    rule: GroupingRule,
    tz: &Tz,
) -> Vec<TimelineItem<T>>
where
    T: Groupable + Clone,
    Tz: TimeZone,
{
    // Built newest-to-oldest, then reversed.
    let mut reversed: Vec<TimelineItem<T>> = Vec::new();
    let mut run: Vec<T> = Vec::new();
    let mut run_date: Option<NaiveDate> = None;

    for item in items.iter().rev() {
        let date = item.sent_at().with_timezone(tz).date_naive();
        let (breaks_group, breaks_day) = match run.last() {
            Some(newer) => {
                let same_day = run_date == Some(date);
                (!same_day || !rule.joins(item, newer), !same_day)
            }
            None => (false, false),
        };
        if breaks_group {
            flush_run(&mut reversed, &mut run);
        }
        if breaks_day {
            if let Some(day) = run_date {
                reversed.push(TimelineItem::DateSeparator(day));
            }
        }
        run_date = Some(date);
        run.push(item.clone());
    }

    flush_run(&mut reversed, &mut run);
    if let Some(day) = run_date {
        reversed.push(TimelineItem::DateSeparator(day));
    }
    reversed.reverse();
    reversed
}

fn flush_run<T: Groupable>(out: &mut Vec<TimelineItem<T>>, run: &mut Vec<T>) {
    if run.is_empty() {
        return;
    }
    let mut items = mem::take(run);
    items.reverse();
    let sender = items[0].sender().clone();
    out.push(TimelineItem::Group(MessageGroup { sender, items }));
}

#[cfg(test)]
#[path = "tests/grouping_tests.rs"]
mod tests;
