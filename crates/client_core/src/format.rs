//! Human-readable labels for timestamps and the quick reaction picker.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// Emoji offered by the quick reaction picker, in display order.
pub const QUICK_REACTIONS: [&str; 6] = ["👍", "❤️", "😄", "😮", "😂", "😢"];

/// Maps a 1-based picker position to its emoji. Anything else is taken as
/// the reaction itself.
pub fn resolve_reaction(input: &str) -> &str {
    let input = input.trim();
    input
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|index| QUICK_REACTIONS.get(index).copied())
        .unwrap_or(input)
}

pub fn relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - ts).num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{minutes} min ago");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{hours} hour{} ago", plural(hours));
    }
    let days = hours / 24;
    if days < 7 {
        return format!("{days} day{} ago", plural(days));
    }
    ts.format("%b %-d").to_string()
}

/// Label for a date separator relative to `today`.
pub fn day_label(date: NaiveDate, today: NaiveDate) -> String {
    match (today - date).num_days() {
        0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        2..=6 => date.format("%A").to_string(),
        _ => date.format("%b %-d").to_string(),
    }
}

pub fn message_time<Tz>(ts: DateTime<Utc>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    ts.with_timezone(tz).format("%-I:%M %p").to_string()
}

pub fn last_seen_label(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - ts).num_minutes();
    match minutes {
        m if m < 1 => "just now".to_string(),
        m if m < 60 => format!("{m} minutes ago"),
        m if m < 1440 => format!("{} hours ago", m / 60),
        m => format!("{} days ago", m / 1440),
    }
}

fn plural(n: i64) -> &'static str {
    if n > 1 {
        "s"
    } else {
        ""
    }
}
