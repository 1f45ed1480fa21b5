use chrono::{DateTime, FixedOffset, Utc};

use crate::evaluator::{DueNotification, NotificationKind};
use crate::schedule::RotationWindow;

/// Start times render as e.g. "2026-08-21 19:00 +09:00".
const TOOT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M %:z";

pub fn format_time(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset).format(TOOT_TIME_FORMAT).to_string()
}

pub fn notification_text(due: &DueNotification, label: &str, offset: FixedOffset) -> String {
    let start = format_time(due.window.start_at, offset);
    match due.kind {
        NotificationKind::Late => format!("{label} soon start at {start}"),
        NotificationKind::Early => format!("{label} start at {start}"),
    }
}

pub fn summary_text(starts: &[DateTime<Utc>], label: &str, offset: FixedOffset) -> String {
    let mut text = format!("{label} schedules\n");
    for start in starts {
        text.push_str(&format!("start at {}\n", format_time(*start, offset)));
    }
    text
}

/// One `status` line describing a cached window.
pub fn status_line(window: &RotationWindow, watched: bool, offset: FixedOffset) -> String {
    let rule = if window.rule_key.is_empty() {
        window.rule.clone()
    } else {
        format!("{} ({})", window.rule, window.rule_key)
    };
    let mut tags = String::new();
    if watched {
        tags.push_str(" [watched]");
    }
    match (window.notified.early, window.notified.late) {
        (_, true) => tags.push_str(" [announced: soon]"),
        (true, false) => tags.push_str(" [announced]"),
        (false, false) => {}
    }
    format!(
        "{} on {} from {} to {}{}",
        rule,
        window.maps.join(", "),
        format_time(window.start_at, offset),
        format_time(window.end_at, offset),
        tags
    )
}
