use chrono::{DateTime, Duration, Utc};

use crate::config::TargetConfig;
use crate::schedule::{RotationWindow, ScheduleSnapshot};

const EARLY_LEAD_HOURS: i64 = 2;
const LATE_LEAD_MINUTES: i64 = 10;
const SUMMARY_INTERVAL_HOURS: i64 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// Heads-up, fires once the start is under two hours away.
    Early,
    /// Final call, fires once the start is under ten minutes away.
    Late,
}

#[derive(Debug, Clone)]
pub struct DueNotification {
    pub kind: NotificationKind,
    pub window: RotationWindow,
}

#[derive(Debug)]
pub struct Evaluation {
    /// Newly due notifications in window order, at most one per window per run.
    pub due: Vec<DueNotification>,
    /// Start times for the aggregate schedule post, present only when the
    /// summary throttle allows one this run.
    pub summary_starts: Option<Vec<DateTime<Utc>>>,
    /// The input snapshot with notification flags advanced; this is what the
    /// caller must persist so later runs stay quiet.
    pub snapshot: ScheduleSnapshot,
}

/// Decide which notifications crossed their threshold since the last run.
/// The late check comes first and marks both flags, so a heads-up is never
/// sent after its final call. Ended windows are skipped whatever their flags.
pub fn evaluate(
    mut snapshot: ScheduleSnapshot,
    now: DateTime<Utc>,
    target: &TargetConfig,
) -> Evaluation {
    let mut due = Vec::new();
    let mut upcoming = Vec::new();

    for window in &mut snapshot.windows {
        if !window.matches(&target.rule, &target.map) || window.end_at <= now {
            continue;
        }
        upcoming.push(window.start_at);

        if now + Duration::minutes(LATE_LEAD_MINUTES) > window.start_at && !window.notified.late {
            window.notified.late = true;
            window.notified.early = true;
            due.push(DueNotification {
                kind: NotificationKind::Late,
                window: window.clone(),
            });
        } else if now + Duration::hours(EARLY_LEAD_HOURS) > window.start_at
            && !window.notified.early
        {
            window.notified.early = true;
            due.push(DueNotification {
                kind: NotificationKind::Early,
                window: window.clone(),
            });
        }
    }

    let summary_open = match snapshot.last_summary_at {
        Some(at) => now - at > Duration::hours(SUMMARY_INTERVAL_HOURS),
        None => true,
    };
    let summary_starts = if summary_open && !upcoming.is_empty() {
        snapshot.last_summary_at = Some(now);
        Some(upcoming)
    } else {
        None
    };

    Evaluation {
        due,
        summary_starts,
        snapshot,
    }
}
