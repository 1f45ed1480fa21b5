use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Per-threshold notification markers for one rotation window. Flags only
/// move false to true; they reset when a fresh fetch replaces the snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyFlags {
    #[serde(default)]
    pub early: bool,
    #[serde(default)]
    pub late: bool,
}

/// One time-boxed rule + maps slot from the remote schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationWindow {
    pub rule: String,
    #[serde(default)]
    pub rule_key: String,
    pub maps: Vec<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default)]
    pub notified: NotifyFlags,
}

impl RotationWindow {
    /// True when this window runs `rule` and includes `map`.
    pub fn matches(&self, rule: &str, map: &str) -> bool {
        self.rule == rule && self.maps.iter().any(|m| m == map)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    pub windows: Vec<RotationWindow>,
    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_summary_at: Option<DateTime<Utc>>,
}

impl ScheduleSnapshot {
    /// A snapshot older than `ttl` must be re-fetched rather than reused.
    /// A never-fetched snapshot is always stale.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match self.fetched_at {
            Some(at) => now - at > ttl,
            None => true,
        }
    }
}
