use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::config::ApiConfig;
use crate::schedule::{NotifyFlags, RotationWindow, ScheduleSnapshot};

/// Source of fresh rotation data; the bot only sees this seam so tests can
/// feed it canned schedules.
#[async_trait::async_trait]
pub trait ScheduleSource: Send + Sync {
    /// Fetch the rotation list at `path` as a fresh snapshot: flags cleared,
    /// fetch time stamped.
    async fn fetch(&self, path: &str) -> Result<ScheduleSnapshot>;
}

pub struct Spla2Client {
    client: Client,
    base_url: String,
    user_agent: String,
}

// --- Response types (spla2.yuu26.com, consumed subset) ---

#[derive(Deserialize)]
struct SchedulesResponse {
    result: Vec<WireWindow>,
}

#[derive(Deserialize)]
struct WireWindow {
    rule: String,
    #[serde(default)]
    rule_ex: Option<WireRule>,
    maps: Vec<String>,
    start_utc: DateTime<Utc>,
    end_utc: DateTime<Utc>,
}

#[derive(Deserialize)]
struct WireRule {
    key: String,
}

impl Spla2Client {
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
        }
    }
}

#[async_trait::async_trait]
impl ScheduleSource for Spla2Client {
    async fn fetch(&self, path: &str) -> Result<ScheduleSnapshot> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));

        let response = self
            .client
            .get(&url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .with_context(|| format!("Failed to call schedule API: {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Schedule API error ({status}): {body}");
        }

        let body: SchedulesResponse = response
            .json()
            .await
            .context("Failed to parse schedule API response")?;

        let snapshot = into_snapshot(body, Utc::now());
        tracing::info!("Fetched {} rotation windows", snapshot.windows.len());
        Ok(snapshot)
    }
}

fn into_snapshot(response: SchedulesResponse, fetched_at: DateTime<Utc>) -> ScheduleSnapshot {
    let windows = response
        .result
        .into_iter()
        .map(|w| RotationWindow {
            rule: w.rule,
            rule_key: w.rule_ex.map(|r| r.key).unwrap_or_default(),
            maps: w.maps,
            start_at: w.start_utc,
            end_at: w.end_utc,
            notified: NotifyFlags::default(),
        })
        .collect();

    ScheduleSnapshot {
        windows,
        fetched_at: Some(fetched_at),
        last_summary_at: None,
    }
}
