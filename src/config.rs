use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Duration, FixedOffset};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub mastodon: MastodonConfig,
    #[serde(default)]
    pub target: TargetConfig,
}

#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> String {
    "https://spla2.yuu26.com".to_string()
}

fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    /// Where the schedule snapshot lives between runs. `~` is expanded.
    #[serde(default = "default_cache_path")]
    pub path: String,
    #[serde(default = "default_cache_ttl_hours")]
    pub ttl_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            ttl_hours: default_cache_ttl_hours(),
        }
    }
}

impl CacheConfig {
    pub fn resolved_path(&self) -> PathBuf {
        expand_tilde(&self.path)
    }

    pub fn ttl(&self) -> Duration {
        Duration::hours(self.ttl_hours as i64)
    }
}

fn default_cache_path() -> String {
    "~/.kombu-area-bot/cache.json".to_string()
}

fn default_cache_ttl_hours() -> u64 {
    12
}

#[derive(Debug, Clone, Deserialize)]
pub struct MastodonConfig {
    #[serde(default = "default_mastodon_server")]
    pub server: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub website: Option<String>,
}

impl Default for MastodonConfig {
    fn default() -> Self {
        Self {
            server: default_mastodon_server(),
            client_id: None,
            client_secret: None,
            email: None,
            password: None,
            website: None,
        }
    }
}

impl MastodonConfig {
    /// Posting needs the full credential set; `init`/`register`/`status` do not.
    pub fn require_credentials(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.client_id.is_none() {
            missing.push("mastodon.client_id (MASTODON_CLIENT_ID)");
        }
        if self.client_secret.is_none() {
            missing.push("mastodon.client_secret (MASTODON_CLIENT_SECRET)");
        }
        if self.email.is_none() {
            missing.push("mastodon.email (MASTODON_EMAIL)");
        }
        if self.password.is_none() {
            missing.push("mastodon.password (MASTODON_PASSWORD)");
        }
        if !missing.is_empty() {
            anyhow::bail!(
                "Missing Mastodon credentials: {}. Run `{} register` to obtain app credentials.",
                missing.join(", "),
                env!("CARGO_PKG_NAME"),
            );
        }
        Ok(())
    }
}

fn default_mastodon_server() -> String {
    "https://mustardon.tokyo".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// Ruleset display name as the schedule API reports it.
    #[serde(default = "default_rule")]
    pub rule: String,
    /// Map name that makes a window worth announcing.
    #[serde(default = "default_map")]
    pub map: String,
    /// Short name used in toot text.
    #[serde(default = "default_label")]
    pub label: String,
    /// Fixed UTC offset used when formatting start times.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            rule: default_rule(),
            map: default_map(),
            label: default_label(),
            utc_offset_hours: default_utc_offset_hours(),
        }
    }
}

impl TargetConfig {
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).expect("offset validated at load")
    }
}

fn default_rule() -> String {
    "ガチエリア".to_string()
}

fn default_map() -> String {
    "コンブトラック".to_string()
}

fn default_label() -> String {
    "コンブエリア".to_string()
}

fn default_utc_offset_hours() -> i32 {
    9
}

pub fn load(path: &str) -> Result<Config> {
    let path = expand_tilde(path);
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config.toml")?
    } else {
        Config::default()
    };

    apply_overrides(&mut config, |key| {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    });
    validate(&config)?;
    Ok(config)
}

/// Environment wins over the config file, so credentials can stay out of
/// the file on deployments that inject them per process.
fn apply_overrides(config: &mut Config, get: impl Fn(&str) -> Option<String>) {
    if let Some(v) = get("SPLA2_BASE_URL") {
        config.api.base_url = v;
    }
    if let Some(v) = get("KOMBU_USER_AGENT") {
        config.api.user_agent = v;
    }
    if let Some(v) = get("MASTODON_SERVER") {
        config.mastodon.server = v;
    }
    if let Some(v) = get("MASTODON_CLIENT_ID") {
        config.mastodon.client_id = Some(v);
    }
    if let Some(v) = get("MASTODON_CLIENT_SECRET") {
        config.mastodon.client_secret = Some(v);
    }
    if let Some(v) = get("MASTODON_EMAIL") {
        config.mastodon.email = Some(v);
    }
    if let Some(v) = get("MASTODON_PASSWORD") {
        config.mastodon.password = Some(v);
    }
}

const MAX_CACHE_TTL_HOURS: u64 = 24 * 365;

fn validate(config: &Config) -> Result<()> {
    if config.cache.ttl_hours > MAX_CACHE_TTL_HOURS {
        anyhow::bail!(
            "cache.ttl_hours must be at most {MAX_CACHE_TTL_HOURS}, got {}",
            config.cache.ttl_hours
        );
    }
    if !(-23..=23).contains(&config.target.utc_offset_hours) {
        anyhow::bail!(
            "target.utc_offset_hours must be between -23 and 23, got {}",
            config.target.utc_offset_hours
        );
    }
    Ok(())
}

/// Write a commented starter config if none exists yet. Returns the path.
pub fn init_config_file() -> Result<PathBuf> {
    let base = default_base_dir();
    std::fs::create_dir_all(&base)
        .with_context(|| format!("Failed to create {}", base.display()))?;

    let config_path = base.join("config.toml");
    if !config_path.exists() {
        std::fs::write(
            &config_path,
            r#"[mastodon]
server = "https://mustardon.tokyo"
# Obtain these with `kombu-area-bot register`, or set the matching
# environment variables (MASTODON_CLIENT_ID etc.) instead.
client_id = "YOUR_CLIENT_ID"
client_secret = "YOUR_CLIENT_SECRET"
email = "bot@example.com"
password = "YOUR_PASSWORD"
# website = "https://example.com/kombu-area-bot"

[api]
# base_url = "https://spla2.yuu26.com"
# user_agent = "kombu-area-bot/0.1.0"

[cache]
# path = "~/.kombu-area-bot/cache.json"
# ttl_hours = 12

[target]
# rule = "ガチエリア"
# map = "コンブトラック"
# label = "コンブエリア"
# utc_offset_hours = 9
"#,
        )
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    }

    Ok(config_path)
}

fn default_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kombu-area-bot")
}

fn expand_tilde(path: &str) -> PathBuf {
    if path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(&path[2..]);
        }
    }
    PathBuf::from(path)
}
