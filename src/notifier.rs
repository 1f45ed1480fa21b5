use anyhow::{Context, Result};
use tokio::sync::OnceCell;

use crate::config::MastodonConfig;
use crate::mastodon::{Account, MastodonClient};

const TOOT_VISIBILITY: &str = "unlisted";

/// Who a message is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// One plain post, no mentions.
    Public,
    /// One post per non-bot follower, each prefixed with that follower's
    /// mention handle.
    MentionFollowers,
}

/// Delivery seam between the bot and the social platform.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn post(&self, text: &str, audience: Audience) -> Result<()>;
}

pub struct MastodonNotifier {
    client: MastodonClient,
    config: MastodonConfig,
    session: OnceCell<Session>,
}

struct Session {
    token: String,
    followers: Vec<Account>,
}

impl MastodonNotifier {
    pub fn new(config: MastodonConfig) -> Self {
        Self {
            client: MastodonClient::new(&config.server),
            config,
            session: OnceCell::new(),
        }
    }

    /// Authenticate and resolve the follower list once per process; later
    /// posts reuse the same token.
    async fn session(&self) -> Result<&Session> {
        self.session
            .get_or_try_init(|| async {
                let client_id = self
                    .config
                    .client_id
                    .as_deref()
                    .context("mastodon.client_id is not configured")?;
                let client_secret = self
                    .config
                    .client_secret
                    .as_deref()
                    .context("mastodon.client_secret is not configured")?;
                let email = self
                    .config
                    .email
                    .as_deref()
                    .context("mastodon.email is not configured")?;
                let password = self
                    .config
                    .password
                    .as_deref()
                    .context("mastodon.password is not configured")?;

                let token = self
                    .client
                    .obtain_token(client_id, client_secret, email, password)
                    .await?;
                let account = self.client.verify_credentials(&token).await?;
                let followers = self.client.followers(&token, &account.id).await?;
                tracing::info!(
                    "Authenticated as {} ({} followers)",
                    account.acct,
                    followers.len()
                );

                Ok(Session { token, followers })
            })
            .await
    }
}

#[async_trait::async_trait]
impl Notifier for MastodonNotifier {
    async fn post(&self, text: &str, audience: Audience) -> Result<()> {
        let session = self.session().await?;

        match audience {
            Audience::Public => {
                self.client
                    .post_status(&session.token, text, TOOT_VISIBILITY)
                    .await?;
                tracing::info!("Posted: {text}");
            }
            Audience::MentionFollowers => {
                for message in mention_messages(text, &session.followers) {
                    self.client
                        .post_status(&session.token, &message, TOOT_VISIBILITY)
                        .await?;
                    tracing::info!("Posted: {message}");
                }
            }
        }

        Ok(())
    }
}

/// One copy of `text` per non-bot follower, prefixed with the follower's
/// mention handle. Accounts whose profile URL yields no handle are skipped.
fn mention_messages(text: &str, followers: &[Account]) -> Vec<String> {
    followers
        .iter()
        .filter(|a| !a.bot)
        .filter_map(Account::mention_token)
        .map(|token| format!("{token} {text}"))
        .collect()
}
