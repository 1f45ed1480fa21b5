use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";
const OAUTH_SCOPES: &str = "read write follow";

pub struct MastodonClient {
    client: Client,
    base_url: String,
}

// --- Request types ---

#[derive(Serialize)]
struct RegisterAppRequest<'a> {
    client_name: &'a str,
    redirect_uris: &'a str,
    scopes: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    website: Option<&'a str>,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    username: &'a str,
    password: &'a str,
    scope: &'a str,
}

#[derive(Serialize)]
struct StatusRequest<'a> {
    status: &'a str,
    visibility: &'a str,
}

// --- Response types ---

#[derive(Debug, Deserialize)]
pub struct RegisteredApp {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub id: String,
    pub acct: String,
    pub url: String,
    #[serde(default)]
    pub bot: bool,
}

impl Account {
    /// Mention handle derived from the profile URL
    /// (`https://host/@user` becomes `@user@host`).
    pub fn mention_token(&self) -> Option<String> {
        let mut segments = self.url.split('/').rev().filter(|s| !s.is_empty());
        let user = segments.next()?;
        let host = segments.next()?;
        Some(format!("{user}@{host}"))
    }
}

impl MastodonClient {
    pub fn new(server: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: server.trim_end_matches('/').to_string(),
        }
    }

    /// Register this bot as an OAuth application on the server and return
    /// the credentials to put into the config file.
    pub async fn register_app(
        &self,
        client_name: &str,
        website: Option<&str>,
    ) -> Result<RegisteredApp> {
        let url = format!("{}/api/v1/apps", self.base_url);
        let request = RegisterAppRequest {
            client_name,
            redirect_uris: OOB_REDIRECT_URI,
            scopes: OAUTH_SCOPES,
            website,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to call Mastodon app registration")?;

        let response = Self::check(response, "app registration").await?;
        response
            .json()
            .await
            .context("Failed to parse Mastodon app registration response")
    }

    /// Exchange account credentials for an access token (password grant).
    pub async fn obtain_token(
        &self,
        client_id: &str,
        client_secret: &str,
        email: &str,
        password: &str,
    ) -> Result<String> {
        let url = format!("{}/oauth/token", self.base_url);
        let request = TokenRequest {
            grant_type: "password",
            client_id,
            client_secret,
            username: email,
            password,
            scope: OAUTH_SCOPES,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to call Mastodon token endpoint")?;

        let response = Self::check(response, "authentication").await?;
        let body: TokenResponse = response
            .json()
            .await
            .context("Failed to parse Mastodon token response")?;
        Ok(body.access_token)
    }

    /// Account the token belongs to.
    pub async fn verify_credentials(&self, token: &str) -> Result<Account> {
        let url = format!("{}/api/v1/accounts/verify_credentials", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .context("Failed to call Mastodon credential check")?;

        let response = Self::check(response, "credential check").await?;
        response
            .json()
            .await
            .context("Failed to parse Mastodon account response")
    }

    /// First page of the account's followers.
    pub async fn followers(&self, token: &str, account_id: &str) -> Result<Vec<Account>> {
        let url = format!("{}/api/v1/accounts/{}/followers", self.base_url, account_id);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .context("Failed to call Mastodon follower list")?;

        let response = Self::check(response, "follower list").await?;
        response
            .json()
            .await
            .context("Failed to parse Mastodon follower response")
    }

    pub async fn post_status(&self, token: &str, status: &str, visibility: &str) -> Result<()> {
        let url = format!("{}/api/v1/statuses", self.base_url);
        let request = StatusRequest { status, visibility };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {token}"))
            .json(&request)
            .send()
            .await
            .context("Failed to call Mastodon status endpoint")?;

        Self::check(response, "status post").await?;
        Ok(())
    }

    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Mastodon {what} error ({status}): {body}");
        }
        Ok(response)
    }
}
