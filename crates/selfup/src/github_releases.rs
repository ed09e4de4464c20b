//! GitHub Releases API client and the release-source seam.
//!
//! The engine only sees the [`ReleaseSource`] trait; [`GitHubClient`] is the
//! production implementation. Private repositories are supported through an
//! optional bearer token.

use crate::error::{Result, UpdateError};
use crate::version::Version;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const LIST_TIMEOUT: Duration = Duration::from_secs(30);
const FETCH_TIMEOUT: Duration = Duration::from_secs(300);

/// One published release, as seen by the engine. Read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: String,
    /// Free-text release notes; may embed a metadata block.
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    /// Version parsed from the tag name (`v` prefix tolerated).
    pub fn version(&self) -> Result<Version> {
        self.tag_name.parse()
    }

    /// Find an asset whose file name contains `pattern`.
    pub fn find_asset(&self, pattern: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|a| a.name.contains(pattern))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
    #[serde(default)]
    pub size: u64,
}

/// Where releases come from. Narrow seam: listing and raw asset bytes.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// All published releases, newest first (as the hosting service orders them).
    async fn list_releases(&self) -> Result<Vec<Release>>;

    /// Fetch one asset's bytes.
    async fn fetch_asset(&self, asset: &ReleaseAsset) -> Result<Vec<u8>>;
}

/// GitHub Releases API client.
pub struct GitHubClient {
    repo_owner: String,
    repo_name: String,
    auth_token: Option<String>,
    user_agent: String,
    client: reqwest::Client,
}

impl GitHubClient {
    pub fn new(
        repo_owner: impl Into<String>,
        repo_name: impl Into<String>,
        auth_token: Option<String>,
    ) -> Self {
        Self {
            repo_owner: repo_owner.into(),
            repo_name: repo_name.into(),
            auth_token,
            user_agent: format!("selfup/{}", env!("CARGO_PKG_VERSION")),
            client: reqwest::Client::new(),
        }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.get(url).header("User-Agent", &self.user_agent);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        request
    }

    fn status_error(status: reqwest::StatusCode) -> UpdateError {
        let message = if status.as_u16() == 403 {
            "GitHub API denied the request (rate limit or missing token)".to_string()
        } else {
            format!("GitHub API returned {status}")
        };
        UpdateError::Network {
            message,
            status: Some(status.as_u16()),
        }
    }
}

#[async_trait]
impl ReleaseSource for GitHubClient {
    async fn list_releases(&self) -> Result<Vec<Release>> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/releases",
            self.repo_owner, self.repo_name
        );
        debug!(url = %url, "listing releases");

        let response = self
            .get(&url)
            .header("Accept", "application/vnd.github.v3+json")
            .timeout(LIST_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::status_error(response.status()));
        }

        Ok(response.json().await?)
    }

    async fn fetch_asset(&self, asset: &ReleaseAsset) -> Result<Vec<u8>> {
        debug!(asset = %asset.name, bytes = asset.size, "fetching release asset");

        let response = self
            .get(&asset.download_url)
            .header("Accept", "application/octet-stream")
            .timeout(FETCH_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::status_error(response.status()));
        }

        Ok(response.bytes().await?.to_vec())
    }
}
