//! The `atlas.cloud` block.
//!
//! The block has two views. Providers read [`CloudConfig`] directly, secrets
//! included. Expressions only ever see [`CloudConfig::external_view`], an
//! explicit allow-list that currently exposes a single `client` flag.

use std::fmt;

use atlas_db::MemDir;
use atlas_db::migrate::unarchive_dir;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::error::ProviderError;

const USER_AGENT: &str = concat!("atlas-ext/", env!("CARGO_PKG_VERSION"));

const DIR_QUERY: &str = "query dirState($name: String!, $tag: String) { dir(name: $name, tag: $tag) { content } }";

/// Internal view of the cloud block.
#[derive(Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloudConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub project: Option<String>,
}

impl fmt::Debug for CloudConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudConfig")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("project", &self.project)
            .finish()
    }
}

impl CloudConfig {
    /// Both the endpoint and the token are set.
    pub fn has_client(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.is_empty())
            && self.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Build an authenticated client for the configured endpoint.
    pub fn client(&self) -> Result<CloudClient, ProviderError> {
        match (self.url.as_deref(), self.token.as_deref()) {
            (Some(url), Some(token)) if !url.is_empty() && !token.is_empty() => {
                let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
                Ok(CloudClient {
                    http,
                    url: url.trim_end_matches('/').to_string(),
                    token: token.to_string(),
                })
            }
            _ => Err(ProviderError::MissingCloudConfig),
        }
    }

    /// The attributes expressions are allowed to see.
    pub fn external_view(&self) -> Value {
        let mut view = Map::new();
        view.insert("client".to_string(), Value::Bool(self.has_client()));
        Value::Object(view)
    }
}

/// HTTP client for the cloud API.
pub struct CloudClient {
    http: reqwest::Client,
    url: String,
    token: String,
}

impl fmt::Debug for CloudClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudClient").field("url", &self.url).finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct DirResponse {
    data: DirData,
}

#[derive(Deserialize)]
struct DirData {
    dir: DirContent,
}

#[derive(Deserialize)]
struct DirContent {
    content: String,
}

impl CloudClient {
    /// Fetch a migration directory by name, and optionally by tag.
    pub async fn dir(&self, name: &str, tag: Option<&str>) -> Result<MemDir, ProviderError> {
        let endpoint = format!("{}/api/query", self.url);
        let body = json!({
            "query": DIR_QUERY,
            "variables": { "name": name, "tag": tag },
        });
        debug!(endpoint = %endpoint, name, tag, "fetching remote directory");

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: DirResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        let archive = STANDARD.decode(parsed.data.dir.content.as_bytes())?;
        let dir = unarchive_dir(&archive).map_err(ProviderError::Archive)?;
        info!(name, files = dir.len(), "fetched remote directory");
        Ok(dir)
    }
}
