use crate::snapshot::Snapshot;
use crate::store::{validate_name, SnapshotStore, StoreError};
use base64::{engine::general_purpose, Engine};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const API_ROOT: &str = "https://api.github.com";

#[derive(Debug, Clone)]
pub struct GitHubStoreConfig {
    /// `owner/repo`
    pub repository: String,
    pub branch: String,
    pub token: Option<String>,
    pub commit_message: String,
}

impl GitHubStoreConfig {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            branch: "main".to_string(),
            token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
            commit_message: "Update listing snapshot".to_string(),
        }
    }
}

/// Snapshots as JSON files in a GitHub repository, written through the contents API.
///
/// Every save is a single commit, so a snapshot is either fully replaced or untouched.
pub struct GitHubStore {
    client: Client,
    config: GitHubStoreConfig,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

impl GitHubStore {
    pub fn new(config: GitHubStoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .user_agent(concat!("chintaifinder/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn contents_url(&self, name: &str) -> Result<String, StoreError> {
        validate_name(name)?;
        Ok(format!(
            "{}/repos/{}/contents/{}.json",
            API_ROOT,
            self.config.repository,
            urlencoding::encode(name)
        ))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("Accept", "application/vnd.github.v3+json");
        match &self.config.token {
            Some(token) => request.header("Authorization", format!("token {}", token)),
            None => request,
        }
    }

    fn fetch_contents(&self, name: &str) -> Result<Option<ContentsResponse>, StoreError> {
        let url = self.contents_url(name)?;
        debug!("Fetching snapshot contents: {}", url);

        let response = self
            .authorized(self.client.get(&url))
            .query(&[("ref", self.config.branch.as_str())])
            .send()?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response)?;
        Ok(Some(response.json()?))
    }

    fn download(&self, url: &str) -> Result<String, StoreError> {
        let response = self.authorized(self.client.get(url)).send()?;
        Ok(ensure_success(response)?.text()?)
    }
}

impl SnapshotStore for GitHubStore {
    fn describe(&self) -> String {
        format!("github.com/{} ({})", self.config.repository, self.config.branch)
    }

    fn load(&self, name: &str) -> Result<Option<Snapshot>, StoreError> {
        let Some(contents) = self.fetch_contents(name)? else {
            debug!("No snapshot named {} in {}", name, self.describe());
            return Ok(None);
        };

        let json = match embedded_content(&contents)? {
            Some(json) => json,
            None => self.download(large_file_url(&contents)?)?,
        };

        let snapshot = Snapshot::from_json_str(&json)?;
        info!("Loaded {} listings for {} from {}", snapshot.len(), name, self.describe());
        Ok(Some(snapshot))
    }

    fn save(&self, name: &str, snapshot: &Snapshot) -> Result<(), StoreError> {
        let url = self.contents_url(name)?;
        let json = snapshot
            .to_json_string()
            .map_err(|e| StoreError::Encoding(e.to_string()))?;

        let sha = self.fetch_contents(name)?.map(|c| c.sha);
        let body = PutContentsRequest {
            message: &self.config.commit_message,
            content: general_purpose::STANDARD.encode(json.as_bytes()),
            branch: &self.config.branch,
            sha,
        };

        let response = self.authorized(self.client.put(&url)).json(&body).send()?;
        ensure_success(response)?;
        info!("Saved {} listings for {} to {}", snapshot.len(), name, self.describe());
        Ok(())
    }
}

fn ensure_success(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(StoreError::Http {
        status: status.as_u16(),
        body,
    })
}

/// The snapshot embedded in a contents response, or `None` when the API left
/// `content` empty because the file is above 1 MB.
fn embedded_content(contents: &ContentsResponse) -> Result<Option<String>, StoreError> {
    if contents.content.is_empty() {
        return Ok(None);
    }
    decode_content(&contents.content, contents.encoding.as_deref()).map(Some)
}

fn large_file_url(contents: &ContentsResponse) -> Result<&str, StoreError> {
    contents
        .download_url
        .as_deref()
        .ok_or_else(|| StoreError::Encoding("snapshot too large and no download_url".to_string()))
}

/// Decodes the `content` field of a contents API response.
fn decode_content(content: &str, encoding: Option<&str>) -> Result<String, StoreError> {
    match encoding {
        Some("base64") | None => {
            // The API wraps base64 content at 60 columns
            let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = general_purpose::STANDARD
                .decode(compact)
                .map_err(|e| StoreError::Encoding(format!("invalid base64 content: {}", e)))?;
            String::from_utf8(bytes)
                .map_err(|e| StoreError::Encoding(format!("snapshot is not UTF-8: {}", e)))
        }
        Some(other) => Err(StoreError::Encoding(format!("unsupported content encoding {}", other))),
    }
}
