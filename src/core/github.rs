use crate::core::change_set::ChangedFile;
use crate::error::{ReviewError, ReviewResult};
use base64::Engine;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const FILES_PER_PAGE: usize = 100;

/// Minimal GitHub REST client covering the three calls a review run needs.
pub struct GitHubClient {
    http: Client,
    api_url: Url,
    token: String,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Serialize)]
struct CommentRequest<'a> {
    body: &'a str,
}

impl GitHubClient {
    pub fn new(token: &str, api_url: &str) -> ReviewResult<Self> {
        let api_url = Url::parse(api_url)
            .map_err(|e| ReviewError::Config(format!("invalid GitHub API URL '{api_url}': {e}")))?;
        if api_url.cannot_be_a_base() {
            return Err(ReviewError::Config(format!(
                "GitHub API URL '{api_url}' cannot be used as a base"
            )));
        }

        let http = Client::builder()
            .user_agent(concat!("pr-critic/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ReviewError::Config(format!("failed to create GitHub client: {e}")))?;

        Ok(Self {
            http,
            api_url,
            token: token.to_string(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Lists every changed file of a pull request, following pagination.
    pub async fn list_pr_files(
        &self,
        owner: &str,
        repo: &str,
        pull_number: u64,
    ) -> ReviewResult<Vec<ChangedFile>> {
        let number = pull_number.to_string();
        let url = self.endpoint(&["repos", owner, repo, "pulls", &number, "files"]);

        let mut files = Vec::new();
        let mut page = 1usize;
        loop {
            debug!("Listing PR files, page {}", page);
            let response = self
                .get(url.clone())
                .query(&[("per_page", FILES_PER_PAGE), ("page", page)])
                .send()
                .await
                .map_err(|e| ReviewError::HostFetch(format!("failed to list PR files: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ReviewError::HostFetch(format!(
                    "GitHub API error {status}: {}",
                    body.trim()
                )));
            }

            let batch: Vec<ChangedFile> = response.json().await.map_err(|e| {
                ReviewError::HostFetch(format!("failed to parse PR file listing: {e}"))
            })?;
            let batch_len = batch.len();
            files.extend(batch);

            if batch_len < FILES_PER_PAGE {
                break;
            }
            page += 1;
        }

        Ok(files)
    }

    /// Fetches a file's text at `reference`.
    ///
    /// Fails for anything that is not a base64-encoded UTF-8 file body,
    /// including blobs too large for the contents API.
    pub async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        reference: &str,
    ) -> ReviewResult<String> {
        let content_error = |reason: String| ReviewError::ContentFetch {
            path: path.to_string(),
            reason,
        };

        let mut segments = vec!["repos", owner, repo, "contents"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        let url = self.endpoint(&segments);

        let response = self
            .get(url)
            .query(&[("ref", reference)])
            .send()
            .await
            .map_err(|e| content_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(content_error(format!("GitHub API error {status}")));
        }

        let body: ContentResponse = response
            .json()
            .await
            .map_err(|e| content_error(format!("unexpected contents response: {e}")))?;

        match body.encoding.as_deref() {
            Some("base64") => {}
            Some("none") => {
                return Err(content_error(format!(
                    "file too large to fetch ({} bytes)",
                    body.size.unwrap_or(0)
                )))
            }
            other => {
                return Err(content_error(format!(
                    "unsupported content encoding {:?}",
                    other
                )))
            }
        }

        let encoded: String = body
            .content
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| content_error(format!("invalid base64 content: {e}")))?;

        String::from_utf8(bytes).map_err(|_| content_error("content is not valid UTF-8".into()))
    }

    /// Creates one comment on the pull request's conversation.
    pub async fn create_comment(
        &self,
        owner: &str,
        repo: &str,
        issue_number: u64,
        body: &str,
    ) -> ReviewResult<()> {
        let number = issue_number.to_string();
        let url = self.endpoint(&["repos", owner, repo, "issues", &number, "comments"]);

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .json(&CommentRequest { body })
            .send()
            .await
            .map_err(|e| ReviewError::Publish(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReviewError::Publish(format!(
                "GitHub API error {status}: {}",
                body.trim()
            )));
        }

        Ok(())
    }
}
