//! GitHub REST API client.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::{FileWrite, NewPullRequest, PullRequest, RemoteFile, RepoHost};
use crate::errors::GitHubError;
use crate::models::RepoId;

/// One entry from `GET /repos/{owner}/{repo}/contents/{path}`.
#[derive(Debug, Deserialize)]
struct ContentEntry {
    #[serde(rename = "type")]
    kind: String,
    path: String,
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Debug, Serialize)]
struct CreateRefBody<'a> {
    #[serde(rename = "ref")]
    ref_name: String,
    sha: &'a str,
}

#[derive(Debug, Serialize)]
struct PutContentsBody<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    branch: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: String,
}

/// Asynchronous GitHub REST API client.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Result<Self, GitHubError> {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let token = token.into();
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("filesync/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        info!(api_url = %api_url, "created GitHubClient");
        Ok(Self {
            http,
            api_url,
            token,
        })
    }

    /// Build `<api_url>/repos/<owner>/<repo>/<tail...>`, percent-encoding each
    /// path segment. Slashes inside `tail` entries separate segments.
    fn repo_url(&self, repo: &RepoId, tail: &[&str]) -> Result<Url, GitHubError> {
        let mut url = Url::parse(&self.api_url)
            .map_err(|e| GitHubError::ParseError(format!("invalid API URL '{}': {}", self.api_url, e)))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                GitHubError::ParseError(format!("API URL '{}' cannot be a base", self.api_url))
            })?;
            segments.pop_if_empty();
            segments.extend(["repos", repo.owner.as_str(), repo.name.as_str()]);
            for part in tail {
                segments.extend(part.split('/'));
            }
        }
        Ok(url)
    }

    async fn check_response(resource: &str, resp: Response) -> Result<Response, GitHubError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(GitHubError::NotFound {
                resource: resource.to_string(),
            });
        }
        let rate_limit_exhausted = resp
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            == Some("0");
        if status == StatusCode::TOO_MANY_REQUESTS
            || (status == StatusCode::FORBIDDEN && rate_limit_exhausted)
        {
            let reset = resp
                .headers()
                .get("x-ratelimit-reset")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string();
            return Err(GitHubError::RateLimited { reset_at: reset });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(GitHubError::AuthenticationFailed(format!(
                "HTTP {} for {}",
                status, resource
            )));
        }
        let text = resp.text().await.unwrap_or_default();
        Err(GitHubError::ApiError {
            status: status.as_u16(),
            body: api_message(&text).unwrap_or_else(|| format!("HTTP {}", status)),
        })
    }
}

/// Extract GitHub's `message` field from an error body.
fn api_message(body: &str) -> Option<String> {
    serde_json::from_str::<ApiMessage>(body)
        .ok()
        .map(|m| m.message)
}

fn decode_base64(path: &str, encoded: &str) -> Result<Vec<u8>, GitHubError> {
    // The API wraps base64 payloads at 60 columns.
    let compact: String = encoded.split_ascii_whitespace().collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|e| GitHubError::ParseError(format!("contents of '{}': {}", path, e)))
}

/// Interpret a contents-endpoint payload as a single file.
fn parse_content(path: &str, payload: serde_json::Value) -> Result<RemoteFile, GitHubError> {
    if payload.is_array() {
        return Err(GitHubError::UnexpectedContent {
            path: path.to_string(),
            kind: "a directory listing".into(),
        });
    }
    let entry: ContentEntry = serde_json::from_value(payload)
        .map_err(|e| GitHubError::ParseError(format!("contents of '{}': {}", path, e)))?;
    if entry.kind != "file" {
        return Err(GitHubError::UnexpectedContent {
            path: path.to_string(),
            kind: format!("a {}", entry.kind),
        });
    }
    let content = match (entry.encoding.as_deref(), entry.content) {
        // Files over 1 MB come back with encoding "none" and an empty body.
        (Some("none"), _) | (None, None) => None,
        (Some("base64"), Some(encoded)) | (None, Some(encoded)) => {
            Some(decode_base64(path, &encoded)?)
        }
        (Some("base64"), None) => {
            return Err(GitHubError::ParseError(format!(
                "contents of '{}' carry no content",
                path
            )))
        }
        (Some(other), _) => {
            return Err(GitHubError::ParseError(format!(
                "contents of '{}' use unsupported encoding '{}'",
                path, other
            )))
        }
    };
    Ok(RemoteFile {
        path: entry.path,
        sha: entry.sha,
        content,
    })
}

#[async_trait]
impl RepoHost for GitHubClient {
    #[instrument(skip(self))]
    async fn get_file(
        &self,
        repo: &RepoId,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<RemoteFile, GitHubError> {
        let url = self.repo_url(repo, &["contents", path])?;
        let mut req = self.http.get(url).bearer_auth(&self.token);
        if let Some(r) = git_ref {
            req = req.query(&[("ref", r)]);
        }
        let resp = req.send().await?;
        let resp = Self::check_response(&format!("{}:{}", repo, path), resp).await?;
        let payload: serde_json::Value = resp.json().await?;
        let file = parse_content(path, payload)?;
        debug!(
            sha = %file.sha,
            bytes = file.content.as_ref().map(Vec::len),
            "fetched file"
        );
        Ok(file)
    }

    #[instrument(skip(self))]
    async fn get_ref(&self, repo: &RepoId, branch: &str) -> Result<String, GitHubError> {
        let url = self.repo_url(repo, &["git", "ref", "heads", branch])?;
        let resp = self.http.get(url).bearer_auth(&self.token).send().await?;
        let resp = Self::check_response(&format!("{}@heads/{}", repo, branch), resp).await?;
        let git_ref: GitRef = resp.json().await?;
        debug!(sha = %git_ref.object.sha, "fetched ref");
        Ok(git_ref.object.sha)
    }

    #[instrument(skip(self))]
    async fn create_ref(
        &self,
        repo: &RepoId,
        branch: &str,
        sha: &str,
    ) -> Result<(), GitHubError> {
        let url = self.repo_url(repo, &["git", "refs"])?;
        let body = CreateRefBody {
            ref_name: format!("refs/heads/{}", branch),
            sha,
        };
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        Self::check_response(&format!("{}@heads/{}", repo, branch), resp).await?;
        info!("created branch");
        Ok(())
    }

    #[instrument(skip(self, write), fields(path = %write.path, branch = %write.branch))]
    async fn put_file(&self, repo: &RepoId, write: &FileWrite) -> Result<(), GitHubError> {
        let url = self.repo_url(repo, &["contents", &write.path])?;
        let body = PutContentsBody {
            message: &write.message,
            content: BASE64.encode(&write.content),
            sha: write.sha.as_deref(),
            branch: &write.branch,
        };
        let resp = self
            .http
            .put(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        Self::check_response(&format!("{}:{}", repo, write.path), resp).await?;
        info!(updated = write.sha.is_some(), "wrote file");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_open_pulls(
        &self,
        repo: &RepoId,
        head: &str,
        base: &str,
    ) -> Result<Vec<PullRequest>, GitHubError> {
        let url = self.repo_url(repo, &["pulls"])?;
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .query(&[("head", head), ("base", base), ("state", "open")])
            .send()
            .await?;
        let resp = Self::check_response(&format!("{} pulls", repo), resp).await?;
        let prs: Vec<PullRequest> = resp.json().await?;
        debug!(count = prs.len(), "fetched open pull requests");
        Ok(prs)
    }

    #[instrument(skip(self, pull), fields(head = %pull.head, base = %pull.base))]
    async fn create_pull(
        &self,
        repo: &RepoId,
        pull: &NewPullRequest,
    ) -> Result<PullRequest, GitHubError> {
        let url = self.repo_url(repo, &["pulls"])?;
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(pull)
            .send()
            .await?;
        let resp = Self::check_response(&format!("{} pulls", repo), resp).await?;
        let pr: PullRequest = resp.json().await?;
        info!(number = pr.number, "created pull request");
        Ok(pr)
    }
}
