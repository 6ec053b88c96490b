//! Repository-hosting API abstraction.
//!
//! The sync engine only talks to a [`RepoHost`]: six operations covering file
//! reads and writes, branch refs, and pull requests. [`GitHubClient`] is the
//! REST implementation; tests drive the engine against an in-memory fake.

pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::GitHubError;
use crate::models::RepoId;

pub use client::GitHubClient;

/// A single file read from a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub path: String,
    /// Content identifier (blob SHA) required to overwrite this revision.
    pub sha: String,
    /// Decoded bytes. `None` when the host only reported metadata, as GitHub
    /// does for files over 1 MB.
    pub content: Option<Vec<u8>>,
}

/// A create-or-update file request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite {
    pub path: String,
    pub message: String,
    pub content: Vec<u8>,
    /// Present when overwriting a known revision, absent when creating.
    pub sha: Option<String>,
    pub branch: String,
}

/// A pull request as returned by the hosting API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
    #[serde(default)]
    pub title: String,
}

/// Parameters for opening a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub head: String,
    pub base: String,
    pub body: String,
}

/// The capabilities the sync engine needs from a repository host.
///
/// Implementations must report an absent file or ref as
/// [`GitHubError::NotFound`] so callers can tell absence apart from other
/// failures.
#[async_trait]
pub trait RepoHost: Send + Sync {
    /// Read a file at `path`, on `git_ref` or the default branch.
    async fn get_file(
        &self,
        repo: &RepoId,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<RemoteFile, GitHubError>;

    /// Commit SHA that `refs/heads/<branch>` points at.
    async fn get_ref(&self, repo: &RepoId, branch: &str) -> Result<String, GitHubError>;

    /// Create `refs/heads/<branch>` pointing at `sha`.
    async fn create_ref(&self, repo: &RepoId, branch: &str, sha: &str)
        -> Result<(), GitHubError>;

    /// Create or update a file with a single commit.
    async fn put_file(&self, repo: &RepoId, write: &FileWrite) -> Result<(), GitHubError>;

    /// Open pull requests from `head` (`owner:branch`) into `base`.
    async fn list_open_pulls(
        &self,
        repo: &RepoId,
        head: &str,
        base: &str,
    ) -> Result<Vec<PullRequest>, GitHubError>;

    /// Open a new pull request.
    async fn create_pull(
        &self,
        repo: &RepoId,
        pull: &NewPullRequest,
    ) -> Result<PullRequest, GitHubError>;
}
