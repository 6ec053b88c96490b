//! Error types for the file-sync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them for callers that want a single
//! error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// GitHub API errors
// ---------------------------------------------------------------------------

/// Errors from repository-hosting API interactions.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// HTTP-level transport error (network, TLS, etc.).
    #[error("GitHub HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API reported the resource as absent (HTTP 404).
    #[error("GitHub resource not found: {resource}")]
    NotFound { resource: String },

    /// The API returned a non-success status code.
    #[error("GitHub API error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    /// Authentication token is missing or invalid.
    #[error("GitHub authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Rate limit exceeded.
    #[error("GitHub rate limit exceeded, resets at {reset_at}")]
    RateLimited { reset_at: String },

    /// The contents endpoint described something other than a single file.
    #[error("expected a file at '{path}' but found {kind}")]
    UnexpectedContent { path: String, kind: String },

    /// JSON or base64 decoding failure.
    #[error("GitHub response parse error: {0}")]
    ParseError(String),
}

impl GitHubError {
    /// True when the API cleanly reported the resource as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

// ---------------------------------------------------------------------------
// Sync errors
// ---------------------------------------------------------------------------

/// Fatal conditions for a single mapping.
///
/// Every variant ends processing of the mapping it occurred in; none of them
/// affect sibling mappings.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The source file does not exist in the source repository.
    #[error("source file '{path}' not found in {repo}")]
    SourceNotFound { repo: String, path: String },

    /// The source path resolved to something other than a single file.
    #[error("source path '{path}' in {repo} is not a file: {source}")]
    SourceContentShape {
        repo: String,
        path: String,
        #[source]
        source: GitHubError,
    },

    /// Any other failure while reading the source file.
    #[error("failed to read source file '{path}' from {repo}: {source}")]
    SourceUnreadable {
        repo: String,
        path: String,
        #[source]
        source: GitHubError,
    },

    /// The destination base branch (and its fallback) could not be resolved.
    #[error("failed to resolve branch '{branch}' in {repo}: {source}")]
    RefResolution {
        repo: String,
        branch: String,
        #[source]
        source: GitHubError,
    },

    /// The sync branch already exists and the strategy forbids reusing it.
    #[error("branch '{branch}' already exists in {repo} and the existing-branch strategy is 'fail'")]
    BranchConflict { repo: String, branch: String },

    /// Creating the working branch failed.
    #[error("failed to create branch '{branch}' in {repo}: {source}")]
    BranchCreate {
        repo: String,
        branch: String,
        #[source]
        source: GitHubError,
    },

    /// The content write itself failed.
    #[error("failed to write '{path}' on branch '{branch}' in {repo}: {source}")]
    WriteFailure {
        repo: String,
        path: String,
        branch: String,
        #[source]
        source: GitHubError,
    },

    /// Opening the pull request failed after a successful write.
    #[error("failed to open pull request from '{head}' into '{base}' in {repo}: {source}")]
    PullRequest {
        repo: String,
        head: String,
        base: String,
        #[source]
        source: GitHubError,
    },

    /// The task driving the mapping panicked or was cancelled.
    #[error("sync task for mapping '{mapping}' did not complete: {detail}")]
    TaskFailed { mapping: String, detail: String },

    /// The batch deadline passed before the mapping finished.
    #[error("mapping '{mapping}' was cancelled after the {after_secs}s batch deadline")]
    DeadlineExceeded { mapping: String, after_secs: u64 },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and mapping validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML or JSON parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A required environment variable is not set.
    #[error("required environment variable '{var}' is not set (referenced by config field '{field}')")]
    EnvVarMissing { var: String, field: String },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
