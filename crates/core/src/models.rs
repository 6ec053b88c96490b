//! Domain model types used throughout file-sync.
//!
//! A [`FileMapping`] is the unit of work. All branch names, paths, commit
//! messages and pull request titles are derived from it by pure functions;
//! downstream tooling matches on their exact string forms.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::SyncError;

/// Sentinel path meaning "repository root".
pub const ROOT_PATH: &str = ".";

/// Branch targeted when a mapping does not name one.
pub const DEFAULT_BRANCH: &str = "main";

/// Single fallback tried when [`DEFAULT_BRANCH`] does not exist.
pub const FALLBACK_BRANCH: &str = "master";

/// Body attached to every pull request opened by the engine.
pub const PR_BODY: &str = "This PR was automatically created by the `[happi-file-sync-gh](https://github.com/simonloynes/happi-file-sync-gh)` action.";

// ---------------------------------------------------------------------------
// Repository identity
// ---------------------------------------------------------------------------

/// An `owner/name` repository identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse `owner/name`. Exactly two non-empty segments without whitespace
    /// are required.
    pub fn parse(s: &str) -> Option<Self> {
        if s.chars().any(char::is_whitespace) {
            return None;
        }
        let mut parts = s.split('/');
        let owner = parts.next()?;
        let name = parts.next()?;
        if parts.next().is_some() || owner.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(owner, name))
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// ---------------------------------------------------------------------------
// Existing-branch strategy
// ---------------------------------------------------------------------------

/// What to do when the sync branch from a prior run still exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExistingBranchStrategy {
    /// Commit on top of the existing branch.
    #[default]
    Update,
    /// Cut a fresh, timestamped branch.
    CreateNew,
    /// Abort the mapping.
    Fail,
}

impl ExistingBranchStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "update" => Some(Self::Update),
            "create-new" => Some(Self::CreateNew),
            "fail" => Some(Self::Fail),
            _ => None,
        }
    }
}

impl fmt::Display for ExistingBranchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Update => write!(f, "update"),
            Self::CreateNew => write!(f, "create-new"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

// ---------------------------------------------------------------------------
// File mapping
// ---------------------------------------------------------------------------

/// A validated source-file to destination-file sync rule.
///
/// Constructed only by [`crate::config`] validation; the engine consumes it
/// read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMapping {
    pub source_path: String,
    pub source_filename: String,
    pub dest_repo: RepoId,
    pub dest_path: String,
    pub dest_filename: String,
    pub dest_branch: String,
    pub existing_branch_strategy: ExistingBranchStrategy,
}

impl FileMapping {
    /// Path of the file inside the source repository.
    pub fn source_file_path(&self) -> String {
        join_repo_path(&self.source_path, &self.source_filename)
    }

    /// Path of the file inside the destination repository.
    pub fn dest_file_path(&self) -> String {
        join_repo_path(&self.dest_path, &self.dest_filename)
    }

    /// Name of the sync branch before any strategy suffix.
    pub fn base_branch_name(&self) -> String {
        format!("sync-{}-{}", self.source_filename, self.dest_filename)
    }

    /// Sync branch name with a UTC timestamp suffix, used by `create-new`.
    pub fn timestamped_branch_name(&self, now: DateTime<Utc>) -> String {
        format!("{}-{}", self.base_branch_name(), branch_timestamp(now))
    }

    pub fn update_commit_message(&self) -> String {
        format!("Sync {} from source repository", self.source_filename)
    }

    pub fn create_commit_message(&self) -> String {
        format!("Add {} from source repository", self.source_filename)
    }

    pub fn pull_request_title(&self, source: &RepoId) -> String {
        format!("Sync {} from {}", self.source_filename, source)
    }

    /// Whether a missing base branch may fall back to `master`.
    pub fn allows_branch_fallback(&self) -> bool {
        self.dest_branch == DEFAULT_BRANCH
    }
}

/// A mapping together with the name it was configured under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedMapping {
    pub name: String,
    pub mapping: FileMapping,
}

fn join_repo_path(dir: &str, filename: &str) -> String {
    if dir == ROOT_PATH {
        filename.to_string()
    } else {
        format!("{}/{}", dir, filename)
    }
}

/// `YYYY-MM-DDTHH-MM-SS` in UTC: an ISO-8601 timestamp with colons replaced
/// by hyphens and sub-second precision dropped.
pub fn branch_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H-%M-%S").to_string()
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// How the destination file was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    Created,
    Updated,
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
        }
    }
}

/// Result of a successfully synced mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncedPullRequest {
    pub working_branch: String,
    pub base_branch: String,
    pub file_action: FileAction,
    pub number: u64,
    pub html_url: String,
    /// False when an already-open pull request was reused.
    pub opened: bool,
}

/// Per-mapping outcome reported upward.
#[derive(Debug)]
pub struct MappingOutcome {
    pub name: String,
    pub source_filename: String,
    pub dest_repo: RepoId,
    pub result: Result<SyncedPullRequest, SyncError>,
}

impl MappingOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcomes for a whole batch, in mapping-name order.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub outcomes: Vec<MappingOutcome>,
}

impl SyncReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &MappingOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &MappingOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// True when every mapping succeeded (vacuously true for an empty batch).
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(MappingOutcome::is_success)
    }
}
