//! Destination branch resolution.
//!
//! Two decisions are made here before anything is written:
//!
//! 1. Which commit the sync branch is cut from ([`resolve_base`]), with a
//!    single `main` → `master` fallback for mappings that did not name a
//!    branch.
//! 2. Which branch the commit lands on ([`plan_working_branch`]), driven by
//!    whether the sync branch already exists and the mapping's
//!    [`ExistingBranchStrategy`].
//!
//! The planning step is a pure function over [`BranchState`] so the strategy
//! table can be tested without a host.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::errors::{GitHubError, SyncError};
use crate::github::RepoHost;
use crate::models::{ExistingBranchStrategy, FileMapping, FALLBACK_BRANCH};

/// The branch a sync branch is cut from and its pull request targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseRef {
    pub branch: String,
    pub sha: String,
}

/// Whether the sync branch from a prior run is still present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchState {
    NoBranch,
    BranchExists,
}

/// What to do with the working branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchPlan {
    /// Create this branch from the base commit.
    Create(String),
    /// Commit on top of this existing branch.
    Reuse(String),
}

impl BranchPlan {
    pub fn branch(&self) -> &str {
        match self {
            Self::Create(name) | Self::Reuse(name) => name,
        }
    }
}

/// Resolve the base branch of a mapping.
///
/// A not-found `main` is retried once as `master`. Custom branch names never
/// fall back, and nothing beyond `master` is tried.
pub async fn resolve_base(
    host: &dyn RepoHost,
    mapping: &FileMapping,
) -> Result<BaseRef, SyncError> {
    let repo = &mapping.dest_repo;
    let requested = mapping.dest_branch.as_str();
    debug!(repo = %repo, branch = requested, "resolving base branch");

    let ref_error = |branch: &str, source: GitHubError| SyncError::RefResolution {
        repo: repo.to_string(),
        branch: branch.to_string(),
        source,
    };

    match host.get_ref(repo, requested).await {
        Ok(sha) => Ok(BaseRef {
            branch: requested.to_string(),
            sha,
        }),
        Err(e) if e.is_not_found() && mapping.allows_branch_fallback() => {
            info!(
                repo = %repo,
                branch = requested,
                fallback = FALLBACK_BRANCH,
                "branch not found, trying fallback"
            );
            let sha = host
                .get_ref(repo, FALLBACK_BRANCH)
                .await
                .map_err(|e| ref_error(FALLBACK_BRANCH, e))?;
            Ok(BaseRef {
                branch: FALLBACK_BRANCH.to_string(),
                sha,
            })
        }
        Err(e) => Err(ref_error(requested, e)),
    }
}

/// Probe whether `branch` exists in the mapping's destination repository.
///
/// Only a clean not-found means [`BranchState::NoBranch`]; any other failure
/// is fatal for the mapping.
pub async fn probe_branch(
    host: &dyn RepoHost,
    mapping: &FileMapping,
    branch: &str,
) -> Result<BranchState, SyncError> {
    match host.get_ref(&mapping.dest_repo, branch).await {
        Ok(_) => Ok(BranchState::BranchExists),
        Err(e) if e.is_not_found() => Ok(BranchState::NoBranch),
        Err(e) => Err(SyncError::RefResolution {
            repo: mapping.dest_repo.to_string(),
            branch: branch.to_string(),
            source: e,
        }),
    }
}

/// Decide the working branch from the probed state and the strategy.
pub fn plan_working_branch(
    mapping: &FileMapping,
    state: BranchState,
    now: DateTime<Utc>,
) -> Result<BranchPlan, SyncError> {
    let base_name = mapping.base_branch_name();
    match (state, mapping.existing_branch_strategy) {
        (BranchState::NoBranch, _) => Ok(BranchPlan::Create(base_name)),
        (BranchState::BranchExists, ExistingBranchStrategy::Update) => {
            Ok(BranchPlan::Reuse(base_name))
        }
        (BranchState::BranchExists, ExistingBranchStrategy::CreateNew) => {
            Ok(BranchPlan::Create(mapping.timestamped_branch_name(now)))
        }
        (BranchState::BranchExists, ExistingBranchStrategy::Fail) => {
            Err(SyncError::BranchConflict {
                repo: mapping.dest_repo.to_string(),
                branch: base_name,
            })
        }
    }
}
