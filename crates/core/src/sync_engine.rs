//! File synchronization engine.
//!
//! The [`SyncEngine`] drives one mapping through a fixed sequence:
//!
//! 1. Read the source file from the source repository.
//! 2. Resolve the destination base branch (`main` may fall back to `master`).
//! 3. Probe the sync branch and apply the existing-branch strategy.
//! 4. Create or update the destination file on the working branch.
//! 5. Reuse an open pull request for the working branch or open one.
//!
//! All state is re-derived from the remote on every run. Mappings in a batch
//! run as independent tasks in a [`JoinSet`]; a failure or panic in one is
//! recorded in its outcome and never reaches its siblings.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::{self, JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::branch::{self, BaseRef, BranchPlan};
use crate::errors::{GitHubError, SyncError};
use crate::github::{FileWrite, NewPullRequest, PullRequest, RemoteFile, RepoHost};
use crate::models::{
    FileAction, FileMapping, MappingOutcome, NamedMapping, RepoId, SyncReport, SyncedPullRequest,
    PR_BODY,
};

/// Source of "now" for timestamped branch names.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The file synchronization engine.
#[derive(Clone)]
pub struct SyncEngine {
    host: Arc<dyn RepoHost>,
    source: RepoId,
    clock: Clock,
}

impl SyncEngine {
    /// Create an engine reading from `source` through `host`.
    pub fn new(host: Arc<dyn RepoHost>, source: RepoId) -> Self {
        info!(source = %source, "initializing sync engine");
        Self {
            host,
            source,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock used for `create-new` branch names.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// The repository files are read from.
    pub fn source(&self) -> &RepoId {
        &self.source
    }

    // -----------------------------------------------------------------------
    // Batch entry point
    // -----------------------------------------------------------------------

    /// Sync every mapping concurrently and report each outcome.
    ///
    /// Every mapping runs to completion regardless of the others; the report
    /// lists outcomes in the order the mappings were given.
    pub async fn run(&self, mappings: Vec<NamedMapping>) -> SyncReport {
        self.run_with_deadline(mappings, None).await
    }

    /// Like [`run`](Self::run), but mappings still in flight when `deadline`
    /// passes are aborted and reported as [`SyncError::DeadlineExceeded`].
    /// Mappings that finished in time keep their outcomes.
    pub async fn run_with_deadline(
        &self,
        mappings: Vec<NamedMapping>,
        deadline: Option<Duration>,
    ) -> SyncReport {
        info!(count = mappings.len(), deadline = ?deadline, "starting sync batch");

        let mut labels: Vec<MappingLabel> = Vec::with_capacity(mappings.len());
        let mut slots: Vec<Option<MappingOutcome>> = Vec::with_capacity(mappings.len());
        let mut task_index: HashMap<task::Id, usize> = HashMap::new();
        let mut tasks = JoinSet::new();

        for (index, named) in mappings.into_iter().enumerate() {
            labels.push((
                named.name.clone(),
                named.mapping.source_filename.clone(),
                named.mapping.dest_repo.clone(),
            ));
            slots.push(None);
            let engine = self.clone();
            let handle = tasks.spawn(async move { engine.sync_named(named).await });
            task_index.insert(handle.id(), index);
        }

        let collect = async {
            while let Some(joined) = tasks.join_next_with_id().await {
                settle(joined, &task_index, &labels, &mut slots);
            }
        };

        match deadline {
            Some(limit) => {
                if tokio::time::timeout(limit, collect).await.is_err() {
                    warn!(
                        pending = tasks.len(),
                        after_secs = limit.as_secs(),
                        "batch deadline passed, aborting unfinished mappings"
                    );
                    tasks.abort_all();
                    // Tasks that completed before the abort keep their outcome.
                    while let Some(joined) = tasks.join_next_with_id().await {
                        settle(joined, &task_index, &labels, &mut slots);
                    }
                }
            }
            None => collect.await,
        }

        let after_secs = deadline.map(|d| d.as_secs()).unwrap_or_default();
        let mut report = SyncReport::default();
        for (slot, (name, source_filename, dest_repo)) in slots.into_iter().zip(labels) {
            let outcome = slot.unwrap_or_else(|| {
                error!(mapping = %name, dest_repo = %dest_repo, "mapping did not finish before the deadline");
                MappingOutcome {
                    result: Err(SyncError::DeadlineExceeded {
                        mapping: name.clone(),
                        after_secs,
                    }),
                    name,
                    source_filename,
                    dest_repo,
                }
            });
            report.outcomes.push(outcome);
        }

        info!(
            succeeded = report.succeeded().count(),
            failed = report.failed().count(),
            "sync batch finished"
        );
        report
    }

    /// Sync one named mapping, catching its failure at the mapping boundary.
    pub async fn sync_named(&self, named: NamedMapping) -> MappingOutcome {
        let NamedMapping { name, mapping } = named;
        let result = self.sync_mapping(&mapping).await;
        match &result {
            Ok(pr) => info!(
                mapping = %name,
                dest_repo = %mapping.dest_repo,
                number = pr.number,
                url = %pr.html_url,
                opened = pr.opened,
                "mapping synced"
            ),
            Err(e) => error!(
                mapping = %name,
                source_filename = %mapping.source_filename,
                dest_repo = %mapping.dest_repo,
                error = %e,
                "mapping failed"
            ),
        }
        MappingOutcome {
            name,
            source_filename: mapping.source_filename,
            dest_repo: mapping.dest_repo,
            result,
        }
    }

    // -----------------------------------------------------------------------
    // Single mapping
    // -----------------------------------------------------------------------

    /// Run the full protocol for one mapping.
    pub async fn sync_mapping(&self, mapping: &FileMapping) -> Result<SyncedPullRequest, SyncError> {
        info!(
            source_filename = %mapping.source_filename,
            dest = %format!("{}/{}", mapping.dest_repo, mapping.dest_file_path()),
            "starting sync"
        );

        let content = self.fetch_source(mapping).await?;
        let base = branch::resolve_base(self.host.as_ref(), mapping).await?;
        let working_branch = self.prepare_working_branch(mapping, &base).await?;
        let file_action = self.write_content(mapping, &content, &working_branch).await?;
        let (pr, opened) = self
            .reconcile_pull_request(mapping, &working_branch, &base.branch)
            .await?;

        Ok(SyncedPullRequest {
            working_branch,
            base_branch: base.branch,
            file_action,
            number: pr.number,
            html_url: pr.html_url,
            opened,
        })
    }

    async fn fetch_source(&self, mapping: &FileMapping) -> Result<Vec<u8>, SyncError> {
        let path = mapping.source_file_path();
        info!(repo = %self.source, path = %path, "fetching source file");

        match self.host.get_file(&self.source, &path, None).await {
            Ok(RemoteFile {
                sha,
                content: Some(content),
                ..
            }) => {
                debug!(sha = %sha, bytes = content.len(), "fetched source file");
                Ok(content)
            }
            Ok(RemoteFile { path: found, .. }) => Err(SyncError::SourceContentShape {
                repo: self.source.to_string(),
                path,
                source: GitHubError::UnexpectedContent {
                    path: found,
                    kind: "a file too large to be returned inline".into(),
                },
            }),
            Err(e) if e.is_not_found() => Err(SyncError::SourceNotFound {
                repo: self.source.to_string(),
                path,
            }),
            Err(e @ GitHubError::UnexpectedContent { .. }) => {
                Err(SyncError::SourceContentShape {
                    repo: self.source.to_string(),
                    path,
                    source: e,
                })
            }
            Err(e) => Err(SyncError::SourceUnreadable {
                repo: self.source.to_string(),
                path,
                source: e,
            }),
        }
    }

    /// Probe the sync branch, apply the strategy, and create the branch when
    /// the plan calls for it. Returns the working branch name.
    async fn prepare_working_branch(
        &self,
        mapping: &FileMapping,
        base: &BaseRef,
    ) -> Result<String, SyncError> {
        let base_name = mapping.base_branch_name();
        let state = branch::probe_branch(self.host.as_ref(), mapping, &base_name).await?;
        let plan = branch::plan_working_branch(mapping, state, (self.clock)())?;
        debug!(
            state = ?state,
            strategy = %mapping.existing_branch_strategy,
            plan = ?plan,
            "planned working branch"
        );

        match plan {
            BranchPlan::Reuse(name) => {
                info!(branch = %name, "reusing existing sync branch");
                Ok(name)
            }
            BranchPlan::Create(name) => {
                info!(branch = %name, from = %base.branch, sha = %base.sha, "creating sync branch");
                self.host
                    .create_ref(&mapping.dest_repo, &name, &base.sha)
                    .await
                    .map_err(|e| SyncError::BranchCreate {
                        repo: mapping.dest_repo.to_string(),
                        branch: name.clone(),
                        source: e,
                    })?;
                Ok(name)
            }
        }
    }

    /// Replace the destination file's content with the source content.
    ///
    /// Only the existing file's sha is needed, so a probe answer without
    /// inline content still counts as present. A probe that fails for any
    /// reason other than a clean not-found is treated as "absent" and a
    /// create is attempted.
    async fn write_content(
        &self,
        mapping: &FileMapping,
        content: &[u8],
        working_branch: &str,
    ) -> Result<FileAction, SyncError> {
        let path = mapping.dest_file_path();
        debug!(path = %path, branch = working_branch, "checking destination file");

        let existing_sha = match self
            .host
            .get_file(&mapping.dest_repo, &path, Some(working_branch))
            .await
        {
            Ok(existing) => Some(existing.sha),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                warn!(
                    path = %path,
                    branch = working_branch,
                    error = %e,
                    "destination probe failed, attempting create"
                );
                None
            }
        };

        let (action, message) = match existing_sha {
            Some(_) => (FileAction::Updated, mapping.update_commit_message()),
            None => (FileAction::Created, mapping.create_commit_message()),
        };
        info!(path = %path, branch = working_branch, action = %action, "writing destination file");

        let write = FileWrite {
            path: path.clone(),
            message,
            content: content.to_vec(),
            sha: existing_sha,
            branch: working_branch.to_string(),
        };
        self.host
            .put_file(&mapping.dest_repo, &write)
            .await
            .map_err(|e| SyncError::WriteFailure {
                repo: mapping.dest_repo.to_string(),
                path,
                branch: working_branch.to_string(),
                source: e,
            })?;
        Ok(action)
    }

    /// Ensure one open pull request from the working branch into the base.
    /// Returns the pull request and whether it was opened by this run.
    async fn reconcile_pull_request(
        &self,
        mapping: &FileMapping,
        working_branch: &str,
        base_branch: &str,
    ) -> Result<(PullRequest, bool), SyncError> {
        let repo = &mapping.dest_repo;
        let head = format!("{}:{}", repo.owner, working_branch);

        match self.host.list_open_pulls(repo, &head, base_branch).await {
            Ok(prs) => {
                if let Some(existing) = prs.into_iter().next() {
                    info!(
                        number = existing.number,
                        url = %existing.html_url,
                        "pull request already open"
                    );
                    return Ok((existing, false));
                }
            }
            Err(e) => {
                warn!(head = %head, base = base_branch, error = %e, "listing pull requests failed");
            }
        }

        info!(head = working_branch, base = base_branch, "creating pull request");
        let pull = NewPullRequest {
            title: mapping.pull_request_title(&self.source),
            head: working_branch.to_string(),
            base: base_branch.to_string(),
            body: PR_BODY.to_string(),
        };
        let pr = self
            .host
            .create_pull(repo, &pull)
            .await
            .map_err(|e| SyncError::PullRequest {
                repo: repo.to_string(),
                head: working_branch.to_string(),
                base: base_branch.to_string(),
                source: e,
            })?;
        info!(
            number = pr.number,
            url = %pr.html_url,
            "created pull request for {} in {}",
            mapping.dest_filename,
            repo
        );
        Ok((pr, true))
    }
}

type MappingLabel = (String, String, RepoId);

/// Store a joined task's outcome in its slot. A panicked task becomes
/// [`SyncError::TaskFailed`]; a cancelled one leaves its slot empty.
fn settle(
    joined: Result<(task::Id, MappingOutcome), JoinError>,
    task_index: &HashMap<task::Id, usize>,
    labels: &[MappingLabel],
    slots: &mut [Option<MappingOutcome>],
) {
    match joined {
        Ok((id, outcome)) => {
            if let Some(&index) = task_index.get(&id) {
                slots[index] = Some(outcome);
            }
        }
        Err(join_err) if join_err.is_cancelled() => {}
        Err(join_err) => {
            let Some(&index) = task_index.get(&join_err.id()) else {
                return;
            };
            let (name, source_filename, dest_repo) = labels[index].clone();
            error!(
                mapping = %name,
                dest_repo = %dest_repo,
                error = %join_err,
                "sync task panicked"
            );
            slots[index] = Some(MappingOutcome {
                result: Err(SyncError::TaskFailed {
                    mapping: name.clone(),
                    detail: join_err.to_string(),
                }),
                name,
                source_filename,
                dest_repo,
            });
        }
    }
}
