//! In-memory repository host used by the engine integration tests.
//!
//! Models just enough of GitHub to exercise the sync protocol: branches carry
//! their own file trees, new branches copy the tree of the branch they were
//! cut from, overwrites must supply the current blob SHA, and every call is
//! recorded in order. Operations can be rigged to fail, panic, or hang.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use filesync_core::errors::GitHubError;
use filesync_core::github::{FileWrite, NewPullRequest, PullRequest, RemoteFile, RepoHost};
use filesync_core::models::{
    ExistingBranchStrategy, FileMapping, NamedMapping, RepoId, DEFAULT_BRANCH,
};
use filesync_core::SyncEngine;

pub const SOURCE_REPO: &str = "acme/templates";
pub const DEST_REPO: &str = "acme/widgets";
pub const BASE_SHA: &str = "base-sha";

/// Host operations, for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    GetFile,
    GetRef,
    CreateRef,
    PutFile,
    ListPulls,
    CreatePull,
}

/// One recorded host call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetFile {
        repo: String,
        path: String,
        git_ref: Option<String>,
    },
    GetRef {
        repo: String,
        branch: String,
    },
    CreateRef {
        repo: String,
        branch: String,
        sha: String,
    },
    PutFile {
        repo: String,
        write: FileWrite,
    },
    ListPulls {
        repo: String,
        head: String,
        base: String,
    },
    CreatePull {
        repo: String,
        pull: NewPullRequest,
    },
}

impl Call {
    /// True for calls that change remote state.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Call::CreateRef { .. } | Call::PutFile { .. } | Call::CreatePull { .. }
        )
    }
}

#[derive(Debug, Clone)]
struct StoredFile {
    sha: String,
    content: Vec<u8>,
    /// False for files the API only describes by sha (over 1 MB on GitHub).
    inline: bool,
}

#[derive(Debug, Clone)]
struct OpenPull {
    repo: RepoId,
    head: String,
    base: String,
    pr: PullRequest,
}

#[derive(Default)]
struct State {
    /// (repo, branch) -> head commit.
    refs: HashMap<(RepoId, String), String>,
    /// (repo, branch) -> path -> file.
    trees: HashMap<(RepoId, String), BTreeMap<String, StoredFile>>,
    directories: HashSet<(RepoId, String)>,
    pulls: Vec<OpenPull>,
    failures: HashMap<(RepoId, Op), u16>,
    panics: HashSet<(RepoId, Op)>,
    stalls: HashSet<(RepoId, Op)>,
    calls: Vec<Call>,
    next_id: u64,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn injected(&self, repo: &RepoId, op: Op) -> Option<GitHubError> {
        self.failures.get(&(repo.clone(), op)).map(|status| {
            if *status == 404 {
                GitHubError::NotFound {
                    resource: format!("{:?} on {}", op, repo),
                }
            } else {
                GitHubError::ApiError {
                    status: *status,
                    body: format!("injected {:?} failure", op),
                }
            }
        })
    }
}

fn not_found(resource: String) -> GitHubError {
    GitHubError::NotFound { resource }
}

fn unprocessable(body: &str) -> GitHubError {
    GitHubError::ApiError {
        status: 422,
        body: body.to_string(),
    }
}

#[derive(Default)]
pub struct FakeHost {
    state: Mutex<State>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `branch` in `repo` pointing at `sha`, with an empty tree.
    pub fn with_branch(self, repo: &str, branch: &str, sha: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let key = (repo_id(repo), branch.to_string());
            state.refs.insert(key.clone(), sha.to_string());
            state.trees.entry(key).or_default();
        }
        self
    }

    /// Put a file on an existing branch.
    pub fn with_file(self, repo: &str, branch: &str, path: &str, content: &str, sha: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let key = (repo_id(repo), branch.to_string());
            assert!(state.refs.contains_key(&key), "unknown branch {}", branch);
            state.trees.entry(key).or_default().insert(
                path.to_string(),
                StoredFile {
                    sha: sha.to_string(),
                    content: content.as_bytes().to_vec(),
                    inline: true,
                },
            );
        }
        self
    }

    /// Put a file that reads back with its sha but without inline content.
    pub fn with_large_file(self, repo: &str, branch: &str, path: &str, sha: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let key = (repo_id(repo), branch.to_string());
            assert!(state.refs.contains_key(&key), "unknown branch {}", branch);
            state.trees.entry(key).or_default().insert(
                path.to_string(),
                StoredFile {
                    sha: sha.to_string(),
                    content: Vec::new(),
                    inline: false,
                },
            );
        }
        self
    }

    /// Make `path` a directory in `repo`.
    pub fn with_directory(self, repo: &str, path: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .directories
            .insert((repo_id(repo), path.to_string()));
        self
    }

    /// Make every `op` against `repo` fail with `status`.
    pub fn failing(self, repo: &str, op: Op, status: u16) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((repo_id(repo), op), status);
        self
    }

    /// Make every `op` against `repo` panic.
    pub fn panicking(self, repo: &str, op: Op) -> Self {
        self.state
            .lock()
            .unwrap()
            .panics
            .insert((repo_id(repo), op));
        self
    }

    /// Make every `op` against `repo` hang forever.
    pub fn stalling(self, repo: &str, op: Op) -> Self {
        self.state
            .lock()
            .unwrap()
            .stalls
            .insert((repo_id(repo), op));
        self
    }

    /// Open a pull request directly, as a prior run would have.
    pub fn with_open_pull(self, repo: &str, head_branch: &str, base: &str, number: u64) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let repo = repo_id(repo);
            state.pulls.push(OpenPull {
                head: format!("{}:{}", repo.owner, head_branch),
                base: base.to_string(),
                pr: PullRequest {
                    number,
                    html_url: format!("https://github.com/{}/pull/{}", repo, number),
                    title: String::new(),
                },
                repo,
            });
        }
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn write_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_write).collect()
    }

    /// Branch names in `repo`, sorted.
    pub fn branches(&self, repo: &str) -> Vec<String> {
        let repo = repo_id(repo);
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state
            .refs
            .keys()
            .filter(|(r, _)| *r == repo)
            .map(|(_, b)| b.clone())
            .collect();
        names.sort();
        names
    }

    pub fn file_content(&self, repo: &str, branch: &str, path: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .trees
            .get(&(repo_id(repo), branch.to_string()))
            .and_then(|tree| tree.get(path))
            .map(|f| String::from_utf8_lossy(&f.content).into_owned())
    }

    pub fn open_pull_count(&self, repo: &str) -> usize {
        let repo = repo_id(repo);
        self.state
            .lock()
            .unwrap()
            .pulls
            .iter()
            .filter(|p| p.repo == repo)
            .count()
    }

    fn record(&self, call: Call) -> std::sync::MutexGuard<'_, State> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state
    }

    /// Panic or hang if `op` was rigged to. The lock is released first so
    /// other tasks keep working.
    async fn interrupt(&self, repo: &RepoId, op: Op) {
        let key = (repo.clone(), op);
        let (panics, stalls) = {
            let state = self.state.lock().unwrap();
            (state.panics.contains(&key), state.stalls.contains(&key))
        };
        if panics {
            panic!("{:?} on {} blew up", op, repo);
        }
        if stalls {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl RepoHost for FakeHost {
    async fn get_file(
        &self,
        repo: &RepoId,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<RemoteFile, GitHubError> {
        self.interrupt(repo, Op::GetFile).await;
        let state = self.record(Call::GetFile {
            repo: repo.to_string(),
            path: path.to_string(),
            git_ref: git_ref.map(str::to_string),
        });
        if let Some(err) = state.injected(repo, Op::GetFile) {
            return Err(err);
        }
        if state.directories.contains(&(repo.clone(), path.to_string())) {
            return Err(GitHubError::UnexpectedContent {
                path: path.to_string(),
                kind: "a directory listing".into(),
            });
        }
        let branch = git_ref.unwrap_or(DEFAULT_BRANCH);
        state
            .trees
            .get(&(repo.clone(), branch.to_string()))
            .and_then(|tree| tree.get(path))
            .map(|f| RemoteFile {
                path: path.to_string(),
                sha: f.sha.clone(),
                content: f.inline.then(|| f.content.clone()),
            })
            .ok_or_else(|| not_found(format!("{}:{}@{}", repo, path, branch)))
    }

    async fn get_ref(&self, repo: &RepoId, branch: &str) -> Result<String, GitHubError> {
        self.interrupt(repo, Op::GetRef).await;
        let state = self.record(Call::GetRef {
            repo: repo.to_string(),
            branch: branch.to_string(),
        });
        if let Some(err) = state.injected(repo, Op::GetRef) {
            return Err(err);
        }
        state
            .refs
            .get(&(repo.clone(), branch.to_string()))
            .cloned()
            .ok_or_else(|| not_found(format!("{}@heads/{}", repo, branch)))
    }

    async fn create_ref(
        &self,
        repo: &RepoId,
        branch: &str,
        sha: &str,
    ) -> Result<(), GitHubError> {
        self.interrupt(repo, Op::CreateRef).await;
        let mut state = self.record(Call::CreateRef {
            repo: repo.to_string(),
            branch: branch.to_string(),
            sha: sha.to_string(),
        });
        if let Some(err) = state.injected(repo, Op::CreateRef) {
            return Err(err);
        }
        let key = (repo.clone(), branch.to_string());
        if state.refs.contains_key(&key) {
            return Err(unprocessable("Reference already exists"));
        }
        let tree = state
            .refs
            .iter()
            .find(|((r, _), head)| r == repo && head.as_str() == sha)
            .and_then(|(k, _)| state.trees.get(k))
            .cloned()
            .ok_or_else(|| unprocessable("Object does not exist"))?;
        state.refs.insert(key.clone(), sha.to_string());
        state.trees.insert(key, tree);
        Ok(())
    }

    async fn put_file(&self, repo: &RepoId, write: &FileWrite) -> Result<(), GitHubError> {
        self.interrupt(repo, Op::PutFile).await;
        let mut state = self.record(Call::PutFile {
            repo: repo.to_string(),
            write: write.clone(),
        });
        if let Some(err) = state.injected(repo, Op::PutFile) {
            return Err(err);
        }
        let key = (repo.clone(), write.branch.clone());
        if !state.refs.contains_key(&key) {
            return Err(not_found(format!("{}@heads/{}", repo, write.branch)));
        }
        let current = state
            .trees
            .get(&key)
            .and_then(|tree| tree.get(&write.path))
            .map(|f| f.sha.clone());
        match (&current, &write.sha) {
            (Some(_), None) => return Err(unprocessable("\"sha\" wasn't supplied.")),
            (Some(cur), Some(given)) if cur != given => {
                return Err(GitHubError::ApiError {
                    status: 409,
                    body: format!("{} does not match {}", write.path, given),
                })
            }
            (None, Some(_)) => return Err(not_found(write.path.clone())),
            _ => {}
        }
        let id = state.next_id();
        state.trees.entry(key.clone()).or_default().insert(
            write.path.clone(),
            StoredFile {
                sha: format!("blob-{}", id),
                content: write.content.clone(),
                inline: true,
            },
        );
        state.refs.insert(key, format!("commit-{}", id));
        Ok(())
    }

    async fn list_open_pulls(
        &self,
        repo: &RepoId,
        head: &str,
        base: &str,
    ) -> Result<Vec<PullRequest>, GitHubError> {
        self.interrupt(repo, Op::ListPulls).await;
        let state = self.record(Call::ListPulls {
            repo: repo.to_string(),
            head: head.to_string(),
            base: base.to_string(),
        });
        if let Some(err) = state.injected(repo, Op::ListPulls) {
            return Err(err);
        }
        Ok(state
            .pulls
            .iter()
            .filter(|p| p.repo == *repo && p.head == head && p.base == base)
            .map(|p| p.pr.clone())
            .collect())
    }

    async fn create_pull(
        &self,
        repo: &RepoId,
        pull: &NewPullRequest,
    ) -> Result<PullRequest, GitHubError> {
        self.interrupt(repo, Op::CreatePull).await;
        let mut state = self.record(Call::CreatePull {
            repo: repo.to_string(),
            pull: pull.clone(),
        });
        if let Some(err) = state.injected(repo, Op::CreatePull) {
            return Err(err);
        }
        let head = format!("{}:{}", repo.owner, pull.head);
        if state
            .pulls
            .iter()
            .any(|p| p.repo == *repo && p.head == head && p.base == pull.base)
        {
            return Err(unprocessable("A pull request already exists"));
        }
        let number = 100 + state.next_id();
        let pr = PullRequest {
            number,
            html_url: format!("https://github.com/{}/pull/{}", repo, number),
            title: pull.title.clone(),
        };
        state.pulls.push(OpenPull {
            repo: repo.clone(),
            head,
            base: pull.base.clone(),
            pr: pr.clone(),
        });
        Ok(pr)
    }
}

pub fn repo_id(s: &str) -> RepoId {
    RepoId::parse(s).expect("test repo ids are well formed")
}

/// The LICENSE mapping used throughout the tests: `docs/LICENSE` into the
/// root of `acme/widgets`.
pub fn license_mapping() -> FileMapping {
    FileMapping {
        source_path: "docs".into(),
        source_filename: "LICENSE".into(),
        dest_repo: repo_id(DEST_REPO),
        dest_path: ".".into(),
        dest_filename: "LICENSE".into(),
        dest_branch: DEFAULT_BRANCH.into(),
        existing_branch_strategy: ExistingBranchStrategy::Update,
    }
}

pub fn with_strategy(mut mapping: FileMapping, strategy: ExistingBranchStrategy) -> FileMapping {
    mapping.existing_branch_strategy = strategy;
    mapping
}

pub fn named(name: &str, mapping: FileMapping) -> NamedMapping {
    NamedMapping {
        name: name.to_string(),
        mapping,
    }
}

/// Source repo with `docs/LICENSE`, destination repo with an empty `main`.
pub fn standard_host() -> FakeHost {
    FakeHost::new()
        .with_branch(SOURCE_REPO, DEFAULT_BRANCH, "source-sha")
        .with_file(SOURCE_REPO, DEFAULT_BRANCH, "docs/LICENSE", "MIT License\n", "src-blob")
        .with_branch(DEST_REPO, DEFAULT_BRANCH, BASE_SHA)
}

pub fn engine(host: &Arc<FakeHost>) -> SyncEngine {
    let host: Arc<dyn RepoHost> = host.clone();
    SyncEngine::new(host, repo_id(SOURCE_REPO))
}
