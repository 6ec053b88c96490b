//! Configuration loading and mapping validation.
//!
//! Configuration comes from one of two places:
//!
//! - GitHub Action inputs exposed as `INPUT_*` environment variables, with
//!   the mapping table passed as a JSON object
//!   ([`AppConfig::from_action_env`]).
//! - A TOML file whose secrets are stored as `_env` fields naming
//!   environment variables ([`AppConfig::load_and_resolve`]).
//!
//! Either way, raw mapping records are validated into [`FileMapping`]s before
//! the sync engine sees them.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::models::{
    ExistingBranchStrategy, FileMapping, NamedMapping, RepoId, DEFAULT_BRANCH, ROOT_PATH,
};

/// Action input carrying the API token.
pub const INPUT_GITHUB_TOKEN: &str = "INPUT_GITHUB-TOKEN";
/// Action input carrying the JSON mapping table.
pub const INPUT_FILE_MAPPINGS: &str = "INPUT_FILE-MAPPINGS";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// GitHub API and source repository settings.
    #[serde(default)]
    pub github: GitHubConfig,

    /// Raw mapping records keyed by mapping name.
    #[serde(default)]
    pub mappings: BTreeMap<String, RawFileMapping>,
}

/// GitHub API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API base URL (default `https://api.github.com`).
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// Environment variable holding the GitHub token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Source repository in `owner/repo` format. Falls back to
    /// `GITHUB_REPOSITORY` when unset.
    #[serde(default)]
    pub source_repo: Option<String>,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_github_api_url() -> String {
    "https://api.github.com".into()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".into()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            token_env: default_token_env(),
            source_repo: None,
            token: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Raw mapping records
// ---------------------------------------------------------------------------

/// A mapping record exactly as it appears in configuration, before
/// validation. Keys are camelCase for compatibility with existing workflow
/// files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFileMapping {
    pub source_path: String,
    pub source_filename: String,
    pub dest_repo: String,
    pub dest_path: String,
    pub dest_filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_branch_strategy: Option<String>,
}

impl RawFileMapping {
    /// Validate the record, naming offending fields as
    /// `mappings.<name>.<field>`.
    pub fn validate(&self, name: &str) -> Result<FileMapping, ConfigError> {
        let field = |f: &str| format!("mappings.{}.{}", name, f);

        let source_path = validate_dir(&self.source_path, &field("sourcePath"))?;
        let source_filename = validate_filename(&self.source_filename, &field("sourceFilename"))?;
        let dest_path = validate_dir(&self.dest_path, &field("destPath"))?;
        let dest_filename = validate_filename(&self.dest_filename, &field("destFilename"))?;

        let dest_repo =
            RepoId::parse(&self.dest_repo).ok_or_else(|| ConfigError::InvalidValue {
                field: field("destRepo"),
                detail: format!("'{}' is not in 'owner/repo' format", self.dest_repo),
            })?;

        let dest_branch = match self.dest_branch.as_deref() {
            None => DEFAULT_BRANCH.to_string(),
            Some("") => {
                return Err(ConfigError::InvalidValue {
                    field: field("destBranch"),
                    detail: "branch name must not be empty".into(),
                })
            }
            Some(b) => {
                reject_padding(b, &field("destBranch"))?;
                b.to_string()
            }
        };

        let existing_branch_strategy = match self.existing_branch_strategy.as_deref() {
            None => ExistingBranchStrategy::default(),
            Some(s) => {
                ExistingBranchStrategy::parse(s).ok_or_else(|| ConfigError::InvalidValue {
                    field: field("existingBranchStrategy"),
                    detail: format!("'{}' is not one of update, create-new, fail", s),
                })?
            }
        };

        Ok(FileMapping {
            source_path,
            source_filename,
            dest_repo,
            dest_path,
            dest_filename,
            dest_branch,
            existing_branch_strategy,
        })
    }
}

/// Values feed branch names and paths verbatim, so padding is an error
/// rather than something to strip.
fn reject_padding(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim() != value {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            detail: format!("'{}' has leading or trailing whitespace", value),
        });
    }
    Ok(())
}

fn validate_dir(value: &str, field: &str) -> Result<String, ConfigError> {
    let invalid = |detail: &str| ConfigError::InvalidValue {
        field: field.to_string(),
        detail: detail.to_string(),
    };
    if value.is_empty() {
        return Err(invalid("path must not be empty; use '.' for the repository root"));
    }
    reject_padding(value, field)?;
    if value == ROOT_PATH {
        return Ok(value.to_string());
    }
    if value.starts_with('/') {
        return Err(invalid("path must be relative to the repository root"));
    }
    if value.ends_with('/') {
        return Err(invalid("path must not end with '/'"));
    }
    Ok(value.to_string())
}

fn validate_filename(value: &str, field: &str) -> Result<String, ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            detail: "filename must not be empty".into(),
        });
    }
    reject_padding(value, field)?;
    if value.contains('/') {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            detail: "filename must not contain '/'; put directories in the path field".into(),
        });
    }
    Ok(value.to_string())
}

/// Parse the JSON object passed through the `file-mappings` action input.
pub fn parse_mappings_json(json: &str) -> Result<BTreeMap<String, RawFileMapping>, ConfigError> {
    serde_json::from_str(json)
        .map_err(|e| ConfigError::ParseError(format!("file mappings are not valid JSON: {}", e)))
}

/// Validate every raw record, stopping at the first invalid one.
pub fn validate_mappings(
    raw: &BTreeMap<String, RawFileMapping>,
) -> Result<Vec<NamedMapping>, ConfigError> {
    raw.iter()
        .map(|(name, record)| {
            record.validate(name).map(|mapping| NamedMapping {
                name: name.clone(),
                mapping,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!(mappings = config.mappings.len(), "configuration parsed successfully");
        Ok(config)
    }

    /// Resolve the token and the source repository from the process
    /// environment.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Same as [`resolve_env_vars`](Self::resolve_env_vars) with an explicit
    /// variable lookup.
    pub fn resolve_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        info!("resolving environment variable references in config");

        self.github.token = resolve_optional(&lookup, &self.github.token_env, "github.token_env");

        if self.github.source_repo.is_none() {
            self.github.source_repo = repository_from_env(&lookup);
        }

        debug!("environment variable resolution complete");
        Ok(())
    }

    /// Build a config from GitHub Action inputs in the process environment.
    pub fn from_action_env() -> Result<Self, ConfigError> {
        Self::from_action_inputs(|name| std::env::var(name).ok())
    }

    /// Build a config from GitHub Action inputs using an explicit lookup.
    ///
    /// Runners expose inputs as `INPUT_<NAME>`; both the hyphenated and the
    /// underscored spellings are accepted.
    pub fn from_action_inputs<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let input = |name: &str| {
            lookup(name)
                .or_else(|| lookup(&name.replace('-', "_")))
                .filter(|v| !v.trim().is_empty())
        };

        let token = input(INPUT_GITHUB_TOKEN).ok_or_else(|| ConfigError::EnvVarMissing {
            var: INPUT_GITHUB_TOKEN.into(),
            field: "github-token".into(),
        })?;
        let mappings_json =
            input(INPUT_FILE_MAPPINGS).ok_or_else(|| ConfigError::EnvVarMissing {
                var: INPUT_FILE_MAPPINGS.into(),
                field: "file-mappings".into(),
            })?;
        let mappings = parse_mappings_json(&mappings_json)?;

        let api_url = lookup("GITHUB_API_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_github_api_url);

        info!(mappings = mappings.len(), "loaded configuration from action inputs");

        Ok(Self {
            github: GitHubConfig {
                api_url,
                token_env: INPUT_GITHUB_TOKEN.into(),
                source_repo: repository_from_env(&lookup),
                token: Some(token),
            },
            mappings,
        })
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.github.api_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "github.api_url".into(),
                detail: "GitHub API URL must not be empty".into(),
            });
        }
        if self.github.token.is_none() {
            return Err(ConfigError::EnvVarMissing {
                var: self.github.token_env.clone(),
                field: "github.token_env".into(),
            });
        }
        self.source_repo()?;
        self.validated_mappings()?;
        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// The repository files are read from.
    pub fn source_repo(&self) -> Result<RepoId, ConfigError> {
        let raw = self
            .github
            .source_repo
            .as_deref()
            .ok_or_else(|| ConfigError::EnvVarMissing {
                var: "GITHUB_REPOSITORY".into(),
                field: "github.source_repo".into(),
            })?;
        RepoId::parse(raw).ok_or_else(|| ConfigError::InvalidValue {
            field: "github.source_repo".into(),
            detail: format!("'{}' is not in 'owner/repo' format", raw),
        })
    }

    /// Validated mappings, in mapping-name order.
    pub fn validated_mappings(&self) -> Result<Vec<NamedMapping>, ConfigError> {
        validate_mappings(&self.mappings)
    }
}

/// `GITHUB_REPOSITORY`, with the owner replaced by `GITHUB_REPOSITORY_OWNER`
/// when that is set.
fn repository_from_env<F>(lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let repository = lookup("GITHUB_REPOSITORY").filter(|v| !v.is_empty())?;
    match (
        lookup("GITHUB_REPOSITORY_OWNER").filter(|v| !v.is_empty()),
        repository.split_once('/'),
    ) {
        (Some(owner), Some((_, name))) => Some(format!("{}/{}", owner, name)),
        _ => Some(repository),
    }
}

/// Look up a variable by name. Returns `Some(value)` on success; logs a
/// warning and returns `None` if the variable is unset or empty.
fn resolve_optional<F>(lookup: &F, env_name: &str, field: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(env_name) {
        Some(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Some(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        None => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
