//! file-sync command-line tool.
//!
//! Runs inside a GitHub Actions job (reading `INPUT_*` variables) or from a
//! TOML configuration file, syncing each configured file into its
//! destination repository through a pull request.

mod report;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use filesync_core::config::AppConfig;
use filesync_core::models::SyncReport;
use filesync_core::github::{GitHubClient, RepoHost};
use filesync_core::sync_engine::SyncEngine;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Propagate files from this repository into others via pull requests.
#[derive(Parser, Debug)]
#[command(name = "filesync", version, about)]
struct Cli {
    /// Path to a TOML configuration file. Without it, GitHub Action inputs
    /// are read from the environment.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync every configured mapping (the default).
    Sync {
        /// Cancel mappings still running after this many seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Validate the configuration without contacting GitHub.
    Validate,

    /// Generate a sample configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./filesync.toml")]
        output: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level())),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", style::error(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

/// `debug` when the Actions runner has step debugging enabled.
fn default_level() -> &'static str {
    let runner_debug = std::env::var("RUNNER_DEBUG").is_ok_and(|v| v == "1");
    let step_debug = std::env::var("ACTIONS_STEP_DEBUG").is_ok_and(|v| v == "true");
    if runner_debug || step_debug {
        "debug"
    } else {
        "info"
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.as_deref().map(expand_tilde);
    match cli.command.unwrap_or(Commands::Sync { timeout_secs: None }) {
        Commands::Sync { timeout_secs } => cmd_sync(config_path.as_deref(), timeout_secs).await,
        Commands::Validate => cmd_validate(config_path.as_deref()).map(|()| ExitCode::SUCCESS),
        Commands::Init { output } => cmd_init(&output).map(|()| ExitCode::SUCCESS),
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_and_resolve(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => {
            let config =
                AppConfig::from_action_env().context("failed to read action inputs")?;
            config.validate().context("invalid action inputs")?;
            config
        }
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

/// Failed mappings are already listed in the report, so they only set the
/// exit code.
async fn cmd_sync(config_path: Option<&Path>, timeout_secs: Option<u64>) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let source = config.source_repo()?;
    let mappings = config.validated_mappings()?;
    let token = config.github.token.as_deref().unwrap_or_default();

    let client = GitHubClient::new(&config.github.api_url, token)
        .context("failed to build GitHub client")?;
    let host: Arc<dyn RepoHost> = Arc::new(client);
    let engine = SyncEngine::new(host, source);

    info!(mappings = mappings.len(), source = %engine.source(), "syncing files");

    let report = engine
        .run_with_deadline(mappings, timeout_secs.map(Duration::from_secs))
        .await;

    println!();
    println!("{}", style::header("Sync results"));
    println!("{}", report::render(&report));
    println!("{}", report::summary(&report));

    Ok(exit_code(&report))
}

fn exit_code(report: &SyncReport) -> ExitCode {
    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn cmd_validate(config_path: Option<&Path>) -> Result<()> {
    match config_path {
        Some(path) => println!("Validating configuration: {}", path.display()),
        None => println!("Validating action inputs"),
    }
    println!();

    let config = load_config(config_path)?;
    println!("  [OK] Configuration structure is valid");

    let source = config.source_repo()?;
    let mappings = config.validated_mappings()?;
    println!("  [OK] {} mapping(s) are valid", mappings.len());

    println!();
    println!("Configuration summary:");
    println!("  GitHub API    : {}", config.github.api_url);
    println!("  Source repo   : {}", source);
    println!("  GitHub token  : set (from {})", config.github.token_env);
    for named in &mappings {
        let m = &named.mapping;
        println!(
            "  {:<13} : {} -> {}:{} (base {}, on existing branch: {})",
            named.name,
            m.source_file_path(),
            m.dest_repo,
            m.dest_file_path(),
            m.dest_branch,
            m.existing_branch_strategy
        );
    }

    Ok(())
}

fn cmd_init(output: &Path) -> Result<()> {
    let default_config = r#"# file-sync configuration
#
# Every mapping copies one file from the source repository into a
# destination repository and opens a pull request for it.

[github]
api_url = "https://api.github.com"
# Environment variable holding a token with contents and pull-request write
# access to every destination repository.
token_env = "GITHUB_TOKEN"
# Defaults to $GITHUB_REPOSITORY when unset.
source_repo = "owner/templates"

[mappings.license]
sourcePath = "."
sourceFilename = "LICENSE"
destRepo = "owner/repo"
destPath = "."
destFilename = "LICENSE"
# destBranch = "main"
# existingBranchStrategy = "update"   # update | create-new | fail
"#;

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, default_config).context("failed to write config file")?;

    println!(
        "{}",
        style::success(&format!(
            "Default configuration written to {}",
            output.display()
        ))
    );
    println!();
    println!("Next steps:");
    println!("  1. Edit the mappings and the source repository");
    println!("  2. Export the token variable named by github.token_env");
    println!(
        "  3. Validate with: filesync --config {} validate",
        output.display()
    );
    println!(
        "  4. Sync with: filesync --config {} sync",
        output.display()
    );

    Ok(())
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
