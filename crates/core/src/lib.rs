//! file-sync core library.
//!
//! Propagates single files from a source repository into destination
//! repositories by opening pull requests: configuration and mapping
//! validation, the repository-host abstraction and its GitHub REST client,
//! branch strategy resolution, and the sync engine.

pub mod branch;
pub mod config;
pub mod errors;
pub mod github;
pub mod models;
pub mod sync_engine;

// Re-exports for convenience.
pub use config::AppConfig;
pub use github::{GitHubClient, RepoHost};
pub use models::{FileMapping, NamedMapping, RepoId, SyncReport};
pub use sync_engine::SyncEngine;
