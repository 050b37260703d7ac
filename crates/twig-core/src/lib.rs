//! Core library for twig: version model, change detection, registry access,
//! dependency resolution, pull and push. Used by the CLI binary.

pub mod commands;
pub mod config;
pub mod credentials;
pub mod descriptor;
pub mod error;
pub mod hash;
pub mod http_client;
pub mod identifier;
pub mod logger;
pub mod manifest;
pub mod project;
pub mod prompt;
pub mod pull;
pub mod push;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod sync;
pub mod version;

// Re-export main API for CLI
pub use config::{load_config, Config};
pub use descriptor::{DependencyDescription, DependencyMap, UpdatePolicy, UtilityDescriptor};
pub use error::{Result, TwigError};
pub use manifest::find_project_root;
pub use project::ProjectContext;
pub use pull::{pull_all, pull_utility, PullAllReport, PullOutcome, PullRequest};
pub use push::{delete_version, push_all, push_utility, PushOutcome, PushRequest};
pub use registry::{GithubRegistry, MemoryRegistry, RemoteRegistry};
pub use session::{SessionOptions, SyncSession};
pub use version::Version;
