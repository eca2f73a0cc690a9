//! Deployment error taxonomy

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the deployment pipeline and its capabilities.
///
/// The orchestrator propagates these unchanged; only the HTTP layer maps them
/// to status codes.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The repository URL does not yield a usable slug.
    #[error("invalid repository URL: {0}")]
    InvalidRepository(String),

    /// Creating the base directory or cloning failed.
    #[error("failed to fetch repository {url}: {message}")]
    Fetch { url: String, message: String },

    /// The working copy has no build descriptor at its root.
    #[error("Dockerfile not found in repository at {}", .0.display())]
    MissingBuildDescriptor(PathBuf),

    /// The build engine rejected or failed the build.
    #[error("failed to build image {tag}: {message}")]
    Build { tag: String, message: String },

    /// The container engine daemon cannot be reached.
    #[error("container engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The engine refused to start the container.
    #[error("failed to run container from {image}: {message}")]
    Run { image: String, message: String },

    /// The tunnel agent could not be started or queried.
    #[error("failed to open tunnel: {0}")]
    Tunnel(String),

    /// One or more teardown steps failed.
    #[error("cleanup failed: {}", .0.join("; "))]
    Cleanup(Vec<String>),

    /// Teardown was called with neither a container id nor a repository URL.
    #[error("either container_id or repo_url is required")]
    MissingIdentifier,
}

impl DeployError {
    pub fn fetch(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn cleanup(message: impl Into<String>) -> Self {
        Self::Cleanup(vec![message.into()])
    }

    /// Short machine-readable name used in logs and error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRepository(_) => "invalid_repository",
            Self::Fetch { .. } => "fetch_error",
            Self::MissingBuildDescriptor(_) => "missing_build_descriptor",
            Self::Build { .. } => "build_error",
            Self::EngineUnavailable(_) => "engine_unavailable",
            Self::Run { .. } => "run_error",
            Self::Tunnel(_) => "tunnel_error",
            Self::Cleanup(_) => "cleanup_error",
            Self::MissingIdentifier => "missing_identifier",
        }
    }
}

pub type DeployResult<T> = Result<T, DeployError>;
