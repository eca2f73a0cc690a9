//! 领域模型模块
//!
//! 纯数据结构，不依赖 axum/tokio

pub mod container;
pub mod deploy;
pub mod source;
pub mod tunnel;

// Re-exports for convenience
pub use container::{ContainerHandle, ImageHandle, PortBinding};
pub use deploy::{
    DeployStage, DeployState, Deployment, DeploymentRecord, StageStatus, TeardownPolicy,
    TeardownReport, TeardownRequest,
};
pub use source::{RepositoryReference, Slug, WorkingCopy};
pub use tunnel::TunnelHandle;
