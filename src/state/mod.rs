//! 运行时状态模块
//!
//! 管理应用状态和部署记录

pub mod app_state;
pub mod deployment_store;

pub use app_state::AppState;
pub use deployment_store::DeploymentStore;
