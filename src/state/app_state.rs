//! 应用状态

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 全局 shutdown token，用于优雅关闭 HTTP 服务和隧道代理
static GLOBAL_SHUTDOWN: std::sync::OnceLock<CancellationToken> = std::sync::OnceLock::new();

/// 获取全局 shutdown token
pub fn get_shutdown_token() -> CancellationToken {
    GLOBAL_SHUTDOWN
        .get_or_init(CancellationToken::new)
        .clone()
}

/// 触发全局 shutdown
pub fn trigger_shutdown() {
    if let Some(token) = GLOBAL_SHUTDOWN.get() {
        token.cancel();
    }
}

use crate::config::env::EnvConfig;
use crate::services::deploy::{DeploymentOrchestrator, OrchestratorOptions};
use crate::services::docker::DockerCli;
use crate::services::source::GitFetcher;
use crate::services::tunnel::NgrokTunnel;

use super::deployment_store::DeploymentStore;

/// 应用状态
pub struct AppState {
    /// 环境配置
    pub config: EnvConfig,
    /// 服务启动时间
    pub started_at: DateTime<Utc>,
    /// 部署编排器
    pub orchestrator: Arc<DeploymentOrchestrator>,
    /// 部署记录
    pub store: DeploymentStore,
}

impl AppState {
    /// 按配置组装真实的 git / docker / ngrok 实现
    pub async fn new(config: EnvConfig) -> Self {
        let fetcher = Arc::new(GitFetcher::new(
            config.base_dir.clone(),
            config.git_path.clone(),
            config.clone_timeout,
        ));
        let docker = Arc::new(DockerCli::new(
            config.docker.docker_path.clone(),
            config.docker.ports,
            config.docker.timeouts.clone(),
        ));
        let tunnel = Arc::new(NgrokTunnel::new(config.tunnel.clone()));

        let options = OrchestratorOptions {
            rollback_on_failure: config.rollback_on_failure,
            teardown_policy: config.teardown_policy,
        };
        let orchestrator = Arc::new(DeploymentOrchestrator::new(
            fetcher,
            docker.clone(),
            docker,
            tunnel,
            options,
        ));

        let store = match &config.store_path {
            Some(path) => DeploymentStore::open(path.clone()).await,
            None => DeploymentStore::in_memory(),
        };

        Self::with_parts(config, orchestrator, store)
    }

    /// 使用已构建的编排器和存储
    pub fn with_parts(
        config: EnvConfig,
        orchestrator: Arc<DeploymentOrchestrator>,
        store: DeploymentStore,
    ) -> Self {
        Self {
            config,
            started_at: Utc::now(),
            orchestrator,
            store,
        }
    }

    /// 运行时长（秒）
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
