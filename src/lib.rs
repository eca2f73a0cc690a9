//! DockLaunch Agent - 仓库一键部署代理
//!
//! 克隆 Git 仓库、构建 Docker 镜像、运行容器，并通过 ngrok 暴露公网地址

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod services;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::env::{constants::VERSION, EnvConfig};
use crate::state::app_state::{get_shutdown_token, trigger_shutdown};
use crate::state::AppState;

/// 命令行覆盖的运行时配置
#[derive(Clone, Debug, Default)]
pub struct RuntimeConfig {
    /// 覆盖监听端口
    pub port_override: Option<u16>,
}

/// 初始化日志
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("docklaunch_agent=info,tower_http=info"));

    // 测试或嵌入场景下可能已初始化过
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// 启动 Agent，直到收到退出信号
pub async fn init_and_run_agent_with_config(runtime: RuntimeConfig) -> anyhow::Result<()> {
    init_tracing();

    let mut config = EnvConfig::from_env();
    if let Some(port) = runtime.port_override {
        config.port = port;
    }

    info!(
        version = VERSION,
        bind = %config.bind,
        port = config.port,
        base_dir = %config.base_dir.display(),
        store = ?config.store_path,
        rollback_on_failure = config.rollback_on_failure,
        teardown_policy = ?config.teardown_policy,
        "DockLaunch agent starting"
    );

    tokio::fs::create_dir_all(&config.base_dir)
        .await
        .with_context(|| format!("failed to create {}", config.base_dir.display()))?;

    let addr: SocketAddr = format!("{}:{}", config.bind, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.bind, config.port))?;

    let state = Arc::new(AppState::new(config).await);
    let app = api::router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(addr = %addr, "Listening");

    let cancel = get_shutdown_token();
    tokio::spawn(wait_for_signal());

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("HTTP server error")?;

    let closed = state.orchestrator.shutdown().await;
    info!(tunnels_closed = closed, "DockLaunch agent stopped");

    Ok(())
}

/// 等待 Ctrl+C / SIGTERM 后触发全局 shutdown
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }

    trigger_shutdown();
}
