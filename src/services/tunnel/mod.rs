//! 公网隧道模块
//!
//! 通过外部隧道代理（ngrok）把本地端口暴露为公网 https URL。
//! 每个部署一个隧道，句柄由调用方持有并在 teardown 时交回。

pub mod ngrok;

use async_trait::async_trait;

use crate::domain::tunnel::TunnelHandle;
use crate::services::deploy::error::DeployResult;

pub use ngrok::NgrokTunnel;

/// 暴露本地端口的能力
#[async_trait]
pub trait PublicTunnel: Send + Sync {
    /// 为本地端口打开隧道
    async fn open(&self, port: u16) -> DeployResult<TunnelHandle>;

    /// 关闭隧道；句柄不存在或已关闭时返回 `Ok(false)`
    async fn close(&self, handle: &TunnelHandle) -> DeployResult<bool>;

    /// 进程退出前关闭所有隧道，返回关闭的数量
    async fn close_all(&self) -> usize {
        0
    }
}
