//! 隧道相关领域模型
//!
//! 纯数据类型，无 tokio/axum 依赖

use serde::{Deserialize, Serialize};

/// 已打开的公网隧道
///
/// 每个部署一个隧道，`id` 会写入部署记录，teardown 时据此关闭。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelHandle {
    pub id: String,
    /// 公网可访问的 URL（https）
    pub public_url: String,
    /// 隧道转发到的本地端口
    pub local_port: u16,
}

/// 隧道代理控制 API 的响应 (`GET /api/tunnels`)
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TunnelList {
    #[serde(default)]
    pub tunnels: Vec<TunnelEntry>,
}

/// 控制 API 中的单条隧道
#[derive(Clone, Debug, Deserialize)]
pub struct TunnelEntry {
    #[serde(default)]
    pub name: String,
    pub public_url: String,
    pub proto: String,
    #[serde(default)]
    pub config: Option<TunnelEntryConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TunnelEntryConfig {
    /// 上游地址，如 `http://localhost:8080`
    #[serde(default)]
    pub addr: String,
}

impl TunnelEntry {
    /// 上游地址是否指向给定端口（未上报地址时视为匹配）
    pub fn targets_port(&self, port: u16) -> bool {
        match &self.config {
            Some(config) if !config.addr.is_empty() => config
                .addr
                .trim_end_matches('/')
                .rsplit(':')
                .next()
                .and_then(|p| p.parse::<u16>().ok())
                .map_or(false, |p| p == port),
            _ => true,
        }
    }
}

impl TunnelList {
    /// 选出第一条 https 且指向该端口的隧道 URL
    pub fn select_https(&self, port: u16) -> Option<&str> {
        self.tunnels
            .iter()
            .find(|t| t.proto == "https" && t.targets_port(port))
            .map(|t| t.public_url.as_str())
    }
}
