//! 环境变量配置加载

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::domain::container::PortBinding;
use crate::domain::deploy::TeardownPolicy;
use crate::services::docker::DockerTimeouts;

/// 环境配置
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// 服务监听地址
    pub bind: String,
    /// 服务监听端口
    pub port: u16,
    /// 工作副本根目录
    pub base_dir: PathBuf,
    /// 部署记录 JSON 文件（可选）
    pub store_path: Option<PathBuf>,
    /// git 可执行文件
    pub git_path: String,
    /// git clone 超时
    pub clone_timeout: Duration,
    /// docker 配置
    pub docker: DockerConfig,
    /// 隧道配置
    pub tunnel: TunnelConfig,
    /// 部署失败时是否回滚已创建的资源
    pub rollback_on_failure: bool,
    /// teardown 失败处理策略
    pub teardown_policy: TeardownPolicy,
}

/// docker 配置
#[derive(Clone, Debug)]
pub struct DockerConfig {
    pub docker_path: String,
    pub ports: PortBinding,
    pub timeouts: DockerTimeouts,
}

/// 隧道代理配置
#[derive(Clone, Debug)]
pub struct TunnelConfig {
    /// 代理可执行文件（默认 ngrok）
    pub agent_path: String,
    /// 代理参数，`{port}` 替换为本地端口，`{web_addr}` 替换为该代理独占的控制地址，
    /// `{config}` 替换为代理配置文件列表
    pub agent_args: Vec<String>,
    /// 代理本地控制 API，`{web_addr}` 同上
    pub api_url: String,
    /// 基础配置文件（authtoken 等），与每个代理自己的配置文件合并
    pub base_config: Option<String>,
    /// 启动后首次查询前的等待时间
    pub settle_delay: Duration,
    /// 控制 API 最多查询次数
    pub poll_attempts: u32,
    /// 两次查询之间的间隔
    pub poll_interval: Duration,
}

impl TunnelConfig {
    /// 从环境变量加载隧道配置
    pub fn from_env() -> Self {
        let agent_path = env::var("NGROK_PATH").unwrap_or_else(|_| "ngrok".to_string());

        let agent_args = env::var("NGROK_ARGS")
            .ok()
            .map(|v| v.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|args| !args.is_empty())
            .unwrap_or_else(default_agent_args);

        let api_url = env::var("NGROK_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        let base_config = env::var("NGROK_CONFIG")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(default_ngrok_config);

        Self {
            agent_path,
            agent_args,
            api_url,
            base_config,
            settle_delay: Duration::from_millis(parse_or("TUNNEL_SETTLE_MS", 2000)),
            poll_attempts: parse_or("TUNNEL_POLL_ATTEMPTS", 5),
            poll_interval: Duration::from_millis(parse_or("TUNNEL_POLL_INTERVAL_MS", 1000)),
        }
    }

    /// 代入占位符后的代理参数
    pub fn agent_args_for(&self, port: u16, web_addr: &str, config: &str) -> Vec<String> {
        let port = port.to_string();
        self.agent_args
            .iter()
            .map(|arg| {
                arg.replace("{port}", &port)
                    .replace("{web_addr}", web_addr)
                    .replace("{config}", config)
            })
            .collect()
    }

    /// 某个代理的控制 API 地址
    pub fn api_url_for(&self, web_addr: &str) -> String {
        self.api_url.replace("{web_addr}", web_addr)
    }

    /// 参数中引用了 `{config}` 时需要为每个代理生成配置文件
    pub fn uses_agent_config(&self) -> bool {
        self.agent_args.iter().any(|arg| arg.contains("{config}"))
    }

    /// `{config}` 的取值：基础配置在前，代理自己的配置在后（后者覆盖 web_addr）
    pub fn config_arg(&self, agent_config: &Path) -> String {
        let agent_config = agent_config.to_string_lossy();
        match &self.base_config {
            Some(base) => format!("{},{}", base, agent_config),
            None => agent_config.to_string(),
        }
    }
}

const DEFAULT_API_URL: &str = "http://{web_addr}/api/tunnels";

fn default_agent_args() -> Vec<String> {
    ["http", "{port}", "--config", "{config}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// ngrok 默认配置文件位置，存在时才使用
fn default_ngrok_config() -> Option<String> {
    let home = env::var("HOME").ok().filter(|h| !h.is_empty())?;
    let path = PathBuf::from(home).join(".config").join("ngrok").join("ngrok.yml");
    path.exists().then(|| path.to_string_lossy().to_string())
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            agent_path: "ngrok".to_string(),
            agent_args: default_agent_args(),
            api_url: DEFAULT_API_URL.to_string(),
            base_config: None,
            settle_delay: Duration::from_secs(2),
            poll_attempts: 5,
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl DockerConfig {
    pub fn from_env() -> Self {
        let docker_path = env::var("DOCKER_PATH").unwrap_or_else(|_| "docker".to_string());

        let ports = PortBinding {
            container_port: parse_or("DOCKLAUNCH_CONTAINER_PORT", 8080),
            host_port: parse_or("DOCKLAUNCH_HOST_PORT", 8080),
        };

        let timeouts = DockerTimeouts {
            build: Duration::from_secs(parse_or("BUILD_TIMEOUT_SECS", 1800)),
            engine: Duration::from_secs(parse_or("ENGINE_TIMEOUT_SECS", 120)),
        };

        Self {
            docker_path,
            ports,
            timeouts,
        }
    }
}

impl EnvConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        let bind = env::var("DOCKLAUNCH_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = load_with_fallback("DOCKLAUNCH_PORT", "PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(8000);

        let base_dir = env::var("DOCKLAUNCH_BASE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_base_dir());

        let store_path = env::var("DOCKLAUNCH_STORE_PATH")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let git_path = env::var("GIT_PATH").unwrap_or_else(|_| "git".to_string());

        let rollback_on_failure = env::var("DOCKLAUNCH_ROLLBACK_ON_FAILURE")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(true);

        let teardown_policy = env::var("DOCKLAUNCH_TEARDOWN_POLICY")
            .map(|v| TeardownPolicy::parse_lenient(&v))
            .unwrap_or_default();

        Self {
            bind,
            port,
            base_dir,
            store_path,
            git_path,
            clone_timeout: Duration::from_secs(parse_or("CLONE_TIMEOUT_SECS", 600)),
            docker: DockerConfig::from_env(),
            tunnel: TunnelConfig::from_env(),
            rollback_on_failure,
            teardown_policy,
        }
    }
}

/// `$HOME/deployed_repos`，无 HOME 时退回临时目录
fn default_base_dir() -> PathBuf {
    match env::var("HOME") {
        Ok(home) if !home.is_empty() => PathBuf::from(home).join("deployed_repos"),
        _ => {
            warn!("HOME is not set, storing working copies under the temp directory");
            env::temp_dir().join("deployed_repos")
        }
    }
}

/// 解析数值型环境变量，缺失或非法时使用默认值
fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(v) => v.trim().parse().unwrap_or_else(|_| {
            warn!(variable = %name, value = %v, "Invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}

/// 加载环境变量，支持 fallback
fn load_with_fallback(primary: &str, fallback: &str) -> Option<String> {
    env::var(primary).ok().or_else(|| env::var(fallback).ok())
}

/// 常量
pub mod constants {
    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    /// 部署记录文件格式版本
    pub const STORE_FORMAT_VERSION: u32 = 1;
}
