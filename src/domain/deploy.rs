//! 部署相关领域模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::container::ImageHandle;
use super::source::Slug;
use super::tunnel::TunnelHandle;

/// 单次部署尝试的状态
///
/// `Pending → Fetched → Built → Running → Exposed`，任一步失败进入 `Failed`。
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeployState {
    Pending,
    Fetched,
    Built,
    Running,
    Exposed,
    Failed,
}

impl DeployState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployState::Pending => "pending",
            DeployState::Fetched => "fetched",
            DeployState::Built => "built",
            DeployState::Running => "running",
            DeployState::Exposed => "exposed",
            DeployState::Failed => "failed",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployState::Exposed | DeployState::Failed)
    }

    /// 当前状态下正在执行的阶段下标（终态返回 None）
    pub fn stage_index(&self) -> Option<usize> {
        match self {
            DeployState::Pending => Some(0),
            DeployState::Fetched => Some(1),
            DeployState::Built => Some(2),
            DeployState::Running => Some(3),
            DeployState::Exposed | DeployState::Failed => None,
        }
    }

    /// 成功完成当前步骤后的下一个状态
    pub fn advance(self) -> Self {
        match self {
            DeployState::Pending => DeployState::Fetched,
            DeployState::Fetched => DeployState::Built,
            DeployState::Built => DeployState::Running,
            DeployState::Running => DeployState::Exposed,
            terminal => terminal,
        }
    }
}

/// 阶段状态
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

/// 部署阶段信息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeployStage {
    /// 阶段标识 (e.g., "fetch", "build", "run", "expose")
    pub name: String,
    /// 显示名称 (e.g., "Git Clone", "Docker Build")
    pub display_name: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// 持续时间（毫秒）
    pub duration_ms: Option<i64>,
    pub status: StageStatus,
    /// 附加信息
    pub message: Option<String>,
}

impl DeployStage {
    /// 创建新的待执行阶段
    pub fn new(name: &str, display_name: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            started_at: None,
            finished_at: None,
            duration_ms: None,
            status: StageStatus::Pending,
            message: None,
        }
    }

    /// 部署流水线的四个标准阶段
    pub fn pipeline() -> Vec<Self> {
        vec![
            Self::new("fetch", "Git Clone"),
            Self::new("build", "Docker Build"),
            Self::new("run", "Docker Run"),
            Self::new("expose", "Public Tunnel"),
        ]
    }

    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
        self.status = StageStatus::Running;
    }

    pub fn finish(&mut self, success: bool, message: Option<String>) {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.status = if success {
            StageStatus::Success
        } else {
            StageStatus::Failed
        };
        self.message = message;
        if let Some(started) = self.started_at {
            self.duration_ms = Some((now - started).num_milliseconds());
        }
    }

    pub fn skip(&mut self, reason: Option<String>) {
        self.status = StageStatus::Skipped;
        self.message = reason;
    }
}

/// 成功部署的结果（由编排器返回）
#[derive(Clone, Debug, Serialize)]
pub struct Deployment {
    pub container_id: String,
    pub public_url: String,
    pub repo_url: String,
    pub slug: Slug,
    pub image: ImageHandle,
    pub tunnel: TunnelHandle,
    pub stages: Vec<DeployStage>,
}

/// 持久化的部署记录
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub repo_url: String,
    pub slug: Slug,
    pub container_id: String,
    pub ngrok_url: String,
    pub tunnel_id: String,
    pub image_tag: String,
    #[serde(default)]
    pub host_port: u16,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub stages: Vec<DeployStage>,
}

impl DeploymentRecord {
    pub fn from_deployment(deployment: &Deployment) -> Self {
        Self {
            repo_url: deployment.repo_url.clone(),
            slug: deployment.slug.clone(),
            container_id: deployment.container_id.clone(),
            ngrok_url: deployment.public_url.clone(),
            tunnel_id: deployment.tunnel.id.clone(),
            image_tag: deployment.image.tag.clone(),
            host_port: deployment.tunnel.local_port,
            created_at: Utc::now(),
            stages: deployment.stages.clone(),
        }
    }

    /// 还原 teardown 所需的隧道句柄
    pub fn tunnel_handle(&self) -> TunnelHandle {
        TunnelHandle {
            id: self.tunnel_id.clone(),
            public_url: self.ngrok_url.clone(),
            local_port: self.host_port,
        }
    }
}

/// teardown 失败处理策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownPolicy {
    /// 第一个失败的步骤中止后续步骤
    #[default]
    FailFast,
    /// 尝试所有步骤，汇总失败
    BestEffort,
}

impl TeardownPolicy {
    /// 宽松解析，未知值回落到 FailFast
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "best_effort" => TeardownPolicy::BestEffort,
            _ => TeardownPolicy::FailFast,
        }
    }
}

/// teardown 请求
///
/// `container_id` 与 `repo_url` 至少提供一个。
#[derive(Clone, Debug, Default)]
pub struct TeardownRequest {
    pub container_id: Option<String>,
    pub repo_url: Option<String>,
    /// 部署时返回的隧道句柄
    pub tunnel: Option<TunnelHandle>,
}

impl TeardownRequest {
    pub fn has_identifier(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.container_id) || present(&self.repo_url)
    }
}

/// teardown 结果
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub container_removed: bool,
    pub image_removed: bool,
    pub working_copy_removed: bool,
    pub tunnel_closed: bool,
}
