//! 容器与镜像相关领域模型

use serde::{Deserialize, Serialize};

/// 已构建镜像
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHandle {
    /// 引擎返回的镜像 ID（如 `sha256:...`）
    pub id: String,
    /// 镜像 tag（`deploy-<slug>`）
    pub tag: String,
}

/// 运行中的容器
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    pub id: String,
    /// 创建该容器的镜像
    pub image: ImageHandle,
    /// 容器端口在宿主机上发布的端口
    pub host_port: u16,
}

/// 端口发布配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortBinding {
    /// 容器内端口
    pub container_port: u16,
    /// 宿主机端口，0 表示由引擎分配
    pub host_port: u16,
}

impl PortBinding {
    /// `docker run -p` 参数
    pub fn publish_arg(&self) -> String {
        if self.host_port == 0 {
            self.container_port.to_string()
        } else {
            format!("{}:{}", self.host_port, self.container_port)
        }
    }
}

impl Default for PortBinding {
    fn default() -> Self {
        Self {
            container_port: 8080,
            host_port: 8080,
        }
    }
}

/// 解析 `docker port <id> <port>/tcp` 的输出，取第一个宿主机端口
///
/// 输出形如：
/// ```text
/// 0.0.0.0:49153
/// [::]:49153
/// ```
pub fn parse_port_output(output: &str) -> Option<u16> {
    output
        .lines()
        .filter_map(|line| line.trim().rsplit(':').next())
        .find_map(|port| port.parse().ok())
}
