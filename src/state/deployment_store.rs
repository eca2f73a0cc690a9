//! 部署记录存储
//!
//! 内存中保存部署记录（按 container_id 索引），
//! 可选镜像到本地 JSON 文件，以便 Agent 重启后恢复

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::env::constants::STORE_FORMAT_VERSION;
use crate::domain::deploy::DeploymentRecord;

/// 持久化文件格式
#[derive(Debug, Serialize, Deserialize)]
struct PersistedDeployments {
    /// 版本号（用于未来格式升级）
    version: u32,
    /// 保存时间
    saved_at: DateTime<Utc>,
    records: Vec<DeploymentRecord>,
}

/// 部署记录存储
pub struct DeploymentStore {
    /// container_id -> record
    records: RwLock<HashMap<String, DeploymentRecord>>,
    /// JSON 文件路径（None 表示仅内存）
    path: Option<PathBuf>,
}

impl DeploymentStore {
    /// 仅内存存储
    pub fn in_memory() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            path: None,
        }
    }

    /// 打开文件存储，文件存在时加载已有记录
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = load(&path)
            .await
            .map(|records| {
                records
                    .into_iter()
                    .map(|r| (r.container_id.clone(), r))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            records: RwLock::new(records),
            path: Some(path),
        }
    }

    /// 保存记录（同一容器的旧记录会被覆盖）
    pub async fn insert(&self, record: DeploymentRecord) {
        let mut records = self.records.write().await;
        records.insert(record.container_id.clone(), record);
        self.persist(&records).await;
    }

    pub async fn get(&self, container_id: &str) -> Option<DeploymentRecord> {
        let records = self.records.read().await;
        records.get(container_id.trim()).cloned()
    }

    /// 按仓库 URL 查找最新的记录
    pub async fn find_by_repo(&self, repo_url: &str) -> Option<DeploymentRecord> {
        let repo_url = repo_url.trim();
        let records = self.records.read().await;
        records
            .values()
            .filter(|r| r.repo_url == repo_url)
            .max_by_key(|r| r.created_at)
            .cloned()
    }

    pub async fn remove_by_container(&self, container_id: &str) -> Option<DeploymentRecord> {
        let mut records = self.records.write().await;
        let removed = records.remove(container_id.trim());
        if removed.is_some() {
            self.persist(&records).await;
        }
        removed
    }

    /// 删除该仓库的所有记录，返回删除的数量
    pub async fn remove_by_repo(&self, repo_url: &str) -> usize {
        let repo_url = repo_url.trim();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.repo_url != repo_url);
        let removed = before - records.len();
        if removed > 0 {
            self.persist(&records).await;
        }
        removed
    }

    /// 所有记录，最新的在前
    pub async fn list(&self) -> Vec<DeploymentRecord> {
        let records = self.records.read().await;
        let mut list: Vec<_> = records.values().cloned().collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }

    /// 写入文件；失败只记录日志，内存状态仍然有效
    async fn persist(&self, records: &HashMap<String, DeploymentRecord>) {
        let Some(path) = &self.path else {
            return;
        };

        let snapshot = PersistedDeployments {
            version: STORE_FORMAT_VERSION,
            saved_at: Utc::now(),
            records: records.values().cloned().collect(),
        };

        if let Err(e) = save(path, &snapshot).await {
            error!(path = %path.display(), error = %e, "Failed to persist deployment records");
        }
    }
}

/// 从文件加载记录，文件不存在或无法解析时返回 None
async fn load(path: &Path) -> Option<Vec<DeploymentRecord>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read deployment records file");
            return None;
        }
    };

    match serde_json::from_str::<PersistedDeployments>(&content) {
        Ok(persisted) if persisted.version == STORE_FORMAT_VERSION => {
            info!(
                path = %path.display(),
                records = persisted.records.len(),
                saved_at = %persisted.saved_at,
                "Loaded deployment records"
            );
            Some(persisted.records)
        }
        Ok(persisted) => {
            warn!(
                path = %path.display(),
                version = persisted.version,
                "Unsupported deployment records version, ignoring"
            );
            None
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Failed to parse deployment records, ignoring"
            );
            None
        }
    }
}

/// 原子写入：先写临时文件再重命名
async fn save(path: &Path, snapshot: &PersistedDeployments) -> anyhow::Result<()> {
    let temp_path = path.with_extension("json.tmp");

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let content = serde_json::to_string_pretty(snapshot)?;
    fs::write(&temp_path, &content).await?;
    fs::rename(&temp_path, path).await?;

    Ok(())
}
