//! 源码获取
//!
//! 将远程仓库 clone 到 `<base_dir>/<slug>`，已存在则直接复用。
//! 同一 slug 的 fetch/discard 通过 slug 级别的锁串行化。

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::domain::source::{RepositoryReference, Slug, WorkingCopy};
use crate::infra::command::{stderr_trimmed, CommandError, CommandRunner};
use crate::services::deploy::error::{DeployError, DeployResult};

/// 获取仓库工作副本的能力
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// 获取工作副本；目录已存在时直接返回，不做更新
    async fn fetch(&self, repo: &RepositoryReference) -> DeployResult<WorkingCopy>;

    /// 删除工作副本，返回是否实际删除了目录
    async fn discard(&self, slug: &Slug) -> DeployResult<bool>;
}

/// 按 slug 分配的互斥锁
#[derive(Default)]
pub struct SlugLocks {
    locks: Mutex<HashMap<Slug, Arc<Mutex<()>>>>,
}

impl SlugLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取 slug 对应的锁，guard 释放前其他同 slug 的调用会等待
    pub async fn acquire(&self, slug: &Slug) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(slug.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// 基于 `git` CLI 的实现
pub struct GitFetcher {
    base_dir: PathBuf,
    git_path: String,
    clone_timeout: Duration,
    locks: SlugLocks,
}

impl GitFetcher {
    pub fn new(base_dir: impl Into<PathBuf>, git_path: impl Into<String>, clone_timeout: Duration) -> Self {
        Self {
            base_dir: base_dir.into(),
            git_path: git_path.into(),
            clone_timeout,
            locks: SlugLocks::new(),
        }
    }

    /// 工作副本路径
    pub fn path_for(&self, slug: &Slug) -> PathBuf {
        self.base_dir.join(slug.as_str())
    }

    async fn clone_into(&self, repo: &RepositoryReference, target: &Path) -> DeployResult<()> {
        fs::create_dir_all(&self.base_dir).await.map_err(|e| {
            DeployError::fetch(
                &repo.url,
                format!("cannot create base directory {}: {}", self.base_dir.display(), e),
            )
        })?;

        let target_str = target.to_string_lossy().to_string();
        info!(url = %repo.url, path = %target_str, "Cloning repository");

        let result = CommandRunner::run(
            &self.git_path,
            ["clone", "--", repo.url.as_str(), target_str.as_str()],
            None,
            self.clone_timeout,
        )
        .await;

        let failure = match result {
            Ok(output) if output.status.success() => return Ok(()),
            Ok(output) => {
                let stderr = stderr_trimmed(&output);
                if stderr.is_empty() {
                    format!("git clone exited with {}", output.status)
                } else {
                    stderr
                }
            }
            Err(CommandError::SpawnFailed(e)) => format!("cannot run {}: {}", self.git_path, e),
            Err(e) => e.to_string(),
        };

        // 清理 clone 中断留下的半成品目录
        if fs::try_exists(target).await.unwrap_or(false) {
            if let Err(e) = fs::remove_dir_all(target).await {
                warn!(path = %target_str, error = %e, "Failed to remove partial clone");
            }
        }

        Err(DeployError::fetch(&repo.url, failure))
    }
}

#[async_trait]
impl SourceFetcher for GitFetcher {
    async fn fetch(&self, repo: &RepositoryReference) -> DeployResult<WorkingCopy> {
        let _guard = self.locks.acquire(&repo.slug).await;
        let target = self.path_for(&repo.slug);

        if fs::try_exists(&target).await.unwrap_or(false) {
            info!(slug = %repo.slug, path = %target.display(), "Repository already exists, reusing");
            return Ok(WorkingCopy {
                slug: repo.slug.clone(),
                path: target,
                freshly_cloned: false,
            });
        }

        self.clone_into(repo, &target).await?;
        info!(slug = %repo.slug, path = %target.display(), "Repository cloned");

        Ok(WorkingCopy {
            slug: repo.slug.clone(),
            path: target,
            freshly_cloned: true,
        })
    }

    async fn discard(&self, slug: &Slug) -> DeployResult<bool> {
        let _guard = self.locks.acquire(slug).await;
        let target = self.path_for(slug);

        if !fs::try_exists(&target).await.unwrap_or(false) {
            return Ok(false);
        }

        fs::remove_dir_all(&target).await.map_err(|e| {
            DeployError::cleanup(format!(
                "failed to remove working copy {}: {}",
                target.display(),
                e
            ))
        })?;
        info!(slug = %slug, path = %target.display(), "Working copy removed");
        Ok(true)
    }
}
