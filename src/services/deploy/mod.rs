//! 部署编排
//!
//! 把 fetch → build → run → expose 四个步骤串成一次部署，
//! 并负责失败回滚与 teardown。编排器自身不持有可变状态，
//! 隧道句柄随 `Deployment` 返回，teardown 时由调用方交回。

pub mod error;
pub mod rollback;

use std::future::Future;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::domain::deploy::{
    DeployStage, DeployState, Deployment, TeardownPolicy, TeardownReport, TeardownRequest,
};
use crate::domain::source::{RepositoryReference, Slug};
use crate::services::docker::{ContainerRunner, ImageBuilder};
use crate::services::source::SourceFetcher;
use crate::services::tunnel::PublicTunnel;

pub use error::{DeployError, DeployResult};
use rollback::{Compensation, Rollback};

/// 编排器选项
#[derive(Clone, Copy, Debug)]
pub struct OrchestratorOptions {
    /// 部署失败时回滚已创建的资源
    pub rollback_on_failure: bool,
    pub teardown_policy: TeardownPolicy,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            rollback_on_failure: true,
            teardown_policy: TeardownPolicy::FailFast,
        }
    }
}

pub struct DeploymentOrchestrator {
    fetcher: Arc<dyn SourceFetcher>,
    builder: Arc<dyn ImageBuilder>,
    runner: Arc<dyn ContainerRunner>,
    tunnel: Arc<dyn PublicTunnel>,
    options: OrchestratorOptions,
}

/// 单次部署尝试的进度
struct DeployAttempt {
    slug: Slug,
    state: DeployState,
    stages: Vec<DeployStage>,
}

impl DeployAttempt {
    fn new(slug: Slug) -> Self {
        Self {
            slug,
            state: DeployState::Pending,
            stages: DeployStage::pipeline(),
        }
    }

    /// 执行当前状态对应的步骤，成功则推进状态，失败则进入 Failed
    async fn step<T, F>(&mut self, fut: F) -> DeployResult<T>
    where
        F: Future<Output = DeployResult<T>>,
    {
        let index = self.state.stage_index();
        if let Some(stage) = index.and_then(|i| self.stages.get_mut(i)) {
            stage.start();
        }

        match fut.await {
            Ok(value) => {
                if let Some(stage) = index.and_then(|i| self.stages.get_mut(i)) {
                    stage.finish(true, None);
                }
                let next = self.state.advance();
                info!(
                    slug = %self.slug,
                    from = self.state.as_str(),
                    to = next.as_str(),
                    "Deployment state changed"
                );
                self.state = next;
                Ok(value)
            }
            Err(e) => {
                if let Some(i) = index {
                    if let Some(stage) = self.stages.get_mut(i) {
                        stage.finish(false, Some(e.to_string()));
                    }
                    for stage in self.stages.iter_mut().skip(i + 1) {
                        stage.skip(Some("previous stage failed".to_string()));
                    }
                }
                warn!(
                    slug = %self.slug,
                    from = self.state.as_str(),
                    kind = e.kind(),
                    "Deployment step failed"
                );
                self.state = DeployState::Failed;
                Err(e)
            }
        }
    }
}

impl DeploymentOrchestrator {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        builder: Arc<dyn ImageBuilder>,
        runner: Arc<dyn ContainerRunner>,
        tunnel: Arc<dyn PublicTunnel>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            fetcher,
            builder,
            runner,
            tunnel,
            options,
        }
    }

    /// 部署一个仓库，成功时返回公网可访问的部署
    pub async fn deploy(&self, repo_url: &str) -> DeployResult<Deployment> {
        let repo = RepositoryReference::parse(repo_url)
            .map_err(|e| DeployError::InvalidRepository(e.to_string()))?;

        info!(repo_url = %repo.url, slug = %repo.slug, "Starting deployment");

        let mut attempt = DeployAttempt::new(repo.slug.clone());
        let mut rollback = Rollback::new();

        match self.run_pipeline(&repo, &mut attempt, &mut rollback).await {
            Ok(deployment) => {
                info!(
                    slug = %repo.slug,
                    container_id = %deployment.container_id,
                    url = %deployment.public_url,
                    "Deployment exposed"
                );
                Ok(deployment)
            }
            Err(e) => {
                error!(slug = %repo.slug, error = %e, "Deployment failed");
                if self.options.rollback_on_failure {
                    self.unwind(&repo.slug, rollback).await;
                } else if !rollback.is_empty() {
                    warn!(
                        slug = %repo.slug,
                        resources = rollback.len(),
                        "Rollback disabled, leaving created resources in place"
                    );
                }
                Err(e)
            }
        }
    }

    async fn run_pipeline(
        &self,
        repo: &RepositoryReference,
        attempt: &mut DeployAttempt,
        rollback: &mut Rollback,
    ) -> DeployResult<Deployment> {
        let working_copy = attempt.step(self.fetcher.fetch(repo)).await?;
        if working_copy.freshly_cloned {
            rollback.push(Compensation::DiscardWorkingCopy(working_copy.slug.clone()));
        }

        let tag = repo.slug.image_tag();
        let image = attempt.step(self.builder.build(&working_copy, &tag)).await?;
        rollback.push(Compensation::RemoveImage(image.id.clone()));

        let container = attempt.step(self.runner.run(&image)).await?;
        rollback.push(Compensation::RemoveContainer(container.id.clone()));

        let tunnel = attempt.step(self.tunnel.open(container.host_port)).await?;

        Ok(Deployment {
            container_id: container.id,
            public_url: tunnel.public_url.clone(),
            repo_url: repo.url.clone(),
            slug: repo.slug.clone(),
            image,
            tunnel,
            stages: std::mem::take(&mut attempt.stages),
        })
    }

    /// 逆序执行补偿动作；补偿失败只记录日志
    async fn unwind(&self, slug: &Slug, rollback: Rollback) {
        for action in rollback.into_unwind_order() {
            match self.compensate(&action).await {
                Ok(()) => info!(slug = %slug, action = %action.describe(), "Rolled back"),
                Err(e) => warn!(
                    slug = %slug,
                    action = %action.describe(),
                    error = %e,
                    "Rollback step failed"
                ),
            }
        }
    }

    async fn compensate(&self, action: &Compensation) -> DeployResult<()> {
        match action {
            Compensation::DiscardWorkingCopy(slug) => self.fetcher.discard(slug).await.map(|_| ()),
            Compensation::RemoveImage(image) => self.runner.remove_image(image).await,
            Compensation::RemoveContainer(id) => {
                self.runner.stop(id).await?;
                self.runner.remove(id).await
            }
        }
    }

    /// 清理一个部署
    ///
    /// 顺序：容器 → 镜像 → 工作副本 → 隧道。
    pub async fn teardown(&self, request: &TeardownRequest) -> DeployResult<TeardownReport> {
        if !request.has_identifier() {
            return Err(DeployError::MissingIdentifier);
        }

        let container_id = non_blank(&request.container_id);
        let slug = match non_blank(&request.repo_url) {
            Some(url) => Some(
                Slug::from_url(url).map_err(|e| DeployError::InvalidRepository(e.to_string()))?,
            ),
            None => None,
        };

        info!(
            container_id = ?container_id,
            slug = ?slug.as_ref().map(Slug::as_str),
            tunnel_id = ?request.tunnel.as_ref().map(|t| t.id.as_str()),
            policy = ?self.options.teardown_policy,
            "Tearing down deployment"
        );

        let mut report = TeardownReport::default();
        let mut failures = Vec::new();

        if let Some(id) = container_id {
            match self.runner.image_of(id).await {
                Ok(Some(image)) => {
                    let result = self.runner.stop(id).await;
                    self.absorb(result, &mut failures)?;

                    let result = self
                        .runner
                        .remove(id)
                        .await
                        .map(|()| report.container_removed = true);
                    self.absorb(result, &mut failures)?;

                    let result = self
                        .runner
                        .remove_image(&image)
                        .await
                        .map(|()| report.image_removed = true);
                    self.absorb(result, &mut failures)?;
                }
                Ok(None) => {
                    warn!(container_id = %id, "Container not found, skipping container and image removal");
                }
                Err(e) => self.absorb(Err(e), &mut failures)?,
            }
        }

        if let Some(slug) = &slug {
            let result = self
                .fetcher
                .discard(slug)
                .await
                .map(|removed| report.working_copy_removed = removed);
            self.absorb(result, &mut failures)?;
        }

        if let Some(handle) = &request.tunnel {
            let result = self
                .tunnel
                .close(handle)
                .await
                .map(|closed| report.tunnel_closed = closed);
            self.absorb(result, &mut failures)?;
        }

        match failures.len() {
            0 => {
                info!(report = ?report, "Teardown complete");
                Ok(report)
            }
            1 => Err(failures.remove(0)),
            _ => Err(DeployError::Cleanup(
                failures.iter().map(ToString::to_string).collect(),
            )),
        }
    }

    /// 按 teardown 策略处理单步结果
    fn absorb(&self, result: DeployResult<()>, failures: &mut Vec<DeployError>) -> DeployResult<()> {
        match (result, self.options.teardown_policy) {
            (Ok(()), _) => Ok(()),
            (Err(e), TeardownPolicy::FailFast) => Err(e),
            (Err(e), TeardownPolicy::BestEffort) => {
                warn!(error = %e, "Teardown step failed, continuing");
                failures.push(e);
                Ok(())
            }
        }
    }

    /// 关闭所有仍在运行的隧道代理
    pub async fn shutdown(&self) -> usize {
        let closed = self.tunnel.close_all().await;
        if closed > 0 {
            info!(count = closed, "Closed tunnels on shutdown");
        }
        closed
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::container::{ContainerHandle, ImageHandle};
    use crate::domain::deploy::StageStatus;
    use crate::domain::source::WorkingCopy;
    use crate::domain::tunnel::TunnelHandle;
    use crate::services::docker::DAEMON_UNAVAILABLE_MESSAGE;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// 四种能力的内存实现，记录每次调用
    #[derive(Default)]
    pub(crate) struct FakeWorld {
        pub calls: Mutex<Vec<String>>,
        failing: Mutex<HashSet<&'static str>>,
        pub working_copies: Mutex<HashSet<String>>,
        pub images: Mutex<HashSet<String>>,
        /// container id -> image id
        pub containers: Mutex<HashMap<String, String>>,
        pub tunnels: Mutex<HashSet<String>>,
    }

    impl FakeWorld {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn fail(&self, op: &'static str) {
            self.failing.lock().unwrap().insert(op);
        }

        pub fn with_working_copy(&self, slug: &str) {
            self.working_copies.lock().unwrap().insert(slug.to_string());
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, op: &'static str, arg: &str) -> bool {
            self.calls.lock().unwrap().push(format!("{}:{}", op, arg));
            self.failing.lock().unwrap().contains(op)
        }
    }

    #[async_trait]
    impl SourceFetcher for FakeWorld {
        async fn fetch(&self, repo: &RepositoryReference) -> DeployResult<WorkingCopy> {
            if self.record("fetch", repo.slug.as_str()) {
                return Err(DeployError::fetch(&repo.url, "clone refused"));
            }
            let freshly_cloned = self
                .working_copies
                .lock()
                .unwrap()
                .insert(repo.slug.to_string());
            Ok(WorkingCopy {
                slug: repo.slug.clone(),
                path: PathBuf::from("/srv/deployed_repos").join(repo.slug.as_str()),
                freshly_cloned,
            })
        }

        async fn discard(&self, slug: &Slug) -> DeployResult<bool> {
            if self.record("discard", slug.as_str()) {
                return Err(DeployError::cleanup("directory busy"));
            }
            Ok(self.working_copies.lock().unwrap().remove(slug.as_str()))
        }
    }

    #[async_trait]
    impl ImageBuilder for FakeWorld {
        async fn build(&self, _working_copy: &WorkingCopy, tag: &str) -> DeployResult<ImageHandle> {
            if self.record("build", tag) {
                return Err(DeployError::EngineUnavailable(DAEMON_UNAVAILABLE_MESSAGE.to_string()));
            }
            let id = format!("sha256:{}", tag);
            self.images.lock().unwrap().insert(id.clone());
            Ok(ImageHandle {
                id,
                tag: tag.to_string(),
            })
        }
    }

    #[async_trait]
    impl ContainerRunner for FakeWorld {
        async fn run(&self, image: &ImageHandle) -> DeployResult<ContainerHandle> {
            if self.record("run", &image.tag) {
                return Err(DeployError::Run {
                    image: image.tag.clone(),
                    message: "port is already allocated".to_string(),
                });
            }
            let id = format!("ctr-{}", image.tag.trim_start_matches("deploy-"));
            self.containers
                .lock()
                .unwrap()
                .insert(id.clone(), image.id.clone());
            Ok(ContainerHandle {
                id,
                image: image.clone(),
                host_port: 8080,
            })
        }

        async fn image_of(&self, container_id: &str) -> DeployResult<Option<String>> {
            if self.record("image_of", container_id) {
                return Err(DeployError::EngineUnavailable(DAEMON_UNAVAILABLE_MESSAGE.to_string()));
            }
            Ok(self.containers.lock().unwrap().get(container_id).cloned())
        }

        async fn stop(&self, container_id: &str) -> DeployResult<()> {
            if self.record("stop", container_id) {
                return Err(DeployError::cleanup(format!("stop {} timed out", container_id)));
            }
            Ok(())
        }

        async fn remove(&self, container_id: &str) -> DeployResult<()> {
            if self.record("remove", container_id) {
                return Err(DeployError::cleanup(format!("rm {} failed", container_id)));
            }
            self.containers.lock().unwrap().remove(container_id);
            Ok(())
        }

        async fn remove_image(&self, image: &str) -> DeployResult<()> {
            if self.record("rmi", image) {
                return Err(DeployError::cleanup(format!("rmi {} failed", image)));
            }
            self.images.lock().unwrap().remove(image);
            Ok(())
        }
    }

    #[async_trait]
    impl PublicTunnel for FakeWorld {
        async fn open(&self, port: u16) -> DeployResult<TunnelHandle> {
            if self.record("open", &port.to_string()) {
                return Err(DeployError::Tunnel("control API unreachable".to_string()));
            }
            let id = format!("tun-{}", port);
            self.tunnels.lock().unwrap().insert(id.clone());
            Ok(TunnelHandle {
                id,
                public_url: "https://sample.ngrok.io".to_string(),
                local_port: port,
            })
        }

        async fn close(&self, handle: &TunnelHandle) -> DeployResult<bool> {
            if self.record("close", &handle.id) {
                return Err(DeployError::Tunnel("agent refused to die".to_string()));
            }
            Ok(self.tunnels.lock().unwrap().remove(&handle.id))
        }
    }

    pub(crate) fn orchestrator(world: &Arc<FakeWorld>, options: OrchestratorOptions) -> DeploymentOrchestrator {
        DeploymentOrchestrator::new(
            world.clone(),
            world.clone(),
            world.clone(),
            world.clone(),
            options,
        )
    }

    const REPO: &str = "https://example.com/org/sample.git";

    fn no_rollback() -> OrchestratorOptions {
        OrchestratorOptions {
            rollback_on_failure: false,
            ..Default::default()
        }
    }

    fn best_effort() -> OrchestratorOptions {
        OrchestratorOptions {
            teardown_policy: TeardownPolicy::BestEffort,
            ..Default::default()
        }
    }

    fn full_request(deployment: &Deployment) -> TeardownRequest {
        TeardownRequest {
            container_id: Some(deployment.container_id.clone()),
            repo_url: Some(deployment.repo_url.clone()),
            tunnel: Some(deployment.tunnel.clone()),
        }
    }

    #[tokio::test]
    async fn test_deploy_end_to_end() {
        let world = FakeWorld::new();
        let orchestrator = orchestrator(&world, OrchestratorOptions::default());

        let deployment = orchestrator.deploy(REPO).await.unwrap();

        assert_eq!(deployment.container_id, "ctr-sample");
        assert_eq!(deployment.public_url, "https://sample.ngrok.io");
        assert_eq!(deployment.repo_url, REPO);
        assert_eq!(deployment.slug.as_str(), "sample");
        assert_eq!(deployment.image.tag, "deploy-sample");
        assert_eq!(deployment.tunnel.local_port, 8080);
        assert_eq!(
            world.calls(),
            vec!["fetch:sample", "build:deploy-sample", "run:deploy-sample", "open:8080"]
        );
        assert!(deployment
            .stages
            .iter()
            .all(|s| s.status == StageStatus::Success));
    }

    #[tokio::test]
    async fn test_engine_unavailable_without_rollback_keeps_working_copy() {
        let world = FakeWorld::new();
        world.fail("build");
        let orchestrator = orchestrator(&world, no_rollback());

        let err = orchestrator.deploy(REPO).await.unwrap_err();

        assert!(matches!(err, DeployError::EngineUnavailable(ref m) if m == DAEMON_UNAVAILABLE_MESSAGE));
        assert_eq!(world.calls(), vec!["fetch:sample", "build:deploy-sample"]);
        assert!(world.working_copies.lock().unwrap().contains("sample"));
        assert!(world.containers.lock().unwrap().is_empty());
        assert!(world.tunnels.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tunnel_failure_rolls_back_in_reverse_order() {
        let world = FakeWorld::new();
        world.fail("open");
        let orchestrator = orchestrator(&world, OrchestratorOptions::default());

        let err = orchestrator.deploy(REPO).await.unwrap_err();

        assert!(matches!(err, DeployError::Tunnel(_)));
        assert_eq!(
            world.calls(),
            vec![
                "fetch:sample",
                "build:deploy-sample",
                "run:deploy-sample",
                "open:8080",
                "stop:ctr-sample",
                "remove:ctr-sample",
                "rmi:sha256:deploy-sample",
                "discard:sample",
            ]
        );
        assert!(world.working_copies.lock().unwrap().is_empty());
        assert!(world.images.lock().unwrap().is_empty());
        assert!(world.containers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_keeps_reused_working_copy() {
        let world = FakeWorld::new();
        world.with_working_copy("sample");
        world.fail("run");
        let orchestrator = orchestrator(&world, OrchestratorOptions::default());

        let err = orchestrator.deploy(REPO).await.unwrap_err();

        assert!(matches!(err, DeployError::Run { .. }));
        let calls = world.calls();
        assert_eq!(calls.last().map(String::as_str), Some("rmi:sha256:deploy-sample"));
        assert!(!calls.iter().any(|c| c.starts_with("discard")));
        assert!(world.working_copies.lock().unwrap().contains("sample"));
    }

    #[tokio::test]
    async fn test_failed_compensation_keeps_original_error() {
        let world = FakeWorld::new();
        world.fail("open");
        world.fail("stop");
        let orchestrator = orchestrator(&world, OrchestratorOptions::default());

        let err = orchestrator.deploy(REPO).await.unwrap_err();

        assert!(matches!(err, DeployError::Tunnel(_)));
        // 容器补偿失败后其余补偿继续执行
        let calls = world.calls();
        assert!(calls.contains(&"rmi:sha256:deploy-sample".to_string()));
        assert!(calls.contains(&"discard:sample".to_string()));
        assert!(!calls.contains(&"remove:ctr-sample".to_string()));
    }

    #[tokio::test]
    async fn test_invalid_repository_makes_no_calls() {
        let world = FakeWorld::new();
        let orchestrator = orchestrator(&world, OrchestratorOptions::default());

        for url in ["   ", "https://example.com/org/-bad", "https://example.com/org/.git"] {
            let err = orchestrator.deploy(url).await.unwrap_err();
            assert!(matches!(err, DeployError::InvalidRepository(_)), "{}", url);
        }
        assert!(world.calls().is_empty());
    }

    #[tokio::test]
    async fn test_teardown_requires_identifier_before_any_call() {
        let world = FakeWorld::new();
        let orchestrator = orchestrator(&world, OrchestratorOptions::default());

        let request = TeardownRequest {
            container_id: Some(" ".to_string()),
            repo_url: None,
            tunnel: Some(TunnelHandle {
                id: "tun-8080".to_string(),
                public_url: "https://sample.ngrok.io".to_string(),
                local_port: 8080,
            }),
        };
        let err = orchestrator.teardown(&request).await.unwrap_err();

        assert!(matches!(err, DeployError::MissingIdentifier));
        assert!(world.calls().is_empty());
    }

    #[tokio::test]
    async fn test_teardown_removes_everything() {
        let world = FakeWorld::new();
        let orchestrator = orchestrator(&world, OrchestratorOptions::default());
        let deployment = orchestrator.deploy(REPO).await.unwrap();
        world.calls.lock().unwrap().clear();

        let report = orchestrator.teardown(&full_request(&deployment)).await.unwrap();

        assert_eq!(
            report,
            TeardownReport {
                container_removed: true,
                image_removed: true,
                working_copy_removed: true,
                tunnel_closed: true,
            }
        );
        assert_eq!(
            world.calls(),
            vec![
                "image_of:ctr-sample",
                "stop:ctr-sample",
                "remove:ctr-sample",
                "rmi:sha256:deploy-sample",
                "discard:sample",
                "close:tun-8080",
            ]
        );
        assert!(world.containers.lock().unwrap().is_empty());
        assert!(world.images.lock().unwrap().is_empty());
        assert!(world.working_copies.lock().unwrap().is_empty());
        assert!(world.tunnels.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_teardown_fail_fast_stops_at_first_failure() {
        let world = FakeWorld::new();
        let orchestrator = orchestrator(&world, OrchestratorOptions::default());
        let deployment = orchestrator.deploy(REPO).await.unwrap();
        world.calls.lock().unwrap().clear();
        world.fail("stop");

        let err = orchestrator.teardown(&full_request(&deployment)).await.unwrap_err();

        assert!(matches!(err, DeployError::Cleanup(ref m) if m.len() == 1));
        assert_eq!(world.calls(), vec!["image_of:ctr-sample", "stop:ctr-sample"]);
        assert!(world.working_copies.lock().unwrap().contains("sample"));
    }

    #[tokio::test]
    async fn test_teardown_best_effort_attempts_every_step() {
        let world = FakeWorld::new();
        let orchestrator = orchestrator(&world, best_effort());
        let deployment = orchestrator.deploy(REPO).await.unwrap();
        world.calls.lock().unwrap().clear();
        world.fail("stop");
        world.fail("close");

        let err = orchestrator.teardown(&full_request(&deployment)).await.unwrap_err();

        match err {
            DeployError::Cleanup(messages) => {
                assert_eq!(messages.len(), 2);
                assert!(messages[0].contains("stop ctr-sample timed out"));
                assert!(messages[1].contains("agent refused to die"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(
            world.calls(),
            vec![
                "image_of:ctr-sample",
                "stop:ctr-sample",
                "remove:ctr-sample",
                "rmi:sha256:deploy-sample",
                "discard:sample",
                "close:tun-8080",
            ]
        );
        assert!(world.working_copies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_teardown_best_effort_single_failure_keeps_its_kind() {
        let world = FakeWorld::new();
        let orchestrator = orchestrator(&world, best_effort());
        world.fail("image_of");

        let request = TeardownRequest {
            container_id: Some("ctr-sample".to_string()),
            ..Default::default()
        };
        let err = orchestrator.teardown(&request).await.unwrap_err();

        assert!(matches!(err, DeployError::EngineUnavailable(_)));
    }

    #[tokio::test]
    async fn test_teardown_skips_missing_container() {
        let world = FakeWorld::new();
        world.with_working_copy("sample");
        let orchestrator = orchestrator(&world, OrchestratorOptions::default());

        let request = TeardownRequest {
            container_id: Some("ghost".to_string()),
            repo_url: Some(REPO.to_string()),
            tunnel: None,
        };
        let report = orchestrator.teardown(&request).await.unwrap();

        assert!(!report.container_removed);
        assert!(!report.image_removed);
        assert!(report.working_copy_removed);
        assert!(!report.tunnel_closed);
        assert_eq!(world.calls(), vec!["image_of:ghost", "discard:sample"]);
    }
}
