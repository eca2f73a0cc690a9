//! Docker engine access
//!
//! Image builds and container lifecycle are driven through the `docker` CLI,
//! the same way the rest of the agent talks to the engine.

use async_trait::async_trait;
use std::path::Path;
use std::process::Output;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

use crate::domain::container::{parse_port_output, ContainerHandle, ImageHandle, PortBinding};
use crate::domain::source::WorkingCopy;
use crate::infra::command::{stderr_trimmed, stdout_trimmed, CommandError, CommandRunner};
use crate::services::deploy::error::{DeployError, DeployResult};

/// Build descriptor expected at the root of every working copy
pub const BUILD_DESCRIPTOR: &str = "Dockerfile";

/// Message shown to API callers when the daemon is unreachable
pub const DAEMON_UNAVAILABLE_MESSAGE: &str =
    "Docker daemon error. Please ensure Docker is running and you have the necessary permissions.";

/// Builds a runnable image from a working copy.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    async fn build(&self, working_copy: &WorkingCopy, tag: &str) -> DeployResult<ImageHandle>;
}

/// Container lifecycle operations.
///
/// `stop`, `remove` and `remove_image` tolerate objects that are already gone.
#[async_trait]
pub trait ContainerRunner: Send + Sync {
    async fn run(&self, image: &ImageHandle) -> DeployResult<ContainerHandle>;

    /// Image id of a container, `None` when the container does not exist.
    async fn image_of(&self, container_id: &str) -> DeployResult<Option<String>>;

    async fn stop(&self, container_id: &str) -> DeployResult<()>;

    async fn remove(&self, container_id: &str) -> DeployResult<()>;

    /// Force-removes an image by id or tag.
    async fn remove_image(&self, image: &str) -> DeployResult<()>;
}

/// Timeouts for engine calls
#[derive(Clone, Debug)]
pub struct DockerTimeouts {
    pub build: Duration,
    pub engine: Duration,
}

impl Default for DockerTimeouts {
    fn default() -> Self {
        Self {
            build: Duration::from_secs(1800),
            engine: Duration::from_secs(120),
        }
    }
}

/// `docker` CLI backed implementation of [`ImageBuilder`] and [`ContainerRunner`]
pub struct DockerCli {
    docker_path: String,
    ports: PortBinding,
    timeouts: DockerTimeouts,
}

impl DockerCli {
    pub fn new(docker_path: impl Into<String>, ports: PortBinding, timeouts: DockerTimeouts) -> Self {
        Self {
            docker_path: docker_path.into(),
            ports,
            timeouts,
        }
    }

    async fn docker(&self, args: &[&str], timeout: Duration) -> DeployResult<Output> {
        CommandRunner::run(&self.docker_path, args, None, timeout)
            .await
            .map_err(|e| match e {
                CommandError::SpawnFailed(e) => DeployError::EngineUnavailable(format!(
                    "cannot run {}: {}",
                    self.docker_path, e
                )),
                CommandError::Timeout(d) => DeployError::EngineUnavailable(format!(
                    "docker {} did not finish within {}s",
                    args.first().copied().unwrap_or_default(),
                    d.as_secs()
                )),
            })
    }

    /// Runs a cleanup command, treating "already gone" answers as success.
    async fn cleanup(&self, args: &[&str], what: &str) -> DeployResult<()> {
        let output = self.docker(args, self.timeouts.engine).await?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = stderr_trimmed(&output);
        if is_already_gone(&stderr) {
            warn!(target_object = %what, stderr = %stderr, "Already gone, ignoring");
            return Ok(());
        }
        if is_daemon_unavailable(&stderr) {
            return Err(DeployError::EngineUnavailable(stderr));
        }
        Err(DeployError::cleanup(format!("{}: {}", what, stderr)))
    }
}

#[async_trait]
impl ImageBuilder for DockerCli {
    async fn build(&self, working_copy: &WorkingCopy, tag: &str) -> DeployResult<ImageHandle> {
        if !has_build_descriptor(&working_copy.path).await {
            return Err(DeployError::MissingBuildDescriptor(working_copy.path.clone()));
        }

        let context = working_copy.path.to_string_lossy().to_string();
        info!(tag = %tag, context = %context, "Building image");

        let output = self
            .docker(&["build", "--rm", "-q", "-t", tag, context.as_str()], self.timeouts.build)
            .await?;

        if !output.status.success() {
            let stderr = stderr_trimmed(&output);
            if is_daemon_unavailable(&stderr) {
                return Err(DeployError::EngineUnavailable(stderr));
            }
            return Err(DeployError::Build {
                tag: tag.to_string(),
                message: tail_lines(&stderr, 20),
            });
        }

        let stdout = stdout_trimmed(&output);
        let id = stdout
            .lines()
            .last()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(tag)
            .to_string();

        info!(tag = %tag, image_id = %id, "Image built");
        Ok(ImageHandle {
            id,
            tag: tag.to_string(),
        })
    }
}

#[async_trait]
impl ContainerRunner for DockerCli {
    async fn run(&self, image: &ImageHandle) -> DeployResult<ContainerHandle> {
        let publish = self.ports.publish_arg();
        let output = self
            .docker(&["run", "-d", "-p", publish.as_str(), image.tag.as_str()], self.timeouts.engine)
            .await?;

        if !output.status.success() {
            let stderr = stderr_trimmed(&output);
            if is_daemon_unavailable(&stderr) {
                return Err(DeployError::EngineUnavailable(stderr));
            }
            return Err(DeployError::Run {
                image: image.tag.clone(),
                message: stderr,
            });
        }

        let id = stdout_trimmed(&output);
        if id.is_empty() {
            return Err(DeployError::Run {
                image: image.tag.clone(),
                message: "engine returned no container id".to_string(),
            });
        }

        let host_port = if self.ports.host_port == 0 {
            let port_spec = format!("{}/tcp", self.ports.container_port);
            let port = self
                .docker(&["port", id.as_str(), port_spec.as_str()], self.timeouts.engine)
                .await
                .ok()
                .filter(|o| o.status.success())
                .and_then(|o| parse_port_output(&stdout_trimmed(&o)));

            match port {
                Some(port) => port,
                None => {
                    match self.docker(&["rm", "-f", id.as_str()], self.timeouts.engine).await {
                        Ok(output) if output.status.success() => {}
                        Ok(output) => warn!(
                            container_id = %id,
                            stderr = %stderr_trimmed(&output),
                            "Failed to remove container with unresolved port"
                        ),
                        Err(e) => warn!(
                            container_id = %id,
                            error = %e,
                            "Failed to remove container with unresolved port"
                        ),
                    }
                    return Err(DeployError::Run {
                        image: image.tag.clone(),
                        message: format!("cannot resolve host port for {}", port_spec),
                    });
                }
            }
        } else {
            self.ports.host_port
        };

        info!(container_id = %id, image = %image.tag, host_port, "Container started");
        Ok(ContainerHandle {
            id,
            image: image.clone(),
            host_port,
        })
    }

    async fn image_of(&self, container_id: &str) -> DeployResult<Option<String>> {
        let output = self
            .docker(
                &["inspect", "--type", "container", "--format", "{{.Image}}", container_id],
                self.timeouts.engine,
            )
            .await?;

        if output.status.success() {
            let image = stdout_trimmed(&output);
            return Ok((!image.is_empty()).then_some(image));
        }

        let stderr = stderr_trimmed(&output);
        if is_already_gone(&stderr) {
            return Ok(None);
        }
        if is_daemon_unavailable(&stderr) {
            return Err(DeployError::EngineUnavailable(stderr));
        }
        Err(DeployError::cleanup(format!(
            "inspect container {}: {}",
            container_id, stderr
        )))
    }

    async fn stop(&self, container_id: &str) -> DeployResult<()> {
        self.cleanup(&["stop", container_id], &format!("stop container {}", container_id))
            .await
    }

    async fn remove(&self, container_id: &str) -> DeployResult<()> {
        self.cleanup(&["rm", container_id], &format!("remove container {}", container_id))
            .await
    }

    async fn remove_image(&self, image: &str) -> DeployResult<()> {
        self.cleanup(&["rmi", "-f", image], &format!("remove image {}", image))
            .await
    }
}

/// Whether engine stderr says the daemon itself is unreachable
pub fn is_daemon_unavailable(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("cannot connect to the docker daemon")
        || lower.contains("is the docker daemon running")
        || lower.contains("permission denied while trying to connect")
        || lower.contains("error during connect")
}

/// Whether engine stderr says the target object no longer exists / is stopped
fn is_already_gone(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("no such container")
        || lower.contains("no such image")
        || lower.contains("no such object")
        || lower.contains("is not running")
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

/// Checks that the path has the build descriptor without touching the engine.
pub async fn has_build_descriptor(path: &Path) -> bool {
    fs::try_exists(path.join(BUILD_DESCRIPTOR)).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::source::Slug;
    use tempfile::TempDir;

    fn working_copy(path: &Path) -> WorkingCopy {
        WorkingCopy {
            slug: Slug::parse("sample").unwrap(),
            path: path.to_path_buf(),
            freshly_cloned: true,
        }
    }

    fn cli(docker_path: &str) -> DockerCli {
        DockerCli::new(docker_path, PortBinding::default(), DockerTimeouts::default())
    }

    #[cfg(unix)]
    fn fake_docker(dir: &Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-docker");
        std::fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script.to_string_lossy().to_string()
    }

    #[test]
    fn test_daemon_detection() {
        assert!(is_daemon_unavailable(
            "Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?"
        ));
        assert!(is_daemon_unavailable(
            "permission denied while trying to connect to the Docker daemon socket"
        ));
        assert!(!is_daemon_unavailable("failed to solve: process \"/bin/sh -c make\" did not complete"));
    }

    #[test]
    fn test_tail_lines() {
        assert_eq!(tail_lines("a\nb\nc", 2), "b\nc");
        assert_eq!(tail_lines("a", 5), "a");
        assert_eq!(tail_lines("", 5), "");
    }

    #[tokio::test]
    async fn test_missing_dockerfile_never_invokes_engine() {
        let dir = TempDir::new().unwrap();
        // 引擎被调用的话会得到 EngineUnavailable
        let docker = cli("nonexistent_docker_binary_12345");

        let err = docker
            .build(&working_copy(dir.path()), "deploy-sample")
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::MissingBuildDescriptor(p) if p == dir.path()));
        assert!(!has_build_descriptor(dir.path()).await);
    }

    #[tokio::test]
    async fn test_missing_engine_binary_is_engine_unavailable() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();
        let docker = cli("nonexistent_docker_binary_12345");

        let err = docker
            .build(&working_copy(dir.path()), "deploy-sample")
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::EngineUnavailable(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_build_reports_daemon_down() {
        let tools = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        std::fs::write(repo.path().join("Dockerfile"), "FROM scratch\n").unwrap();
        let docker = cli(&fake_docker(
            tools.path(),
            "echo 'Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?' >&2; exit 1",
        ));

        let err = docker
            .build(&working_copy(repo.path()), "deploy-sample")
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::EngineUnavailable(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_build_failure_and_success() {
        let tools = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        std::fs::write(repo.path().join("Dockerfile"), "FROM scratch\n").unwrap();

        let failing = cli(&fake_docker(tools.path(), "echo 'step 3/5 failed' >&2; exit 1"));
        let err = failing
            .build(&working_copy(repo.path()), "deploy-sample")
            .await
            .unwrap_err();
        match err {
            DeployError::Build { tag, message } => {
                assert_eq!(tag, "deploy-sample");
                assert_eq!(message, "step 3/5 failed");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let tools = TempDir::new().unwrap();
        let ok = cli(&fake_docker(tools.path(), "echo sha256:abc123"));
        let image = ok
            .build(&working_copy(repo.path()), "deploy-sample")
            .await
            .unwrap();
        assert_eq!(image.id, "sha256:abc123");
        assert_eq!(image.tag, "deploy-sample");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_returns_container_on_fixed_port() {
        let tools = TempDir::new().unwrap();
        let docker = cli(&fake_docker(tools.path(), "echo 4f1c2d3e4f5a"));
        let image = ImageHandle {
            id: "sha256:abc".to_string(),
            tag: "deploy-sample".to_string(),
        };

        let container = docker.run(&image).await.unwrap();
        assert_eq!(container.id, "4f1c2d3e4f5a");
        assert_eq!(container.host_port, 8080);
        assert_eq!(container.image, image);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_rejected_is_run_error() {
        let tools = TempDir::new().unwrap();
        let docker = cli(&fake_docker(
            tools.path(),
            "echo 'Bind for 0.0.0.0:8080 failed: port is already allocated.' >&2; exit 125",
        ));
        let image = ImageHandle {
            id: "sha256:abc".to_string(),
            tag: "deploy-sample".to_string(),
        };

        let err = docker.run(&image).await.unwrap_err();
        assert!(matches!(err, DeployError::Run { message, .. } if message.contains("already allocated")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_resolves_ephemeral_host_port() {
        let tools = TempDir::new().unwrap();
        let log = tools.path().join("calls.log");
        let body = format!(
            "echo \"$*\" >> {log}\ncase \"$1\" in\n  run) echo 4f1c2d3e4f5a ;;\n  port) echo 0.0.0.0:49153; echo '[::]:49153' ;;\n  *) exit 1 ;;\nesac",
            log = log.display()
        );
        let docker = DockerCli::new(
            fake_docker(tools.path(), &body),
            PortBinding {
                container_port: 8080,
                host_port: 0,
            },
            DockerTimeouts::default(),
        );
        let image = ImageHandle {
            id: "sha256:abc".to_string(),
            tag: "deploy-sample".to_string(),
        };

        let container = docker.run(&image).await.unwrap();
        assert_eq!(container.id, "4f1c2d3e4f5a");
        assert_eq!(container.host_port, 49153);

        let calls = std::fs::read_to_string(&log).unwrap();
        let calls: Vec<&str> = calls.lines().collect();
        assert_eq!(
            calls,
            vec!["run -d -p 8080 deploy-sample", "port 4f1c2d3e4f5a 8080/tcp"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unresolved_host_port_removes_container() {
        let tools = TempDir::new().unwrap();
        let log = tools.path().join("calls.log");
        let body = format!(
            "echo \"$*\" >> {log}\ncase \"$1\" in\n  run) echo 4f1c2d3e4f5a ;;\n  port) echo 'Error: No public port 8080/tcp published' >&2; exit 1 ;;\n  rm) echo 4f1c2d3e4f5a ;;\n  *) exit 1 ;;\nesac",
            log = log.display()
        );
        let docker = DockerCli::new(
            fake_docker(tools.path(), &body),
            PortBinding {
                container_port: 8080,
                host_port: 0,
            },
            DockerTimeouts::default(),
        );
        let image = ImageHandle {
            id: "sha256:abc".to_string(),
            tag: "deploy-sample".to_string(),
        };

        let err = docker.run(&image).await.unwrap_err();
        match err {
            DeployError::Run { image, message } => {
                assert_eq!(image, "deploy-sample");
                assert!(message.contains("8080/tcp"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(calls.lines().last(), Some("rm -f 4f1c2d3e4f5a"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cleanup_tolerates_missing_objects() {
        let tools = TempDir::new().unwrap();
        let docker = cli(&fake_docker(
            tools.path(),
            "echo 'Error response from daemon: No such container: abc' >&2; exit 1",
        ));

        docker.stop("abc").await.unwrap();
        docker.remove("abc").await.unwrap();
        assert_eq!(docker.image_of("abc").await.unwrap(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cleanup_surfaces_real_failures() {
        let tools = TempDir::new().unwrap();
        let docker = cli(&fake_docker(
            tools.path(),
            "echo 'Error response from daemon: conflict: unable to delete image' >&2; exit 1",
        ));

        let err = docker.remove_image("sha256:abc").await.unwrap_err();
        assert!(matches!(err, DeployError::Cleanup(_)));
    }
}
