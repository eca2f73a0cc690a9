//! ngrok agent process manager
//!
//! Each tunnel is its own `ngrok http <port>` process with a private control
//! address, so several agents can run side by side. After a settling delay
//! that agent's control API is polled until an https tunnel for the port
//! shows up.

use std::collections::HashMap;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::{
    fs,
    io::{AsyncBufReadExt, BufReader},
    process::{Child, Command},
    sync::Mutex,
    time::sleep,
};
use tracing::{debug, info, warn};

use super::PublicTunnel;
use crate::config::env::TunnelConfig;
use crate::domain::tunnel::{TunnelHandle, TunnelList};
use crate::services::deploy::error::{DeployError, DeployResult};

/// A running agent and the resources that belong to it
struct Agent {
    child: Child,
    api_url: String,
    config_file: Option<PathBuf>,
}

pub struct NgrokTunnel {
    config: TunnelConfig,
    client: Client,
    /// tunnel id -> agent
    agents: Mutex<HashMap<String, Agent>>,
}

impl NgrokTunnel {
    pub fn new(config: TunnelConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();

        Self {
            config,
            client,
            agents: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live agent processes
    pub async fn active_count(&self) -> usize {
        self.agents.lock().await.len()
    }

    fn spawn_agent(&self, tunnel_id: &str, args: &[String]) -> DeployResult<Child> {
        info!(
            tunnel_id = %tunnel_id,
            agent = %self.config.agent_path,
            args = ?args,
            "Starting tunnel agent"
        );

        let mut child = Command::new(&self.config.agent_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DeployError::Tunnel(format!(
                    "failed to start {}: {}",
                    self.config.agent_path, e
                ))
            })?;

        if let Some(stdout) = child.stdout.take() {
            let id = tunnel_id.to_string();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    debug!(tunnel_id = %id, "[agent stdout] {}", line);
                }
            });
        }

        if let Some(stderr) = child.stderr.take() {
            let id = tunnel_id.to_string();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    debug!(tunnel_id = %id, "[agent stderr] {}", line);
                }
            });
        }

        Ok(child)
    }

    /// Starts an agent with its own control address and config file.
    async fn launch(&self, tunnel_id: &str, port: u16) -> DeployResult<Agent> {
        let web_addr = reserve_web_addr()?;

        let config_file = if self.config.uses_agent_config() {
            Some(write_agent_config(tunnel_id, &web_addr).await?)
        } else {
            None
        };
        let config_arg = config_file
            .as_deref()
            .map(|path| self.config.config_arg(path))
            .unwrap_or_default();

        let args = self.config.agent_args_for(port, &web_addr, &config_arg);
        match self.spawn_agent(tunnel_id, &args) {
            Ok(child) => Ok(Agent {
                child,
                api_url: self.config.api_url_for(&web_addr),
                config_file,
            }),
            Err(e) => {
                remove_agent_config(tunnel_id, config_file.as_deref()).await;
                Err(e)
            }
        }
    }

    async fn query_url(&self, api_url: &str, port: u16) -> Result<Option<String>, String> {
        let list = self
            .client
            .get(api_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| format!("control API {} unreachable: {}", api_url, e))?
            .json::<TunnelList>()
            .await
            .map_err(|e| format!("invalid control API response: {}", e))?;

        Ok(list.select_https(port).map(str::to_string))
    }

    /// Settling delay, then bounded polling of the agent's control API.
    async fn wait_for_url(&self, agent: &mut Agent, port: u16) -> DeployResult<String> {
        sleep(self.config.settle_delay).await;

        let attempts = self.config.poll_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if let Ok(Some(status)) = agent.child.try_wait() {
                return Err(DeployError::Tunnel(format!(
                    "tunnel agent exited early: {}",
                    status
                )));
            }

            match self.query_url(&agent.api_url, port).await {
                Ok(Some(url)) => return Ok(url),
                Ok(None) => {
                    last_error = format!("no https tunnel for port {} reported by the agent", port);
                }
                Err(e) => last_error = e,
            }

            debug!(attempt, attempts, error = %last_error, "Tunnel not ready");
            if attempt < attempts {
                sleep(self.config.poll_interval).await;
            }
        }

        Err(DeployError::Tunnel(last_error))
    }
}

/// Kills the agent and removes its config file.
async fn stop_agent(tunnel_id: &str, mut agent: Agent) {
    // 进程可能已自行退出，kill 失败不影响结果
    if let Err(e) = agent.child.kill().await {
        warn!(tunnel_id = %tunnel_id, error = %e, "Failed to kill tunnel agent");
    }
    remove_agent_config(tunnel_id, agent.config_file.as_deref()).await;
}

/// Picks a free loopback port for an agent's control API.
fn reserve_web_addr() -> DeployResult<String> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .map_err(|e| DeployError::Tunnel(format!("no free control port: {}", e)))?;
    let addr = listener
        .local_addr()
        .map_err(|e| DeployError::Tunnel(format!("no free control port: {}", e)))?;
    Ok(addr.to_string())
}

async fn write_agent_config(tunnel_id: &str, web_addr: &str) -> DeployResult<PathBuf> {
    let path = std::env::temp_dir().join(format!("docklaunch-ngrok-{}.yml", tunnel_id));
    let content = format!("version: \"2\"\nweb_addr: {}\n", web_addr);
    fs::write(&path, content).await.map_err(|e| {
        DeployError::Tunnel(format!("cannot write agent config {}: {}", path.display(), e))
    })?;
    Ok(path)
}

async fn remove_agent_config(tunnel_id: &str, path: Option<&Path>) {
    let Some(path) = path else {
        return;
    };
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(tunnel_id = %tunnel_id, path = %path.display(), error = %e, "Failed to remove agent config");
        }
    }
}

#[async_trait]
impl PublicTunnel for NgrokTunnel {
    async fn open(&self, port: u16) -> DeployResult<TunnelHandle> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut agent = self.launch(&id, port).await?;

        let public_url = match self.wait_for_url(&mut agent, port).await {
            Ok(url) => url,
            Err(e) => {
                stop_agent(&id, agent).await;
                return Err(e);
            }
        };

        debug!(tunnel_id = %id, api_url = %agent.api_url, "Agent control API ready");
        self.agents.lock().await.insert(id.clone(), agent);
        info!(tunnel_id = %id, url = %public_url, port, "Tunnel opened");

        Ok(TunnelHandle {
            id,
            public_url,
            local_port: port,
        })
    }

    async fn close(&self, handle: &TunnelHandle) -> DeployResult<bool> {
        let Some(agent) = self.agents.lock().await.remove(&handle.id) else {
            debug!(tunnel_id = %handle.id, "Tunnel already closed");
            return Ok(false);
        };

        stop_agent(&handle.id, agent).await;
        info!(tunnel_id = %handle.id, url = %handle.public_url, "Tunnel closed");
        Ok(true)
    }

    async fn close_all(&self) -> usize {
        let agents: Vec<(String, Agent)> = self.agents.lock().await.drain().collect();
        let count = agents.len();
        for (id, agent) in agents {
            stop_agent(&id, agent).await;
        }
        count
    }
}
