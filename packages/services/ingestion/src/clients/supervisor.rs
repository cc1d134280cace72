use async_trait::async_trait;
use reqwest::{Client, Method};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::{running_in_container, Config, ReloadMode};
use crate::models::*;
use crate::storage::DatasetStore;

const MANUAL_RESTART_NOTICE: &str = "Running without a process supervisor - please restart the app manually to load the new data";
/// Used when DOCKER_HOST is unset and the socket is mounted
pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Makes the serving process pick up a freshly committed dataset.
/// Implementations never fail the ingestion; problems are reported in the status.
#[async_trait]
pub trait ReloadCoordinator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn reload(&self) -> ReloadStatus;
}

pub struct ManualReload;

#[async_trait]
impl ReloadCoordinator for ManualReload {
    fn name(&self) -> &'static str { "manual" }

    async fn reload(&self) -> ReloadStatus {
        ReloadStatus::not_attempted(self.name(), MANUAL_RESTART_NOTICE)
    }
}

/// Drops the in-memory copy and reads the committed file again.
pub struct CacheReload {
    store: DatasetStore,
}

impl CacheReload {
    pub fn new(store: DatasetStore) -> Self { Self { store } }
}

#[async_trait]
impl ReloadCoordinator for CacheReload {
    fn name(&self) -> &'static str { "in-process" }

    async fn reload(&self) -> ReloadStatus {
        self.store.invalidate();
        match self.store.load() {
            Ok(table) => ReloadStatus::requested(
                self.name(),
                format!("Dataset reloaded in place ({} rows)", table.row_count()),
            ),
            Err(e) => {
                tracing::error!(error = %e, "In-process dataset reload failed");
                ReloadStatus::failed(self.name(), format!("Reload failed: {}; restart the app manually", e))
            }
        }
    }
}

/// Where the Docker Engine API listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerEndpoint {
    Http(Url),
    Unix(PathBuf),
}

/// Minimal Docker Engine API client: only the status code of each call matters.
#[derive(Clone)]
struct DockerApi {
    client: Client,
    endpoint: DockerEndpoint,
    user_agent: String,
    timeout: Duration,
}

impl DockerApi {
    async fn send(&self, method: Method, path: &str) -> Result<u16> {
        match &self.endpoint {
            DockerEndpoint::Http(base) => {
                let url = base
                    .join(path)
                    .map_err(|e| IngestionError::Supervisor(format!("invalid supervisor URL: {}", e)))?;
                let response = self.client.request(method, url).send().await?;
                Ok(response.status().as_u16())
            }
            DockerEndpoint::Unix(socket) => {
                let call = unix_request(socket, method.as_str(), path, &self.user_agent);
                tokio::time::timeout(self.timeout, call).await.map_err(|_| {
                    IngestionError::Supervisor(format!("no answer from {} within {:?}", socket.display(), self.timeout))
                })?
            }
        }
    }
}

/// Asks the Docker Engine API to restart the container this process runs in.
pub struct ContainerSupervisor {
    api: Option<DockerApi>,
    container: Option<String>,
    grace: Duration,
}

impl ContainerSupervisor {
    pub fn from_config(cfg: &Config) -> Self {
        let client = Client::builder()
            .user_agent(cfg.http_user_agent.as_str())
            .timeout(Duration::from_millis(cfg.http_timeout_ms))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to build supervisor HTTP client; using defaults");
                Client::new()
            });
        let endpoint = match cfg.docker_host.as_deref() {
            Some(host) => match parse_docker_host(host) {
                Ok(endpoint) => Some(endpoint),
                Err(e) => {
                    tracing::warn!(docker_host = host, error = %e, "Unusable DOCKER_HOST; container restarts disabled");
                    None
                }
            },
            None => Path::new(DEFAULT_DOCKER_SOCKET)
                .exists()
                .then(|| DockerEndpoint::Unix(PathBuf::from(DEFAULT_DOCKER_SOCKET))),
        };
        let api = endpoint.map(|endpoint| DockerApi {
            client,
            endpoint,
            user_agent: cfg.http_user_agent.clone(),
            timeout: Duration::from_millis(cfg.http_timeout_ms),
        });
        let container = cfg.container_name.clone().or_else(detect_hostname);
        Self {
            api,
            container,
            grace: Duration::from_millis(cfg.reload_grace_ms),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api.is_some() && self.container.is_some()
    }

    async fn check_reachable(&self, api: &DockerApi, container: &str) -> Result<()> {
        let status = api.send(Method::GET, &format!("containers/{}/json", container)).await?;
        if !(200..300).contains(&status) {
            return Err(IngestionError::Supervisor(format!(
                "supervisor answered {} for container {}",
                status, container
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ReloadCoordinator for ContainerSupervisor {
    fn name(&self) -> &'static str { "container" }

    async fn reload(&self) -> ReloadStatus {
        let (Some(api), Some(container)) = (&self.api, &self.container) else {
            return ReloadStatus::not_attempted(self.name(), MANUAL_RESTART_NOTICE);
        };

        if let Err(e) = self.check_reachable(api, container).await {
            tracing::warn!(container = %container, error = %e, "Container supervisor unreachable; manual restart required");
            return ReloadStatus::not_attempted(
                self.name(),
                format!("Container restart not possible ({}); please restart the app manually", e),
            );
        }

        // Restarting stops this process, so the request goes out after the response has had time to leave
        let api = api.clone();
        let grace = self.grace;
        let container_name = container.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            tracing::info!(container = %container_name, "Requesting container restart");
            match api.send(Method::POST, &format!("containers/{}/restart", container_name)).await {
                Ok(status) if (200..300).contains(&status) => {
                    tracing::info!(container = %container_name, "Container restart accepted");
                }
                Ok(status) => {
                    tracing::error!(container = %container_name, status = status, "Container restart rejected");
                }
                Err(e) => {
                    tracing::error!(container = %container_name, error = %e, "Container restart request failed");
                }
            }
        });

        ReloadStatus::requested(
            self.name(),
            "Container restart initiated... The page will reload automatically in a few seconds.",
        )
    }
}

/// Uses the container supervisor only while the environment check says one is there.
/// The check runs on every reload.
pub struct AutoReload {
    marker: PathBuf,
    supervisor: ContainerSupervisor,
    fallback: ManualReload,
}

impl AutoReload {
    pub fn new(marker: impl Into<PathBuf>, supervisor: ContainerSupervisor) -> Self {
        Self { marker: marker.into(), supervisor, fallback: ManualReload }
    }

    fn supervisor_available(&self) -> bool {
        running_in_container(&self.marker) && self.supervisor.is_configured()
    }
}

#[async_trait]
impl ReloadCoordinator for AutoReload {
    fn name(&self) -> &'static str { "auto" }

    async fn reload(&self) -> ReloadStatus {
        if self.supervisor_available() {
            self.supervisor.reload().await
        } else {
            tracing::info!("No container supervisor detected; skipping automatic restart");
            self.fallback.reload().await
        }
    }
}

pub fn coordinator_from_config(cfg: &Config, store: &DatasetStore) -> Arc<dyn ReloadCoordinator> {
    match cfg.reload_mode {
        ReloadMode::Auto => Arc::new(AutoReload::new(
            cfg.container_marker.clone(),
            ContainerSupervisor::from_config(cfg),
        )),
        ReloadMode::Container => Arc::new(ContainerSupervisor::from_config(cfg)),
        ReloadMode::InProcess => Arc::new(CacheReload::new(store.clone())),
        ReloadMode::Manual => Arc::new(ManualReload),
    }
}

/// Accepts `unix:///path/to/docker.sock`, `tcp://host:port` and http(s) URLs.
pub fn parse_docker_host(host: &str) -> Result<DockerEndpoint> {
    if let Some(path) = host.strip_prefix("unix://") {
        if path.is_empty() {
            return Err(IngestionError::Configuration(format!("invalid DOCKER_HOST {}: empty socket path", host)));
        }
        return Ok(DockerEndpoint::Unix(PathBuf::from(path)));
    }
    let normalized = if let Some(rest) = host.strip_prefix("tcp://") {
        format!("http://{}", rest)
    } else {
        host.to_string()
    };
    let mut url = Url::parse(&normalized)
        .map_err(|e| IngestionError::Configuration(format!("invalid DOCKER_HOST {}: {}", host, e)))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(IngestionError::Configuration(format!(
                "unsupported DOCKER_HOST scheme {}",
                other
            )))
        }
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(DockerEndpoint::Http(url))
}

/// One HTTP/1.1 request over the Docker socket. Returns the response status code.
#[cfg(unix)]
async fn unix_request(socket: &Path, method: &str, path: &str, user_agent: &str) -> Result<u16> {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let mut stream = tokio::net::UnixStream::connect(socket).await?;
    let request = format!(
        "{} /{} HTTP/1.1\r\nHost: docker\r\nUser-Agent: {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        method, path, user_agent
    );
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    let mut status_line = String::new();
    BufReader::new(stream).read_line(&mut status_line).await?;
    parse_status_line(&status_line)
}

#[cfg(not(unix))]
async fn unix_request(socket: &Path, _method: &str, _path: &str, _user_agent: &str) -> Result<u16> {
    Err(IngestionError::Supervisor(format!(
        "unix sockets are not available on this platform ({})",
        socket.display()
    )))
}

fn parse_status_line(line: &str) -> Result<u16> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next().and_then(|code| code.parse::<u16>().ok())) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") => Ok(code),
        _ => Err(IngestionError::Supervisor(format!(
            "malformed response from Docker socket: {:?}",
            line.trim()
        ))),
    }
}

fn detect_hostname() -> Option<String> {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}
