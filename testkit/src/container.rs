// testkit/src/container.rs
//
// Container lifecycle providers for the test harness.
// DockerScylla drives the docker CLI and waits until the node answers CQL.
//

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use storekit::config::DatabaseConfig;
use storekit::database::{RetryPolicy, ScyllaConnection};
use storekit::StoreError;

pub const DOCKER_IMAGE: &str = "scylladb/scylla:4.0.7";
pub const CQL_PORT: u16 = 9042;
pub const CONTAINER_PREFIX: &str = "scylla-testkit";

/// Starts and stops one backend instance. The harness only observes whether
/// `start` succeeded.
#[async_trait]
pub trait ContainerProvider: Send {
    /// Publish the backend's CQL port on `host_port`. Called before `start`.
    fn expose_port(&mut self, host_port: u16);

    /// Host the published port is reachable on.
    fn host(&self) -> &str;

    /// Block until the instance accepts connections.
    async fn start(&mut self) -> Result<(), StoreError>;

    /// Stop the instance. Must be safe to call when `start` never ran or
    /// failed half-way.
    async fn stop(&mut self) -> Result<(), StoreError>;
}

/// ScyllaDB in a local docker container.
pub struct DockerScylla {
    image: String,
    host: String,
    host_port: Option<u16>,
    container_name: Option<String>,
    readiness: RetryPolicy,
}

impl Default for DockerScylla {
    fn default() -> Self {
        Self {
            image: DOCKER_IMAGE.to_string(),
            host: "127.0.0.1".to_string(),
            host_port: None,
            container_name: None,
            // Scylla typically needs 20-60s to answer CQL after boot.
            readiness: RetryPolicy::new(30, Duration::from_millis(500), Duration::from_secs(5)),
        }
    }
}

impl DockerScylla {
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_readiness(mut self, readiness: RetryPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    /// Name of the container this provider may have started. Recorded before
    /// `docker run` is spawned, so a start abandoned mid-flight can still be
    /// removed by `stop`.
    pub fn container_name(&self) -> Option<&str> {
        self.container_name.as_deref()
    }

    fn name_for(host_port: u16) -> String {
        format!("{}-{}", CONTAINER_PREFIX, host_port)
    }

    fn run_args(&self, name: &str, host_port: u16) -> Vec<String> {
        vec![
            "run".to_string(),
            "-d".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            name.to_string(),
            "-p".to_string(),
            format!("{}:{}:{}", self.host, host_port, CQL_PORT),
            self.image.clone(),
            "--smp".to_string(),
            "1".to_string(),
            "--memory".to_string(),
            "750M".to_string(),
            "--overprovisioned".to_string(),
            "1".to_string(),
            "--developer-mode".to_string(),
            "1".to_string(),
        ]
    }

    async fn wait_until_ready(&self, host_port: u16) -> Result<(), StoreError> {
        let config = DatabaseConfig {
            hosts: vec![self.host.clone()],
            port: host_port,
            keyspace: "system".to_string(),
            pool_size: 1,
            ..DatabaseConfig::default()
        };

        let config = &config;
        self.readiness
            .execute(move || async move {
                let connection = ScyllaConnection::new(config).await?;
                connection.health_check().await
            })
            .await
    }
}

#[async_trait]
impl ContainerProvider for DockerScylla {
    fn expose_port(&mut self, host_port: u16) {
        self.host_port = Some(host_port);
    }

    fn host(&self) -> &str {
        &self.host
    }

    async fn start(&mut self) -> Result<(), StoreError> {
        let host_port = self
            .host_port
            .ok_or_else(|| StoreError::StartupFailure("no host port exposed".to_string()))?;

        let name = Self::name_for(host_port);
        self.container_name = Some(name.clone());

        info!("Starting {} as {} on {}:{}", self.image, name, self.host, host_port);
        let output = Command::new("docker")
            .args(self.run_args(&name, host_port))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| StoreError::StartupFailure(format!("failed to spawn docker: {}", e)))?;

        if !output.status.success() {
            return Err(StoreError::StartupFailure(format!(
                "docker run exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("Container {} ({}) started, waiting for CQL", name, container_id);

        self.wait_until_ready(host_port).await?;
        info!("ScyllaDB is accepting connections on {}:{}", self.host, host_port);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), StoreError> {
        let name = match self.container_name.take() {
            Some(name) => name,
            None => return Ok(()),
        };

        let output = Command::new("docker")
            .args(remove_args(&name))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| StoreError::Unknown(format!("failed to spawn docker: {}", e)))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() && !stderr.contains("No such container") {
            return Err(StoreError::Unknown(format!(
                "docker rm {} failed: {}",
                name,
                stderr.trim()
            )));
        }
        info!("Removed container {}", name);
        Ok(())
    }
}

impl Drop for DockerScylla {
    fn drop(&mut self) {
        if let Some(name) = self.container_name.take() {
            warn!("Container {} still running on drop, removing it", name);
            let _ = std::process::Command::new("docker")
                .args(remove_args(&name))
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
        }
    }
}

fn remove_args(name: &str) -> [&str; 3] {
    ["rm", "-f", name]
}
