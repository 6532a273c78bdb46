// testkit/src/driver.rs
//
// Lifecycle of one ephemeral backend instance for the conformance suites:
// Created -> Starting -> Ready -> Stopping -> Stopped, or
// Created -> Starting -> Failed -> Stopped when startup fails.
//

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

use storekit::config::{StoreProperties, PROP_HOSTS, PROP_PORT};
use storekit::{BackendKind, DataStoreFactory, Persistent, StoreError, StoreHandle, StoreKey, TableMapping};

use crate::container::{ContainerProvider, DockerScylla};
use crate::ports;

pub const DEFAULT_BASE_DIRECTORY: &str = "target/test";
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    Created,
    Starting,
    Ready,
    Stopping,
    Failed,
    Stopped,
}

/// Test driver for suites that need a running ScyllaDB.
///
/// `start` and `stop` take `&mut self`; drive one harness from one place
/// (suite setup and teardown).
pub struct ScyllaTestDriver<P: ContainerProvider = DockerScylla> {
    provider: P,
    backend: BackendKind,
    port: u16,
    base_directory: PathBuf,
    properties: StoreProperties,
    startup_timeout: Duration,
    state: HarnessState,
    transitions: Vec<HarnessState>,
    port_claimed: bool,
}

impl ScyllaTestDriver<DockerScylla> {
    /// Harness around a docker-managed ScyllaDB on a free local port.
    pub fn new() -> Result<Self, StoreError> {
        Self::with_provider(DockerScylla::default())
    }
}

impl<P: ContainerProvider> ScyllaTestDriver<P> {
    pub fn with_provider(provider: P) -> Result<Self, StoreError> {
        Ok(Self {
            provider,
            backend: BackendKind::Scylla,
            port: ports::free_local_port()?,
            base_directory: PathBuf::from(DEFAULT_BASE_DIRECTORY),
            properties: StoreProperties::new(),
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            state: HarnessState::Created,
            transitions: vec![HarnessState::Created],
            port_claimed: false,
        })
    }

    /// Use a fixed host port instead of an ephemeral one.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_base_directory(mut self, base_directory: impl Into<PathBuf>) -> Self {
        self.base_directory = base_directory.into();
        self
    }

    pub fn with_startup_timeout(mut self, startup_timeout: Duration) -> Self {
        self.startup_timeout = startup_timeout;
        self
    }

    /// Extra connection parameters passed to every store created through
    /// this harness. Host and port are always the harness's own.
    pub fn set_parameters(&mut self, properties: StoreProperties) {
        self.properties = properties;
    }

    pub fn state(&self) -> HarnessState {
        self.state
    }

    /// Every state entered so far, in order.
    pub fn transitions(&self) -> &[HarnessState] {
        &self.transitions
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> &str {
        self.provider.host()
    }

    /// Directory for on-disk artifacts of the backend; fixed for the
    /// lifetime of the harness.
    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    /// Connection parameters handed to the store factory.
    pub fn connection_properties(&self) -> StoreProperties {
        let mut properties = self.properties.clone();
        properties.insert(PROP_HOSTS.to_string(), self.provider.host().to_string());
        properties.insert(PROP_PORT.to_string(), self.port.to_string());
        properties
    }

    /// Start the backend and wait until it accepts connections.
    ///
    /// Fails with [`StoreError::IllegalState`], leaving the harness
    /// `Created`, when another running harness holds the port. Any other
    /// failure tears the instance down, leaves the harness `Stopped` and is
    /// returned as [`StoreError::StartupFailure`].
    pub async fn start(&mut self) -> Result<(), StoreError> {
        if self.state != HarnessState::Created {
            return Err(StoreError::IllegalState(format!(
                "start called on a harness that is {:?}",
                self.state
            )));
        }

        if !ports::claim(self.port) {
            return Err(StoreError::IllegalState(format!(
                "port {} is held by another running harness",
                self.port
            )));
        }
        self.port_claimed = true;

        self.transition(HarnessState::Starting);
        info!("Starting embedded Scylla server on port {}...", self.port);

        match self.provision().await {
            Ok(()) => {
                self.transition(HarnessState::Ready);
                info!("Embedded Scylla server ready at {}:{}", self.provider.host(), self.port);
                Ok(())
            }
            Err(err) => {
                error!("Embedded Scylla server start failed: {}", err);
                self.transition(HarnessState::Failed);
                if let Err(stop_err) = self.teardown().await {
                    warn!("Cleanup after failed start also failed: {}", stop_err);
                }
                Err(match err {
                    StoreError::StartupFailure(cause) => StoreError::StartupFailure(cause),
                    other => StoreError::StartupFailure(other.to_string()),
                })
            }
        }
    }

    async fn provision(&mut self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.base_directory).await.map_err(|e| {
            StoreError::StartupFailure(format!(
                "cannot create base directory {}: {}",
                self.base_directory.display(),
                e
            ))
        })?;

        self.provider.expose_port(self.port);
        match tokio::time::timeout(self.startup_timeout, self.provider.start()).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::TimeoutError(self.startup_timeout)),
        }
    }

    /// Create a store against the running backend.
    pub async fn create_data_store<K: StoreKey, T: Persistent>(
        &self,
        mapping: TableMapping,
    ) -> Result<StoreHandle<K, T>, StoreError> {
        if self.state != HarnessState::Ready {
            return Err(StoreError::IllegalState(format!(
                "cannot create a data store while the harness is {:?}",
                self.state
            )));
        }
        DataStoreFactory::create_data_store(self.backend, &self.connection_properties(), mapping).await
    }

    /// Stop the backend. Idempotent; a harness that never started just
    /// moves to `Stopped`.
    pub async fn stop(&mut self) -> Result<(), StoreError> {
        match self.state {
            HarnessState::Stopped => Ok(()),
            HarnessState::Created => {
                self.transition(HarnessState::Stopped);
                Ok(())
            }
            _ => {
                self.transition(HarnessState::Stopping);
                self.teardown().await
            }
        }
    }

    async fn teardown(&mut self) -> Result<(), StoreError> {
        info!("Shutting down embedded Scylla server...");
        let result = self.provider.stop().await;
        if let Err(err) = &result {
            error!("Failed to stop embedded Scylla server: {}", err);
        }
        if self.port_claimed {
            ports::release(self.port);
            self.port_claimed = false;
        }
        self.transition(HarnessState::Stopped);
        result
    }

    fn transition(&mut self, next: HarnessState) {
        self.state = next;
        self.transitions.push(next);
    }
}

impl<P: ContainerProvider> Drop for ScyllaTestDriver<P> {
    fn drop(&mut self) {
        if self.port_claimed {
            warn!("Harness on port {} dropped without stop()", self.port);
            ports::release(self.port);
        }
    }
}
