use async_trait::async_trait;
use parking_lot::Mutex;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use storekit::StoreError;

use crate::container::ContainerProvider;

/// What a scripted `start` does.
#[derive(Debug, Clone)]
pub enum StartBehavior {
    /// Bind the exposed port and report success.
    Succeed,
    /// Report the given failure without binding anything.
    Fail(String),
    /// Sleep before succeeding; used to exercise startup timeouts.
    Hang(Duration),
}

/// Calls observed by a [`ScriptedContainer`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ContainerCalls {
    pub exposed_port: Option<u16>,
    pub starts: usize,
    pub stops: usize,
}

/// Provider with a scripted outcome, for exercising harness lifecycles
/// without docker. A successful start holds the exposed port open until
/// `stop`, standing in for the container's published port.
pub struct ScriptedContainer {
    behavior: StartBehavior,
    host_port: Option<u16>,
    listener: Option<TcpListener>,
    calls: Arc<Mutex<ContainerCalls>>,
}

impl ScriptedContainer {
    pub fn new(behavior: StartBehavior) -> Self {
        Self {
            behavior,
            host_port: None,
            listener: None,
            calls: Arc::new(Mutex::new(ContainerCalls::default())),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(StartBehavior::Succeed)
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self::new(StartBehavior::Fail(reason.into()))
    }

    /// Shared view of the calls, still readable after the provider moved
    /// into a harness.
    pub fn calls(&self) -> Arc<Mutex<ContainerCalls>> {
        self.calls.clone()
    }
}

#[async_trait]
impl ContainerProvider for ScriptedContainer {
    fn expose_port(&mut self, host_port: u16) {
        self.host_port = Some(host_port);
        self.calls.lock().exposed_port = Some(host_port);
    }

    fn host(&self) -> &str {
        "127.0.0.1"
    }

    async fn start(&mut self) -> Result<(), StoreError> {
        self.calls.lock().starts += 1;
        match self.behavior.clone() {
            StartBehavior::Fail(reason) => return Err(StoreError::StartupFailure(reason)),
            StartBehavior::Hang(delay) => tokio::time::sleep(delay).await,
            StartBehavior::Succeed => {}
        }

        let port = self
            .host_port
            .ok_or_else(|| StoreError::StartupFailure("no host port exposed".to_string()))?;
        let listener = TcpListener::bind(("127.0.0.1", port))
            .map_err(|e| StoreError::StartupFailure(format!("port {} unavailable: {}", port, e)))?;
        self.listener = Some(listener);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), StoreError> {
        self.calls.lock().stops += 1;
        self.listener = None;
        Ok(())
    }
}
