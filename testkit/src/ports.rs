use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::TcpListener;

use storekit::StoreError;

lazy_static! {
    /// Host ports currently held by a started harness in this process.
    static ref CLAIMED_PORTS: Mutex<HashSet<u16>> = Mutex::new(HashSet::new());
}

/// Ask the OS for a currently free local port.
pub fn free_local_port() -> Result<u16, StoreError> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .map_err(|e| StoreError::ConfigError(format!("failed to bind to ephemeral port: {}", e)))?;
    let port = listener
        .local_addr()
        .map_err(|e| StoreError::ConfigError(format!("failed to get local addr: {}", e)))?
        .port();
    drop(listener);
    Ok(port)
}

/// Returns `false` when the port is already claimed.
pub(crate) fn claim(port: u16) -> bool {
    CLAIMED_PORTS.lock().insert(port)
}

pub(crate) fn release(port: u16) {
    CLAIMED_PORTS.lock().remove(&port);
}

pub fn is_claimed(port: u16) -> bool {
    CLAIMED_PORTS.lock().contains(&port)
}
