//! Ephemeral ScyllaDB for data-store conformance suites.
//!
//! [`ScyllaTestDriver`] owns one backend instance behind a
//! [`ContainerProvider`]: start it in suite setup, create stores with
//! [`ScyllaTestDriver::create_data_store`], stop it in teardown.

pub mod container;
pub mod driver;
pub mod ports;
pub mod scripted;

pub use container::{ContainerProvider, DockerScylla};
pub use driver::{HarnessState, ScyllaTestDriver};
pub use scripted::{ScriptedContainer, StartBehavior};
