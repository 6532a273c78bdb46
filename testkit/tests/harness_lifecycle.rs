use std::net::TcpListener;

use scylla_testkit::{HarnessState, ScriptedContainer, ScyllaTestDriver};
use serde::{Deserialize, Serialize};
use storekit::config::{StoreProperties, PROP_HOSTS, PROP_KEYSPACE, PROP_PORT};
use storekit::{BackendKind, ColumnMapping, StoreError, TableMapping};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MyRecord {
    #[serde(default)]
    label: Option<String>,
}

fn mapping() -> TableMapping {
    TableMapping::new("my_record", ColumnMapping::new("id", "int")).with_column("label", "text")
}

fn harness(provider: ScriptedContainer) -> ScyllaTestDriver<ScriptedContainer> {
    ScyllaTestDriver::with_provider(provider)
        .unwrap()
        .with_backend(BackendKind::Memory)
        .with_base_directory(std::env::temp_dir().join("scylla-testkit-it"))
}

#[tokio::test]
async fn failed_start_leaves_harness_unusable() {
    let mut driver = harness(ScriptedContainer::failing("container exited with code 137"));

    let err = driver.start().await.unwrap_err();
    assert!(matches!(err, StoreError::StartupFailure(_)));
    assert_eq!(driver.state(), HarnessState::Stopped);

    let result = driver.create_data_store::<i32, MyRecord>(mapping()).await;
    assert!(matches!(result, Err(StoreError::IllegalState(_))));
}

#[tokio::test]
async fn ready_harness_hands_out_stores_on_its_port() -> anyhow::Result<()> {
    let port = scylla_testkit::ports::free_local_port()?;
    let mut driver = harness(ScriptedContainer::succeeding()).with_port(port);

    let mut extra = StoreProperties::new();
    extra.insert(PROP_KEYSPACE.to_string(), "conformance".to_string());
    extra.insert(PROP_PORT.to_string(), "1".to_string());
    driver.set_parameters(extra);

    driver.start().await?;
    assert_eq!(driver.state(), HarnessState::Ready);
    // The provider holds the published port while running.
    assert!(TcpListener::bind(("127.0.0.1", port)).is_err());

    let store = driver.create_data_store::<i32, MyRecord>(mapping()).await?;
    assert!(store.is_open());

    let properties = driver.connection_properties();
    assert_eq!(properties[PROP_PORT], port.to_string());
    assert_eq!(properties[PROP_HOSTS], "127.0.0.1");
    assert_eq!(properties[PROP_KEYSPACE], "conformance");

    store.close().await?;
    driver.stop().await?;
    assert_eq!(driver.state(), HarnessState::Stopped);
    assert!(TcpListener::bind(("127.0.0.1", port)).is_ok());
    Ok(())
}

#[tokio::test]
async fn create_before_start_is_illegal() {
    let driver = harness(ScriptedContainer::succeeding());
    let result = driver.create_data_store::<i32, MyRecord>(mapping()).await;
    assert!(matches!(result, Err(StoreError::IllegalState(_))));
}

#[tokio::test]
async fn create_after_stop_is_illegal() {
    let mut driver = harness(ScriptedContainer::succeeding());
    driver.start().await.unwrap();
    driver.stop().await.unwrap();

    let result = driver.create_data_store::<i32, MyRecord>(mapping()).await;
    assert!(matches!(result, Err(StoreError::IllegalState(_))));
}

#[tokio::test]
async fn two_harnesses_cannot_share_a_port() {
    let port = scylla_testkit::ports::free_local_port().unwrap();
    let mut first = harness(ScriptedContainer::succeeding()).with_port(port);
    let second_provider = ScriptedContainer::succeeding();
    let second_calls = second_provider.calls();
    let mut second = harness(second_provider).with_port(port);

    first.start().await.unwrap();
    assert!(matches!(second.start().await, Err(StoreError::IllegalState(_))));
    assert_eq!(second.state(), HarnessState::Created);
    assert_eq!(second.transitions(), &[HarnessState::Created]);
    assert_eq!(second_calls.lock().starts, 0);
    assert_eq!(second_calls.lock().stops, 0);

    // The failed harness must not have released the winner's claim.
    assert!(scylla_testkit::ports::is_claimed(port));
    assert_eq!(first.state(), HarnessState::Ready);
    first.stop().await.unwrap();
    assert!(!scylla_testkit::ports::is_claimed(port));
}

#[tokio::test]
async fn distinct_harnesses_get_distinct_ports() {
    let mut first = harness(ScriptedContainer::succeeding());
    let mut second = harness(ScriptedContainer::succeeding());
    first.start().await.unwrap();
    second.start().await.unwrap();

    assert_ne!(first.port(), second.port());
    assert_eq!(first.state(), HarnessState::Ready);
    assert_eq!(second.state(), HarnessState::Ready);

    first.stop().await.unwrap();
    second.stop().await.unwrap();
}

#[tokio::test]
async fn stop_is_idempotent_after_failure() {
    let provider = ScriptedContainer::failing("boom");
    let calls = provider.calls();
    let mut driver = harness(provider);

    let _ = driver.start().await;
    driver.stop().await.unwrap();
    driver.stop().await.unwrap();

    assert_eq!(calls.lock().stops, 1);
    assert_eq!(
        driver.transitions().last().copied(),
        Some(HarnessState::Stopped)
    );
}
