// Shared data-store contract, run against every backend a harness can
// provision. The docker-backed run needs a local docker daemon.

use scylla_testkit::{DockerScylla, ScriptedContainer, ScyllaTestDriver};
use serde::{Deserialize, Serialize};
use storekit::{BackendKind, ColumnMapping, Filter, FilterOp, StoreError, StoreHandle, TableMapping};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Employee {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    date_of_birth: Option<i64>,
    #[serde(default)]
    salary: Option<i32>,
}

fn employee(name: &str, date_of_birth: i64, salary: i32) -> Employee {
    Employee {
        name: Some(name.to_string()),
        date_of_birth: Some(date_of_birth),
        salary: Some(salary),
    }
}

fn employee_mapping() -> TableMapping {
    TableMapping::new("employee", ColumnMapping::new("ssn", "text"))
        .with_column("name", "text")
        .with_column("date_of_birth", "bigint")
        .with_column("salary", "int")
}

async fn populate(store: &StoreHandle<String, Employee>) -> Result<(), StoreError> {
    for i in 0..10 {
        let ssn = format!("ssn-{:02}", i);
        store
            .put(ssn, &employee(&format!("employee {}", i), 1_000 + i as i64, 100 * i))
            .await?;
    }
    Ok(())
}

async fn schema_lifecycle(store: &StoreHandle<String, Employee>) -> Result<(), StoreError> {
    store.create_schema().await?;
    assert!(store.schema_exists().await?);
    store.create_schema().await?;

    store.delete_schema().await?;
    assert!(!store.schema_exists().await?);

    store.create_schema().await?;
    Ok(())
}

async fn put_get_update_delete(store: &StoreHandle<String, Employee>) -> Result<(), StoreError> {
    let ssn = "ssn-crud".to_string();
    assert_eq!(store.get(&ssn).await?, None);

    store.put(ssn.clone(), &employee("ana", 1, 10)).await?;
    assert_eq!(store.get(&ssn).await?, Some(employee("ana", 1, 10)));

    store.put(ssn.clone(), &employee("ana", 1, 20)).await?;
    assert_eq!(store.get(&ssn).await?.and_then(|e| e.salary), Some(20));

    let partial = store.get_fields(&ssn, &["name".to_string()]).await?;
    assert_eq!(
        partial,
        Some(Employee {
            name: Some("ana".to_string()),
            date_of_birth: None,
            salary: None,
        })
    );

    store.delete(&ssn).await?;
    assert_eq!(store.get(&ssn).await?, None);
    Ok(())
}

async fn query_shapes(store: &StoreHandle<String, Employee>) -> Result<(), StoreError> {
    store.truncate_schema().await?;
    populate(store).await?;

    let all = store.new_query()?;
    let mut cursor = store.execute(&all).await?;
    assert_eq!(cursor.collect_rows().await?.len(), 10);
    cursor.close().await?;

    let single = store.new_query()?.with_key("ssn-03".to_string());
    let mut cursor = store.execute(&single).await?;
    let rows = cursor.collect_rows().await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value.salary, Some(300));

    let filtered = store
        .new_query()?
        .with_filter(Filter::new("salary", FilterOp::GtEq, 500))
        .with_fields(["name", "salary"]);
    let mut cursor = store.execute(&filtered).await?;
    let rows = cursor.collect_rows().await?;
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r.value.date_of_birth.is_none()));

    let limited = store.new_query()?.with_limit(4);
    let mut cursor = store.execute(&limited).await?;
    assert_eq!(cursor.collect_rows().await?.len(), 4);
    assert!(!cursor.has_next().await?);
    assert!(matches!(cursor.next().await, Err(StoreError::ExhaustionError(_))));
    cursor.close().await?;
    cursor.close().await?;

    Ok(())
}

async fn delete_by_query(store: &StoreHandle<String, Employee>) -> Result<(), StoreError> {
    store.truncate_schema().await?;
    populate(store).await?;

    let query = store
        .new_query()?
        .with_filter(Filter::new("salary", FilterOp::Lt, 300));
    assert_eq!(store.delete_by_query(&query).await?, 3);

    let mut cursor = store.execute(&store.new_query()?).await?;
    assert_eq!(cursor.collect_rows().await?.len(), 7);
    Ok(())
}

async fn cross_handle_queries_rejected(
    store: &StoreHandle<String, Employee>,
    other: &StoreHandle<String, Employee>,
) -> Result<(), StoreError> {
    let foreign = other.new_query()?;
    assert!(matches!(store.execute(&foreign).await, Err(StoreError::InvalidArgument(_))));
    assert!(matches!(store.delete_by_query(&foreign).await, Err(StoreError::InvalidArgument(_))));
    Ok(())
}

async fn run_suite<P: scylla_testkit::ContainerProvider>(driver: &ScyllaTestDriver<P>) -> Result<(), StoreError> {
    let store = driver.create_data_store::<String, Employee>(employee_mapping()).await?;
    let other = driver.create_data_store::<String, Employee>(employee_mapping()).await?;

    schema_lifecycle(&store).await?;
    put_get_update_delete(&store).await?;
    query_shapes(&store).await?;
    delete_by_query(&store).await?;
    cross_handle_queries_rejected(&store, &other).await?;

    store.delete_schema().await?;
    store.close().await?;
    other.close().await?;

    assert!(matches!(store.new_query(), Err(StoreError::ConfigError(_))));
    Ok(())
}

#[tokio::test]
async fn memory_backend_honours_the_contract() {
    let mut driver = ScyllaTestDriver::with_provider(ScriptedContainer::succeeding())
        .unwrap()
        .with_backend(BackendKind::Memory)
        .with_base_directory(std::env::temp_dir().join("scylla-testkit-conformance"));
    driver.start().await.unwrap();

    let outcome = run_suite(&driver).await;
    driver.stop().await.unwrap();
    outcome.unwrap();
}

#[tokio::test]
#[ignore] // Requires a local docker daemon
async fn scylla_backend_honours_the_contract() {
    storekit::observability::init_tracing(&Default::default());

    let mut driver = ScyllaTestDriver::with_provider(DockerScylla::default()).unwrap();
    driver.start().await.unwrap();

    let outcome = run_suite(&driver).await;
    driver.stop().await.unwrap();
    outcome.unwrap();
}
