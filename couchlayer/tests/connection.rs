mod common;

use common::{Dummy, connection_config, driver, open_dummies};
use couchlayer::{connection::BUCKET_SETTLE_DELAY, memory::InMemoryDriver, prelude::*};
use std::sync::Arc;
use tokio::time::Instant;

async fn shared_connection(driver: &InMemoryDriver, config: &ConfigParams) -> Arc<StoreConnection> {
    let mut connection = StoreConnection::new(Arc::new(driver.clone()));
    connection.configure(config).unwrap();
    connection.set_references(&References::new()).unwrap();
    connection.open(None).await.unwrap();
    Arc::new(connection)
}

fn dummies(driver: &InMemoryDriver, collection: &str) -> IdentifiablePersistence<Dummy> {
    IdentifiablePersistence::<Dummy>::new(Arc::new(driver.clone()), None, collection).unwrap()
}

#[tokio::test]
async fn empty_collection_name_is_rejected() {
    let driver = driver().await;
    let err = IdentifiablePersistence::<Dummy>::new(Arc::new(driver), Some("test"), "")
        .err()
        .unwrap();

    assert_eq!(err.code(), Some("NO_COLLECTION"));
}

#[tokio::test]
async fn open_without_references_fails() {
    let driver = driver().await;
    let persistence = dummies(&driver, "dummies");

    let err = persistence.open(None).await.unwrap_err();
    assert_eq!(err.code(), Some("NO_CONNECTION"));
    assert!(!persistence.is_open().await);
}

#[tokio::test]
async fn operations_require_open_persistence() {
    let driver = driver().await;
    let mut persistence = dummies(&driver, "dummies");
    persistence.configure(&connection_config("test")).unwrap();
    persistence.set_references(&References::new()).unwrap();

    let err = persistence.get_one_by_id(None, "1").await.unwrap_err();
    assert_eq!(err.code(), Some("NOT_OPENED"));

    let err = persistence.clear(None).await.unwrap_err();
    assert_eq!(err.code(), Some("NOT_OPENED"));
}

#[tokio::test]
async fn owned_connection_follows_persistence_lifecycle() {
    let driver = driver().await;
    let persistence = open_dummies(&driver, "dummies").await;

    let connection = persistence.persistence().connection().unwrap();
    assert!(connection.is_owned());
    assert!(connection.connection().is_open().await);

    persistence.close(None).await.unwrap();
    assert!(!persistence.is_open().await);
    assert!(!connection.connection().is_open().await);

    persistence.open(None).await.unwrap();
    assert!(connection.connection().is_open().await);
}

#[tokio::test]
async fn shared_connection_is_borrowed_and_left_open() {
    let driver = driver().await;
    let connection = shared_connection(&driver, &connection_config("test")).await;
    let references = References::new().with_connection("default", connection.clone());

    let mut alphas = dummies(&driver, "alphas");
    alphas.set_references(&references).unwrap();
    alphas.open(None).await.unwrap();

    let mut betas = dummies(&driver, "betas");
    betas.set_references(&references).unwrap();
    betas.open(None).await.unwrap();

    assert!(!alphas.persistence().connection().unwrap().is_owned());
    assert_eq!(alphas.persistence().bucket_name(), Some("test"));

    let alpha = alphas.create(None, Dummy::new("Key 1", "Alpha")).await.unwrap();
    assert_eq!(alphas.get_one_by_id(None, alpha.id().unwrap()).await.unwrap(), Some(alpha));

    alphas.close(None).await.unwrap();
    assert!(connection.is_open().await);
    assert_eq!(betas.get_count_by_filter(None, None).await.unwrap(), 0);

    connection.close(None).await.unwrap();
    assert!(!connection.is_open().await);
}

#[tokio::test]
async fn shared_connection_key_is_configurable() {
    let driver = driver().await;
    let connection = shared_connection(&driver, &connection_config("test")).await;
    let references = References::new().with_connection("couchbase", connection);

    let mut persistence = dummies(&driver, "dummies");
    persistence
        .configure(&ConfigParams::from_tuples([("dependencies.connection", "couchbase")]))
        .unwrap();
    persistence.set_references(&references).unwrap();

    assert!(!persistence.persistence().connection().unwrap().is_owned());
}

#[tokio::test]
async fn unopened_shared_connection_fails_persistence_open() {
    let driver = driver().await;
    let mut connection = StoreConnection::new(Arc::new(driver.clone()));
    connection.configure(&connection_config("test")).unwrap();
    let references = References::new().with_connection("default", Arc::new(connection));

    let mut persistence = dummies(&driver, "dummies");
    persistence.set_references(&references).unwrap();

    let err = persistence.open(None).await.unwrap_err();
    assert_eq!(err.code(), Some("CONNECT_FAILED"));
}

#[tokio::test]
async fn missing_bucket_fails_to_connect() {
    let driver = driver().await;
    let mut persistence = dummies(&driver, "dummies");
    persistence.configure(&connection_config("absent")).unwrap();
    persistence.set_references(&References::new()).unwrap();

    let err = persistence.open(None).await.unwrap_err();
    assert_eq!(err.code(), Some("CONNECT_FAILED"));
    assert!(!persistence.is_open().await);
}

#[tokio::test]
async fn missing_bucket_name_fails_to_open() {
    let driver = driver().await;
    let mut connection = StoreConnection::new(Arc::new(driver));
    connection
        .configure(&ConfigParams::from_tuples([("connection.host", "localhost"), ("connection.port", "8091")]))
        .unwrap();

    let err = connection.open(None).await.unwrap_err();
    assert_eq!(err.code(), Some("NO_BUCKET"));
}

#[tokio::test]
async fn missing_host_fails_to_open() {
    let driver = driver().await;
    let mut persistence = dummies(&driver, "dummies");
    persistence
        .configure(&ConfigParams::from_tuples([("bucket", "test"), ("connection.port", "8091")]))
        .unwrap();
    persistence.set_references(&References::new()).unwrap();

    let err = persistence.open(None).await.unwrap_err();
    assert_eq!(err.code(), Some("NO_HOST"));
}

#[tokio::test(start_paused = true)]
async fn auto_create_makes_bucket_and_primary_index() {
    let driver = InMemoryDriver::new();
    let mut persistence = dummies(&driver, "dummies");
    let mut config = connection_config("fresh");
    config.set("options.auto_create", "true");
    persistence.configure(&config).unwrap();
    persistence.set_references(&References::new()).unwrap();

    let started = Instant::now();
    persistence.open(None).await.unwrap();
    assert!(started.elapsed() >= BUCKET_SETTLE_DELAY);

    assert!(driver.bucket("fresh").await.is_some());
    assert!(driver.has_primary_index("fresh").await);

    let created = persistence.create(None, Dummy::new("Key 1", "Content 1")).await.unwrap();
    assert!(persistence.get_one_by_id(None, created.id().unwrap()).await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn auto_create_reuses_existing_bucket() {
    let driver = driver().await;
    let persistence = open_dummies(&driver, "dummies").await;
    persistence.create(None, Dummy::with_id("1", "Key 1", "Content 1")).await.unwrap();

    let mut other = dummies(&driver, "dummies");
    let mut config = connection_config("test");
    config.set("options.auto_create", "true");
    other.configure(&config).unwrap();
    other.set_references(&References::new()).unwrap();
    let started = Instant::now();
    other.open(None).await.unwrap();
    assert!(started.elapsed() < BUCKET_SETTLE_DELAY);

    assert!(other.get_one_by_id(None, "1").await.unwrap().is_some());
    assert!(!driver.has_primary_index("test").await);
}

#[tokio::test]
async fn credentials_are_checked_by_the_driver() {
    let driver = InMemoryDriver::builder()
        .with_bucket("test")
        .with_user("admin", "secret")
        .build()
        .await
        .unwrap();

    let mut config = connection_config("test");
    config.set("credential.username", "admin");
    config.set("credential.password", "secret");

    let mut persistence = dummies(&driver, "dummies");
    persistence.configure(&config).unwrap();
    persistence.set_references(&References::new()).unwrap();
    persistence.open(None).await.unwrap();

    config.set("credential.password", "wrong");
    let mut rejected = dummies(&driver, "dummies");
    rejected.configure(&config).unwrap();
    rejected.set_references(&References::new()).unwrap();

    let err = rejected.open(None).await.unwrap_err();
    assert_eq!(err.code(), Some("CONNECT_FAILED"));
    assert_eq!(err.driver_kind(), Some(DriverErrorKind::AuthenticationFailed));
}

#[tokio::test]
async fn connection_resolved_through_discovery() {
    let driver = driver().await;
    let discovery = MemoryDiscovery::new();
    discovery
        .register(
            "main",
            ConnectionParams::from_tuples([("host", "db.local"), ("port", "8091")]),
        )
        .await;

    let mut persistence = dummies(&driver, "dummies");
    persistence
        .configure(&ConfigParams::from_tuples([
            ("bucket", "test"),
            ("connection.discovery_key", "main"),
        ]))
        .unwrap();
    persistence
        .set_references(&References::new().with_discovery(Arc::new(discovery)))
        .unwrap();

    persistence.open(None).await.unwrap();
    assert!(persistence.is_open().await);
}

#[tokio::test]
async fn clear_fails_when_flush_is_disabled() {
    let driver = InMemoryDriver::builder()
        .with_unflushable_bucket("test")
        .build()
        .await
        .unwrap();
    let persistence = open_dummies(&driver, "dummies").await;

    let err = persistence.clear(None).await.unwrap_err();
    assert_eq!(err.code(), Some("FLUSH_FAILED"));
}

#[tokio::test(start_paused = true)]
async fn auto_create_without_auto_index_skips_primary_index() {
    let driver = InMemoryDriver::new();
    let mut persistence = dummies(&driver, "dummies");
    let mut config = connection_config("fresh");
    config.set("options.auto_create", "true");
    config.set("options.auto_index", "false");
    persistence.configure(&config).unwrap();
    persistence.set_references(&References::new()).unwrap();

    persistence.open(None).await.unwrap();

    assert!(driver.bucket("fresh").await.is_some());
    assert!(!driver.has_primary_index("fresh").await);
}

#[tokio::test]
async fn unset_references_drops_open_handles() {
    let driver = driver().await;
    let connection = shared_connection(&driver, &connection_config("test")).await;
    let references = References::new().with_connection("default", connection.clone());

    let mut persistence = dummies(&driver, "dummies");
    persistence.set_references(&references).unwrap();
    persistence.open(None).await.unwrap();

    persistence.unset_references();

    assert!(!persistence.is_open().await);
    persistence.close(None).await.unwrap();
    assert!(connection.is_open().await);

    let err = persistence.get_one_by_id(None, "1").await.unwrap_err();
    assert_eq!(err.code(), Some("NOT_OPENED"));
}
