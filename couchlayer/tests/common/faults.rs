use async_trait::async_trait;
use couchlayer::{
    driver::{BucketSettings, Cas, QueryResult, StoredDocument},
    error::DriverResult,
    memory::InMemoryDriver,
    prelude::*,
    serde_json::Value,
    statement::StatementKind,
};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

/// Failures injected around an in-memory bucket.
#[derive(Debug, Default)]
pub struct Faults {
    /// Keys whose remove fails with the given kind, leaving the document in place.
    pub failing_removes: Mutex<HashMap<String, DriverErrorKind>>,
    /// Keys removed by a concurrent writer right before our remove, which then reports not-found.
    pub vanishing_removes: Mutex<HashSet<String>>,
    /// Keys rewritten by a concurrent writer right after every read, changing their CAS.
    pub racing_gets: Mutex<HashSet<String>>,
    /// Kind every key of a batch read fails with.
    pub get_multi_error: Mutex<Option<DriverErrorKind>>,
    /// Rows returned for count statements instead of the real count.
    pub count_rows: Mutex<Option<Vec<Value>>>,
}

/// Driver wrapping [`InMemoryDriver`] with injectable failures.
#[derive(Debug, Clone)]
pub struct FaultyDriver {
    inner: InMemoryDriver,
    pub faults: Arc<Faults>,
}

impl FaultyDriver {
    pub fn new(inner: InMemoryDriver) -> Self {
        Self { inner, faults: Arc::new(Faults::default()) }
    }

    pub fn inner(&self) -> &InMemoryDriver {
        &self.inner
    }
}

#[async_trait]
impl DocumentDriver for FaultyDriver {
    async fn connect(&self, connection: &ResolvedConnection) -> DriverResult<Arc<dyn DriverCluster>> {
        let inner = self.inner.connect(connection).await?;
        Ok(Arc::new(FaultyCluster { inner, faults: self.faults.clone() }))
    }
}

#[derive(Debug)]
struct FaultyCluster {
    inner: Arc<dyn DriverCluster>,
    faults: Arc<Faults>,
}

#[async_trait]
impl DriverCluster for FaultyCluster {
    async fn create_bucket(&self, settings: &BucketSettings) -> DriverResult<()> {
        self.inner.create_bucket(settings).await
    }

    async fn open_bucket(&self, name: &str) -> DriverResult<Arc<dyn BucketHandle>> {
        let inner = self.inner.open_bucket(name).await?;
        Ok(Arc::new(FaultyBucket { inner, faults: self.faults.clone() }))
    }

    async fn create_primary_index(&self, bucket: &str) -> DriverResult<()> {
        self.inner.create_primary_index(bucket).await
    }

    async fn disconnect(&self) {
        self.inner.disconnect().await
    }
}

#[derive(Debug)]
struct FaultyBucket {
    inner: Arc<dyn BucketHandle>,
    faults: Arc<Faults>,
}

#[async_trait]
impl BucketHandle for FaultyBucket {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn query(&self, statement: &Statement) -> DriverResult<QueryResult> {
        if statement.kind == StatementKind::Count {
            let rows = self.faults.count_rows.lock().unwrap().clone();
            if let Some(rows) = rows {
                return Ok(QueryResult { rows, mutation_count: None });
            }
        }

        self.inner.query(statement).await
    }

    async fn get(&self, key: &str) -> DriverResult<StoredDocument> {
        let stored = self.inner.get(key).await?;

        let racing = self.faults.racing_gets.lock().unwrap().contains(key);
        if racing {
            self.inner.upsert(key, stored.value.clone()).await?;
        }

        Ok(stored)
    }

    async fn get_multi(&self, keys: &[String]) -> DriverResult<Vec<(String, DriverResult<StoredDocument>)>> {
        let error = *self.faults.get_multi_error.lock().unwrap();
        match error {
            Some(kind) => Ok(keys
                .iter()
                .map(|key| (key.clone(), Err(DriverError::new(kind, format!("Read of {key} failed")))))
                .collect()),
            None => self.inner.get_multi(keys).await,
        }
    }

    async fn insert(&self, key: &str, value: Value) -> DriverResult<Cas> {
        self.inner.insert(key, value).await
    }

    async fn upsert(&self, key: &str, value: Value) -> DriverResult<Cas> {
        self.inner.upsert(key, value).await
    }

    async fn replace(&self, key: &str, value: Value, cas: Option<Cas>) -> DriverResult<Cas> {
        self.inner.replace(key, value, cas).await
    }

    async fn remove(&self, key: &str) -> DriverResult<()> {
        let failure = self.faults.failing_removes.lock().unwrap().get(key).copied();
        if let Some(kind) = failure {
            return Err(DriverError::new(kind, format!("Remove of {key} failed")));
        }

        let vanishing = self.faults.vanishing_removes.lock().unwrap().contains(key);
        if vanishing {
            self.inner.remove(key).await?;
            return Err(DriverError::key_not_found(key));
        }

        self.inner.remove(key).await
    }

    async fn flush(&self) -> DriverResult<()> {
        self.inner.flush().await
    }

    async fn disconnect(&self) {
        self.inner.disconnect().await
    }
}
