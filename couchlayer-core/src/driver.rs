//! Document driver abstraction.
//!
//! The persistence layer never talks to a wire protocol itself. It consumes a
//! narrow capability made of three traits:
//!
//! - [`DocumentDriver`]: establishes a cluster connection from a resolved URI
//! - [`DriverCluster`]: cluster-level management (create/open bucket, primary index)
//! - [`BucketHandle`]: statements and key/value operations on one open bucket
//!
//! Implementations must be thread-safe; the library performs no locking around
//! a shared bucket handle and relies on the driver for that.

use async_trait::async_trait;
use serde_json::Value;
use std::{fmt::Debug, sync::Arc};

use crate::{error::DriverResult, resolver::ResolvedConnection, statement::Statement};

/// Opaque compare-and-swap token returned with every read and write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cas(pub u64);

/// A stored value together with its current CAS token.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub value: Value,
    pub cas: Cas,
}

/// Rows returned by a statement, plus the number of mutated documents when reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<Value>,
    pub mutation_count: Option<u64>,
}

/// Settings used when a bucket is created on open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSettings {
    pub name: String,
    pub bucket_type: String,
    pub ram_quota_mb: usize,
    pub flush_enabled: bool,
}

/// Entry point of a document database driver.
#[async_trait]
pub trait DocumentDriver: Send + Sync + Debug {
    /// Connects to the cluster described by `connection`, authenticating when
    /// a username is present.
    async fn connect(&self, connection: &ResolvedConnection) -> DriverResult<Arc<dyn DriverCluster>>;
}

/// A connected cluster.
#[async_trait]
pub trait DriverCluster: Send + Sync + Debug {
    /// Creates a bucket. Reports [`BucketExists`](crate::error::DriverErrorKind::BucketExists)
    /// when a bucket with the same name is already present.
    async fn create_bucket(&self, settings: &BucketSettings) -> DriverResult<()>;

    async fn open_bucket(&self, name: &str) -> DriverResult<Arc<dyn BucketHandle>>;

    /// Creates the primary index of a bucket. Reports
    /// [`IndexExists`](crate::error::DriverErrorKind::IndexExists) when it already exists.
    async fn create_primary_index(&self, bucket: &str) -> DriverResult<()>;

    async fn disconnect(&self);
}

/// An open bucket.
#[async_trait]
pub trait BucketHandle: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Executes a statement. Count statements return a single row `{"count": n}`.
    async fn query(&self, statement: &Statement) -> DriverResult<QueryResult>;

    async fn get(&self, key: &str) -> DriverResult<StoredDocument>;

    /// Reads several keys at once, reporting the outcome of each key separately.
    async fn get_multi(&self, keys: &[String]) -> DriverResult<Vec<(String, DriverResult<StoredDocument>)>>;

    /// Stores a new document. Fails with `KeyExists` when the key is taken.
    async fn insert(&self, key: &str, value: Value) -> DriverResult<Cas>;

    /// Creates or replaces a document.
    async fn upsert(&self, key: &str, value: Value) -> DriverResult<Cas>;

    /// Replaces an existing document. Fails with `KeyNotFound` when the key is
    /// missing and with `CasMismatch` when `cas` no longer matches.
    async fn replace(&self, key: &str, value: Value, cas: Option<Cas>) -> DriverResult<Cas>;

    async fn remove(&self, key: &str) -> DriverResult<()>;

    /// Removes every document in the bucket.
    async fn flush(&self) -> DriverResult<()>;

    async fn disconnect(&self);
}

#[async_trait]
impl<D> DocumentDriver for Arc<D>
where
    D: DocumentDriver + ?Sized,
{
    async fn connect(&self, connection: &ResolvedConnection) -> DriverResult<Arc<dyn DriverCluster>> {
        (**self).connect(connection).await
    }
}

/// Factory for driver instances.
#[async_trait]
pub trait DocumentDriverBuilder {
    type Driver: DocumentDriver;

    async fn build(self) -> DriverResult<Self::Driver>;
}
