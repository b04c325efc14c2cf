//! Bucket-scoped persistence shared by all concrete persistence components.
//!
//! [`Persistence`] wires itself to a [`StoreConnection`] (a shared one found
//! in [`References`], or a private one it owns), tracks its open state, and
//! composes filter, paging and sort parameters into statements against the
//! open bucket.
//!
//! Every record read through a query passes through the record mapper; rows
//! that map to `None` are dropped from the result.
//!
//! # Example
//!
//! ```ignore
//! use couchlayer_core::{persistence::Persistence, query::{Filter, PagingParams}, lifecycle::*};
//!
//! let mut persistence = Persistence::<Dummy>::new(driver, Some("test"), Some("dummies"));
//! persistence.configure(&config)?;
//! persistence.set_references(&References::new())?;
//! persistence.open(None).await?;
//!
//! let page = persistence
//!     .get_page_by_filter(None, Some(Filter::eq("key", "Key 1")), Some(PagingParams::new(Some(0), Some(10), true)), vec![], None)
//!     .await?;
//! ```

use async_trait::async_trait;
use mea::rwlock::RwLock;
use rand::Rng;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{marker::PhantomData, sync::Arc};
use tracing::{debug, trace};

use crate::{
    config::ConfigParams,
    connection::{OpenConnection, StoreConnection},
    driver::{BucketHandle, DocumentDriver, DriverCluster, QueryResult},
    error::{PersistenceError, PersistenceResult},
    lifecycle::{Configurable, DEFAULT_CONNECTION_KEY, Opener, References, Referenceable},
    params::{ConnectionOptions, DEFAULT_MAX_PAGE_SIZE},
    query::{DataPage, Expr, Filter, PagingParams, Sort},
    record::{COLLECTION_FIELD, JsonMapper, RecordMapper, strip_collection, tag_collection},
    statement::{ScanConsistency, Statement},
};

/// How a persistence component holds its connection.
///
/// Only an `Owned` connection is opened and closed by the persistence; a
/// `Borrowed` one is managed by whoever registered it.
#[derive(Debug)]
pub enum ConnectionRef {
    Owned(StoreConnection),
    Borrowed(Arc<StoreConnection>),
}

impl ConnectionRef {
    pub fn connection(&self) -> &StoreConnection {
        match self {
            ConnectionRef::Owned(connection) => connection,
            ConnectionRef::Borrowed(connection) => connection,
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, ConnectionRef::Owned(_))
    }
}

/// Generic persistence over one bucket and, optionally, one logical collection.
pub struct Persistence<T, M = JsonMapper> {
    driver: Arc<dyn DocumentDriver>,
    mapper: M,
    config: ConfigParams,
    bucket_name: Option<String>,
    collection: Option<String>,
    max_page_size: usize,
    connection_key: String,
    connection: Option<ConnectionRef>,
    state: RwLock<Option<OpenConnection>>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Persistence<T, JsonMapper>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(driver: Arc<dyn DocumentDriver>, bucket: Option<&str>, collection: Option<&str>) -> Self {
        Self::with_mapper(driver, bucket, collection, JsonMapper)
    }
}

impl<T, M> Persistence<T, M>
where
    T: Send + Sync + 'static,
    M: RecordMapper<T>,
{
    pub fn with_mapper(
        driver: Arc<dyn DocumentDriver>,
        bucket: Option<&str>,
        collection: Option<&str>,
        mapper: M,
    ) -> Self {
        Self {
            driver,
            mapper,
            config: ConfigParams::new(),
            bucket_name: bucket.map(str::to_string),
            collection: collection.map(str::to_string),
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            connection_key: DEFAULT_CONNECTION_KEY.to_string(),
            connection: None,
            state: RwLock::new(None),
            _record: PhantomData,
        }
    }

    /// Bucket name, taken from a borrowed connection when one is wired.
    pub fn bucket_name(&self) -> Option<&str> {
        self.bucket_name.as_deref()
    }

    /// Logical collection name used as the `_c` marker.
    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// Page size applied when paging omits `take`, and the cap on `take`.
    pub fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    /// Connection wired by `set_references`.
    pub fn connection(&self) -> Option<&ConnectionRef> {
        self.connection.as_ref()
    }

    /// Returns the handles captured on open.
    pub async fn handles(&self) -> PersistenceResult<OpenConnection> {
        self.state.read().await.clone().ok_or_else(|| {
            PersistenceError::invalid_state("NOT_OPENED", "Persistence is not opened")
        })
    }

    /// Open bucket handle. Fails with `NOT_OPENED` while closed.
    pub async fn bucket(&self) -> PersistenceResult<Arc<dyn BucketHandle>> {
        Ok(self.handles().await?.bucket)
    }

    /// Open cluster handle. Fails with `NOT_OPENED` while closed.
    pub async fn cluster(&self) -> PersistenceResult<Arc<dyn DriverCluster>> {
        Ok(self.handles().await?.cluster)
    }

    /// Converts a record into its stored form, including the collection marker.
    pub fn to_internal(&self, item: &T) -> PersistenceResult<Value> {
        tag_collection(self.mapper.to_internal(item)?, self.collection())
    }

    /// Converts a stored document into a record, dropping the collection marker.
    pub fn to_public(&self, value: Value) -> PersistenceResult<Option<T>> {
        self.mapper.to_public(strip_collection(value))
    }

    fn convert_rows(&self, rows: Vec<Value>) -> PersistenceResult<Vec<T>> {
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(item) = self.to_public(row)? {
                items.push(item);
            }
        }
        Ok(items)
    }

    /// Restricts `filter` to documents tagged with this persistence's collection.
    pub fn scope_to_collection(&self, filter: Option<Expr>) -> Option<Expr> {
        let Some(collection) = self.collection() else {
            return filter;
        };

        let scope = Filter::eq(COLLECTION_FIELD, collection);
        Some(match filter {
            Some(filter) => scope.and(filter),
            None => scope,
        })
    }

    fn display_name(&self) -> &str {
        self.collection()
            .or(self.bucket_name())
            .unwrap_or_default()
    }

    fn count_of(result: &QueryResult) -> PersistenceResult<usize> {
        result
            .rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_u64)
            .map(|count| count as usize)
            .ok_or_else(|| PersistenceError::InvalidDocument("Count statement returned no numeric count".into()))
    }

    /// Gets a page of records matching `filter` within this collection.
    ///
    /// When `paging.total` is set a second COUNT statement with the same
    /// filter is issued after the data statement completes. The two are
    /// separate observations of the store.
    pub async fn get_page_by_filter(
        &self,
        correlation_id: Option<&str>,
        filter: Option<Expr>,
        paging: Option<PagingParams>,
        sort: Vec<Sort>,
        select: Option<Vec<String>>,
    ) -> PersistenceResult<DataPage<T>> {
        let handles = self.handles().await?;
        let paging = paging.unwrap_or_default();
        let filter = self.scope_to_collection(filter);

        let statement = Statement::select(&handles.bucket_name)
            .with_select(select)
            .with_filter(filter.clone())
            .with_sort(sort)
            .with_offset(paging.skip)
            .with_limit(Some(paging.take_or(self.max_page_size)))
            .with_consistency(ScanConsistency::StatementPlus);

        let result = handles.bucket.query(&statement).await?;
        let items = self.convert_rows(result.rows)?;
        trace!(correlation_id, "Retrieved {} from {}", items.len(), self.display_name());

        if !paging.total {
            return Ok(DataPage::new(items, None));
        }

        let statement = Statement::count(&handles.bucket_name)
            .with_filter(filter)
            .with_consistency(ScanConsistency::StatementPlus);
        let total = Self::count_of(&handles.bucket.query(&statement).await?)?;

        Ok(DataPage::new(items, Some(total)))
    }

    /// Gets every record matching `filter`. The filter alone defines the scope.
    ///
    /// Uses request-plus consistency, waiting for all prior mutations to be indexed.
    pub async fn get_list_by_filter(
        &self,
        correlation_id: Option<&str>,
        filter: Option<Expr>,
        sort: Vec<Sort>,
        select: Option<Vec<String>>,
    ) -> PersistenceResult<Vec<T>> {
        let handles = self.handles().await?;

        let statement = Statement::select(&handles.bucket_name)
            .with_select(select)
            .with_filter(filter)
            .with_sort(sort)
            .with_consistency(ScanConsistency::RequestPlus);

        let result = handles.bucket.query(&statement).await?;
        let items = self.convert_rows(result.rows)?;
        trace!(correlation_id, "Retrieved {} from {}", items.len(), self.display_name());

        Ok(items)
    }

    /// Counts records matching `filter` within this collection.
    pub async fn get_count_by_filter(&self, correlation_id: Option<&str>, filter: Option<Expr>) -> PersistenceResult<usize> {
        let handles = self.handles().await?;

        let statement = Statement::count(&handles.bucket_name)
            .with_filter(self.scope_to_collection(filter))
            .with_consistency(ScanConsistency::StatementPlus);
        let count = Self::count_of(&handles.bucket.query(&statement).await?)?;

        trace!(correlation_id, "Counted {} items in {}", count, self.display_name());
        Ok(count)
    }

    /// Gets one random record matching `filter` within this collection.
    ///
    /// The count and the offset read are two separate statements, so a
    /// concurrent insert or delete may shift the sampled window.
    pub async fn get_one_random(&self, correlation_id: Option<&str>, filter: Option<Expr>) -> PersistenceResult<Option<T>> {
        let handles = self.handles().await?;
        let filter = self.scope_to_collection(filter);

        let statement = Statement::count(&handles.bucket_name)
            .with_filter(filter.clone())
            .with_consistency(ScanConsistency::StatementPlus);
        let count = Self::count_of(&handles.bucket.query(&statement).await?)?;

        if count == 0 {
            trace!(correlation_id, "Nothing found in {}", self.display_name());
            return Ok(None);
        }

        let offset = rand::thread_rng().gen_range(0..count);
        let statement = Statement::select(&handles.bucket_name)
            .with_filter(filter)
            .with_offset(Some(offset))
            .with_limit(Some(1))
            .with_consistency(ScanConsistency::StatementPlus);

        let result = handles.bucket.query(&statement).await?;
        let item = self.convert_rows(result.rows)?.into_iter().next();

        trace!(correlation_id, "Retrieved random item from {}", self.display_name());
        Ok(item)
    }

    /// Deletes every document matching `filter`. The filter alone defines the scope.
    pub async fn delete_by_filter(&self, correlation_id: Option<&str>, filter: Option<Expr>) -> PersistenceResult<()> {
        let handles = self.handles().await?;

        let statement = Statement::delete(&handles.bucket_name).with_filter(filter);
        let result = handles.bucket.query(&statement).await?;

        if let Some(count) = result.mutation_count {
            trace!(correlation_id, "Deleted {} items from {}", count, self.display_name());
        }

        Ok(())
    }

    /// Flushes the whole bucket. This is not scoped to the logical collection.
    pub async fn clear(&self, correlation_id: Option<&str>) -> PersistenceResult<()> {
        let handles = self.state.read().await.clone();
        let bucket_name = handles
            .as_ref()
            .map(|open| open.bucket_name.clone())
            .or_else(|| self.bucket_name.clone());

        let Some(bucket_name) = bucket_name else {
            return Err(PersistenceError::Unknown("Bucket name is not defined".into()));
        };
        let Some(handles) = handles else {
            return Err(PersistenceError::invalid_state("NOT_OPENED", "Persistence is not opened"));
        };

        handles.bucket.flush().await.map_err(|err| {
            PersistenceError::connection("FLUSH_FAILED", format!("Failed to flush bucket {bucket_name}"), Some(err))
        })?;

        debug!(correlation_id, "Flushed bucket {}", bucket_name);
        Ok(())
    }
}

impl<T, M> Configurable for Persistence<T, M>
where
    T: Send + Sync + 'static,
    M: RecordMapper<T>,
{
    fn configure(&mut self, config: &ConfigParams) -> PersistenceResult<()> {
        self.config = self.config.merge(config);

        if let Some(bucket) = config.get_non_empty("bucket") {
            self.bucket_name = Some(bucket.to_string());
        }
        if let Some(collection) = config.get_non_empty("collection") {
            self.collection = Some(collection.to_string());
        }
        if let Some(key) = config.get_non_empty("dependencies.connection") {
            self.connection_key = key.to_string();
        }

        self.max_page_size = ConnectionOptions {
            max_page_size: self.max_page_size,
            ..ConnectionOptions::default()
        }
        .with_config(config)
        .max_page_size;

        Ok(())
    }
}

impl<T, M> Referenceable for Persistence<T, M>
where
    T: Send + Sync + 'static,
    M: RecordMapper<T>,
{
    fn set_references(&mut self, references: &References) -> PersistenceResult<()> {
        if let Some(connection) = references.connection(&self.connection_key) {
            self.bucket_name = connection
                .bucket_name()
                .map(str::to_string)
                .or(self.bucket_name.take());
            self.connection = Some(ConnectionRef::Borrowed(connection));
            return Ok(());
        }

        let mut config = self.config.clone();
        if let Some(bucket) = &self.bucket_name {
            config.set("bucket", bucket.clone());
        }

        let mut connection = StoreConnection::new(self.driver.clone());
        connection.configure(&config)?;
        connection.set_references(references)?;
        self.connection = Some(ConnectionRef::Owned(connection));

        Ok(())
    }

    /// Drops the connection reference and any handles captured on open. A
    /// borrowed connection stays open; an owned one should be closed first.
    fn unset_references(&mut self) {
        self.connection = None;
        self.state = RwLock::new(None);
    }
}

#[async_trait]
impl<T, M> Opener for Persistence<T, M>
where
    T: Send + Sync + 'static,
    M: RecordMapper<T>,
{
    async fn is_open(&self) -> bool {
        self.state.read().await.is_some()
    }

    async fn open(&self, correlation_id: Option<&str>) -> PersistenceResult<()> {
        let mut state = self.state.write().await;
        if state.is_some() {
            return Ok(());
        }

        let Some(connection) = &self.connection else {
            return Err(PersistenceError::invalid_state(
                "NO_CONNECTION",
                "Couchbase connection is missing",
            ));
        };

        if let ConnectionRef::Owned(owned) = connection {
            owned.open(correlation_id).await?;
        }

        let Some(handles) = connection.connection().handles().await else {
            return Err(PersistenceError::connection(
                "CONNECT_FAILED",
                "Couchbase connection is not opened",
                None,
            ));
        };

        debug!(
            correlation_id,
            "Opened persistence for {} in bucket {}",
            self.display_name(),
            handles.bucket_name
        );
        *state = Some(handles);

        Ok(())
    }

    async fn close(&self, correlation_id: Option<&str>) -> PersistenceResult<()> {
        let mut state = self.state.write().await;
        if state.is_none() {
            return Ok(());
        }

        let Some(connection) = &self.connection else {
            return Err(PersistenceError::invalid_state(
                "NO_CONNECTION",
                "Couchbase connection is missing",
            ));
        };

        if let ConnectionRef::Owned(owned) = connection {
            owned.close(correlation_id).await?;
        }

        *state = None;
        debug!(correlation_id, "Closed persistence for {}", self.display_name());

        Ok(())
    }
}
