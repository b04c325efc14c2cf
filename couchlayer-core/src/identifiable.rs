//! Identity-keyed CRUD on top of [`Persistence`].
//!
//! Each record's id is combined with the collection name to form its storage
//! key (`<collection><id>`), so logical collections sharing one bucket never
//! collide on single-key operations.
//!
//! Missing keys are not errors on reads: [`get_one_by_id`] and
//! [`get_list_by_ids`] return nothing instead of failing.
//!
//! [`get_one_by_id`]: IdentifiablePersistence::get_one_by_id
//! [`get_list_by_ids`]: IdentifiablePersistence::get_list_by_ids

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::trace;

use crate::{
    config::ConfigParams,
    driver::DocumentDriver,
    error::{PersistenceError, PersistenceResult},
    lifecycle::{Configurable, Opener, References, Referenceable},
    persistence::Persistence,
    query::{DataPage, Expr, Filter, PagingParams, Sort},
    record::{COLLECTION_FIELD, ID_FIELD, Identifiable, JsonMapper, RecordMapper, generate_id},
};

/// Persistence for records with a unique id, scoped to one logical collection.
///
/// # Example
///
/// ```ignore
/// use couchlayer_core::{identifiable::IdentifiablePersistence, lifecycle::*};
///
/// let mut dummies = IdentifiablePersistence::<Dummy>::new(driver, Some("test"), "dummies")?;
/// dummies.configure(&config)?;
/// dummies.set_references(&References::new())?;
/// dummies.open(None).await?;
///
/// let created = dummies.create(None, dummy).await?;
/// let found = dummies.get_one_by_id(None, created.id().unwrap_or_default()).await?;
/// ```
pub struct IdentifiablePersistence<T, M = JsonMapper> {
    persistence: Persistence<T, M>,
}

impl<T> IdentifiablePersistence<T, JsonMapper>
where
    T: Identifiable + Serialize + DeserializeOwned,
{
    pub fn new(driver: Arc<dyn DocumentDriver>, bucket: Option<&str>, collection: &str) -> PersistenceResult<Self> {
        Self::with_mapper(driver, bucket, collection, JsonMapper)
    }
}

impl<T, M> IdentifiablePersistence<T, M>
where
    T: Identifiable,
    M: RecordMapper<T>,
{
    /// Creates the persistence. Fails when `collection` is empty.
    pub fn with_mapper(
        driver: Arc<dyn DocumentDriver>,
        bucket: Option<&str>,
        collection: &str,
        mapper: M,
    ) -> PersistenceResult<Self> {
        if collection.is_empty() {
            return Err(PersistenceError::config(
                "NO_COLLECTION",
                "Collection name could not be empty",
            ));
        }

        Ok(Self {
            persistence: Persistence::with_mapper(driver, bucket, Some(collection), mapper),
        })
    }

    /// The underlying bucket-scoped persistence.
    pub fn persistence(&self) -> &Persistence<T, M> {
        &self.persistence
    }

    pub fn collection(&self) -> &str {
        self.persistence.collection().unwrap_or_default()
    }

    /// Builds the storage key of a record id.
    pub fn generate_key(&self, id: &str) -> String {
        format!("{}{}", self.collection(), id)
    }

    /// Scopes `filter` by storage key prefix and collection marker. The prefix
    /// alone would also match collections whose name extends this one.
    fn scope_to_keys(&self, filter: Option<Expr>) -> Option<Expr> {
        let scope = Filter::key_prefix(self.collection());
        let filter = self.persistence.scope_to_collection(filter);
        Some(match filter {
            Some(filter) => scope.and(filter),
            None => scope,
        })
    }

    pub async fn get_page_by_filter(
        &self,
        correlation_id: Option<&str>,
        filter: Option<Expr>,
        paging: Option<PagingParams>,
        sort: Vec<Sort>,
        select: Option<Vec<String>>,
    ) -> PersistenceResult<DataPage<T>> {
        self.persistence
            .get_page_by_filter(correlation_id, filter, paging, sort, select)
            .await
    }

    /// Gets every record of this collection matching `filter`, scoped by storage
    /// key prefix and collection marker.
    pub async fn get_list_by_filter(
        &self,
        correlation_id: Option<&str>,
        filter: Option<Expr>,
        sort: Vec<Sort>,
        select: Option<Vec<String>>,
    ) -> PersistenceResult<Vec<T>> {
        self.persistence
            .get_list_by_filter(correlation_id, self.scope_to_keys(filter), sort, select)
            .await
    }

    pub async fn get_count_by_filter(&self, correlation_id: Option<&str>, filter: Option<Expr>) -> PersistenceResult<usize> {
        self.persistence.get_count_by_filter(correlation_id, filter).await
    }

    pub async fn get_one_random(&self, correlation_id: Option<&str>, filter: Option<Expr>) -> PersistenceResult<Option<T>> {
        self.persistence.get_one_random(correlation_id, filter).await
    }

    /// Deletes every record of this collection matching `filter`, scoped by
    /// storage key prefix and collection marker.
    pub async fn delete_by_filter(&self, correlation_id: Option<&str>, filter: Option<Expr>) -> PersistenceResult<()> {
        self.persistence
            .delete_by_filter(correlation_id, self.scope_to_keys(filter))
            .await
    }

    pub async fn clear(&self, correlation_id: Option<&str>) -> PersistenceResult<()> {
        self.persistence.clear(correlation_id).await
    }

    /// Gets a record by id. A missing key yields `Ok(None)`.
    pub async fn get_one_by_id(&self, correlation_id: Option<&str>, id: &str) -> PersistenceResult<Option<T>> {
        let bucket = self.persistence.bucket().await?;
        let key = self.generate_key(id);

        match bucket.get(&key).await {
            Ok(stored) => {
                let item = self.persistence.to_public(stored.value)?;
                trace!(correlation_id, "Retrieved from {} with id = {}", self.collection(), id);
                Ok(item)
            }
            Err(err) if err.is_key_not_found() => {
                trace!(correlation_id, "Nothing found from {} with id = {}", self.collection(), id);
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Gets the records with the given ids, skipping missing ones.
    ///
    /// Per-key failures are ignored while at least one key was read. When
    /// every key failed the shared error is inspected: a missing key yields an
    /// empty list, anything else is returned.
    pub async fn get_list_by_ids(&self, correlation_id: Option<&str>, ids: &[String]) -> PersistenceResult<Vec<T>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let bucket = self.persistence.bucket().await?;
        let keys = ids.iter().map(|id| self.generate_key(id)).collect::<Vec<_>>();
        let results = bucket.get_multi(&keys).await?;

        if results.iter().all(|(_, result)| result.is_err()) {
            if let Some((_, Err(err))) = results.into_iter().next() {
                if err.is_key_not_found() {
                    trace!(correlation_id, "Retrieved 0 from {}", self.collection());
                    return Ok(Vec::new());
                }
                return Err(err.into());
            }
            return Ok(Vec::new());
        }

        let mut items = Vec::with_capacity(results.len());
        for (_, result) in results {
            if let Ok(stored) = result {
                if let Some(item) = self.persistence.to_public(stored.value)? {
                    items.push(item);
                }
            }
        }

        trace!(correlation_id, "Retrieved {} from {}", items.len(), self.collection());
        Ok(items)
    }

    fn with_id(mut item: T) -> T {
        if item.id().is_none_or(str::is_empty) {
            item.set_id(generate_id());
        }
        item
    }

    /// Inserts a new record, generating an id when it has none.
    ///
    /// Fails with a `KeyExists` driver error when the id is already taken.
    pub async fn create(&self, correlation_id: Option<&str>, item: T) -> PersistenceResult<T> {
        let item = Self::with_id(item);
        let id = item.id().unwrap_or_default().to_string();
        let bucket = self.persistence.bucket().await?;

        bucket
            .insert(&self.generate_key(&id), self.persistence.to_internal(&item)?)
            .await?;

        trace!(correlation_id, "Created in {} with id = {}", self.collection(), id);
        Ok(item)
    }

    /// Creates or replaces a record, generating an id when it has none.
    pub async fn set(&self, correlation_id: Option<&str>, item: T) -> PersistenceResult<T> {
        let item = Self::with_id(item);
        let id = item.id().unwrap_or_default().to_string();
        let bucket = self.persistence.bucket().await?;

        bucket
            .upsert(&self.generate_key(&id), self.persistence.to_internal(&item)?)
            .await?;

        trace!(correlation_id, "Set in {} with id = {}", self.collection(), id);
        Ok(item)
    }

    /// Replaces an existing record. A record without an id is a no-op.
    ///
    /// Fails with a `KeyNotFound` driver error when the record does not exist.
    pub async fn update(&self, correlation_id: Option<&str>, item: T) -> PersistenceResult<Option<T>> {
        let Some(id) = item.id().map(str::to_string) else {
            return Ok(None);
        };
        let bucket = self.persistence.bucket().await?;

        bucket
            .replace(&self.generate_key(&id), self.persistence.to_internal(&item)?, None)
            .await?;

        trace!(correlation_id, "Updated in {} with id = {}", self.collection(), id);
        Ok(Some(item))
    }

    /// Merges `data` into the top-level fields of an existing record. An
    /// empty id is a no-op. The `id` field and the collection marker are never
    /// overwritten.
    ///
    /// The write is guarded by the CAS token read with the record; a
    /// concurrent change surfaces as a `CasMismatch` driver error and is not
    /// retried.
    pub async fn update_partially(
        &self,
        correlation_id: Option<&str>,
        id: &str,
        mut data: Map<String, Value>,
    ) -> PersistenceResult<Option<T>> {
        if id.is_empty() {
            return Ok(None);
        }

        let bucket = self.persistence.bucket().await?;
        let key = self.generate_key(id);
        let stored = bucket.get(&key).await?;

        // Identity and collection marker are owned by the key, not the caller.
        data.remove(ID_FIELD);
        data.remove(COLLECTION_FIELD);

        let mut value = stored.value;
        value
            .as_object_mut()
            .ok_or_else(|| PersistenceError::InvalidDocument(format!("Stored value of {id} is not an object")))?
            .extend(data);

        bucket.replace(&key, value.clone(), Some(stored.cas)).await?;

        trace!(correlation_id, "Updated partially in {} with id = {}", self.collection(), id);
        self.persistence.to_public(value)
    }

    /// Deletes a record and returns it as it was before deletion.
    ///
    /// Fails when the record does not exist. A key that disappears between
    /// the read and the delete is not an error.
    pub async fn delete_by_id(&self, correlation_id: Option<&str>, id: &str) -> PersistenceResult<Option<T>> {
        let bucket = self.persistence.bucket().await?;
        let key = self.generate_key(id);
        let stored = bucket.get(&key).await?;
        let item = self.persistence.to_public(stored.value)?;

        match bucket.remove(&key).await {
            Ok(()) => {}
            Err(err) if err.is_key_not_found() => {}
            Err(err) => return Err(err.into()),
        }

        trace!(correlation_id, "Deleted from {} with id = {}", self.collection(), id);
        Ok(item)
    }

    /// Deletes the records with the given ids.
    ///
    /// All deletes are issued concurrently and awaited; missing keys count as
    /// deleted. The first other error, if any, is returned.
    pub async fn delete_by_ids(&self, correlation_id: Option<&str>, ids: &[String]) -> PersistenceResult<()> {
        let bucket = self.persistence.bucket().await?;
        let keys = ids.iter().map(|id| self.generate_key(id)).collect::<Vec<_>>();

        let results = join_all(keys.iter().map(|key| bucket.remove(key))).await;

        let mut deleted = 0;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(()) => deleted += 1,
                Err(err) if err.is_key_not_found() => {}
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        trace!(correlation_id, "Deleted {} items from {}", deleted, self.collection());

        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

impl<T, M> Configurable for IdentifiablePersistence<T, M>
where
    T: Identifiable,
    M: RecordMapper<T>,
{
    fn configure(&mut self, config: &ConfigParams) -> PersistenceResult<()> {
        self.persistence.configure(config)
    }
}

impl<T, M> Referenceable for IdentifiablePersistence<T, M>
where
    T: Identifiable,
    M: RecordMapper<T>,
{
    fn set_references(&mut self, references: &References) -> PersistenceResult<()> {
        self.persistence.set_references(references)
    }

    fn unset_references(&mut self) {
        self.persistence.unset_references();
    }
}

#[async_trait]
impl<T, M> Opener for IdentifiablePersistence<T, M>
where
    T: Identifiable,
    M: RecordMapper<T>,
{
    async fn is_open(&self) -> bool {
        self.persistence.is_open().await
    }

    async fn open(&self, correlation_id: Option<&str>) -> PersistenceResult<()> {
        self.persistence.open(correlation_id).await
    }

    async fn close(&self, correlation_id: Option<&str>) -> PersistenceResult<()> {
        self.persistence.close(correlation_id).await
    }
}
