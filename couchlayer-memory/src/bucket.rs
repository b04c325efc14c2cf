//! In-memory bucket: key/value storage with CAS tokens and structured statements.

use async_trait::async_trait;
use mea::rwlock::RwLock;
use serde_json::{Map, Value};
use std::{collections::BTreeMap, sync::Arc};

use couchlayer_core::{
    driver::{BucketHandle, Cas, QueryResult, StoredDocument},
    error::{DriverError, DriverErrorKind, DriverResult},
    query::SortDirection,
    statement::{Statement, StatementKind},
};

use crate::evaluator::{compare_field, lookup, DocumentEvaluator};

/// Documents of one bucket ordered by key, with the last CAS token handed out.
#[derive(Debug, Default)]
pub(crate) struct BucketData {
    /// Documents ordered by key.
    pub documents: BTreeMap<String, StoredDocument>,
    /// Last CAS value handed out by this bucket.
    pub last_cas: u64,
    pub flush_enabled: bool,
}

impl BucketData {
    pub fn new(flush_enabled: bool) -> Self {
        Self { flush_enabled, ..Default::default() }
    }

    fn next_cas(&mut self) -> Cas {
        self.last_cas += 1;
        Cas(self.last_cas)
    }

    fn store(&mut self, key: &str, value: Value) -> Cas {
        let cas = self.next_cas();
        self.documents.insert(key.to_string(), StoredDocument { value, cas });
        cas
    }
}

pub(crate) type SharedBucket = Arc<RwLock<BucketData>>;

/// Handle on a bucket held by an [`InMemoryDriver`](crate::InMemoryDriver).
///
/// Handles opened from the same driver share the underlying documents.
#[derive(Debug, Clone)]
pub struct MemoryBucket {
    name: String,
    data: SharedBucket,
}

impl MemoryBucket {
    pub(crate) fn new(name: &str, data: SharedBucket) -> Self {
        Self { name: name.to_string(), data }
    }

    fn project(document: &Value, fields: &[String]) -> Value {
        let mut row = Map::new();
        for field in fields {
            if let Some(value) = lookup(document, field) {
                row.insert(field.clone(), value.clone());
            }
        }
        Value::Object(row)
    }

    fn matching<'a>(data: &'a BucketData, statement: &Statement) -> DriverResult<Vec<(&'a String, &'a Value)>> {
        let mut matched = Vec::new();
        for (key, document) in &data.documents {
            if DocumentEvaluator::matches(key, &document.value, statement.filter.as_ref())? {
                matched.push((key, &document.value));
            }
        }
        Ok(matched)
    }
}

#[async_trait]
impl BucketHandle for MemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, statement: &Statement) -> DriverResult<QueryResult> {
        if statement.bucket != self.name {
            return Err(DriverError::other(format!(
                "Statement targets bucket {} but was issued on {}",
                statement.bucket, self.name
            )));
        }

        match statement.kind {
            StatementKind::Select => {
                let data = self.data.read().await;
                let mut matched = Self::matching(&data, statement)?;

                // Stable sort keeps key order for ties; apply the least significant field first.
                for sort in statement.sort.iter().rev() {
                    matched.sort_by(|(_, left), (_, right)| match sort.direction {
                        SortDirection::Asc => compare_field(left, right, &sort.field),
                        SortDirection::Desc => compare_field(right, left, &sort.field),
                    });
                }

                let rows = matched
                    .into_iter()
                    .skip(statement.offset.unwrap_or(0))
                    .take(statement.limit.unwrap_or(usize::MAX))
                    .map(|(_, document)| match &statement.select {
                        Some(fields) => Self::project(document, fields),
                        None => document.clone(),
                    })
                    .collect();

                Ok(QueryResult { rows, mutation_count: None })
            }
            StatementKind::Count => {
                let data = self.data.read().await;
                let count = Self::matching(&data, statement)?.len();

                Ok(QueryResult {
                    rows: vec![serde_json::json!({ "count": count })],
                    mutation_count: None,
                })
            }
            StatementKind::Delete => {
                let mut data = self.data.write().await;
                let keys = Self::matching(&data, statement)?
                    .into_iter()
                    .map(|(key, _)| key.clone())
                    .collect::<Vec<_>>();

                for key in &keys {
                    data.documents.remove(key);
                }

                Ok(QueryResult {
                    rows: Vec::new(),
                    mutation_count: Some(keys.len() as u64),
                })
            }
        }
    }

    async fn get(&self, key: &str) -> DriverResult<StoredDocument> {
        self.data
            .read()
            .await
            .documents
            .get(key)
            .cloned()
            .ok_or_else(|| DriverError::key_not_found(key))
    }

    async fn get_multi(&self, keys: &[String]) -> DriverResult<Vec<(String, DriverResult<StoredDocument>)>> {
        let data = self.data.read().await;

        Ok(keys
            .iter()
            .map(|key| {
                let outcome = data
                    .documents
                    .get(key)
                    .cloned()
                    .ok_or_else(|| DriverError::key_not_found(key));
                (key.clone(), outcome)
            })
            .collect())
    }

    async fn insert(&self, key: &str, value: Value) -> DriverResult<Cas> {
        let mut data = self.data.write().await;

        if data.documents.contains_key(key) {
            return Err(DriverError::key_exists(key));
        }

        Ok(data.store(key, value))
    }

    async fn upsert(&self, key: &str, value: Value) -> DriverResult<Cas> {
        Ok(self.data.write().await.store(key, value))
    }

    async fn replace(&self, key: &str, value: Value, cas: Option<Cas>) -> DriverResult<Cas> {
        let mut data = self.data.write().await;

        let current = match data.documents.get(key) {
            Some(document) => document.cas,
            None => return Err(DriverError::key_not_found(key)),
        };

        if let Some(expected) = cas
            && expected != current
        {
            return Err(DriverError::new(
                DriverErrorKind::CasMismatch,
                format!("Document {key} was modified concurrently"),
            ));
        }

        Ok(data.store(key, value))
    }

    async fn remove(&self, key: &str) -> DriverResult<()> {
        match self.data.write().await.documents.remove(key) {
            Some(_) => Ok(()),
            None => Err(DriverError::key_not_found(key)),
        }
    }

    async fn flush(&self) -> DriverResult<()> {
        let mut data = self.data.write().await;

        if !data.flush_enabled {
            return Err(DriverError::other(format!("Flush is disabled for bucket {}", self.name)));
        }

        data.documents.clear();
        Ok(())
    }

    async fn disconnect(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use couchlayer_core::query::{Filter, Sort};
    use serde_json::json;

    fn bucket(flush_enabled: bool) -> MemoryBucket {
        MemoryBucket::new("test", Arc::new(RwLock::new(BucketData::new(flush_enabled))))
    }

    #[tokio::test]
    async fn insert_rejects_existing_key() {
        let bucket = bucket(true);

        bucket.insert("a", json!({ "v": 1 })).await.unwrap();
        let err = bucket.insert("a", json!({ "v": 2 })).await.unwrap_err();

        assert_eq!(err.kind, DriverErrorKind::KeyExists);
    }

    #[tokio::test]
    async fn replace_checks_cas() {
        let bucket = bucket(true);

        let first = bucket.insert("a", json!({ "v": 1 })).await.unwrap();
        let second = bucket.replace("a", json!({ "v": 2 }), Some(first)).await.unwrap();
        let err = bucket.replace("a", json!({ "v": 3 }), Some(first)).await.unwrap_err();

        assert_ne!(first, second);
        assert_eq!(err.kind, DriverErrorKind::CasMismatch);
        assert_eq!(bucket.get("a").await.unwrap().value, json!({ "v": 2 }));
    }

    #[tokio::test]
    async fn replace_and_remove_require_existing_key() {
        let bucket = bucket(true);

        assert!(bucket.replace("a", json!({}), None).await.unwrap_err().is_key_not_found());
        assert!(bucket.remove("a").await.unwrap_err().is_key_not_found());
    }

    #[tokio::test]
    async fn select_filters_sorts_and_pages() {
        let bucket = bucket(true);
        for (key, n) in [("a", 3), ("b", 1), ("c", 2), ("d", 4)] {
            bucket.upsert(key, json!({ "n": n, "odd": n % 2 == 1 })).await.unwrap();
        }

        let statement = Statement::select("test")
            .with_filter(Some(Filter::lt("n", 4)))
            .with_sort(vec![Sort::desc("n")])
            .with_offset(Some(1))
            .with_limit(Some(5))
            .with_select(Some(vec!["n".to_string()]));
        let result = bucket.query(&statement).await.unwrap();

        assert_eq!(result.rows, vec![json!({ "n": 2 }), json!({ "n": 1 })]);
    }

    #[tokio::test]
    async fn count_and_delete_statements() {
        let bucket = bucket(true);
        for key in ["x1", "x2", "y1"] {
            bucket.upsert(key, json!({})).await.unwrap();
        }

        let count = bucket
            .query(&Statement::count("test").with_filter(Some(Filter::key_prefix("x"))))
            .await
            .unwrap();
        assert_eq!(count.rows, vec![json!({ "count": 2 })]);

        let deleted = bucket
            .query(&Statement::delete("test").with_filter(Some(Filter::key_prefix("x"))))
            .await
            .unwrap();
        assert_eq!(deleted.mutation_count, Some(2));
        assert!(bucket.get("y1").await.is_ok());
    }

    #[tokio::test]
    async fn flush_respects_bucket_setting() {
        let enabled = bucket(true);
        enabled.upsert("a", json!({})).await.unwrap();
        enabled.flush().await.unwrap();
        assert!(enabled.get("a").await.unwrap_err().is_key_not_found());

        assert!(bucket(false).flush().await.is_err());
    }
}
