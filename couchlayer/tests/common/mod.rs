#![allow(dead_code)]

pub mod faults;

use couchlayer::{memory::InMemoryDriver, prelude::*};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Rejects unknown fields, so a leaked collection marker fails deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dummy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub key: String,
    pub content: String,
}

impl Dummy {
    pub fn new(key: &str, content: &str) -> Self {
        Self { id: None, key: key.to_string(), content: content.to_string() }
    }

    pub fn with_id(id: &str, key: &str, content: &str) -> Self {
        Self { id: Some(id.to_string()), ..Self::new(key, content) }
    }
}

impl Identifiable for Dummy {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }
}

pub fn connection_config(bucket: &str) -> ConfigParams {
    ConfigParams::from_tuples([
        ("bucket", bucket),
        ("connection.host", "localhost"),
        ("connection.port", "8091"),
    ])
}

pub async fn driver() -> InMemoryDriver {
    InMemoryDriver::builder().with_bucket("test").build().await.unwrap()
}

/// Opens a persistence that owns a private connection to the `test` bucket.
pub async fn open_dummies(driver: &InMemoryDriver, collection: &str) -> IdentifiablePersistence<Dummy> {
    open_dummies_with(Arc::new(driver.clone()), collection).await
}

pub async fn open_dummies_with(driver: Arc<dyn DocumentDriver>, collection: &str) -> IdentifiablePersistence<Dummy> {
    let mut persistence = IdentifiablePersistence::<Dummy>::new(driver, None, collection).unwrap();
    persistence.configure(&connection_config("test")).unwrap();
    persistence.set_references(&References::new()).unwrap();
    persistence.open(None).await.unwrap();
    persistence
}
