//! Main couchlayer crate providing persistence components for Couchbase-style
//! document buckets.
//!
//! This crate is the primary entry point for users of the couchlayer framework.
//! It re-exports the core types from `couchlayer-core` and provides access to
//! the bundled in-memory driver.
//!
//! # Features
//!
//! - **Connection resolution** - Build a cluster URI from configuration, discovery services
//!   and credential stores
//! - **Shared or private connections** - Persistence components borrow a registered
//!   connection or own one of their own
//! - **Logical collections** - Several record types share one bucket, isolated by a
//!   hidden collection marker and key prefixes
//! - **Identity-keyed CRUD** - Create, set, update, partial update and delete by id
//!
//! # Quick Start
//!
//! ```ignore
//! use couchlayer::{prelude::*, memory::InMemoryDriver};
//! use serde::{Serialize, Deserialize};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Dummy {
//!     pub id: Option<String>,
//!     pub key: String,
//!     pub content: String,
//! }
//!
//! impl Identifiable for Dummy {
//!     fn id(&self) -> Option<&str> { self.id.as_deref() }
//!     fn set_id(&mut self, id: String) { self.id = Some(id); }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let driver = InMemoryDriver::builder().with_bucket("test").build().await.unwrap();
//!
//!     let mut dummies = IdentifiablePersistence::<Dummy>::new(Arc::new(driver), Some("test"), "dummies").unwrap();
//!     dummies
//!         .configure(&ConfigParams::from_tuples([
//!             ("connection.host", "localhost"),
//!             ("connection.port", "8091"),
//!         ]))
//!         .unwrap();
//!     dummies.set_references(&References::new()).unwrap();
//!     dummies.open(None).await.unwrap();
//!
//!     let dummy = dummies
//!         .create(None, Dummy { id: None, key: "Key 1".into(), content: "Content 1".into() })
//!         .await
//!         .unwrap();
//!
//!     let page = dummies
//!         .get_page_by_filter(None, Some(Filter::eq("key", "Key 1")), None, vec![], None)
//!         .await
//!         .unwrap();
//!
//!     println!("Found {:?}", page.data);
//!
//!     dummies.delete_by_id(None, dummy.id().unwrap()).await.unwrap();
//!     dummies.close(None).await.unwrap();
//! }
//! ```
//!
//! # Shared Connections
//!
//! A [`StoreConnection`](connection::StoreConnection) registered in [`References`](lifecycle::References)
//! under the `default` key (or the key named by `dependencies.connection`) is
//! borrowed by every persistence wired with those references. Its owner opens
//! and closes it; the persistence components never do.
//!
//! ```ignore
//! use couchlayer::{prelude::*, memory::InMemoryDriver};
//! use std::sync::Arc;
//!
//! let mut connection = StoreConnection::new(Arc::new(driver));
//! connection.configure(&config)?;
//! connection.open(None).await?;
//!
//! let references = References::new().with_connection("default", Arc::new(connection));
//! dummies.set_references(&references)?;
//! dummies.open(None).await?;
//! ```
//!
//! # Drivers
//!
//! - [`memory`] - In-memory driver for development and testing

pub mod prelude;

pub use couchlayer_core::{
    config, connection, discovery, driver, error, identifiable, lifecycle, params, persistence, query, record,
    resolver, statement,
};

// Re-export JSON types for convenience
pub use serde_json;

/// In-memory driver implementations.
pub mod memory {
    pub use couchlayer_memory::{InMemoryDriver, InMemoryDriverBuilder, MemoryBucket, MemoryCluster};
}
