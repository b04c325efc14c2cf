//! In-memory document driver for couchlayer.
//!
//! This crate provides a thread-safe implementation of the driver traits from
//! `couchlayer-core`. Buckets live in async-aware read-write locks and statements
//! are evaluated directly against the stored JSON, which makes the driver a
//! drop-in for development and tests.
//!
//! # Features
//!
//! - **Cluster management** - Bucket creation, primary indexes and authentication
//! - **Key/value access** - Insert, upsert, replace with CAS, remove and flush
//! - **Statements** - Filtering by field or key prefix, sorting, paging and projections
//!
//! Raw WHERE fragments cannot be evaluated in memory and are rejected with an
//! `Unsupported` driver error.
//!
//! # Quick Start
//!
//! ```ignore
//! use couchlayer_core::driver::DocumentDriverBuilder;
//! use couchlayer_memory::InMemoryDriver;
//!
//! #[tokio::main]
//! async fn main() {
//!     let driver = InMemoryDriver::builder()
//!         .with_bucket("test")
//!         .build()
//!         .await
//!         .unwrap();
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as couchlayer_memory;

pub mod bucket;
pub mod driver;
mod evaluator;

pub use bucket::MemoryBucket;
pub use driver::{InMemoryDriver, InMemoryDriverBuilder, MemoryCluster};
