//! Connection resolution and persistence for Couchbase-style JSON document buckets.
//!
//! This crate is the core of the couchlayer project and provides:
//!
//! - **Configuration** ([`config`], [`params`]) - Ordered dot-path parameters, connection, credential and option sections
//! - **Connection resolution** ([`resolver`], [`discovery`]) - Merging one or many endpoints and credentials into one URI
//! - **Driver abstraction** ([`driver`]) - The narrow capability the persistence layer consumes from a document driver
//! - **Statements** ([`query`], [`statement`]) - Filter expressions, paging and N1QL statement composition
//! - **Store connection** ([`connection`]) - Opening and closing the physical connection and bucket handle
//! - **Persistence** ([`persistence`], [`identifiable`]) - Bucket-scoped queries and id-keyed CRUD
//! - **Lifecycle** ([`lifecycle`]) - Configure, reference and open/close contract
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use couchlayer_core::{config::ConfigParams, identifiable::IdentifiablePersistence, lifecycle::*};
//!
//! let mut dummies = IdentifiablePersistence::<Dummy>::new(driver, Some("test"), "dummies")?;
//! dummies.configure(&ConfigParams::from_tuples([
//!     ("connection.host", "localhost"),
//!     ("connection.port", "8091"),
//!     ("credential.username", "Administrator"),
//!     ("credential.password", "password"),
//!     ("options.auto_create", "true"),
//! ]))?;
//! dummies.set_references(&References::new())?;
//! dummies.open(None).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as couchlayer_core;

pub mod config;
pub mod connection;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod identifiable;
pub mod lifecycle;
pub mod params;
pub mod persistence;
pub mod query;
pub mod record;
pub mod resolver;
pub mod statement;
