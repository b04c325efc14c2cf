//! Convenient re-exports of commonly used types from couchlayer.
//!
//! ```ignore
//! use couchlayer::prelude::*;
//! ```

pub use couchlayer_core::{
    config::ConfigParams,
    connection::StoreConnection,
    discovery::{CredentialStore, DiscoveryService, MemoryCredentialStore, MemoryDiscovery},
    driver::{BucketHandle, DocumentDriver, DocumentDriverBuilder, DriverCluster},
    error::{DriverError, DriverErrorKind, PersistenceError, PersistenceResult},
    identifiable::IdentifiablePersistence,
    lifecycle::{Configurable, Opener, References, Referenceable},
    params::{ConnectionOptions, ConnectionParams, CredentialParams},
    persistence::Persistence,
    query::{DataPage, Expr, FieldOp, Filter, PagingParams, QueryVisitor, Sort, SortDirection},
    record::{Identifiable, JsonMapper, RecordMapper},
    resolver::{ConnectionResolver, ResolvedConnection},
    statement::{ScanConsistency, Statement},
};
