//! Records and the mapping between their public and stored representations.
//!
//! Several logical collections may share one physical bucket. Stored
//! documents therefore carry a hidden collection marker ([`COLLECTION_FIELD`])
//! that is added on write ("internal format") and stripped before a record is
//! handed back to the application ("public format").

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, to_value};

use crate::error::{PersistenceError, PersistenceResult};

/// Name of the hidden field that tags stored documents with their logical collection.
pub const COLLECTION_FIELD: &str = "_c";

/// Name of the stored field holding a record's id.
pub const ID_FIELD: &str = "id";

/// Records addressed by a unique string identifier.
///
/// # Example
///
/// ```ignore
/// use couchlayer_core::record::Identifiable;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct Dummy {
///     pub id: Option<String>,
///     pub key: String,
///     pub content: String,
/// }
///
/// impl Identifiable for Dummy {
///     fn id(&self) -> Option<&str> {
///         self.id.as_deref()
///     }
///
///     fn set_id(&mut self, id: String) {
///         self.id = Some(id);
///     }
/// }
/// ```
pub trait Identifiable: Send + Sync + Clone + 'static {
    fn id(&self) -> Option<&str>;

    fn set_id(&mut self, id: String);
}

/// Generates a new unique record identifier.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Bidirectional conversion between application records and stored JSON.
///
/// Both directions are pure. The collection marker is maintained by the
/// persistence layer around these calls, so mappers never see it.
pub trait RecordMapper<T>: Send + Sync {
    /// Converts a record into the document written to the store.
    fn to_internal(&self, item: &T) -> PersistenceResult<Value>;

    /// Converts a stored document back into a record. `None` means the
    /// document does not map to a record and is dropped from results.
    fn to_public(&self, value: Value) -> PersistenceResult<Option<T>>;
}

/// Serde-based mapper storing records as their JSON serialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonMapper;

impl<T> RecordMapper<T> for JsonMapper
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn to_internal(&self, item: &T) -> PersistenceResult<Value> {
        let value = to_value(item)?;
        if !value.is_object() {
            return Err(PersistenceError::InvalidDocument("Expected a JSON object".into()));
        }

        Ok(value)
    }

    fn to_public(&self, value: Value) -> PersistenceResult<Option<T>> {
        if value.is_null() {
            return Ok(None);
        }

        Ok(Some(from_value(value)?))
    }
}

/// Tags a stored document with its logical collection.
pub fn tag_collection(mut value: Value, collection: Option<&str>) -> PersistenceResult<Value> {
    if let Some(collection) = collection {
        value
            .as_object_mut()
            .ok_or_else(|| PersistenceError::InvalidDocument("Expected a JSON object".into()))?
            .insert(COLLECTION_FIELD.to_string(), Value::String(collection.to_string()));
    }

    Ok(value)
}

/// Removes the collection marker from a stored document.
pub fn strip_collection(mut value: Value) -> Value {
    if let Some(object) = value.as_object_mut() {
        object.remove(COLLECTION_FIELD);
    }

    value
}
