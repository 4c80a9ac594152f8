//! Record traits.
//!
//! A type becomes storable by implementing [`Record`]: it names its entity,
//! exposes a unique key and a modification time, and lists the property
//! values that should be indexed. [`RecordStore`] is the read/write surface
//! handed out per entity.

use crate::error::CoreResult;
use crate::index::IndexValue;
use crate::metadata::PropertySchema;
use crate::types::Timestamp;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A storable record type.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Person { id: String, age: i64, updated: Timestamp }
///
/// impl Record for Person {
///     const ENTITY: &'static str = "person";
///     fn key(&self) -> String { self.id.clone() }
///     fn last_modified(&self) -> Timestamp { self.updated }
///     fn index_values(&self) -> Vec<(String, IndexValue)> {
///         vec![("age".into(), self.age.into())]
///     }
/// }
/// ```
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Entity name; becomes the directory and file prefix on disk.
    const ENTITY: &'static str;

    /// Returns the unique key of this record.
    fn key(&self) -> String;

    /// Returns when this record was last modified.
    fn last_modified(&self) -> Timestamp;

    /// Returns the indexed property values of this record.
    fn index_values(&self) -> Vec<(String, IndexValue)> {
        Vec::new()
    }

    /// Returns the declared property schema of the entity.
    fn schema() -> Vec<PropertySchema> {
        Vec::new()
    }
}

/// Load, save, query, and delete operations over one entity.
pub trait RecordStore<R: Record> {
    /// Returns every live record, latest copy per key.
    fn load(&self) -> CoreResult<Vec<R>>;

    /// Persists records into the active segment, rotating as needed.
    fn save(&self, records: &[R]) -> CoreResult<()>;

    /// Returns live records matching `predicate`.
    fn query(&self, predicate: &dyn Fn(&R) -> bool) -> CoreResult<Vec<R>>;

    /// Returns the number of live records.
    fn count(&self) -> CoreResult<usize>;

    /// Returns the number of live records matching `predicate`.
    fn count_where(&self, predicate: &dyn Fn(&R) -> bool) -> CoreResult<usize> {
        Ok(self.query(predicate)?.len())
    }

    /// Returns true if a live record with `key` exists.
    fn exists(&self, key: &str) -> CoreResult<bool>;

    /// Returns true if any live record matches `predicate`.
    fn exists_where(&self, predicate: &dyn Fn(&R) -> bool) -> CoreResult<bool> {
        Ok(self.count_where(predicate)? > 0)
    }

    /// Soft-deletes records by key. Returns how many were newly deleted.
    fn delete(&self, keys: &[String]) -> CoreResult<usize>;
}
