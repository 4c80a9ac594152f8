//! Test fixtures and engine helpers.
//!
//! Provides scratch engines over temporary data roots and a couple of
//! record types with secondary indexes.

use segdb_core::{
    EncryptionConfig, EngineConfig, IndexValue, PropertySchema, Record, SegmentId,
    StorageEngine, StorageLayout, Timestamp, ValueKind,
};
use segdb_storage::MIN_ITERATIONS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// A person record indexed by age and city.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// Unique key.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Age in years; a required integer property.
    pub age: i64,
    /// Optional city.
    pub city: Option<String>,
    /// Last modification time.
    pub updated: Timestamp,
}

impl Person {
    /// Creates a person without a city.
    pub fn new(id: impl Into<String>, name: impl Into<String>, age: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            age,
            city: None,
            updated: Timestamp::now(),
        }
    }

    /// Sets the city.
    #[must_use]
    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }
}

impl Record for Person {
    const ENTITY: &'static str = "person";

    fn key(&self) -> String {
        self.id.clone()
    }

    fn last_modified(&self) -> Timestamp {
        self.updated
    }

    fn index_values(&self) -> Vec<(String, IndexValue)> {
        let mut values = vec![("age".to_string(), IndexValue::from(self.age))];
        if let Some(city) = &self.city {
            values.push(("city".to_string(), IndexValue::from(city.as_str())));
        }
        values
    }

    fn schema() -> Vec<PropertySchema> {
        vec![
            PropertySchema::indexed("age", ValueKind::Integer).required(),
            PropertySchema::indexed("city", ValueKind::Text),
        ]
    }
}

/// An unindexed record carrying a text payload of chosen size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    /// Unique key.
    pub id: String,
    /// Payload.
    pub body: String,
}

impl Blob {
    /// Creates a blob whose body is `size` bytes long.
    pub fn sized(id: impl Into<String>, size: usize) -> Self {
        Self {
            id: id.into(),
            body: "x".repeat(size),
        }
    }
}

impl Record for Blob {
    const ENTITY: &'static str = "blob";

    fn key(&self) -> String {
        self.id.clone()
    }

    fn last_modified(&self) -> Timestamp {
        Timestamp(0)
    }
}

/// Returns a small fixed set of people.
pub fn sample_people() -> Vec<Person> {
    vec![
        Person::new("p1", "Ada", 36).with_city("London"),
        Person::new("p2", "Grace", 45).with_city("Arlington"),
        Person::new("p3", "Linus", 21).with_city("Helsinki"),
        Person::new("p4", "Barbara", 65),
        Person::new("p5", "Ken", 36).with_city("London"),
    ]
}

/// Returns encryption settings that derive keys quickly.
pub fn test_encryption(passphrase: &str) -> EncryptionConfig {
    EncryptionConfig::new(passphrase).iterations(MIN_ITERATIONS)
}

/// Returns a configuration rooted at `root` with auto-flush disabled.
pub fn test_config(root: &Path) -> EngineConfig {
    EngineConfig::new(root).auto_flush_interval(Duration::ZERO)
}

/// A file-backed test engine with automatic cleanup.
pub struct TestEngine {
    /// The engine instance.
    pub engine: StorageEngine,
    config: EngineConfig,
    _temp_dir: TempDir,
}

impl TestEngine {
    /// Creates an engine over a fresh temporary data root.
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    /// Creates an engine whose configuration is adjusted by `f`.
    pub fn with_config(f: impl FnOnce(EngineConfig) -> EngineConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = f(test_config(temp_dir.path()));
        let engine = StorageEngine::open(config.clone()).expect("Failed to open engine");
        Self {
            engine,
            config,
            _temp_dir: temp_dir,
        }
    }

    /// Creates an encrypted engine.
    pub fn encrypted(passphrase: &str) -> Self {
        Self::with_config(|config| config.encryption(test_encryption(passphrase)))
    }

    /// Returns the data root.
    pub fn root(&self) -> &Path {
        self._temp_dir.path()
    }

    /// Returns the path layout of the data root.
    pub fn layout(&self) -> StorageLayout {
        StorageLayout::new(self.root())
    }

    /// Returns the file path of a segment.
    pub fn segment_path(&self, entity: &str, id: SegmentId) -> PathBuf {
        self.layout().segment_path(entity, id)
    }

    /// Shuts the engine down and opens the same data root again.
    pub fn reopen(self) -> Self {
        let Self {
            engine,
            config,
            _temp_dir,
        } = self;
        engine.shutdown().expect("Failed to shut down engine");
        drop(engine);
        let engine = StorageEngine::open(config.clone()).expect("Failed to reopen engine");
        Self {
            engine,
            config,
            _temp_dir,
        }
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestEngine {
    type Target = StorageEngine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// Opens an in-memory engine with auto-flush disabled.
pub fn memory_engine(f: impl FnOnce(EngineConfig) -> EngineConfig) -> StorageEngine {
    let config = f(EngineConfig::new("/segdb-test").auto_flush_interval(Duration::ZERO));
    StorageEngine::open_in_memory(config).expect("Failed to open in-memory engine")
}

/// Runs a test with a temporary in-memory engine.
///
/// # Example
///
/// ```rust,ignore
/// use segdb_testkit::with_temp_engine;
///
/// #[test]
/// fn my_test() {
///     with_temp_engine(|engine| {
///         let people = engine.store::<Person>().unwrap();
///         // ... test operations
///     });
/// }
/// ```
pub fn with_temp_engine<F, R>(f: F) -> R
where
    F: FnOnce(&StorageEngine) -> R,
{
    let engine = memory_engine(|config| config);
    f(&engine)
}

/// Runs a test with a temporary file-backed engine.
pub fn with_file_engine<F, R>(f: F) -> R
where
    F: FnOnce(&StorageEngine, &Path) -> R,
{
    let test_engine = TestEngine::new();
    f(&test_engine.engine, test_engine.root())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_engine() {
        with_temp_engine(|engine| {
            let people = engine.store::<Person>().unwrap();
            people.save(&sample_people()).unwrap();
            assert_eq!(people.count().unwrap(), 5);
        });
    }

    #[test]
    fn test_file_engine_writes_under_root() {
        with_file_engine(|engine, root| {
            let people = engine.store::<Person>().unwrap();
            people.save(&sample_people()).unwrap();
            assert!(root.join("person").join("person.metadata").exists());
        });
    }

    #[test]
    fn test_reopen_keeps_records() {
        let test_engine = TestEngine::new();
        test_engine
            .store::<Person>()
            .unwrap()
            .save(&sample_people())
            .unwrap();

        let test_engine = test_engine.reopen();
        let people = test_engine.store::<Person>().unwrap();
        assert_eq!(people.count().unwrap(), 5);
    }

    #[test]
    fn test_person_index_values() {
        let person = Person::new("x", "X", 30).with_city("Oslo");
        assert_eq!(
            person.index_values(),
            vec![
                ("age".to_string(), IndexValue::Integer(30)),
                ("city".to_string(), IndexValue::from("Oslo")),
            ]
        );
    }
}
