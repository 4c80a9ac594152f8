//! Reference model for operation sequences.
//!
//! [`ModelHarness`] applies operations to a real store and to an in-memory
//! map side by side, then checks that both agree.

use crate::fixtures::{memory_engine, Person};
use crate::generators::StoreOperation;
use segdb_core::{EngineConfig, EntityStore, IndexValue, StorageEngine};
use std::collections::BTreeMap;

/// Runs store operations against an engine and a reference map.
pub struct ModelHarness {
    /// The engine instance.
    pub engine: StorageEngine,
    store: EntityStore<Person>,
    expected: BTreeMap<String, Person>,
}

impl ModelHarness {
    /// Creates a harness over an in-memory engine adjusted by `f`.
    pub fn new(f: impl FnOnce(EngineConfig) -> EngineConfig) -> Self {
        let engine = memory_engine(f);
        let store = engine.store::<Person>().expect("Failed to open store");
        Self {
            engine,
            store,
            expected: BTreeMap::new(),
        }
    }

    /// Returns the store under test.
    pub fn store(&self) -> &EntityStore<Person> {
        &self.store
    }

    /// Applies one operation to both sides.
    pub fn apply(&mut self, op: &StoreOperation) {
        match op {
            StoreOperation::Save(person) => {
                self.store
                    .save(std::slice::from_ref(person))
                    .expect("Failed to save record");
                self.expected.insert(person.id.clone(), person.clone());
            }
            StoreOperation::Delete(key) => {
                let deleted = self
                    .store
                    .delete_one(key)
                    .expect("Failed to delete record");
                let existed = self.expected.remove(key).is_some();
                assert_eq!(deleted, existed, "delete result mismatch for {key}");
            }
            StoreOperation::Compact => {
                self.engine
                    .compact("person")
                    .expect("Failed to compact");
            }
            StoreOperation::Flush => {
                self.engine.flush().expect("Failed to flush");
            }
        }
    }

    /// Applies a sequence of operations.
    pub fn apply_all(&mut self, ops: &[StoreOperation]) {
        for op in ops {
            self.apply(op);
        }
    }

    /// Checks every read path against the reference map.
    pub fn verify(&self) {
        let mut loaded = self.store.load().expect("Failed to load");
        loaded.sort_by(|a, b| a.id.cmp(&b.id));
        let expected: Vec<Person> = self.expected.values().cloned().collect();
        assert_eq!(loaded, expected, "loaded records differ");

        assert_eq!(self.store.count().expect("Failed to count"), expected.len());

        for (key, person) in &self.expected {
            let found = self.store.get(key).expect("Failed to get");
            assert_eq!(found.as_ref(), Some(person), "get mismatch for {key}");
        }

        let mut by_age: BTreeMap<i64, Vec<String>> = BTreeMap::new();
        for person in self.expected.values() {
            by_age.entry(person.age).or_default().push(person.id.clone());
        }
        for (age, keys) in &by_age {
            let mut found: Vec<String> = self
                .store
                .find_by_value("age", &IndexValue::from(*age))
                .expect("Failed to query")
                .into_iter()
                .map(|p| p.id)
                .collect();
            found.sort();
            assert_eq!(&found, keys, "index mismatch for age {age}");
        }

        let all = self
            .store
            .find_by_range("age", &IndexValue::from(i64::MIN), &IndexValue::from(i64::MAX))
            .expect("Failed to query range");
        assert_eq!(all.len(), expected.len(), "range over all ages");
    }

    /// Returns the number of records expected to be live.
    pub fn expected_count(&self) -> usize {
        self.expected.len()
    }
}
