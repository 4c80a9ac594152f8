//! Property-based test generators.
//!
//! Provides proptest strategies for records, entity names, index values,
//! and operation sequences.

use crate::fixtures::Person;
use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;
use segdb_core::{IndexValue, Timestamp, MAX_ENTITY_NAME_LEN};

/// Strategy for record keys drawn from a small pool, so that operation
/// sequences revisit the same keys.
pub fn key_strategy() -> impl Strategy<Value = String> {
    (0u8..16).prop_map(|n| format!("k{n:02}"))
}

/// Strategy for generating people with arbitrary keys.
pub fn person_strategy() -> impl Strategy<Value = Person> {
    (
        prop::string::string_regex("[a-z]{1,8}[0-9]{0,3}").expect("Invalid regex"),
        person_fields_strategy(),
    )
        .prop_map(|(id, (name, age, city, updated))| Person {
            id,
            name,
            age,
            city,
            updated: Timestamp(updated),
        })
}

fn person_fields_strategy() -> impl Strategy<Value = (String, i64, Option<String>, u64)> {
    (
        prop::string::string_regex("[A-Za-z ]{0,24}").expect("Invalid regex"),
        0i64..120,
        prop::option::of(prop_oneof![
            Just("Oslo".to_string()),
            Just("Lima".to_string()),
            Just("Kyoto".to_string()),
        ]),
        0u64..2_000_000_000_000,
    )
}

/// Strategy for a list of people with distinct keys.
pub fn people_strategy(max: usize) -> impl Strategy<Value = Vec<Person>> {
    prop::collection::btree_map(
        prop::string::string_regex("[a-z0-9]{1,12}").expect("Invalid regex"),
        person_fields_strategy(),
        1..max.max(2),
    )
    .prop_map(|people| {
        people
            .into_iter()
            .map(|(id, (name, age, city, updated))| Person {
                id,
                name,
                age,
                city,
                updated: Timestamp(updated),
            })
            .collect()
    })
}

/// Strategy for valid entity names.
pub fn entity_name_strategy() -> impl Strategy<Value = String> {
    let pattern = format!("[A-Za-z0-9_-]{{1,{MAX_ENTITY_NAME_LEN}}}");
    prop::string::string_regex(&pattern).expect("Invalid regex")
}

/// Strategy for index values of every kind.
pub fn index_value_strategy() -> impl Strategy<Value = IndexValue> {
    prop_oneof![
        Just(IndexValue::Null),
        any::<bool>().prop_map(IndexValue::Bool),
        any::<i64>().prop_map(IndexValue::Integer),
        (-1.0e9f64..1.0e9).prop_map(IndexValue::Float),
        "[a-z]{0,12}".prop_map(IndexValue::Text),
        any::<u64>().prop_map(|ms| IndexValue::Timestamp(Timestamp(ms))),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(IndexValue::Bytes),
    ]
}

/// An operation against the person store.
#[derive(Debug, Clone)]
pub enum StoreOperation {
    /// Save one record.
    Save(Person),
    /// Soft-delete a key.
    Delete(String),
    /// Compact sealed segments.
    Compact,
    /// Persist dirty indexes.
    Flush,
}

/// Strategy for generating store operations.
pub fn store_operation_strategy() -> impl Strategy<Value = StoreOperation> {
    prop_oneof![
        5 => (key_strategy(), person_fields_strategy()).prop_map(
            |(id, (name, age, city, updated))| {
                StoreOperation::Save(Person {
                    id,
                    name,
                    age,
                    city,
                    updated: Timestamp(updated),
                })
            }
        ),
        2 => key_strategy().prop_map(StoreOperation::Delete),
        1 => Just(StoreOperation::Compact),
        1 => Just(StoreOperation::Flush),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<StoreOperation>> {
    prop::collection::vec(store_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
