//! Secondary index queries and soft deletes.

use segdb_core::{IndexValue, Record, RecordStore, SegmentId};
use segdb_testkit::prelude::*;

fn ids(people: &[Person]) -> Vec<String> {
    let mut ids: Vec<String> = people.iter().map(Record::key).collect();
    ids.sort();
    ids
}

#[test]
fn soft_delete_keeps_bytes_but_hides_record() {
    let test_engine = TestEngine::new();
    let store = test_engine.store::<Person>().unwrap();
    store.save(&sample_people()).unwrap();

    assert_eq!(store.delete(&["p4".to_string()]).unwrap(), 1);

    assert!(store
        .find_by_value("age", &IndexValue::from(65))
        .unwrap()
        .is_empty());
    assert_eq!(store.get("p4").unwrap(), None);
    assert!(!store.exists("p4").unwrap());

    let meta = test_engine.metadata("person").unwrap();
    let segment = &meta.segments[0];
    assert!(segment.is_deleted("p4"));
    assert_eq!(segment.record_count, 5);
    let header = test_engine
        .segment_header("person", SegmentId::new(1))
        .unwrap()
        .unwrap();
    assert_eq!(header.record_count, 5);

    let entry = store.index_entry("age", "p4").unwrap().unwrap();
    assert!(entry.deleted);
    assert!(entry.deleted_at.is_some());
}

#[test]
fn range_query_is_inclusive_and_typed() {
    with_temp_engine(|engine| {
        let store = engine.store::<Person>().unwrap();
        store
            .save(&[
                Person::new("a", "A", 18),
                Person::new("b", "B", 25),
                Person::new("c", "C", 40),
                Person::new("d", "D", 65),
            ])
            .unwrap();

        let found = store
            .find_by_range("age", &IndexValue::from(20), &IndexValue::from(50))
            .unwrap();
        assert_eq!(ids(&found), vec!["b", "c"]);

        let edges = store
            .find_by_range("age", &IndexValue::from(25), &IndexValue::from(65))
            .unwrap();
        assert_eq!(ids(&edges), vec!["b", "c", "d"]);

        assert!(store
            .find_by_range("age", &IndexValue::from("20"), &IndexValue::from("50"))
            .unwrap()
            .is_empty());
        assert!(store
            .find_by_range("age", &IndexValue::from(50), &IndexValue::from(20))
            .unwrap()
            .is_empty());
    });
}

#[test]
fn equality_on_optional_property() {
    with_temp_engine(|engine| {
        let store = engine.store::<Person>().unwrap();
        store.save(&sample_people()).unwrap();

        let london = store
            .find_by_value("city", &IndexValue::from("London"))
            .unwrap();
        assert_eq!(ids(&london), vec!["p1", "p5"]);
        assert!(store
            .find_by_value("city", &IndexValue::from("Paris"))
            .unwrap()
            .is_empty());
        assert!(store
            .find_by_value("nickname", &IndexValue::from("x"))
            .unwrap()
            .is_empty());

        let cities = store.unique_values("city").unwrap();
        assert_eq!(cities.len(), 3);
    });
}

#[test]
fn cache_is_invalidated_by_writes() {
    with_temp_engine(|engine| {
        let store = engine.store::<Person>().unwrap();
        store.save(&sample_people()).unwrap();
        let thirty_six = IndexValue::from(36);

        assert_eq!(store.find_by_value("age", &thirty_six).unwrap().len(), 2);
        assert_eq!(store.find_by_value("age", &thirty_six).unwrap().len(), 2);
        assert_eq!(engine.stats().cache_hits, 1);

        store.delete_one("p1").unwrap();
        assert_eq!(store.find_by_value("age", &thirty_six).unwrap().len(), 1);

        store.save(&[Person::new("p6", "Dennis", 36)]).unwrap();
        assert_eq!(store.find_by_value("age", &thirty_six).unwrap().len(), 2);
    });
}

#[test]
fn disabled_cache_still_answers() {
    let engine = memory_engine(|config| config.cache_enabled(false));
    let store = engine.store::<Person>().unwrap();
    store.save(&sample_people()).unwrap();
    let age = IndexValue::from(21);

    assert_eq!(store.find_by_value("age", &age).unwrap().len(), 1);
    assert_eq!(store.find_by_value("age", &age).unwrap().len(), 1);
    assert_eq!(engine.stats().cache_hits, 0);
}

#[test]
fn record_store_trait_predicates() {
    with_temp_engine(|engine| {
        let store = engine.store::<Person>().unwrap();
        let dyn_store: &dyn RecordStore<Person> = &store;
        dyn_store.save(&sample_people()).unwrap();

        assert_eq!(dyn_store.count().unwrap(), 5);
        assert_eq!(dyn_store.count_where(&|p: &Person| p.age > 40).unwrap(), 2);
        assert!(dyn_store.exists_where(&|p: &Person| p.city.is_none()).unwrap());
        assert!(!dyn_store.exists_where(&|p: &Person| p.age > 100).unwrap());
        let young = dyn_store.query(&|p: &Person| p.age < 30).unwrap();
        assert_eq!(ids(&young), vec!["p3"]);
    });
}

#[test]
fn missing_required_age_is_rejected() {
    // A record type sharing the entity but without the required property.
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    struct Ageless {
        id: String,
    }

    impl Record for Ageless {
        const ENTITY: &'static str = "person";

        fn key(&self) -> String {
            self.id.clone()
        }

        fn last_modified(&self) -> segdb_core::Timestamp {
            segdb_core::Timestamp(0)
        }

        fn schema() -> Vec<segdb_core::PropertySchema> {
            Person::schema()
        }
    }

    with_temp_engine(|engine| {
        let store = engine.store::<Ageless>().unwrap();
        let err = store.save(&[Ageless { id: "x".into() }]).unwrap_err();
        assert!(matches!(err, segdb_core::CoreError::InvalidOperation { .. }));
    });
}
