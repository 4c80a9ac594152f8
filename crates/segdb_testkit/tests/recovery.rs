//! Reopening, locking, and index recovery.

use segdb_core::{CoreError, IndexValue, StorageEngine};
use segdb_testkit::prelude::*;
use std::fs;

#[test]
fn data_root_is_locked_while_open() {
    let test_engine = TestEngine::new();
    let second = StorageEngine::open(test_config(test_engine.root()));
    assert!(matches!(second, Err(CoreError::DataDirLocked)));
}

#[test]
fn shutdown_is_idempotent_and_closes() {
    let test_engine = TestEngine::new();
    let store = test_engine.store::<Person>().unwrap();
    test_engine.shutdown().unwrap();
    test_engine.shutdown().unwrap();

    assert!(test_engine.is_closed());
    assert!(matches!(store.load(), Err(CoreError::EngineClosed)));
    assert!(matches!(
        test_engine.store::<Person>(),
        Err(CoreError::EngineClosed)
    ));
}

#[test]
fn index_is_persisted_across_reopen() {
    let test_engine = TestEngine::new();
    test_engine
        .store::<Person>()
        .unwrap()
        .save(&sample_people())
        .unwrap();
    let index_path = test_engine.layout().index_path("person");

    let test_engine = test_engine.reopen();
    assert!(index_path.exists());
    let store = test_engine.store::<Person>().unwrap();
    let entry = store.index_entry("age", "p2").unwrap().unwrap();
    assert_eq!(entry.value, IndexValue::from(45));
    assert_eq!(test_engine.entity_names(), vec!["person".to_string()]);
}

#[test]
fn missing_index_is_rebuilt() {
    let test_engine = TestEngine::new();
    test_engine
        .store::<Person>()
        .unwrap()
        .save(&sample_people())
        .unwrap();
    let index_path = test_engine.layout().index_path("person");
    test_engine.shutdown().unwrap();
    fs::remove_file(&index_path).unwrap();

    let test_engine = test_engine.reopen();
    let store = test_engine.store::<Person>().unwrap();
    assert_eq!(
        store
            .find_by_value("city", &IndexValue::from("London"))
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn corrupt_index_is_rebuilt() {
    let test_engine = TestEngine::new();
    test_engine
        .store::<Person>()
        .unwrap()
        .save(&sample_people())
        .unwrap();
    let index_path = test_engine.layout().index_path("person");
    test_engine.shutdown().unwrap();
    fs::write(&index_path, b"not an index").unwrap();

    let test_engine = test_engine.reopen();
    let store = test_engine.store::<Person>().unwrap();
    assert_eq!(
        store.find_by_value("age", &IndexValue::from(21)).unwrap(),
        vec![sample_people()[2].clone()]
    );
}

#[test]
fn stale_index_is_rebuilt() {
    let test_engine = TestEngine::new();
    let store = test_engine.store::<Person>().unwrap();
    store.save(&sample_people()[..2]).unwrap();
    test_engine.flush().unwrap();
    let index_path = test_engine.layout().index_path("person");
    let old_index = fs::read(&index_path).unwrap();

    // Writes the flushed index never saw.
    store.save(&sample_people()[2..]).unwrap();
    store.delete_one("p1").unwrap();
    drop(store);
    test_engine.shutdown().unwrap();
    fs::write(&index_path, old_index).unwrap();

    let test_engine = test_engine.reopen();
    let store = test_engine.store::<Person>().unwrap();
    assert_eq!(
        store.find_by_value("age", &IndexValue::from(65)).unwrap().len(),
        1
    );
    assert_eq!(
        store.find_by_value("age", &IndexValue::from(36)).unwrap().len(),
        1
    );
    assert_eq!(store.count().unwrap(), 4);
}

#[test]
fn corrupt_metadata_reports_integrity_error() {
    let test_engine = TestEngine::new();
    test_engine
        .store::<Person>()
        .unwrap()
        .save(&sample_people())
        .unwrap();
    let metadata_path = test_engine.layout().metadata_path("person");
    test_engine.shutdown().unwrap();
    fs::write(&metadata_path, b"{ truncated").unwrap();

    let test_engine = test_engine.reopen();
    let err = test_engine.store::<Person>().unwrap_err();
    assert!(err.is_integrity(), "unexpected error: {err}");
}

#[test]
fn auto_flush_persists_without_shutdown() {
    let test_engine = TestEngine::with_config(|config| {
        config.auto_flush_interval(std::time::Duration::from_millis(20))
    });
    test_engine
        .store::<Person>()
        .unwrap()
        .save(&sample_people())
        .unwrap();
    let index_path = test_engine.layout().index_path("person");

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while !index_path.exists() && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    assert!(index_path.exists());
    assert!(test_engine.stats().index_flushes >= 1);
}
