/// Identifier strategy tests
///
/// Already-assigned, composite-key, before-insert and generated-keys
/// identifiers driven through a persister against the in-memory backend.
mod common;

use common::*;
use keyforge::prelude::*;
use keyforge::{GeneratedKeysSupport, SequenceStorageOptions, Value};
use std::sync::Arc;

#[test]
fn test_already_assigned_marks_exactly_inserted_entities() {
    let mapping = CarMapping::assigned();
    let db = database(&mapping);
    let persister = Persister::new(mapping, accessor(), assigned_manager());

    let inserted: Vec<Car> = (1..=4).map(|i| car_with_id(i, "sedan")).collect();
    let bystander = car_with_id(99, "coupe");

    let mut conn = db.connect();
    persister.insert(&inserted, &mut conn).unwrap();

    assert!(inserted.iter().all(|car| car.borrow().stored));
    assert!(inserted.iter().all(|car| persister.is_persisted(car)));
    assert!(!bystander.borrow().stored);
    assert!(!persister.is_persisted(&bystander));
    assert_eq!(db.row_count("car").unwrap(), 4);
}

#[test]
fn test_already_assigned_requires_the_id() {
    let mapping = CarMapping::assigned();
    let db = database(&mapping);
    let persister = Persister::new(mapping, accessor(), assigned_manager());

    let result = persister.insert(&[car("no id")], &mut db.connect());

    match result {
        Err(PersistError::ValidationError { columns, .. }) => assert_eq!(columns, vec!["id"]),
        other => panic!("expected a validation error, got {:?}", other),
    }
}

#[test]
fn test_generated_keys_follow_insertion_order() {
    let mapping = CarMapping::generated();
    let db = database(&mapping);
    let persister = Persister::new(mapping, accessor(), generated_manager())
        .with_config(config(2))
        .unwrap();
    let mut conn = db.connect();

    // The database hands out 1..=9 to the first cars.
    persister.insert(&cars(9), &mut conn).unwrap();

    let batch = cars(5);
    persister.insert(&batch, &mut conn).unwrap();

    for (i, car) in batch.iter().enumerate() {
        assert_eq!(car.borrow().id, Some(10 + i as i64));
    }
    let stored = persister.select(&[12], &mut conn).unwrap();
    assert_eq!(stored[0].borrow().model.as_deref(), Some("model-3"));
}

#[test]
fn test_highest_only_reconstruction() {
    let mapping = CarMapping::generated();
    let db = MemoryDatabase::with_generated_keys(GeneratedKeysSupport::HighestOnly);
    db.create_table(mapping.schema()).unwrap();
    let persister = Persister::new(mapping, accessor(), generated_manager())
        .with_config(config(3).key_read_back(KeyReadBack::HighestOnly))
        .unwrap();

    let batch = cars(7);
    persister.insert(&batch, &mut db.connect()).unwrap();

    assert_eq!(ids(&batch), (1..=7).map(Some).collect::<Vec<_>>());
}

#[test]
fn test_insertion_order_against_highest_only_target_fails() {
    let mapping = CarMapping::generated();
    let db = MemoryDatabase::with_generated_keys(GeneratedKeysSupport::HighestOnly);
    db.create_table(mapping.schema()).unwrap();
    let persister = Persister::new(mapping, accessor(), generated_manager())
        .with_config(config(3))
        .unwrap();

    let result = persister.insert(&cars(3), &mut db.connect());
    assert!(matches!(result, Err(PersistError::ExecutionError(_))));
}

#[test]
fn test_before_insert_uses_pooled_sequence() {
    let mapping = CarMapping::assigned();
    let db = database(&mapping);
    let storage = SequenceStorageOptions::default();
    db.create_table(storage.table_schema()).unwrap();
    let sequence = PooledHiLoSequence::new(
        PooledHiLoSequenceOptions::new("car_seq", 4),
        SequencePersister::new(storage, Arc::new(db.clone())).unwrap(),
    )
    .unwrap();
    let sequence = Arc::new(sequence);

    let persister = Persister::new(
        mapping,
        accessor(),
        IdentifierInsertionManager::BeforeInsert(BeforeInsertIdentifierManager::new(
            sequence.clone(),
        )),
    )
    .with_config(config(3))
    .unwrap();

    let batch = cars(6);
    persister.insert(&batch, &mut db.connect()).unwrap();

    assert_eq!(ids(&batch), (1..=6).map(Some).collect::<Vec<_>>());
    assert_eq!(sequence.reservation_count(), 2);
    assert_eq!(
        sequence.persister().current("car_seq").unwrap(),
        Some(8),
        "the durable value stays ahead of what was handed out"
    );
    assert!(batch.iter().all(|car| persister.is_persisted(car)));
}

#[test]
fn test_composite_key_persist_updates_repeated_key() {
    let mapping = CarMapping::assigned();
    let db = database(&mapping);
    let persister = Persister::new(mapping, accessor(), composite_manager());

    let first = car_with_id(1, "draft");
    let second = car_with_id(1, "final");
    persister
        .persist(&[first.clone(), second.clone()], &mut db.connect())
        .unwrap();

    let rows = db.rows("car").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("model"), Some(&Value::Text("final".into())));
    assert!(first.borrow().stored);
}

fn composite_manager() -> IdentifierInsertionManager<Car, i64> {
    IdentifierInsertionManager::CompositeKeyAlreadyAssigned(CompositeKeyIdentifierManager::new(
        |car: &Car| car.borrow().stored,
        |car: &Car| car.borrow_mut().stored = true,
    ))
}

#[test]
fn test_composite_key_insert_updates_key_repeated_in_call() {
    let mapping = CarMapping::assigned();
    let db = database(&mapping);
    let events = EventLog::default();
    let persister = Persister::new(mapping, accessor(), composite_manager())
        .with_config(config(2))
        .unwrap()
        .with_insert_listener(events.clone())
        .with_update_listener(events.clone());

    let batch = vec![
        car_with_id(1, "draft"),
        car_with_id(2, "coupe"),
        car_with_id(1, "final"),
    ];
    let mut conn = RecordingConnection::new(db.connect());
    persister.insert(&batch, &mut conn).unwrap();

    assert_eq!(conn.batches(), vec![2, 1], "two inserted rows, then one update");
    assert_eq!(db.row_count("car").unwrap(), 2);
    let reloaded = persister.select(&[1], &mut conn).unwrap();
    assert_eq!(reloaded[0].borrow().model.as_deref(), Some("final"));
    assert!(batch.iter().all(|car| car.borrow().stored));
    assert_eq!(
        events.events(),
        vec!["before_insert 3", "after_update 1", "after_insert 3"]
    );
}

#[test]
fn test_composite_key_repeat_rolls_back_both_versions() {
    let mapping = CarMapping::assigned();
    let db = database(&mapping);
    let persister = Persister::new(mapping, accessor(), composite_manager())
        .with_versioning(versioning());

    let first = car_with_id(1, "draft");
    let second = car_with_id(1, "final");
    let mut conn = db.connect();
    conn.begin().unwrap();
    persister
        .insert(&[first.clone(), second.clone()], &mut conn)
        .unwrap();

    assert_eq!(first.borrow().version, 1);
    assert_eq!(second.borrow().version, 2);
    assert_eq!(db.rows("car").unwrap()[0].get("version"), Some(&Value::Integer(2)));

    conn.rollback().unwrap();
    assert_eq!(db.row_count("car").unwrap(), 0);
    assert_eq!(first.borrow().version, 0);
    assert_eq!(second.borrow().version, 0);
}

#[test]
fn test_select_marks_loaded_entities_persisted() {
    let mapping = CarMapping::assigned();
    let db = database(&mapping);
    let events = EventLog::default();
    let persister = Persister::new(mapping, accessor(), assigned_manager())
        .with_select_listener(events.clone());
    let mut conn = db.connect();

    persister
        .insert(&[car_with_id(7, "a"), car_with_id(8, "b")], &mut conn)
        .unwrap();
    let loaded = persister.select(&[8, 7, 42], &mut conn).unwrap();

    assert_eq!(loaded.len(), 2);
    assert!(loaded.iter().all(|car| car.borrow().stored));
    assert_eq!(events.events(), vec!["before_select 3", "after_select 2"]);
}
