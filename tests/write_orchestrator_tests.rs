/// Write orchestration tests
///
/// Validation before any write, batch boundaries, the deadlock retry and the
/// lifecycle listeners of insert and persist calls.
mod common;

use common::*;
use keyforge::prelude::*;

#[test]
fn test_missing_required_value_aborts_whole_call() {
    let mapping = CarMapping::generated();
    let db = database(&mapping);
    let events = EventLog::default();
    let persister = Persister::new(mapping, accessor(), generated_manager())
        .with_config(config(2))
        .unwrap()
        .with_versioning(versioning())
        .with_insert_listener(events.clone());

    let batch = cars(5);
    batch[3].borrow_mut().model = None;

    let mut conn = db.connect();
    let result = persister.insert(&batch, &mut conn);

    match result {
        Err(PersistError::ValidationError {
            table,
            position,
            columns,
        }) => {
            assert_eq!(table, "car");
            assert_eq!(position, 3);
            assert_eq!(columns, vec!["model"]);
        }
        other => panic!("expected a validation error, got {:?}", other),
    }
    assert_eq!(db.executed_batches().unwrap(), 0);
    assert_eq!(db.row_count("car").unwrap(), 0);
    assert!(batch.iter().all(|car| car.borrow().id.is_none()));
    assert!(batch.iter().all(|car| car.borrow().version == 0));
    assert_eq!(events.events(), vec!["before_insert 5", "on_insert_error 5"]);
}

#[test]
fn test_seven_entities_in_batches_of_three() {
    let mapping = CarMapping::generated();
    let db = database(&mapping);
    let persister = Persister::new(mapping, accessor(), generated_manager())
        .with_config(config(3))
        .unwrap();

    let mut conn = RecordingConnection::new(db.connect());
    let batch = cars(7);
    persister.insert(&batch, &mut conn).unwrap();

    assert_eq!(conn.batches(), vec![3, 3, 1]);
    assert_eq!(db.executed_batches().unwrap(), 3);
    assert_eq!(ids(&batch), (1..=7).map(Some).collect::<Vec<_>>());
}

#[test]
fn test_updates_are_batched_too() {
    let mapping = CarMapping::assigned();
    let db = database(&mapping);
    let persister = Persister::new(mapping, accessor(), assigned_manager())
        .with_config(config(4))
        .unwrap();

    let batch: Vec<Car> = (1..=5).map(|i| car_with_id(i, "sedan")).collect();
    let mut conn = RecordingConnection::new(db.connect());
    persister.insert(&batch, &mut conn).unwrap();
    persister.update(&batch, &mut conn).unwrap();

    assert_eq!(conn.batches(), vec![4, 1, 4, 1]);
}

#[test]
fn test_deadlock_is_retried_once() {
    let mapping = CarMapping::generated();
    let db = database(&mapping);
    let persister = Persister::new(mapping, accessor(), generated_manager())
        .with_config(config(3))
        .unwrap();

    db.fail_next_batches("Deadlock found when trying to get lock", 1)
        .unwrap();
    let batch = cars(4);
    persister.insert(&batch, &mut db.connect()).unwrap();

    assert_eq!(db.row_count("car").unwrap(), 4);
    assert_eq!(ids(&batch), (1..=4).map(Some).collect::<Vec<_>>());
}

#[test]
fn test_second_deadlock_propagates() {
    let mapping = CarMapping::generated();
    let db = database(&mapping);
    let persister = Persister::new(mapping, accessor(), generated_manager());

    db.fail_next_batches("deadlock detected", 2).unwrap();
    let result = persister.insert(&cars(2), &mut db.connect());

    assert!(matches!(result, Err(PersistError::ExecutionError(ref m)) if m == "deadlock detected"));
    assert_eq!(db.row_count("car").unwrap(), 0);
}

#[test]
fn test_other_failures_are_not_retried() {
    let mapping = CarMapping::generated();
    let db = database(&mapping);
    let persister = Persister::new(mapping, accessor(), generated_manager());

    db.fail_next_batches("connection reset", 1).unwrap();
    let result = persister.insert(&cars(2), &mut db.connect());

    assert!(result.is_err());
    assert_eq!(db.executed_batches().unwrap(), 0);
}

#[test]
fn test_retry_can_be_disabled() {
    let mapping = CarMapping::generated();
    let db = database(&mapping);
    let persister = Persister::new(mapping, accessor(), generated_manager())
        .with_config(PersisterConfig::new().retry_on_deadlock(false))
        .unwrap();

    db.fail_next_batches("Deadlock found", 1).unwrap();
    assert!(persister.insert(&cars(1), &mut db.connect()).is_err());
}

#[test]
fn test_failed_insert_in_transaction_can_be_rolled_back() {
    let mapping = CarMapping::assigned();
    let db = database(&mapping);
    let persister = Persister::new(mapping, accessor(), assigned_manager())
        .with_config(config(2))
        .unwrap()
        .with_versioning(versioning());

    let batch = vec![
        car_with_id(1, "a"),
        car_with_id(2, "b"),
        car_with_id(1, "duplicate"),
    ];
    let mut conn = db.connect();
    conn.begin().unwrap();
    let result = persister.insert(&batch, &mut conn);
    assert!(matches!(result, Err(PersistError::ConstraintViolation(_))));
    assert_eq!(db.row_count("car").unwrap(), 2);

    conn.rollback().unwrap();
    assert_eq!(db.row_count("car").unwrap(), 0);
    assert!(batch.iter().all(|car| car.borrow().version == 0));
    assert!(batch.iter().all(|car| !car.borrow().stored));
}

#[test]
fn test_persist_splits_new_and_existing() {
    let mapping = CarMapping::generated();
    let db = database(&mapping);
    let events = EventLog::default();
    let persister = Persister::new(mapping, accessor(), generated_manager())
        .with_insert_listener(events.clone())
        .with_persist_listener(events.clone());
    let mut conn = db.connect();

    let existing = cars(2);
    persister.insert(&existing, &mut conn).unwrap();
    existing[0].borrow_mut().model = Some("renamed".into());

    let mut all = existing.clone();
    all.extend(cars(3));
    persister.persist(&all, &mut conn).unwrap();

    assert_eq!(db.row_count("car").unwrap(), 5);
    assert!(all.iter().all(|car| persister.is_persisted(car)));
    let reloaded = persister.select(&[1], &mut conn).unwrap();
    assert_eq!(reloaded[0].borrow().model.as_deref(), Some("renamed"));
    assert_eq!(
        events.events(),
        vec![
            "before_insert 2",
            "after_insert 2",
            "before_persist 5",
            "before_insert 3",
            "after_insert 3",
            "after_persist 5",
        ]
    );
}

#[test]
fn test_empty_input_writes_nothing() {
    let mapping = CarMapping::generated();
    let db = database(&mapping);
    let persister = Persister::new(mapping, accessor(), generated_manager());

    persister.insert(&[], &mut db.connect()).unwrap();
    persister.update(&[], &mut db.connect()).unwrap();
    assert!(persister.select(&[], &mut db.connect()).unwrap().is_empty());
    assert_eq!(db.executed_batches().unwrap(), 0);
}
