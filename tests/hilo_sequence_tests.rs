/// Pooled Hi-Lo sequence tests
///
/// Range reservation, resumption from the stored value and concurrent use of
/// one sequence.
use keyforge::prelude::*;
use keyforge::{SequenceStorageOptions, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

fn database(storage: &SequenceStorageOptions) -> MemoryDatabase {
    let db = MemoryDatabase::new();
    db.create_table(storage.table_schema()).unwrap();
    db
}

fn sequence(db: &MemoryDatabase, options: PooledHiLoSequenceOptions) -> PooledHiLoSequence {
    let persister =
        SequencePersister::new(SequenceStorageOptions::default(), Arc::new(db.clone())).unwrap();
    PooledHiLoSequence::new(options, persister).unwrap()
}

#[test]
fn test_first_range_then_exactly_one_reservation() {
    let db = database(&SequenceStorageOptions::default());
    let (seed, pool) = (100, 5);
    let seq = sequence(&db, PooledHiLoSequenceOptions::new("s", pool).initial_value(seed));
    let persister = seq.persister();

    assert_eq!(persister.current("s").unwrap(), Some(seed + pool));

    let first: Vec<i64> = (0..pool).map(|_| seq.next().unwrap()).collect();
    assert_eq!(first, (seed + 1..=seed + pool).collect::<Vec<_>>());
    assert_eq!(seq.reservation_count(), 1);

    assert_eq!(seq.next().unwrap(), seed + pool + 1);
    assert_eq!(seq.reservation_count(), 2);
    assert_eq!(persister.current("s").unwrap(), Some(seed + 2 * pool));
}

#[test]
fn test_resumed_sequence_never_repeats() {
    let db = database(&SequenceStorageOptions::default());
    let options = PooledHiLoSequenceOptions::new("s", 5);

    let first = sequence(&db, options.clone());
    let issued: Vec<i64> = (0..3).map(|_| first.next().unwrap()).collect();
    drop(first);

    let resumed = sequence(&db, options);
    let next: Vec<i64> = (0..7).map(|_| resumed.next().unwrap()).collect();

    assert_eq!(issued, vec![1, 2, 3]);
    assert_eq!(next, (6..=12).collect::<Vec<_>>());
    assert!(next.iter().all(|value| !issued.contains(value)));
}

#[test]
fn test_sequences_share_one_table() {
    let db = database(&SequenceStorageOptions::default());
    let cars = sequence(&db, PooledHiLoSequenceOptions::new("cars", 10));
    let owners = sequence(&db, PooledHiLoSequenceOptions::new("owners", 3));

    assert_eq!(cars.next().unwrap(), 1);
    assert_eq!(owners.next().unwrap(), 1);

    let rows = db.rows("sequence_table").unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().any(|row| row.get("next_val") == Some(&Value::Integer(10))));
    assert!(rows.iter().any(|row| row.get("next_val") == Some(&Value::Integer(3))));
}

#[test]
fn test_custom_storage_layout() {
    let storage = SequenceStorageOptions::new("hilo", "name", "hi");
    let db = database(&storage);
    let persister = SequencePersister::new(storage, Arc::new(db.clone())).unwrap();
    let seq = PooledHiLoSequence::new(PooledHiLoSequenceOptions::new("s", 2), persister).unwrap();

    assert_eq!(seq.next().unwrap(), 1);
    assert_eq!(db.rows("hilo").unwrap()[0].get("hi"), Some(&Value::Integer(2)));
}

#[test]
fn test_concurrent_calls_are_distinct_without_gaps() {
    let db = database(&SequenceStorageOptions::default());
    let seq = Arc::new(sequence(&db, PooledHiLoSequenceOptions::new("s", 7)));
    let threads = 8;
    let per_thread = 125;

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let seq = Arc::clone(&seq);
            thread::spawn(move || {
                (0..per_thread)
                    .map(|_| seq.next().unwrap())
                    .collect::<Vec<i64>>()
            })
        })
        .collect();

    let mut values: Vec<i64> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();
    let distinct: HashSet<i64> = values.iter().copied().collect();
    assert_eq!(distinct.len(), 1000, "values were handed out twice");

    values.sort_unstable();
    assert_eq!(values, (1..=1000).collect::<Vec<_>>());
}

#[test]
fn test_reservation_survives_caller_rollback() {
    let db = database(&SequenceStorageOptions::default());
    let mut conn = db.connect();
    conn.begin().unwrap();

    let seq = sequence(&db, PooledHiLoSequenceOptions::new("s", 10));
    seq.next().unwrap();
    conn.rollback().unwrap();

    assert_eq!(seq.persister().current("s").unwrap(), Some(10));
}
