#![allow(dead_code)]

use keyforge::connection::{WriteOperation, WriteRow};
use keyforge::prelude::*;
use keyforge::{GeneratedKeys, RowReader, WriteTarget};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CarRecord {
    pub id: Option<i64>,
    pub model: Option<String>,
    pub version: i64,
    pub stored: bool,
}

pub type Car = Rc<RefCell<CarRecord>>;

pub fn car(model: &str) -> Car {
    Rc::new(RefCell::new(CarRecord {
        model: Some(model.to_string()),
        ..CarRecord::default()
    }))
}

pub fn car_with_id(id: i64, model: &str) -> Car {
    let car = car(model);
    car.borrow_mut().id = Some(id);
    car
}

pub fn cars(count: usize) -> Vec<Car> {
    (1..=count).map(|i| car(&format!("model-{}", i))).collect()
}

pub fn ids(cars: &[Car]) -> Vec<Option<i64>> {
    cars.iter().map(|car| car.borrow().id).collect()
}

pub struct CarMapping {
    table: TableSchema,
}

impl CarMapping {
    /// `car` table whose id is generated by the database.
    pub fn generated() -> Self {
        Self::build(Column::new("id", DataType::Integer).primary_key().auto_generated())
    }

    /// `car` table whose id is supplied on insert.
    pub fn assigned() -> Self {
        Self::build(Column::new("id", DataType::Integer).primary_key())
    }

    fn build(id: Column) -> Self {
        Self {
            table: TableSchema::new(
                "car",
                vec![
                    id,
                    Column::new("model", DataType::Text).not_null(),
                    Column::new("version", DataType::Integer).not_null(),
                ],
            ),
        }
    }

    pub fn schema(&self) -> TableSchema {
        self.table.clone()
    }
}

impl EntityMapping<Car> for CarMapping {
    fn table(&self) -> &TableSchema {
        &self.table
    }

    fn insert_values(&self, car: &Car) -> ColumnValues {
        let car = car.borrow();
        let mut values = ColumnValues::new();
        values.insert("id".into(), car.id.into());
        values.insert("model".into(), car.model.clone().into());
        values.insert("version".into(), car.version.into());
        values
    }

    fn from_row(&self, row: &ColumnValues) -> keyforge::Result<Car> {
        Ok(Rc::new(RefCell::new(CarRecord {
            id: row.get("id").and_then(Value::as_i64),
            model: row.get("model").and_then(Value::as_str).map(str::to_string),
            version: row.get("version").and_then(Value::as_i64).unwrap_or_default(),
            stored: false,
        })))
    }
}

pub fn database(mapping: &CarMapping) -> MemoryDatabase {
    let db = MemoryDatabase::new();
    db.create_table(mapping.schema()).unwrap();
    db
}

pub fn accessor() -> impl IdAccessor<Car, i64> {
    FnIdAccessor::new(
        |car: &Car| car.borrow().id,
        |car: &Car, id: i64| car.borrow_mut().id = Some(id),
    )
}

pub fn assigned_manager() -> IdentifierInsertionManager<Car, i64> {
    IdentifierInsertionManager::AlreadyAssigned(AlreadyAssignedIdentifierManager::new(
        |car: &Car| car.borrow().stored,
        |car: &Car| car.borrow_mut().stored = true,
    ))
}

pub fn generated_manager() -> IdentifierInsertionManager<Car, i64> {
    IdentifierInsertionManager::GeneratedKeys(GeneratedKeysIdentifierManager::new("id"))
}

pub fn versioning() -> OptimisticLockManager<Car> {
    OptimisticLockManager::versioned(
        "version",
        IntegerVersioning::new(
            |car: &Car| car.borrow().version,
            |car: &Car, version| car.borrow_mut().version = version,
        ),
    )
}

pub fn config(batch_size: usize) -> PersisterConfig {
    PersisterConfig::new().batch_size(batch_size)
}

/// Lifecycle events in the order they fired.
#[derive(Clone, Default)]
pub struct EventLog(Rc<RefCell<Vec<String>>>);

impl EventLog {
    pub fn events(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    fn push(&self, event: String) {
        self.0.borrow_mut().push(event);
    }
}

impl InsertListener<Car> for EventLog {
    fn before_insert(&self, entities: &[Car]) {
        self.push(format!("before_insert {}", entities.len()));
    }

    fn after_insert(&self, entities: &[Car]) {
        self.push(format!("after_insert {}", entities.len()));
    }

    fn on_insert_error(&self, entities: &[Car], _error: &PersistError) {
        self.push(format!("on_insert_error {}", entities.len()));
    }
}

impl UpdateListener<Car> for EventLog {
    fn after_update(&self, entities: &[Car]) {
        self.push(format!("after_update {}", entities.len()));
    }

    fn on_update_error(&self, entities: &[Car], _error: &PersistError) {
        self.push(format!("on_update_error {}", entities.len()));
    }
}

impl SelectListener<Car, i64> for EventLog {
    fn before_select(&self, ids: &[i64]) {
        self.push(format!("before_select {}", ids.len()));
    }

    fn after_select(&self, entities: &[Car]) {
        self.push(format!("after_select {}", entities.len()));
    }
}

impl PersistListener<Car> for EventLog {
    fn before_persist(&self, entities: &[Car]) {
        self.push(format!("before_persist {}", entities.len()));
    }

    fn after_persist(&self, entities: &[Car]) {
        self.push(format!("after_persist {}", entities.len()));
    }
}

/// Connection recording the size of every executed batch.
pub struct RecordingConnection {
    pub inner: MemoryConnection,
    batches: Rc<RefCell<Vec<usize>>>,
}

impl RecordingConnection {
    pub fn new(inner: MemoryConnection) -> Self {
        Self {
            inner,
            batches: Rc::default(),
        }
    }

    pub fn batches(&self) -> Vec<usize> {
        self.batches.borrow().clone()
    }
}

struct RecordingWrite<'a> {
    inner: Box<dyn WriteOperation + 'a>,
    batches: Rc<RefCell<Vec<usize>>>,
}

impl WriteOperation for RecordingWrite<'_> {
    fn add_batch(&mut self, row: WriteRow) -> keyforge::Result<()> {
        self.inner.add_batch(row)
    }

    fn execute_batch(&mut self) -> keyforge::Result<Vec<u64>> {
        let pending = self.inner.pending_rows();
        let counts = self.inner.execute_batch()?;
        self.batches.borrow_mut().push(pending);
        Ok(counts)
    }

    fn generated_keys(&mut self) -> keyforge::Result<Vec<Value>> {
        self.inner.generated_keys()
    }

    fn pending_rows(&self) -> usize {
        self.inner.pending_rows()
    }
}

impl WriteTarget for RecordingConnection {
    fn prepare_insert<'a>(
        &'a mut self,
        table: &TableSchema,
        columns: &[String],
        keys: GeneratedKeys,
    ) -> keyforge::Result<Box<dyn WriteOperation + 'a>> {
        let inner = self.inner.prepare_insert(table, columns, keys)?;
        Ok(Box::new(RecordingWrite {
            inner,
            batches: Rc::clone(&self.batches),
        }))
    }

    fn prepare_update<'a>(
        &'a mut self,
        table: &TableSchema,
        set_columns: &[String],
        criteria_columns: &[String],
    ) -> keyforge::Result<Box<dyn WriteOperation + 'a>> {
        let inner = self.inner.prepare_update(table, set_columns, criteria_columns)?;
        Ok(Box::new(RecordingWrite {
            inner,
            batches: Rc::clone(&self.batches),
        }))
    }
}

impl RowReader for RecordingConnection {
    fn select_in(
        &mut self,
        table: &TableSchema,
        column: &str,
        keys: &[Value],
    ) -> keyforge::Result<Vec<ColumnValues>> {
        self.inner.select_in(table, column, keys)
    }
}

impl RollbackObserver for RecordingConnection {
    fn on_rollback(&mut self, listener: Box<dyn RollbackListener>) {
        self.inner.on_rollback(listener)
    }
}
