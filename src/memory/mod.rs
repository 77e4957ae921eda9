// ============================================================================
// In-Memory Backend
// ============================================================================
//
// A small transactional row store implementing every collaborator contract
// of the write engine. Used by the test suite and the demo binary.
//
// ============================================================================

pub mod change;
pub mod connection;
pub mod table;

use crate::connection::{RowAccess, SeparateTransactionExecutor};
use crate::core::{ColumnValues, PersistError, Result, TableSchema, Value};
use log::debug;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

pub use change::Change;
pub use connection::MemoryConnection;
pub use table::MemoryTable;

/// Which generated keys an executed insert batch exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeneratedKeysSupport {
    /// One key per inserted row, in insertion order.
    #[default]
    AllRows,
    /// Only the highest key of the batch.
    HighestOnly,
}

pub(crate) struct DatabaseState {
    pub(crate) tables: HashMap<String, MemoryTable>,
    generated_keys: GeneratedKeysSupport,
    injected_failures: VecDeque<String>,
    executed_batches: usize,
}

impl DatabaseState {
    pub(crate) fn table_mut(&mut self, name: &str) -> Result<&mut MemoryTable> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| PersistError::TableNotFound(name.to_string()))
    }

    pub(crate) fn table(&self, name: &str) -> Result<&MemoryTable> {
        self.tables
            .get(name)
            .ok_or_else(|| PersistError::TableNotFound(name.to_string()))
    }

    pub(crate) fn generated_keys(&self) -> GeneratedKeysSupport {
        self.generated_keys
    }

    /// Pops the next injected failure, or counts one more executed batch.
    pub(crate) fn begin_batch(&mut self) -> Result<()> {
        if let Some(message) = self.injected_failures.pop_front() {
            return Err(PersistError::ExecutionError(message));
        }
        self.executed_batches += 1;
        Ok(())
    }
}

/// Shared handle on an in-memory database. Clones see the same tables.
#[derive(Clone)]
pub struct MemoryDatabase {
    state: Arc<Mutex<DatabaseState>>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::with_generated_keys(GeneratedKeysSupport::default())
    }

    pub fn with_generated_keys(generated_keys: GeneratedKeysSupport) -> Self {
        Self {
            state: Arc::new(Mutex::new(DatabaseState {
                tables: HashMap::new(),
                generated_keys,
                injected_failures: VecDeque::new(),
                executed_batches: 0,
            })),
        }
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, DatabaseState>> {
        Ok(self.state.lock()?)
    }

    pub fn connect(&self) -> MemoryConnection {
        MemoryConnection::new(self.clone())
    }

    pub fn create_table(&self, schema: TableSchema) -> Result<()> {
        let mut state = self.lock()?;
        let name = schema.name().to_string();
        if state.tables.contains_key(&name) {
            return Err(PersistError::ExecutionError(format!(
                "Table '{}' already exists",
                name
            )));
        }
        debug!("creating table '{}'", name);
        state.tables.insert(name, MemoryTable::new(schema));
        Ok(())
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.lock()
            .map(|state| state.tables.contains_key(name))
            .unwrap_or(false)
    }

    /// Snapshot of the rows of `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Result<Vec<ColumnValues>> {
        let state = self.lock()?;
        Ok(state.table(table)?.rows().cloned().collect())
    }

    pub fn row_count(&self, table: &str) -> Result<usize> {
        Ok(self.lock()?.table(table)?.row_count())
    }

    /// Makes the next `times` batch executions fail with `message`.
    pub fn fail_next_batches(&self, message: &str, times: usize) -> Result<()> {
        let mut state = self.lock()?;
        for _ in 0..times {
            state.injected_failures.push_back(message.to_string());
        }
        Ok(())
    }

    /// Number of batches that reached the tables.
    pub fn executed_batches(&self) -> Result<usize> {
        Ok(self.lock()?.executed_batches)
    }
}

/// Row access inside a unit of work holding the whole database lock.
struct LockedRows<'a> {
    state: &'a mut DatabaseState,
    changes: Vec<Change>,
}

impl RowAccess for LockedRows<'_> {
    fn select_for_update(
        &mut self,
        table: &TableSchema,
        key_column: &str,
        key: &Value,
    ) -> Result<Option<ColumnValues>> {
        let table = self.state.table(table.name())?;
        Ok(table
            .find(key_column, key)
            .into_iter()
            .next()
            .map(|(_, row)| row.clone()))
    }

    fn insert_row(&mut self, table: &TableSchema, values: ColumnValues) -> Result<()> {
        let (row_id, _) = self.state.table_mut(table.name())?.insert(values)?;
        self.changes.push(Change::InsertRow {
            table: table.name().to_string(),
            row_id,
        });
        Ok(())
    }

    fn update_row(
        &mut self,
        table: &TableSchema,
        key_column: &str,
        key: &Value,
        values: ColumnValues,
    ) -> Result<u64> {
        let mut criteria = ColumnValues::new();
        criteria.insert(key_column.to_string(), key.clone());
        let previous = self
            .state
            .table_mut(table.name())?
            .update_where(&values, &criteria)?;
        let updated = previous.len() as u64;
        for (row_id, old_row) in previous {
            self.changes.push(Change::UpdateRow {
                table: table.name().to_string(),
                row_id,
                old_row,
            });
        }
        Ok(updated)
    }
}

impl SeparateTransactionExecutor for MemoryDatabase {
    /// Holds the database lock for the whole unit of work, which makes the
    /// read-then-write of a reservation atomic for every thread sharing this
    /// database.
    fn run_in_new_transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn RowAccess) -> Result<()>,
    ) -> Result<()> {
        let mut state = self.lock()?;
        let mut rows = LockedRows {
            state: &mut *state,
            changes: Vec::new(),
        };
        match work(&mut rows) {
            Ok(()) => Ok(()),
            Err(err) => {
                let changes = std::mem::take(&mut rows.changes);
                change::undo_all(changes, rows.state);
                Err(err)
            }
        }
    }
}
