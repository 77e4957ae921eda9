use super::change::{self, Change};
use super::{GeneratedKeysSupport, MemoryDatabase};
use crate::connection::{
    GeneratedKeys, RollbackListener, RollbackObserver, RowReader, WriteOperation, WriteRow,
    WriteTarget,
};
use crate::core::{ColumnValues, PersistError, Result, TableSchema, Value};
use log::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    AutoCommit,
    InTransaction,
}

struct Savepoint {
    name: String,
    change_mark: usize,
    listener_mark: usize,
}

/// Connection on a `MemoryDatabase`.
///
/// Outside a transaction every executed batch is committed immediately.
/// Inside one, applied changes are kept in an undo log until COMMIT or
/// ROLLBACK. Dropping a connection rolls back its open transaction.
pub struct MemoryConnection {
    db: MemoryDatabase,
    state: ConnectionState,
    changes: Vec<Change>,
    savepoints: Vec<Savepoint>,
    listeners: Vec<Box<dyn RollbackListener>>,
}

impl MemoryConnection {
    pub(crate) fn new(db: MemoryDatabase) -> Self {
        Self {
            db,
            state: ConnectionState::AutoCommit,
            changes: Vec::new(),
            savepoints: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn database(&self) -> &MemoryDatabase {
        &self.db
    }

    pub fn is_in_transaction(&self) -> bool {
        self.state == ConnectionState::InTransaction
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn begin(&mut self) -> Result<()> {
        if self.is_in_transaction() {
            return Err(PersistError::TransactionError(
                "Transaction already active".into(),
            ));
        }
        self.state = ConnectionState::InTransaction;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        self.ensure_transaction()?;
        trace!("commit of {} change(s)", self.changes.len());
        self.changes.clear();
        self.savepoints.clear();
        self.listeners.retain(|listener| !listener.is_temporary());
        self.state = ConnectionState::AutoCommit;
        Ok(())
    }

    /// Undoes the transaction. `after_rollback` runs on the most recently
    /// registered listener first.
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_transaction()?;

        for listener in self.listeners.iter_mut() {
            listener.before_rollback();
        }

        let changes = std::mem::take(&mut self.changes);
        debug!("rollback of {} change(s)", changes.len());
        {
            let mut state = self.db.lock()?;
            change::undo_all(changes, &mut state);
        }
        self.savepoints.clear();
        self.state = ConnectionState::AutoCommit;

        for listener in self.listeners.iter_mut().rev() {
            listener.after_rollback();
        }
        self.listeners.retain(|listener| !listener.is_temporary());
        Ok(())
    }

    pub fn savepoint(&mut self, name: &str) -> Result<()> {
        self.ensure_transaction()?;
        self.savepoints.push(Savepoint {
            name: name.to_string(),
            change_mark: self.changes.len(),
            listener_mark: self.listeners.len(),
        });
        Ok(())
    }

    /// Undoes the changes made since `name` was taken. The savepoint itself
    /// stays usable, later ones are released.
    pub fn rollback_to(&mut self, name: &str) -> Result<()> {
        self.ensure_transaction()?;
        let position = self
            .savepoints
            .iter()
            .rposition(|savepoint| savepoint.name == name)
            .ok_or_else(|| {
                PersistError::TransactionError(format!("Savepoint '{}' does not exist", name))
            })?;
        self.savepoints.truncate(position + 1);
        let change_mark = self.savepoints[position].change_mark;
        let listener_mark = self.savepoints[position].listener_mark.min(self.listeners.len());

        for listener in self.listeners[listener_mark..].iter_mut() {
            listener.before_rollback_to(name);
        }

        let changes = self.changes.split_off(change_mark.min(self.changes.len()));
        {
            let mut state = self.db.lock()?;
            change::undo_all(changes, &mut state);
        }

        let mut scoped = self.listeners.split_off(listener_mark);
        for listener in scoped.iter_mut().rev() {
            listener.after_rollback_to(name);
        }
        scoped.retain(|listener| !listener.is_temporary());
        self.listeners.extend(scoped);
        Ok(())
    }

    fn ensure_transaction(&self) -> Result<()> {
        if !self.is_in_transaction() {
            return Err(PersistError::TransactionError("No active transaction".into()));
        }
        Ok(())
    }

    fn prepare<'a>(&'a mut self, table: &TableSchema, kind: OperationKind) -> Result<Box<dyn WriteOperation + 'a>> {
        self.db.lock()?.table(table.name())?;
        Ok(Box::new(MemoryWriteOperation {
            connection: self,
            table: table.name().to_string(),
            kind,
            pending: Vec::new(),
            last_keys: Vec::new(),
        }))
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        if self.is_in_transaction() {
            let _ = self.rollback();
        }
    }
}

impl RollbackObserver for MemoryConnection {
    fn on_rollback(&mut self, listener: Box<dyn RollbackListener>) {
        if !self.is_in_transaction() && listener.is_temporary() {
            trace!("no transaction to roll back, temporary listener dropped");
            return;
        }
        self.listeners.push(listener);
    }
}

impl WriteTarget for MemoryConnection {
    fn prepare_insert<'a>(
        &'a mut self,
        table: &TableSchema,
        columns: &[String],
        keys: GeneratedKeys,
    ) -> Result<Box<dyn WriteOperation + 'a>> {
        self.prepare(
            table,
            OperationKind::Insert {
                columns: columns.to_vec(),
                keys,
            },
        )
    }

    fn prepare_update<'a>(
        &'a mut self,
        table: &TableSchema,
        set_columns: &[String],
        criteria_columns: &[String],
    ) -> Result<Box<dyn WriteOperation + 'a>> {
        self.prepare(
            table,
            OperationKind::Update {
                set_columns: set_columns.to_vec(),
                criteria_columns: criteria_columns.to_vec(),
            },
        )
    }
}

impl RowReader for MemoryConnection {
    fn select_in(
        &mut self,
        table: &TableSchema,
        column: &str,
        keys: &[Value],
    ) -> Result<Vec<ColumnValues>> {
        let state = self.db.lock()?;
        let table = state.table(table.name())?;
        Ok(keys
            .iter()
            .flat_map(|key| table.find(column, key))
            .map(|(_, row)| row.clone())
            .collect())
    }
}

enum OperationKind {
    Insert {
        columns: Vec<String>,
        keys: GeneratedKeys,
    },
    Update {
        set_columns: Vec<String>,
        criteria_columns: Vec<String>,
    },
}

struct MemoryWriteOperation<'a> {
    connection: &'a mut MemoryConnection,
    table: String,
    kind: OperationKind,
    pending: Vec<WriteRow>,
    last_keys: Vec<Value>,
}

impl MemoryWriteOperation<'_> {
    fn bind(columns: &[String], values: &ColumnValues) -> ColumnValues {
        columns
            .iter()
            .filter_map(|column| values.get(column).map(|v| (column.clone(), v.clone())))
            .collect()
    }
}

impl WriteOperation for MemoryWriteOperation<'_> {
    fn add_batch(&mut self, row: WriteRow) -> Result<()> {
        self.pending.push(row);
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<u64>> {
        let connection = &mut *self.connection;
        let mut state = connection.db.lock()?;
        state.begin_batch()?;
        let key_support = state.generated_keys();

        let mut applied = Vec::new();
        let mut counts = Vec::with_capacity(self.pending.len());
        let mut keys = Vec::new();
        let mut failure = None;

        {
            let table = state.table_mut(&self.table)?;
            for row in &self.pending {
                let outcome = match &self.kind {
                    OperationKind::Insert { columns, keys: wanted } => {
                        table.insert(Self::bind(columns, &row.values)).map(|(row_id, generated)| {
                            applied.push(Change::InsertRow {
                                table: self.table.clone(),
                                row_id,
                            });
                            if let GeneratedKeys::Return { column } = wanted {
                                let key = generated.or_else(|| {
                                    row.values.get(column).cloned()
                                });
                                keys.extend(key);
                            }
                            1
                        })
                    }
                    OperationKind::Update {
                        set_columns,
                        criteria_columns,
                    } => table
                        .update_where(
                            &Self::bind(set_columns, &row.values),
                            &Self::bind(criteria_columns, &row.criteria),
                        )
                        .map(|previous| {
                            let count = previous.len() as u64;
                            applied.extend(previous.into_iter().map(|(row_id, old_row)| {
                                Change::UpdateRow {
                                    table: self.table.clone(),
                                    row_id,
                                    old_row,
                                }
                            }));
                            count
                        }),
                };
                match outcome {
                    Ok(count) => counts.push(count),
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                }
            }
        }

        if let Some(err) = failure {
            change::undo_all(applied, &mut state);
            return Err(err);
        }

        trace!("batch of {} row(s) applied to '{}'", counts.len(), self.table);
        if connection.state == ConnectionState::InTransaction {
            connection.changes.extend(applied);
        }
        self.last_keys = match key_support {
            GeneratedKeysSupport::AllRows => keys,
            GeneratedKeysSupport::HighestOnly => keys.into_iter().max().into_iter().collect(),
        };
        self.pending.clear();
        Ok(counts)
    }

    fn generated_keys(&mut self) -> Result<Vec<Value>> {
        Ok(std::mem::take(&mut self.last_keys))
    }

    fn pending_rows(&self) -> usize {
        self.pending.len()
    }
}
