use crate::core::{ColumnValues, PersistError, Result, TableSchema, Value};

/// Callback bound to the active transaction of a connection.
///
/// Savepoint notifications are only delivered to listeners registered after
/// the savepoint was taken. `after_*` notifications run in reverse order of
/// registration, like an undo log.
pub trait RollbackListener {
    fn before_rollback(&mut self) {}

    fn after_rollback(&mut self) {}

    fn before_rollback_to(&mut self, _savepoint: &str) {}

    fn after_rollback_to(&mut self, _savepoint: &str) {}

    /// Temporary listeners are removed after their first rollback and
    /// discarded on commit.
    fn is_temporary(&self) -> bool {
        false
    }
}

pub trait RollbackObserver {
    fn on_rollback(&mut self, listener: Box<dyn RollbackListener>);
}

/// Row-level operations available to a unit of work.
pub trait RowAccess {
    /// Reads the row and holds it against concurrent writers until the unit
    /// of work ends.
    fn select_for_update(
        &mut self,
        table: &TableSchema,
        key_column: &str,
        key: &Value,
    ) -> Result<Option<ColumnValues>>;

    fn insert_row(&mut self, table: &TableSchema, values: ColumnValues) -> Result<()>;

    fn update_row(
        &mut self,
        table: &TableSchema,
        key_column: &str,
        key: &Value,
        values: ColumnValues,
    ) -> Result<u64>;
}

/// Runs work in a transaction separate from the caller's ambient one.
///
/// The work is committed when it returns `Ok` and rolled back otherwise.
pub trait SeparateTransactionExecutor: Send + Sync {
    fn run_in_new_transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn RowAccess) -> Result<()>,
    ) -> Result<()>;
}

/// Typed wrapper over `run_in_new_transaction`.
pub fn in_new_transaction<T, F>(executor: &dyn SeparateTransactionExecutor, mut work: F) -> Result<T>
where
    F: FnMut(&mut dyn RowAccess) -> Result<T>,
{
    let mut output = None;
    executor.run_in_new_transaction(&mut |rows| {
        output = Some(work(rows)?);
        Ok(())
    })?;
    output.ok_or_else(|| {
        PersistError::TransactionError("separate transaction completed without a result".into())
    })
}
