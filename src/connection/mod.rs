// ============================================================================
// Collaborator Contracts
// ============================================================================
//
// What the write engine needs from a database connection: prepared batched
// writes (optionally returning generated keys), keyed reads, rollback
// observation and a way to run work in a brand-new transaction.
//
// ============================================================================

pub mod transaction;

use crate::core::{ColumnValues, Result, TableSchema, Value};

pub use transaction::{
    RollbackListener, RollbackObserver, RowAccess, SeparateTransactionExecutor,
    in_new_transaction,
};

/// How a prepared insert must treat database-generated keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedKeys {
    /// Nothing is read back.
    None,
    /// Values of `column` produced by the database are retained after each
    /// executed batch.
    Return { column: String },
}

/// One set of bound parameters added to a batch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WriteRow {
    /// Values written (INSERT columns, UPDATE SET clause).
    pub values: ColumnValues,
    /// Values matched (UPDATE WHERE clause). Empty for inserts.
    pub criteria: ColumnValues,
}

impl WriteRow {
    pub fn insert(values: ColumnValues) -> Self {
        Self {
            values,
            criteria: ColumnValues::new(),
        }
    }

    pub fn update(values: ColumnValues, criteria: ColumnValues) -> Self {
        Self { values, criteria }
    }
}

/// A prepared statement accepting batched parameters.
pub trait WriteOperation {
    fn add_batch(&mut self, row: WriteRow) -> Result<()>;

    /// Sends the pending rows, returning one affected-row count per row.
    /// On failure the pending rows are kept so the batch can be re-executed.
    fn execute_batch(&mut self) -> Result<Vec<u64>>;

    /// Keys generated by the last executed batch. Only meaningful when the
    /// operation was prepared with `GeneratedKeys::Return`.
    fn generated_keys(&mut self) -> Result<Vec<Value>>;

    fn pending_rows(&self) -> usize;
}

pub trait WriteTarget {
    fn prepare_insert<'a>(
        &'a mut self,
        table: &TableSchema,
        columns: &[String],
        keys: GeneratedKeys,
    ) -> Result<Box<dyn WriteOperation + 'a>>;

    fn prepare_update<'a>(
        &'a mut self,
        table: &TableSchema,
        set_columns: &[String],
        criteria_columns: &[String],
    ) -> Result<Box<dyn WriteOperation + 'a>>;
}

pub trait RowReader {
    /// Rows of `table` whose `column` value is one of `keys`.
    fn select_in(&mut self, table: &TableSchema, column: &str, keys: &[Value])
    -> Result<Vec<ColumnValues>>;
}

/// Everything a persister needs from the caller's connection.
pub trait Connection: WriteTarget + RowReader + RollbackObserver {}

impl<T: WriteTarget + RowReader + RollbackObserver> Connection for T {}
