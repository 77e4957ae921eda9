use crate::connection::{SeparateTransactionExecutor, in_new_transaction};
use crate::core::{Column, ColumnValues, DataType, PersistError, Result, TableSchema, Value};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Layout of the table holding one reservation row per sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceStorageOptions {
    pub table: String,
    pub key_column: String,
    pub value_column: String,
}

impl Default for SequenceStorageOptions {
    fn default() -> Self {
        Self {
            table: "sequence_table".to_string(),
            key_column: "sequence_name".to_string(),
            value_column: "next_val".to_string(),
        }
    }
}

impl SequenceStorageOptions {
    pub fn new(table: &str, key_column: &str, value_column: &str) -> Self {
        Self {
            table: table.to_string(),
            key_column: key_column.to_string(),
            value_column: value_column.to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (what, name) in [
            ("sequence table name", &self.table),
            ("sequence key column", &self.key_column),
            ("sequence value column", &self.value_column),
        ] {
            if name.trim().is_empty() {
                return Err(PersistError::ConfigurationError(format!(
                    "{} must not be empty",
                    what
                )));
            }
        }
        if self.key_column == self.value_column {
            return Err(PersistError::ConfigurationError(format!(
                "sequence key and value columns must differ, both are '{}'",
                self.key_column
            )));
        }
        Ok(())
    }

    pub fn table_schema(&self) -> TableSchema {
        TableSchema::new(
            self.table.clone(),
            vec![
                Column::new(self.key_column.clone(), DataType::Text).primary_key(),
                Column::new(self.value_column.clone(), DataType::Integer).not_null(),
            ],
        )
    }
}

/// Durable reservation store behind pooled sequences.
///
/// Every call runs in its own transaction, so a reservation survives a
/// rollback of the caller's transaction and never waits on locks the caller
/// holds. The increment reads the row under a row lock and writes it back in
/// the same unit of work.
pub struct SequencePersister {
    storage: SequenceStorageOptions,
    schema: TableSchema,
    executor: Arc<dyn SeparateTransactionExecutor>,
}

impl SequencePersister {
    pub fn new(
        storage: SequenceStorageOptions,
        executor: Arc<dyn SeparateTransactionExecutor>,
    ) -> Result<Self> {
        storage.validate()?;
        let schema = storage.table_schema();
        Ok(Self {
            storage,
            schema,
            executor,
        })
    }

    pub fn storage(&self) -> &SequenceStorageOptions {
        &self.storage
    }

    pub fn table_schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Highest value reserved so far for `sequence_name`, if any.
    pub fn current(&self, sequence_name: &str) -> Result<Option<i64>> {
        check_name(sequence_name)?;
        let key = Value::from(sequence_name);
        in_new_transaction(self.executor.as_ref(), |rows| {
            match rows.select_for_update(&self.schema, &self.storage.key_column, &key)? {
                Some(row) => self.stored_value(sequence_name, &row).map(Some),
                None => Ok(None),
            }
        })
    }

    /// Reserves the next `pool_size` values and returns the new upper bound.
    ///
    /// An absent row is created holding `seed + pool_size`.
    pub fn reserve(&self, sequence_name: &str, pool_size: i64, seed: i64) -> Result<i64> {
        check_name(sequence_name)?;
        if pool_size <= 0 {
            return Err(PersistError::ConfigurationError(format!(
                "pool size of sequence '{}' must be positive, got {}",
                sequence_name, pool_size
            )));
        }

        let key = Value::from(sequence_name);
        let upper_bound = in_new_transaction(self.executor.as_ref(), |rows| {
            let existing = rows.select_for_update(&self.schema, &self.storage.key_column, &key)?;
            match existing {
                Some(row) => {
                    let next = self
                        .stored_value(sequence_name, &row)?
                        .checked_add(pool_size)
                        .ok_or_else(|| overflow(sequence_name))?;
                    let mut values = ColumnValues::new();
                    values.insert(self.storage.value_column.clone(), Value::Integer(next));
                    let updated =
                        rows.update_row(&self.schema, &self.storage.key_column, &key, values)?;
                    if updated != 1 {
                        return Err(PersistError::ExecutionError(format!(
                            "reservation of sequence '{}' updated {} rows",
                            sequence_name, updated
                        )));
                    }
                    Ok(next)
                }
                None => {
                    let next = seed.checked_add(pool_size).ok_or_else(|| overflow(sequence_name))?;
                    let mut values = ColumnValues::new();
                    values.insert(self.storage.key_column.clone(), key.clone());
                    values.insert(self.storage.value_column.clone(), Value::Integer(next));
                    rows.insert_row(&self.schema, values)?;
                    Ok(next)
                }
            }
        })?;

        debug!(
            "sequence '{}' reserved up to {} in '{}'",
            sequence_name, upper_bound, self.storage.table
        );
        Ok(upper_bound)
    }

    fn stored_value(&self, sequence_name: &str, row: &ColumnValues) -> Result<i64> {
        row.get(&self.storage.value_column)
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                PersistError::ExecutionError(format!(
                    "column '{}' of sequence '{}' does not hold an integer",
                    self.storage.value_column, sequence_name
                ))
            })
    }
}

fn check_name(sequence_name: &str) -> Result<()> {
    if sequence_name.trim().is_empty() {
        return Err(PersistError::ConfigurationError(
            "sequence name must not be empty".into(),
        ));
    }
    Ok(())
}

fn overflow(sequence_name: &str) -> PersistError {
    PersistError::ExecutionError(format!("sequence '{}' overflowed i64", sequence_name))
}
