use crate::core::{ColumnValues, PersistError, Result, TableSchema, Value};
use std::collections::BTreeMap;

pub type RowId = u64;

/// Rows of one table, keyed by a hidden, never reused row id.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    schema: TableSchema,
    rows: BTreeMap<RowId, ColumnValues>,
    next_row_id: RowId,
    last_generated: i64,
}

impl MemoryTable {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            next_row_id: 1,
            last_generated: 0,
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> impl Iterator<Item = &ColumnValues> {
        self.rows.values()
    }

    /// Inserts a row, filling missing auto-generated columns.
    ///
    /// Returns the row id and the generated value, if any.
    pub fn insert(&mut self, mut values: ColumnValues) -> Result<(RowId, Option<Value>)> {
        self.check_known_columns(&values)?;

        let mut generated = None;
        for column in self.schema.columns().iter().filter(|c| c.auto_generated) {
            if values.get(&column.name).map_or(true, Value::is_null) {
                self.last_generated += 1;
                let value = Value::Integer(self.last_generated);
                values.insert(column.name.clone(), value.clone());
                generated = Some(value);
            }
        }

        self.validate(&values)?;
        self.check_unique(&values, None)?;

        let row_id = self.next_row_id;
        self.next_row_id += 1;
        self.rows.insert(row_id, values);
        Ok((row_id, generated))
    }

    /// Applies `values` to every row matching all `criteria`.
    ///
    /// Returns the previous content of each updated row.
    pub fn update_where(
        &mut self,
        values: &ColumnValues,
        criteria: &ColumnValues,
    ) -> Result<Vec<(RowId, ColumnValues)>> {
        self.check_known_columns(values)?;
        self.check_known_columns(criteria)?;

        let matching: Vec<RowId> = self
            .rows
            .iter()
            .filter(|(_, row)| matches_all(row, criteria))
            .map(|(id, _)| *id)
            .collect();

        let mut previous = Vec::with_capacity(matching.len());
        for row_id in matching {
            let Some(old_row) = self.rows.get(&row_id).cloned() else {
                continue;
            };
            let mut new_row = old_row.clone();
            for (column, value) in values {
                new_row.insert(column.clone(), value.clone());
            }
            self.validate(&new_row)?;
            self.check_unique(&new_row, Some(row_id))?;
            self.rows.insert(row_id, new_row);
            previous.push((row_id, old_row));
        }
        Ok(previous)
    }

    pub fn find(&self, column: &str, key: &Value) -> Vec<(RowId, &ColumnValues)> {
        self.rows
            .iter()
            .filter(|(_, row)| row.get(column) == Some(key))
            .map(|(id, row)| (*id, row))
            .collect()
    }

    pub fn remove(&mut self, row_id: RowId) -> Option<ColumnValues> {
        self.rows.remove(&row_id)
    }

    pub fn restore(&mut self, row_id: RowId, row: ColumnValues) {
        self.rows.insert(row_id, row);
    }

    fn check_known_columns(&self, values: &ColumnValues) -> Result<()> {
        match values.keys().find(|name| self.schema.get_column(name).is_none()) {
            Some(unknown) => Err(PersistError::ExecutionError(format!(
                "Column '{}' not found in table '{}'",
                unknown,
                self.schema.name()
            ))),
            None => Ok(()),
        }
    }

    fn validate(&self, row: &ColumnValues) -> Result<()> {
        for column in self.schema.columns() {
            column.validate(row.get(&column.name).unwrap_or(&Value::Null))?;
        }
        Ok(())
    }

    fn check_unique(&self, row: &ColumnValues, ignore: Option<RowId>) -> Result<()> {
        let Some(pk) = self.schema.primary_key() else {
            return Ok(());
        };
        let Some(key) = row.get(&pk.name) else {
            return Ok(());
        };
        let duplicate = self
            .find(&pk.name, key)
            .into_iter()
            .any(|(row_id, _)| Some(row_id) != ignore);
        if duplicate {
            return Err(PersistError::ConstraintViolation(format!(
                "Unique constraint violation: {}.{} = {}",
                self.schema.name(),
                pk.name,
                key
            )));
        }
        Ok(())
    }
}

fn matches_all(row: &ColumnValues, criteria: &ColumnValues) -> bool {
    criteria
        .iter()
        .all(|(column, expected)| row.get(column) == Some(expected))
}
