use crate::core::{ColumnValues, Result, TableSchema};

/// Maps entities of type `C` to the rows of one table.
pub trait EntityMapping<C> {
    fn table(&self) -> &TableSchema;

    /// Column holding the identifier. Defaults to the primary key of the
    /// table, or `id` when it has none.
    fn id_column(&self) -> &str {
        self.table()
            .primary_key()
            .map(|column| column.name.as_str())
            .unwrap_or("id")
    }

    /// Values of every mapped column, identifier and version included. An
    /// unset value is `Value::Null` or simply absent.
    fn insert_values(&self, entity: &C) -> ColumnValues;

    fn from_row(&self, row: &ColumnValues) -> Result<C>;
}
