// ============================================================================
// Undo Log
// ============================================================================
//
// Every write applied inside a transaction is recorded as a reversible
// change. ROLLBACK undoes them in reverse order, COMMIT forgets them.
//
// ============================================================================

use super::DatabaseState;
use super::table::RowId;
use crate::core::ColumnValues;
use log::trace;

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    InsertRow {
        table: String,
        row_id: RowId,
    },

    UpdateRow {
        table: String,
        row_id: RowId,
        old_row: ColumnValues,
    },
}

impl Change {
    pub fn table_name(&self) -> &str {
        match self {
            Change::InsertRow { table, .. } => table,
            Change::UpdateRow { table, .. } => table,
        }
    }

    pub(crate) fn undo(self, state: &mut DatabaseState) {
        let table_name = self.table_name().to_string();
        let Some(table) = state.tables.get_mut(&table_name) else {
            trace!("table '{}' vanished, nothing to undo", table_name);
            return;
        };
        match self {
            Change::InsertRow { row_id, .. } => {
                table.remove(row_id);
            }
            Change::UpdateRow { row_id, old_row, .. } => {
                table.restore(row_id, old_row);
            }
        }
    }
}

pub(crate) fn undo_all(changes: Vec<Change>, state: &mut DatabaseState) {
    for change in changes.into_iter().rev() {
        change.undo(state);
    }
}
