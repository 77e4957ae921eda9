use super::Persister;
use crate::batch::{BatchHook, BatchingIterator, DeadlockRetry};
use crate::connection::{Connection, WriteOperation, WriteRow};
use crate::core::{ColumnValues, PersistError, Result};
use crate::identifier::Identifier;
use log::debug;
use tracing::{Level, event, info_span};

struct PendingUpdate {
    position: usize,
    values: ColumnValues,
    criteria: ColumnValues,
}

/// Flush hook checking that every updated row matched.
struct UpdateHook<'a> {
    write: Box<dyn WriteOperation + 'a>,
    retry: DeadlockRetry,
    table: &'a str,
    positions: Vec<usize>,
}

impl UpdateHook<'_> {
    fn add(&mut self, pending: PendingUpdate) -> Result<()> {
        self.positions.push(pending.position);
        self.write
            .add_batch(WriteRow::update(pending.values, pending.criteria))
    }
}

impl BatchHook<PendingUpdate> for UpdateHook<'_> {
    fn on_flush(&mut self, _batch_len: usize) -> Result<()> {
        let write = &mut self.write;
        let counts = self.retry.execute("update batch", || write.execute_batch())?;
        for (position, count) in self.positions.drain(..).zip(counts) {
            if count == 0 {
                return Err(PersistError::StaleObjectError {
                    table: self.table.to_string(),
                    position,
                });
            }
        }
        Ok(())
    }
}

/// Batched update keyed by identifier and, when versioned, by the version the
/// entity had before the update.
pub struct UpdateExecutor<'p, C, I> {
    persister: &'p Persister<C, I>,
}

impl<'p, C: Clone + 'static, I: Identifier> UpdateExecutor<'p, C, I> {
    pub fn new(persister: &'p Persister<C, I>) -> Self {
        Self { persister }
    }

    /// Updates `entities` in order. A row that no longer matches its
    /// identifier and version fails the call with a `StaleObjectError`.
    pub fn update<Conn>(&self, entities: &[C], connection: &mut Conn) -> Result<()>
    where
        Conn: Connection + ?Sized,
    {
        if entities.is_empty() {
            return Ok(());
        }
        let p = self.persister;
        let span = info_span!(
            "keyforge.update",
            table = %p.mapping.table().name(),
            entities = entities.len()
        );
        let _enter = span.enter();

        p.listeners.before_update(entities);
        match self.write_all(entities, connection) {
            Ok(flushes) => {
                event!(Level::DEBUG, flushes, "update completed");
                p.listeners.after_update(entities);
                Ok(())
            }
            Err(err) => {
                event!(Level::ERROR, error = %err, "update failed");
                p.listeners.on_update_error(entities, &err);
                Err(err)
            }
        }
    }

    fn write_all<Conn>(&self, entities: &[C], connection: &mut Conn) -> Result<usize>
    where
        Conn: Connection + ?Sized,
    {
        let p = self.persister;
        let table = p.mapping.table();
        let id_column = p.mapping.id_column();
        let version_column = p.lock.version_column();
        let mut pending = self.prepare(entities)?;

        for (entity, item) in entities.iter().zip(pending.iter_mut()) {
            let previous = p.lock.manage_lock(entity, &mut item.values, &mut *connection)?;
            if let (Some(column), Some(previous)) = (version_column, previous) {
                item.criteria.insert(column.to_string(), previous);
            }
        }

        let set_columns: Vec<String> = table
            .columns()
            .iter()
            .filter(|column| column.name != id_column && !column.auto_generated)
            .map(|column| column.name.clone())
            .collect();
        let mut criteria_columns = vec![id_column.to_string()];
        criteria_columns.extend(version_column.map(str::to_string));

        let write = connection.prepare_update(table, &set_columns, &criteria_columns)?;
        let hook = UpdateHook {
            write,
            retry: p.retry,
            table: table.name(),
            positions: Vec::new(),
        };
        let mut driver = BatchingIterator::new(pending.into_iter(), p.config.batch_size, hook)?;
        driver.drive(|hook, element| hook.add(element))?;

        debug!(
            "updated {} row(s) of '{}' in {} batch(es)",
            entities.len(),
            table.name(),
            driver.flush_count()
        );
        Ok(driver.flush_count())
    }

    fn prepare(&self, entities: &[C]) -> Result<Vec<PendingUpdate>> {
        let p = self.persister;
        let table = p.mapping.table();
        let id_column = p.mapping.id_column();

        let mut exempt = vec![id_column];
        exempt.extend(p.lock.version_column());

        entities
            .iter()
            .enumerate()
            .map(|(position, entity)| {
                let Some(id) = p.accessor.id(entity) else {
                    return Err(PersistError::ValidationError {
                        table: table.name().to_string(),
                        position,
                        columns: vec![id_column.to_string()],
                    });
                };
                let mut values = p.mapping.insert_values(entity);
                values.remove(id_column);
                let missing = table.missing_required(&values, &exempt);
                if !missing.is_empty() {
                    return Err(PersistError::ValidationError {
                        table: table.name().to_string(),
                        position,
                        columns: missing,
                    });
                }
                let mut criteria = ColumnValues::new();
                criteria.insert(id_column.to_string(), id.to_value());
                Ok(PendingUpdate {
                    position,
                    values,
                    criteria,
                })
            })
            .collect()
    }
}
