use super::{Persister, UpdateExecutor};
use crate::batch::BatchOptions;
use crate::connection::Connection;
use crate::core::{PersistError, Result};
use crate::identifier::{Identifier, PendingInsert, WriteContext};
use log::debug;
use tracing::{Level, event, info_span};

/// Batched insert of a list of entities through one prepared statement.
pub struct InsertExecutor<'p, C, I> {
    persister: &'p Persister<C, I>,
}

impl<'p, C: Clone + 'static, I: Identifier> InsertExecutor<'p, C, I> {
    pub fn new(persister: &'p Persister<C, I>) -> Self {
        Self { persister }
    }

    /// Inserts `entities` in order.
    ///
    /// Every entity is validated before anything is sent: a single missing
    /// required value rejects the whole call with a `ValidationError`.
    pub fn insert<Conn>(&self, entities: &[C], connection: &mut Conn) -> Result<()>
    where
        Conn: Connection + ?Sized,
    {
        let mut ctx = WriteContext::new();
        let result = self.insert_in(entities, connection, &mut ctx);
        ctx.clear();
        result
    }

    /// Inserts `entities` while recording their keys in `ctx`. The caller
    /// owns `ctx` and clears it when its own call ends.
    ///
    /// With composite keys, an entity drawn with a key already in `ctx` is
    /// not inserted again: it is updated once the inserts are done.
    pub(crate) fn insert_in<Conn>(
        &self,
        entities: &[C],
        connection: &mut Conn,
        ctx: &mut WriteContext,
    ) -> Result<()>
    where
        Conn: Connection + ?Sized,
    {
        if entities.is_empty() {
            return Ok(());
        }
        let p = self.persister;
        let span = info_span!(
            "keyforge.insert",
            table = %p.mapping.table().name(),
            strategy = p.identifiers.strategy_name(),
            entities = entities.len()
        );
        let _enter = span.enter();

        p.listeners.before_insert(entities);
        let result = self
            .write_all(entities, &mut *connection, ctx)
            .and_then(|(flushes, repeated)| {
                if !repeated.is_empty() {
                    debug!("updating {} entity(ies) with a repeated key", repeated.len());
                    UpdateExecutor::new(p).update(&repeated, &mut *connection)?;
                }
                Ok(flushes)
            });
        if result.is_ok() {
            p.identifiers.after_insert(entities);
        }

        match result {
            Ok(flushes) => {
                event!(Level::DEBUG, flushes, "insert completed");
                p.listeners.after_insert(entities);
                Ok(())
            }
            Err(err) => {
                event!(Level::ERROR, error = %err, "insert failed");
                p.listeners.on_insert_error(entities, &err);
                Err(err)
            }
        }
    }

    fn write_all<Conn>(
        &self,
        entities: &[C],
        connection: &mut Conn,
        ctx: &mut WriteContext,
    ) -> Result<(usize, Vec<C>)>
    where
        Conn: Connection + ?Sized,
    {
        let p = self.persister;
        let mut pending = self.prepare(entities)?;

        for item in pending.iter_mut() {
            p.lock
                .manage_lock(item.entity, &mut item.values, &mut *connection)?;
        }

        let columns = self.columns();
        let write = connection.prepare_insert(
            p.mapping.table(),
            &columns,
            p.identifiers.generated_keys(),
        )?;
        let mut driver = p.identifiers.build_batch_driver(
            pending,
            write,
            BatchOptions {
                batch_size: p.config.batch_size,
                retry: p.retry,
            },
            &*p.accessor,
            p.mapping.id_column(),
            ctx,
        )?;
        driver.drive(|hook, element| hook.add(element))?;

        debug!(
            "inserted {} row(s) into '{}' in {} batch(es)",
            driver.hook().written(),
            p.mapping.table().name(),
            driver.flush_count()
        );
        let repeated = driver
            .hook()
            .repeated()
            .iter()
            .map(|entity| (*entity).clone())
            .collect();
        Ok((driver.flush_count(), repeated))
    }

    /// Computes and validates the values of every entity.
    fn prepare<'e>(&self, entities: &'e [C]) -> Result<Vec<PendingInsert<'e, C>>> {
        let p = self.persister;
        let table = p.mapping.table();
        let id_column = p.mapping.id_column();

        let mut exempt = Vec::new();
        if p.identifiers.supplies_id() {
            exempt.push(id_column);
        }
        exempt.extend(p.lock.version_column());

        entities
            .iter()
            .enumerate()
            .map(|(position, entity)| {
                let mut values = p.mapping.insert_values(entity);
                if p.identifiers.omits_id_column() {
                    values.remove(id_column);
                }
                let missing = table.missing_required(&values, &exempt);
                if !missing.is_empty() {
                    return Err(PersistError::ValidationError {
                        table: table.name().to_string(),
                        position,
                        columns: missing,
                    });
                }
                Ok(PendingInsert {
                    position,
                    entity,
                    values,
                })
            })
            .collect()
    }

    fn columns(&self) -> Vec<String> {
        let p = self.persister;
        let id_column = p.mapping.id_column();
        let omit_id = p.identifiers.omits_id_column();
        p.mapping
            .table()
            .columns()
            .iter()
            .filter(|column| {
                if column.name == id_column {
                    !omit_id
                } else {
                    !column.auto_generated
                }
            })
            .map(|column| column.name.clone())
            .collect()
    }
}
