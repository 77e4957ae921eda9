use super::{IdAccessor, Identifier, KeyReadBack, WriteContext};
use crate::batch::{BatchHook, BatchingIterator, DeadlockRetry};
use crate::connection::{WriteOperation, WriteRow};
use crate::core::{ColumnValues, Result};
use crate::sequence::Sequence;
use log::trace;

/// An entity on its way into an insert batch, with the values it will be
/// written with.
pub struct PendingInsert<'a, C> {
    /// Index of the entity in the caller's input.
    pub position: usize,
    pub entity: &'a C,
    pub values: ColumnValues,
}

/// Identifier work done when an entity is drawn from the driver.
pub(crate) enum DrawAction<'a, I> {
    Nothing,
    /// Pull the next identifier and set it on the entity and in `column`.
    Assign {
        sequence: &'a dyn Sequence<I>,
        column: String,
    },
    /// Record the entity key as being written by this call. An entity whose
    /// key is already recorded is held back from the batch.
    Track(&'a mut WriteContext),
}

/// Entities of the current batch waiting for their generated identifier.
pub(crate) struct ReadBack<'a, C> {
    read_back: KeyReadBack,
    buffer: Vec<&'a C>,
}

impl<'a, C> ReadBack<'a, C> {
    pub(crate) fn new(read_back: KeyReadBack) -> Self {
        Self {
            read_back,
            buffer: Vec::new(),
        }
    }
}

/// Flush hook bound to the single prepared insert of a call.
pub struct InsertHook<'a, C, I> {
    write: Box<dyn WriteOperation + 'a>,
    retry: DeadlockRetry,
    accessor: &'a dyn IdAccessor<C, I>,
    draw: DrawAction<'a, I>,
    read_back: Option<ReadBack<'a, C>>,
    written: usize,
    drawn_repeat: bool,
    repeated: Vec<&'a C>,
}

pub type InsertBatchDriver<'a, C, I> =
    BatchingIterator<std::vec::IntoIter<PendingInsert<'a, C>>, InsertHook<'a, C, I>>;

impl<'a, C, I: Identifier> InsertHook<'a, C, I> {
    pub(crate) fn new(
        write: Box<dyn WriteOperation + 'a>,
        retry: DeadlockRetry,
        accessor: &'a dyn IdAccessor<C, I>,
        draw: DrawAction<'a, I>,
        read_back: Option<ReadBack<'a, C>>,
    ) -> Self {
        Self {
            write,
            retry,
            accessor,
            draw,
            read_back,
            written: 0,
            drawn_repeat: false,
            repeated: Vec::new(),
        }
    }

    /// Adds a drawn entity to the pending batch.
    pub fn add(&mut self, pending: PendingInsert<'a, C>) -> Result<()> {
        if std::mem::take(&mut self.drawn_repeat) {
            self.repeated.push(pending.entity);
            return Ok(());
        }
        if let Some(read_back) = self.read_back.as_mut() {
            read_back.buffer.push(pending.entity);
        }
        self.write.add_batch(WriteRow::insert(pending.values))
    }

    /// Rows written by the flushes so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Entities drawn with a key another entity of the call was already
    /// being written under, in input order.
    pub fn repeated(&self) -> &[&'a C] {
        &self.repeated
    }

    fn apply_generated_keys(&mut self) -> Result<()> {
        let Some(read_back) = self.read_back.as_mut() else {
            return Ok(());
        };
        let returned = self.write.generated_keys()?;
        let keys = read_back.read_back.resolve(returned, read_back.buffer.len())?;
        for (entity, key) in read_back.buffer.drain(..).zip(keys) {
            trace!("generated identifier {}", key);
            self.accessor.set_id(entity, I::from_value(&key)?);
        }
        Ok(())
    }
}

impl<'a, C, I: Identifier> BatchHook<PendingInsert<'a, C>> for InsertHook<'a, C, I> {
    fn on_draw(&mut self, pending: &mut PendingInsert<'a, C>) -> Result<()> {
        match &mut self.draw {
            DrawAction::Nothing => {}
            DrawAction::Assign { sequence, column } => {
                let id = sequence.next()?;
                pending.values.insert(column.clone(), id.to_value());
                self.accessor.set_id(pending.entity, id);
            }
            DrawAction::Track(ctx) => {
                if let Some(id) = self.accessor.id(pending.entity) {
                    let key = id.to_value();
                    if ctx.contains(&key) {
                        trace!("key {} already written in this call", key);
                        self.drawn_repeat = true;
                    } else {
                        ctx.add(key);
                    }
                }
            }
        }
        Ok(())
    }

    fn on_flush(&mut self, _batch_len: usize) -> Result<()> {
        let rows = self.write.pending_rows();
        if rows == 0 {
            return Ok(());
        }
        let write = &mut self.write;
        self.retry.execute("insert batch", || write.execute_batch())?;
        self.written += rows;
        self.apply_generated_keys()
    }
}
