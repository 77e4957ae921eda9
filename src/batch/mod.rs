// ============================================================================
// Batching Driver
// ============================================================================
//
// A single-pass iterator that flushes one pending write every N elements.
// Identifier strategies specialize it through `BatchHook`.
//
// ============================================================================

pub mod retry;

use crate::core::{PersistError, Result};
use log::trace;

pub use retry::DeadlockRetry;

/// How many elements go into one flush, and how a failed flush is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub retry: DeadlockRetry,
}

/// Side effects attached to a `BatchingIterator`.
pub trait BatchHook<T> {
    /// Runs on each element as it is drawn from the source, before the caller
    /// sees it.
    fn on_draw(&mut self, _element: &mut T) -> Result<()> {
        Ok(())
    }

    /// Flushes the pending write, which holds `batch_len` elements.
    fn on_flush(&mut self, batch_len: usize) -> Result<()>;
}

/// Yields every element of `source` unchanged and flushes after every
/// `batch_size`-th one.
///
/// The caller must hand each yielded element to the pending write before
/// pulling the next one: the flush of a full batch happens on that next pull,
/// and the flush of the last partial batch happens on the pull that finds the
/// source exhausted. Once an error is yielded the iterator is fused.
pub struct BatchingIterator<I, H> {
    source: I,
    hook: H,
    batch_size: usize,
    pending: usize,
    flushes: usize,
    done: bool,
}

impl<I, H> BatchingIterator<I, H>
where
    I: Iterator,
    H: BatchHook<I::Item>,
{
    pub fn new(source: I, batch_size: usize, hook: H) -> Result<Self> {
        if batch_size == 0 {
            return Err(PersistError::ConfigurationError(
                "batch size must be greater than 0".into(),
            ));
        }
        Ok(Self {
            source,
            hook,
            batch_size,
            pending: 0,
            flushes: 0,
            done: false,
        })
    }

    pub fn hook(&self) -> &H {
        &self.hook
    }

    /// Number of flushes performed so far.
    pub fn flush_count(&self) -> usize {
        self.flushes
    }

    /// Pulls every remaining element, passing each to `consume`.
    pub fn drive<F>(&mut self, mut consume: F) -> Result<()>
    where
        F: FnMut(&mut H, I::Item) -> Result<()>,
    {
        while let Some(step) = self.next() {
            let element = step?;
            consume(&mut self.hook, element)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let batch_len = self.pending;
        self.pending = 0;
        self.flushes += 1;
        trace!("flushing batch #{} of {} element(s)", self.flushes, batch_len);
        self.hook.on_flush(batch_len)
    }

    fn fail(&mut self, err: PersistError) -> Option<Result<I::Item>> {
        self.done = true;
        Some(Err(err))
    }
}

impl<I, H> Iterator for BatchingIterator<I, H>
where
    I: Iterator,
    H: BatchHook<I::Item>,
{
    type Item = Result<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.pending == self.batch_size {
            if let Err(err) = self.flush() {
                return self.fail(err);
            }
        }

        match self.source.next() {
            Some(mut element) => {
                if let Err(err) = self.hook.on_draw(&mut element) {
                    return self.fail(err);
                }
                self.pending += 1;
                Some(Ok(element))
            }
            None => {
                self.done = true;
                if self.pending > 0 {
                    if let Err(err) = self.flush() {
                        return Some(Err(err));
                    }
                }
                None
            }
        }
    }
}
