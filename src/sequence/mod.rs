// ============================================================================
// Identifier Sequences
// ============================================================================
//
// Sources of identifiers assigned before insertion. The pooled Hi-Lo sequence
// reserves ranges of values in a dedicated table, one round trip per range.
//
// ============================================================================

pub mod hilo;
pub mod persister;

use crate::core::Result;
use uuid::Uuid;

pub use hilo::{LongPool, PooledHiLoSequence, PooledHiLoSequenceOptions};
pub use persister::{SequencePersister, SequenceStorageOptions};

/// Produces identifier values, never absent.
pub trait Sequence<I>: Send + Sync {
    fn next(&self) -> Result<I>;
}

/// Random (v4) UUID source.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidSequence;

impl Sequence<Uuid> for UuidSequence {
    fn next(&self) -> Result<Uuid> {
        Ok(Uuid::new_v4())
    }
}

impl<I, S: Sequence<I> + ?Sized> Sequence<I> for std::sync::Arc<S> {
    fn next(&self) -> Result<I> {
        (**self).next()
    }
}
