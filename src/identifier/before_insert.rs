use crate::sequence::Sequence;
use std::fmt;
use std::sync::Arc;

/// Identifiers pulled from a sequence as each entity is drawn for insertion.
pub struct BeforeInsertIdentifierManager<I> {
    sequence: Arc<dyn Sequence<I>>,
}

impl<I> BeforeInsertIdentifierManager<I> {
    pub fn new(sequence: Arc<dyn Sequence<I>>) -> Self {
        Self { sequence }
    }

    pub fn sequence(&self) -> &dyn Sequence<I> {
        self.sequence.as_ref()
    }
}

impl<I> Clone for BeforeInsertIdentifierManager<I> {
    fn clone(&self) -> Self {
        Self {
            sequence: Arc::clone(&self.sequence),
        }
    }
}

impl<I> fmt::Debug for BeforeInsertIdentifierManager<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BeforeInsertIdentifierManager")
    }
}
