use crate::core::Value;
use std::collections::HashSet;
use std::fmt;

type Predicate<C> = Box<dyn Fn(&C) -> bool>;
type Marker<C> = Box<dyn Fn(&C)>;

/// Identifiers supplied by the application before the write.
///
/// Nothing is done to the identifier itself, the manager only flips the
/// persisted state through the caller's `mark_persisted` after a successful
/// insert or a read.
pub struct AlreadyAssignedIdentifierManager<C> {
    is_persisted: Predicate<C>,
    mark_persisted: Marker<C>,
}

impl<C> AlreadyAssignedIdentifierManager<C> {
    pub fn new<P, M>(is_persisted: P, mark_persisted: M) -> Self
    where
        P: Fn(&C) -> bool + 'static,
        M: Fn(&C) + 'static,
    {
        Self {
            is_persisted: Box::new(is_persisted),
            mark_persisted: Box::new(mark_persisted),
        }
    }

    pub fn is_persisted(&self, entity: &C) -> bool {
        (self.is_persisted)(entity)
    }

    pub fn mark_all_persisted(&self, entities: &[C]) {
        for entity in entities {
            (self.mark_persisted)(entity);
        }
    }
}

impl<C> fmt::Debug for AlreadyAssignedIdentifierManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AlreadyAssignedIdentifierManager")
    }
}

/// Keys of the entities written by the current call.
///
/// Created empty when a write call starts and cleared when it ends, whether
/// it succeeded or not.
#[derive(Debug, Default)]
pub struct WriteContext {
    writing: HashSet<Value>,
}

impl WriteContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: Value) -> bool {
        self.writing.insert(key)
    }

    pub fn contains(&self, key: &Value) -> bool {
        self.writing.contains(key)
    }

    pub fn len(&self) -> usize {
        self.writing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writing.is_empty()
    }

    pub fn clear(&mut self) {
        self.writing.clear();
    }
}

/// Already-assigned identifiers spanning several values, for which equality
/// alone cannot tell a new entity from one written earlier in the same call.
///
/// An entity counts as persisted when the caller says so or when its key is
/// in the `WriteContext` of the ongoing call.
pub struct CompositeKeyIdentifierManager<C> {
    assigned: AlreadyAssignedIdentifierManager<C>,
}

impl<C> CompositeKeyIdentifierManager<C> {
    pub fn new<P, M>(is_persisted: P, mark_persisted: M) -> Self
    where
        P: Fn(&C) -> bool + 'static,
        M: Fn(&C) + 'static,
    {
        Self {
            assigned: AlreadyAssignedIdentifierManager::new(is_persisted, mark_persisted),
        }
    }

    pub fn is_persisted(&self, entity: &C, key: Option<Value>, ctx: Option<&WriteContext>) -> bool {
        if self.assigned.is_persisted(entity) {
            return true;
        }
        match (key, ctx) {
            (Some(key), Some(ctx)) => ctx.contains(&key),
            _ => false,
        }
    }

    pub fn mark_all_persisted(&self, entities: &[C]) {
        self.assigned.mark_all_persisted(entities);
    }
}

impl<C> fmt::Debug for CompositeKeyIdentifierManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompositeKeyIdentifierManager")
    }
}
