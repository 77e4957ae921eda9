// ============================================================================
// Optimistic Locking
// ============================================================================
//
// Version bumps applied to entities right before they are written, and the
// rollback listeners restoring the previous version when the surrounding
// transaction is rolled back.
//
// ============================================================================

pub mod lock;

use crate::core::{PersistError, Result, Value};
use chrono::{DateTime, Duration, Utc};

pub use lock::{OptimisticLockManager, RevertOnRollback};

/// Reads, bumps and restores the version of an entity.
pub trait VersioningStrategy<C> {
    fn current_version(&self, entity: &C) -> Value;

    /// Moves the entity to its next version in place and returns it.
    fn upgrade(&self, entity: &C) -> Result<Value>;

    fn revert(&self, entity: &C, previous: Value);
}

/// Integer version incremented by one on every write.
pub struct IntegerVersioning<C> {
    get: Box<dyn Fn(&C) -> i64>,
    set: Box<dyn Fn(&C, i64)>,
}

impl<C> IntegerVersioning<C> {
    pub fn new<G, S>(get: G, set: S) -> Self
    where
        G: Fn(&C) -> i64 + 'static,
        S: Fn(&C, i64) + 'static,
    {
        Self {
            get: Box::new(get),
            set: Box::new(set),
        }
    }
}

impl<C> VersioningStrategy<C> for IntegerVersioning<C> {
    fn current_version(&self, entity: &C) -> Value {
        Value::Integer((self.get)(entity))
    }

    fn upgrade(&self, entity: &C) -> Result<Value> {
        let current = (self.get)(entity);
        let next = current.checked_add(1).ok_or_else(|| {
            PersistError::ExecutionError(format!("version {} cannot be incremented", current))
        })?;
        (self.set)(entity, next);
        Ok(Value::Integer(next))
    }

    fn revert(&self, entity: &C, previous: Value) {
        if let Some(previous) = previous.as_i64() {
            (self.set)(entity, previous);
        }
    }
}

/// Timestamp version set to the current time on every write. Two writes in
/// the same microsecond still get increasing versions.
pub struct TimestampVersioning<C> {
    get: Box<dyn Fn(&C) -> Option<DateTime<Utc>>>,
    set: Box<dyn Fn(&C, Option<DateTime<Utc>>)>,
}

impl<C> TimestampVersioning<C> {
    pub fn new<G, S>(get: G, set: S) -> Self
    where
        G: Fn(&C) -> Option<DateTime<Utc>> + 'static,
        S: Fn(&C, Option<DateTime<Utc>>) + 'static,
    {
        Self {
            get: Box::new(get),
            set: Box::new(set),
        }
    }
}

impl<C> VersioningStrategy<C> for TimestampVersioning<C> {
    fn current_version(&self, entity: &C) -> Value {
        (self.get)(entity).into()
    }

    fn upgrade(&self, entity: &C) -> Result<Value> {
        let mut next = Utc::now();
        if let Some(current) = (self.get)(entity) {
            if next <= current {
                next = current + Duration::microseconds(1);
            }
        }
        (self.set)(entity, Some(next));
        Ok(Value::Timestamp(next))
    }

    fn revert(&self, entity: &C, previous: Value) {
        (self.set)(entity, previous.as_timestamp());
    }
}
