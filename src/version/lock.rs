use super::VersioningStrategy;
use crate::connection::{RollbackListener, RollbackObserver};
use crate::core::{ColumnValues, Result, Value};
use log::trace;
use std::fmt;
use std::sync::Arc;

pub enum OptimisticLockManager<C> {
    NoVersioning,
    Versioned {
        column: String,
        strategy: Arc<dyn VersioningStrategy<C>>,
    },
}

impl<C> Default for OptimisticLockManager<C> {
    fn default() -> Self {
        Self::NoVersioning
    }
}

impl<C: Clone + 'static> OptimisticLockManager<C> {
    pub fn versioned<S>(column: &str, strategy: S) -> Self
    where
        S: VersioningStrategy<C> + 'static,
    {
        Self::Versioned {
            column: column.to_string(),
            strategy: Arc::new(strategy),
        }
    }

    pub fn version_column(&self) -> Option<&str> {
        match self {
            Self::NoVersioning => None,
            Self::Versioned { column, .. } => Some(column.as_str()),
        }
    }

    /// Bumps the version of `entity`, writes it into `values` and registers
    /// the undo of the bump with `observer`.
    ///
    /// Returns the version the entity had before.
    pub fn manage_lock<O>(
        &self,
        entity: &C,
        values: &mut ColumnValues,
        observer: &mut O,
    ) -> Result<Option<Value>>
    where
        O: RollbackObserver + ?Sized,
    {
        let Self::Versioned { column, strategy } = self else {
            return Ok(None);
        };

        let previous = strategy.current_version(entity);
        let next = strategy.upgrade(entity)?;
        trace!("version {} -> {}", previous, next);
        values.insert(column.clone(), next);

        observer.on_rollback(Box::new(RevertOnRollback {
            entity: entity.clone(),
            previous: Some(previous.clone()),
            strategy: Arc::clone(strategy),
        }));
        Ok(Some(previous))
    }
}

impl<C> fmt::Debug for OptimisticLockManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoVersioning => f.write_str("NoVersioning"),
            Self::Versioned { column, .. } => {
                f.debug_struct("Versioned").field("column", column).finish()
            }
        }
    }
}

/// Restores the version an entity had before a write once the transaction
/// holding that write rolls back. Fires at most once.
pub struct RevertOnRollback<C> {
    entity: C,
    previous: Option<Value>,
    strategy: Arc<dyn VersioningStrategy<C>>,
}

impl<C> RevertOnRollback<C> {
    fn revert(&mut self) {
        if let Some(previous) = self.previous.take() {
            trace!("reverting version to {}", previous);
            self.strategy.revert(&self.entity, previous);
        }
    }
}

impl<C> RollbackListener for RevertOnRollback<C> {
    fn after_rollback(&mut self) {
        self.revert();
    }

    fn after_rollback_to(&mut self, _savepoint: &str) {
        self.revert();
    }

    fn is_temporary(&self) -> bool {
        true
    }
}
