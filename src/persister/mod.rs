// ============================================================================
// Write Orchestration
// ============================================================================
//
// The persister of one entity type: it computes and validates column values,
// bumps versions, and drives the identifier strategy's batching driver for
// inserts. Updates, persist calls and keyed reads go through the same
// mapping and lifecycle listeners.
//
// ============================================================================

pub mod insert;
pub mod mapping;
pub mod update;

use crate::batch::DeadlockRetry;
use crate::config::PersisterConfig;
use crate::connection::Connection;
use crate::core::Result;
use crate::identifier::{IdAccessor, Identifier, IdentifierInsertionManager, WriteContext};
use crate::listener::{InsertListener, Listeners, PersistListener, SelectListener, UpdateListener};
use crate::version::OptimisticLockManager;
use tracing::{Level, event, info_span};

pub use insert::InsertExecutor;
pub use mapping::EntityMapping;
pub use update::UpdateExecutor;

pub struct Persister<C, I> {
    mapping: Box<dyn EntityMapping<C>>,
    accessor: Box<dyn IdAccessor<C, I>>,
    identifiers: IdentifierInsertionManager<C, I>,
    lock: OptimisticLockManager<C>,
    listeners: Listeners<C, I>,
    config: PersisterConfig,
    retry: DeadlockRetry,
}

impl<C: Clone + 'static, I: Identifier> Persister<C, I> {
    /// Creates a persister with the default configuration and no versioning.
    pub fn new<M, A>(mapping: M, accessor: A, identifiers: IdentifierInsertionManager<C, I>) -> Self
    where
        M: EntityMapping<C> + 'static,
        A: IdAccessor<C, I> + 'static,
    {
        let config = PersisterConfig::default();
        Self {
            mapping: Box::new(mapping),
            accessor: Box::new(accessor),
            identifiers,
            lock: OptimisticLockManager::NoVersioning,
            listeners: Listeners::default(),
            retry: DeadlockRetry::new(config.retry_on_deadlock),
            config,
        }
    }

    /// Applies a validated configuration.
    pub fn with_config(mut self, config: PersisterConfig) -> Result<Self> {
        config.validate()?;
        if let IdentifierInsertionManager::GeneratedKeys(manager) = &mut self.identifiers {
            *manager = manager.clone().read_back(config.key_read_back);
        }
        self.retry = DeadlockRetry::new(config.retry_on_deadlock);
        self.config = config;
        Ok(self)
    }

    pub fn with_versioning(mut self, lock: OptimisticLockManager<C>) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_insert_listener(mut self, listener: impl InsertListener<C> + 'static) -> Self {
        self.listeners.add_insert(Box::new(listener));
        self
    }

    pub fn with_update_listener(mut self, listener: impl UpdateListener<C> + 'static) -> Self {
        self.listeners.add_update(Box::new(listener));
        self
    }

    pub fn with_select_listener(mut self, listener: impl SelectListener<C, I> + 'static) -> Self {
        self.listeners.add_select(Box::new(listener));
        self
    }

    pub fn with_persist_listener(mut self, listener: impl PersistListener<C> + 'static) -> Self {
        self.listeners.add_persist(Box::new(listener));
        self
    }

    pub fn mapping(&self) -> &dyn EntityMapping<C> {
        &*self.mapping
    }

    pub fn identifiers(&self) -> &IdentifierInsertionManager<C, I> {
        &self.identifiers
    }

    pub fn lock_manager(&self) -> &OptimisticLockManager<C> {
        &self.lock
    }

    pub fn config(&self) -> &PersisterConfig {
        &self.config
    }

    /// Whether `entity` designates an existing row, outside of any write
    /// call.
    pub fn is_persisted(&self, entity: &C) -> bool {
        self.identifiers.is_persisted(entity, &*self.accessor, None)
    }

    /// Whether `entity` designates an existing row or one already being
    /// written by the call that owns `ctx`.
    pub fn is_persisted_in(&self, entity: &C, ctx: &WriteContext) -> bool {
        self.identifiers.is_persisted(entity, &*self.accessor, Some(ctx))
    }

    pub fn insert<Conn>(&self, entities: &[C], connection: &mut Conn) -> Result<()>
    where
        Conn: Connection + ?Sized,
    {
        InsertExecutor::new(self).insert(entities, connection)
    }

    pub fn update<Conn>(&self, entities: &[C], connection: &mut Conn) -> Result<()>
    where
        Conn: Connection + ?Sized,
    {
        UpdateExecutor::new(self).update(entities, connection)
    }

    /// Inserts the entities that are new and updates the others.
    ///
    /// One `WriteContext` spans the whole call. With composite keys, an
    /// entity sharing its key with one inserted earlier in the same call is
    /// updated after the insert.
    pub fn persist<Conn>(&self, entities: &[C], connection: &mut Conn) -> Result<()>
    where
        Conn: Connection + ?Sized,
    {
        let span = info_span!(
            "keyforge.persist",
            table = %self.mapping.table().name(),
            entities = entities.len()
        );
        let _enter = span.enter();

        self.listeners.before_persist(entities);

        let mut ctx = WriteContext::new();
        let result = self.insert_or_update(entities, connection, &mut ctx);
        ctx.clear();
        result?;

        self.listeners.after_persist(entities);
        Ok(())
    }

    fn insert_or_update<Conn>(
        &self,
        entities: &[C],
        connection: &mut Conn,
        ctx: &mut WriteContext,
    ) -> Result<()>
    where
        Conn: Connection + ?Sized,
    {
        let (existing, fresh): (Vec<C>, Vec<C>) = entities
            .iter()
            .cloned()
            .partition(|entity| self.is_persisted_in(entity, ctx));
        event!(Level::DEBUG, new = fresh.len(), existing = existing.len(), "persist split");

        InsertExecutor::new(self).insert_in(&fresh, &mut *connection, ctx)?;
        self.update(&existing, &mut *connection)
    }

    /// Loads the entities whose identifier is one of `ids`.
    pub fn select<Conn>(&self, ids: &[I], connection: &mut Conn) -> Result<Vec<C>>
    where
        Conn: Connection + ?Sized,
    {
        let span = info_span!(
            "keyforge.select",
            table = %self.mapping.table().name(),
            ids = ids.len()
        );
        let _enter = span.enter();

        self.listeners.before_select(ids);
        match self.read(ids, connection) {
            Ok(entities) => {
                self.identifiers.after_select(&entities);
                self.listeners.after_select(&entities);
                Ok(entities)
            }
            Err(err) => {
                event!(Level::ERROR, error = %err, "select failed");
                self.listeners.on_select_error(ids, &err);
                Err(err)
            }
        }
    }

    fn read<Conn>(&self, ids: &[I], connection: &mut Conn) -> Result<Vec<C>>
    where
        Conn: Connection + ?Sized,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<_> = ids.iter().map(Identifier::to_value).collect();
        let rows = connection.select_in(self.mapping.table(), self.mapping.id_column(), &keys)?;
        rows.iter().map(|row| self.mapping.from_row(row)).collect()
    }
}
