// ============================================================================
// Identifier Insertion Strategies
// ============================================================================
//
// When and how the primary key of an inserted entity becomes known:
// assigned by the application, assigned from a sequence while batching, or
// generated by the database and read back after each batch.
//
// ============================================================================

pub mod assigned;
pub mod before_insert;
pub mod driver;
pub mod generated_keys;
pub mod persistable;

use crate::batch::{BatchOptions, BatchingIterator};
use crate::connection::{GeneratedKeys, WriteOperation};
use crate::core::{Result, Value};
use std::fmt;
use std::marker::PhantomData;

pub use assigned::{AlreadyAssignedIdentifierManager, CompositeKeyIdentifierManager, WriteContext};
pub use before_insert::BeforeInsertIdentifierManager;
pub use driver::{InsertBatchDriver, InsertHook, PendingInsert};
pub use generated_keys::{GeneratedKeysIdentifierManager, KeyReadBack};
pub use persistable::PersistableIdentifier;

use driver::{DrawAction, ReadBack};

/// A primary key value that can be bound to and read from a column.
pub trait Identifier: Clone + fmt::Debug + 'static {
    fn to_value(&self) -> Value;

    fn from_value(value: &Value) -> Result<Self>;
}

/// Reads and writes the identifier of an entity.
pub trait IdAccessor<C, I> {
    fn id(&self, entity: &C) -> Option<I>;

    fn set_id(&self, entity: &C, id: I);
}

/// `IdAccessor` built from a pair of closures.
pub struct FnIdAccessor<C, I, G, S> {
    get: G,
    set: S,
    _marker: PhantomData<fn(&C) -> I>,
}

impl<C, I, G, S> FnIdAccessor<C, I, G, S>
where
    G: Fn(&C) -> Option<I>,
    S: Fn(&C, I),
{
    pub fn new(get: G, set: S) -> Self {
        Self {
            get,
            set,
            _marker: PhantomData,
        }
    }
}

impl<C, I, G, S> IdAccessor<C, I> for FnIdAccessor<C, I, G, S>
where
    G: Fn(&C) -> Option<I>,
    S: Fn(&C, I),
{
    fn id(&self, entity: &C) -> Option<I> {
        (self.get)(entity)
    }

    fn set_id(&self, entity: &C, id: I) {
        (self.set)(entity, id)
    }
}

/// Closed set of identifier strategies. Each variant only holds the state it
/// needs.
pub enum IdentifierInsertionManager<C, I> {
    AlreadyAssigned(AlreadyAssignedIdentifierManager<C>),
    CompositeKeyAlreadyAssigned(CompositeKeyIdentifierManager<C>),
    BeforeInsert(BeforeInsertIdentifierManager<I>),
    GeneratedKeys(GeneratedKeysIdentifierManager),
}

impl<C, I: Identifier> IdentifierInsertionManager<C, I> {
    pub fn identifier_type(&self) -> &'static str {
        std::any::type_name::<I>()
    }

    pub fn strategy_name(&self) -> &'static str {
        match self {
            Self::AlreadyAssigned(_) => "already-assigned",
            Self::CompositeKeyAlreadyAssigned(_) => "composite-key",
            Self::BeforeInsert(_) => "before-insert",
            Self::GeneratedKeys(_) => "generated-keys",
        }
    }

    /// How the insert statement must be prepared.
    pub fn generated_keys(&self) -> GeneratedKeys {
        match self {
            Self::GeneratedKeys(manager) => manager.generated_keys(),
            _ => GeneratedKeys::None,
        }
    }

    /// Whether the identifier column is filled by the strategy (or the
    /// database) rather than by the application.
    pub fn supplies_id(&self) -> bool {
        matches!(self, Self::BeforeInsert(_) | Self::GeneratedKeys(_))
    }

    /// Whether the identifier column is left out of the insert.
    pub fn omits_id_column(&self) -> bool {
        matches!(self, Self::GeneratedKeys(_))
    }

    /// Wraps the entities of one insert call into the batching driver of this
    /// strategy, bound to the prepared `write`.
    pub fn build_batch_driver<'a>(
        &'a self,
        entities: Vec<PendingInsert<'a, C>>,
        write: Box<dyn WriteOperation + 'a>,
        options: BatchOptions,
        accessor: &'a dyn IdAccessor<C, I>,
        id_column: &str,
        ctx: &'a mut WriteContext,
    ) -> Result<InsertBatchDriver<'a, C, I>> {
        let (draw, read_back) = match self {
            Self::AlreadyAssigned(_) => (DrawAction::Nothing, None),
            Self::CompositeKeyAlreadyAssigned(_) => (DrawAction::Track(ctx), None),
            Self::BeforeInsert(manager) => (
                DrawAction::Assign {
                    sequence: manager.sequence(),
                    column: id_column.to_string(),
                },
                None,
            ),
            Self::GeneratedKeys(manager) => (
                DrawAction::Nothing,
                Some(ReadBack::new(manager.key_read_back())),
            ),
        };
        let hook = InsertHook::new(write, options.retry, accessor, draw, read_back);
        BatchingIterator::new(entities.into_iter(), options.batch_size, hook)
    }

    /// Runs once every entity of an insert call has been written.
    pub fn after_insert(&self, entities: &[C]) {
        match self {
            Self::AlreadyAssigned(manager) => manager.mark_all_persisted(entities),
            Self::CompositeKeyAlreadyAssigned(manager) => manager.mark_all_persisted(entities),
            Self::BeforeInsert(_) | Self::GeneratedKeys(_) => {}
        }
    }

    /// Runs on entities built from rows read from the database.
    pub fn after_select(&self, entities: &[C]) {
        match self {
            Self::AlreadyAssigned(manager) => manager.mark_all_persisted(entities),
            Self::CompositeKeyAlreadyAssigned(manager) => manager.mark_all_persisted(entities),
            Self::BeforeInsert(_) | Self::GeneratedKeys(_) => {}
        }
    }

    /// Whether `entity` designates an existing row.
    ///
    /// Strategies that set the identifier themselves consider any entity that
    /// has one as persisted.
    pub fn is_persisted(
        &self,
        entity: &C,
        accessor: &dyn IdAccessor<C, I>,
        ctx: Option<&WriteContext>,
    ) -> bool {
        match self {
            Self::AlreadyAssigned(manager) => manager.is_persisted(entity),
            Self::CompositeKeyAlreadyAssigned(manager) => {
                let key = accessor.id(entity).map(|id| id.to_value());
                manager.is_persisted(entity, key, ctx)
            }
            Self::BeforeInsert(_) | Self::GeneratedKeys(_) => accessor.id(entity).is_some(),
        }
    }
}

impl<C, I> fmt::Debug for IdentifierInsertionManager<C, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyAssigned(m) => f.debug_tuple("AlreadyAssigned").field(m).finish(),
            Self::CompositeKeyAlreadyAssigned(m) => {
                f.debug_tuple("CompositeKeyAlreadyAssigned").field(m).finish()
            }
            Self::BeforeInsert(m) => f.debug_tuple("BeforeInsert").field(m).finish(),
            Self::GeneratedKeys(m) => f.debug_tuple("GeneratedKeys").field(m).finish(),
        }
    }
}
