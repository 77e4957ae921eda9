// ============================================================================
// keyforge Library
// ============================================================================

pub mod batch;
pub mod config;
pub mod connection;
pub mod core;
pub mod identifier;
pub mod listener;
pub mod memory;
pub mod persister;
pub mod prelude;
pub mod sequence;
pub mod version;

// Re-export main types for convenience
pub use crate::core::{Column, ColumnValues, DataType, PersistError, Result, TableSchema, Value};

pub use batch::{BatchHook, BatchOptions, BatchingIterator, DeadlockRetry};
pub use config::{PersisterConfig, SequenceConfig};
pub use connection::{
    Connection, GeneratedKeys, RollbackListener, RollbackObserver, RowAccess, RowReader,
    SeparateTransactionExecutor, WriteOperation, WriteRow, WriteTarget,
};
pub use identifier::{
    AlreadyAssignedIdentifierManager, BeforeInsertIdentifierManager,
    CompositeKeyIdentifierManager, FnIdAccessor, GeneratedKeysIdentifierManager, IdAccessor,
    Identifier, IdentifierInsertionManager, KeyReadBack, PersistableIdentifier, WriteContext,
};
pub use memory::{GeneratedKeysSupport, MemoryConnection, MemoryDatabase};
pub use persister::{EntityMapping, InsertExecutor, Persister, UpdateExecutor};
pub use sequence::{
    PooledHiLoSequence, PooledHiLoSequenceOptions, Sequence, SequencePersister,
    SequenceStorageOptions, UuidSequence,
};
pub use version::{
    IntegerVersioning, OptimisticLockManager, RevertOnRollback, TimestampVersioning,
    VersioningStrategy,
};
