//! Everything needed to declare and use a persister.
//!
//! ```ignore
//! use keyforge::prelude::*;
//! ```

pub use crate::config::{PersisterConfig, SequenceConfig};
pub use crate::connection::{Connection, RollbackListener, RollbackObserver};
pub use crate::core::{Column, ColumnValues, DataType, PersistError, Result, TableSchema, Value};
pub use crate::identifier::{
    AlreadyAssignedIdentifierManager, BeforeInsertIdentifierManager,
    CompositeKeyIdentifierManager, FnIdAccessor, GeneratedKeysIdentifierManager, IdAccessor,
    Identifier, IdentifierInsertionManager, KeyReadBack, PersistableIdentifier, WriteContext,
};
pub use crate::listener::{InsertListener, PersistListener, SelectListener, UpdateListener};
pub use crate::memory::{MemoryConnection, MemoryDatabase};
pub use crate::persister::{EntityMapping, Persister};
pub use crate::sequence::{
    PooledHiLoSequence, PooledHiLoSequenceOptions, Sequence, SequencePersister,
};
pub use crate::version::{IntegerVersioning, OptimisticLockManager, TimestampVersioning};
