use super::{Sequence, SequencePersister};
use crate::core::{PersistError, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PooledHiLoSequenceOptions {
    pub sequence_name: String,
    pub pool_size: i64,
    /// Value the first range starts after when the sequence has no row yet.
    pub initial_value: i64,
}

impl Default for PooledHiLoSequenceOptions {
    fn default() -> Self {
        Self {
            sequence_name: String::new(),
            pool_size: 50,
            initial_value: 0,
        }
    }
}

impl PooledHiLoSequenceOptions {
    pub fn new(sequence_name: &str, pool_size: i64) -> Self {
        Self {
            sequence_name: sequence_name.to_string(),
            pool_size,
            ..Self::default()
        }
    }

    pub fn initial_value(mut self, initial_value: i64) -> Self {
        self.initial_value = initial_value;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sequence_name.trim().is_empty() {
            return Err(PersistError::ConfigurationError(
                "sequence name must not be empty".into(),
            ));
        }
        if self.pool_size <= 0 {
            return Err(PersistError::ConfigurationError(format!(
                "pool size of sequence '{}' must be positive, got {}",
                self.sequence_name, self.pool_size
            )));
        }
        Ok(())
    }
}

/// In-memory range `(upper_bound - pool_size, upper_bound]` being handed out.
///
/// `current <= upper_bound` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongPool {
    pool_size: i64,
    current: i64,
    upper_bound: i64,
}

impl LongPool {
    fn reserved(pool_size: i64, upper_bound: i64) -> Self {
        Self {
            pool_size,
            current: upper_bound - pool_size,
            upper_bound,
        }
    }

    pub fn pool_size(&self) -> i64 {
        self.pool_size
    }

    /// Last value handed out.
    pub fn current(&self) -> i64 {
        self.current
    }

    pub fn upper_bound(&self) -> i64 {
        self.upper_bound
    }

    fn is_exhausted(&self) -> bool {
        self.current >= self.upper_bound
    }

    fn advance(&mut self) -> i64 {
        self.current += 1;
        self.current
    }
}

/// Hi-Lo sequence handing out values from ranges reserved in a table.
///
/// Construction reserves the first range. A range is only replaced once fully
/// consumed, so the stored value is always ahead of what has been handed out.
/// Values of a range left unused when the process stops are lost.
pub struct PooledHiLoSequence {
    options: PooledHiLoSequenceOptions,
    persister: SequencePersister,
    pool: Mutex<LongPool>,
    reservations: AtomicUsize,
}

impl PooledHiLoSequence {
    pub fn new(options: PooledHiLoSequenceOptions, persister: SequencePersister) -> Result<Self> {
        options.validate()?;
        let upper_bound =
            persister.reserve(&options.sequence_name, options.pool_size, options.initial_value)?;
        let pool = LongPool::reserved(options.pool_size, upper_bound);
        debug!(
            "sequence '{}' starts after {} (pool of {})",
            options.sequence_name, pool.current, options.pool_size
        );

        Ok(Self {
            options,
            persister,
            pool: Mutex::new(pool),
            reservations: AtomicUsize::new(1),
        })
    }

    pub fn options(&self) -> &PooledHiLoSequenceOptions {
        &self.options
    }

    pub fn persister(&self) -> &SequencePersister {
        &self.persister
    }

    /// Number of durable reservations made by this instance.
    pub fn reservation_count(&self) -> usize {
        self.reservations.load(Ordering::SeqCst)
    }

    pub fn pool(&self) -> Result<LongPool> {
        Ok(*self.pool.lock()?)
    }
}

impl Sequence<i64> for PooledHiLoSequence {
    fn next(&self) -> Result<i64> {
        let mut pool = self.pool.lock()?;
        if pool.is_exhausted() {
            let upper_bound = self.persister.reserve(
                &self.options.sequence_name,
                self.options.pool_size,
                self.options.initial_value,
            )?;
            *pool = LongPool::reserved(self.options.pool_size, upper_bound);
            self.reservations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(pool.advance())
    }
}
