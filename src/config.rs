use crate::core::{PersistError, Result};
use crate::identifier::KeyReadBack;
use crate::sequence::{PooledHiLoSequenceOptions, SequenceStorageOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings of the pooled sequences created by an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    /// Table holding the reservations
    pub storage: SequenceStorageOptions,

    /// Values reserved per round trip
    pub pool_size: i64,

    /// Value the first range of a new sequence starts after
    pub initial_value: i64,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            storage: SequenceStorageOptions::default(),
            pool_size: 50,
            initial_value: 0,
        }
    }
}

impl SequenceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reservation table layout
    pub fn storage(mut self, storage: SequenceStorageOptions) -> Self {
        self.storage = storage;
        self
    }

    /// Set the pool size
    pub fn pool_size(mut self, pool_size: i64) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Set the initial value
    pub fn initial_value(mut self, initial_value: i64) -> Self {
        self.initial_value = initial_value;
        self
    }

    /// Options of the sequence called `name`
    pub fn sequence(&self, name: &str) -> PooledHiLoSequenceOptions {
        PooledHiLoSequenceOptions::new(name, self.pool_size).initial_value(self.initial_value)
    }

    pub fn validate(&self) -> Result<()> {
        self.storage.validate()?;
        if self.pool_size <= 0 {
            return Err(PersistError::ConfigurationError(format!(
                "pool_size must be positive, got {}",
                self.pool_size
            )));
        }
        Ok(())
    }
}

/// Persister configuration
///
/// Every field has a default, so a JSON document only needs the settings it
/// changes:
///
/// ```json
/// { "batch_size": 100, "key_read_back": "highest_only" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersisterConfig {
    /// Rows sent per batch
    pub batch_size: usize,

    /// Retry a batch once when the driver reports a deadlock
    pub retry_on_deadlock: bool,

    /// How generated keys come back from the database
    pub key_read_back: KeyReadBack,

    pub sequence: SequenceConfig,
}

impl Default for PersisterConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            retry_on_deadlock: true,
            key_read_back: KeyReadBack::default(),
            sequence: SequenceConfig::default(),
        }
    }
}

impl PersisterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the batch size
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Enable or disable the deadlock retry
    pub fn retry_on_deadlock(mut self, enabled: bool) -> Self {
        self.retry_on_deadlock = enabled;
        self
    }

    /// Set how generated keys are read back
    pub fn key_read_back(mut self, read_back: KeyReadBack) -> Self {
        self.key_read_back = read_back;
        self
    }

    /// Set the sequence settings
    pub fn sequence(mut self, sequence: SequenceConfig) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(PersistError::ConfigurationError(
                "batch_size must be greater than 0".into(),
            ));
        }
        self.sequence.validate()
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PersistError::ConfigurationError(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            PersistError::ConfigurationError(format!(
                "cannot read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }
}
