use crate::connection::GeneratedKeys;
use crate::core::{PersistError, Result, Value};
use serde::{Deserialize, Serialize};

/// How the values generated by an executed insert batch are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyReadBack {
    /// One value per inserted row, in insertion order.
    #[default]
    InsertionOrder,
    /// Only the highest value of the batch. The batch is assumed to have
    /// received a contiguous run of values ending there.
    HighestOnly,
}

impl KeyReadBack {
    /// Turns the values returned for a batch of `expected` rows into one value
    /// per row, in insertion order.
    pub fn resolve(&self, returned: Vec<Value>, expected: usize) -> Result<Vec<Value>> {
        match self {
            KeyReadBack::InsertionOrder => {
                if returned.len() != expected {
                    return Err(count_mismatch(returned.len(), expected));
                }
                Ok(returned)
            }
            KeyReadBack::HighestOnly => {
                if expected == 0 && returned.is_empty() {
                    return Ok(Vec::new());
                }
                let [highest] = returned.as_slice() else {
                    return Err(count_mismatch(returned.len(), 1));
                };
                let highest = highest.as_i64().ok_or_else(|| {
                    PersistError::ExecutionError(format!(
                        "Cannot reconstruct keys from non integer value '{}'",
                        highest
                    ))
                })?;
                let first = i64::try_from(expected)
                    .ok()
                    .and_then(|count| highest.checked_sub(count))
                    .and_then(|before| before.checked_add(1))
                    .filter(|first| *first > 0)
                    .ok_or_else(|| {
                        PersistError::ExecutionError(format!(
                            "Highest generated key {} cannot end a run of {} positive key(s)",
                            highest, expected
                        ))
                    })?;
                Ok((first..=highest).map(Value::Integer).collect())
            }
        }
    }
}

fn count_mismatch(got: usize, expected: usize) -> PersistError {
    PersistError::ExecutionError(format!(
        "Expected {} generated key(s), got {}",
        expected, got
    ))
}

/// Identifiers produced by the database during the insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedKeysIdentifierManager {
    column: String,
    read_back: KeyReadBack,
}

impl GeneratedKeysIdentifierManager {
    pub fn new(column: &str) -> Self {
        Self {
            column: column.to_string(),
            read_back: KeyReadBack::default(),
        }
    }

    pub fn read_back(mut self, read_back: KeyReadBack) -> Self {
        self.read_back = read_back;
        self
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn key_read_back(&self) -> KeyReadBack {
        self.read_back
    }

    pub fn generated_keys(&self) -> GeneratedKeys {
        GeneratedKeys::Return {
            column: self.column.clone(),
        }
    }
}
