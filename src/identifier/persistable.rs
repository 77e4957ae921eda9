use super::Identifier;
use crate::core::{PersistError, Result, Value};
use chrono::{DateTime, Utc};
use uuid::Uuid;

impl Identifier for i64 {
    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value(value: &Value) -> Result<Self> {
        value.as_i64().ok_or_else(|| mismatch("integer", value))
    }
}

impl Identifier for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch("text", value))
    }
}

impl Identifier for Uuid {
    fn to_value(&self) -> Value {
        Value::Uuid(*self)
    }

    fn from_value(value: &Value) -> Result<Self> {
        value.as_uuid().ok_or_else(|| mismatch("uuid", value))
    }
}

impl Identifier for DateTime<Utc> {
    fn to_value(&self) -> Value {
        Value::Timestamp(*self)
    }

    fn from_value(value: &Value) -> Result<Self> {
        value.as_timestamp().ok_or_else(|| mismatch("timestamp", value))
    }
}

fn mismatch(expected: &str, value: &Value) -> PersistError {
    PersistError::ExecutionError(format!(
        "Cannot read {} identifier from {} value '{}'",
        expected,
        value.type_name(),
        value
    ))
}

/// Identifier assigned by the application, carrying whether the row it
/// designates is known to exist.
///
/// Equality and hashing only look at the wrapped value.
#[derive(Debug, Clone)]
pub struct PersistableIdentifier<T> {
    value: T,
    persisted: bool,
}

impl<T> PersistableIdentifier<T> {
    /// A fresh identifier, not yet written.
    pub fn new(value: T) -> Self {
        Self {
            value,
            persisted: false,
        }
    }

    pub fn persisted(value: T) -> Self {
        Self {
            value,
            persisted: true,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn mark_persisted(&mut self) {
        self.persisted = true;
    }
}

impl<T: PartialEq> PartialEq for PersistableIdentifier<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T: Eq> Eq for PersistableIdentifier<T> {}

impl<T: std::hash::Hash> std::hash::Hash for PersistableIdentifier<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T: Identifier> Identifier for PersistableIdentifier<T> {
    fn to_value(&self) -> Value {
        self.value.to_value()
    }

    /// Values read back from the database designate existing rows.
    fn from_value(value: &Value) -> Result<Self> {
        T::from_value(value).map(Self::persisted)
    }
}
