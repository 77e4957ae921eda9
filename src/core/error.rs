use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error(
        "Expected non null value for column(s) {} of table '{table}' (entity #{position})",
        .columns.join(", ")
    )]
    ValidationError {
        table: String,
        position: usize,
        columns: Vec<String>,
    },

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Stale object: no row of table '{table}' matched entity #{position} and its version")]
    StaleObjectError { table: String, position: usize },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl PersistError {
    /// Message carried by driver-level failures, used for classification.
    pub fn driver_message(&self) -> Option<&str> {
        match self {
            Self::ExecutionError(message)
            | Self::ConstraintViolation(message)
            | Self::TransactionError(message) => Some(message),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PersistError>;

impl<T> From<std::sync::PoisonError<T>> for PersistError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_columns() {
        let err = PersistError::ValidationError {
            table: "person".into(),
            position: 2,
            columns: vec!["name".into(), "birth".into()],
        };
        let message = err.to_string();
        assert!(message.contains("name, birth"));
        assert!(message.contains("'person'"));
        assert!(message.contains("#2"));
    }

    #[test]
    fn test_driver_message() {
        let err = PersistError::ExecutionError("Deadlock found when trying to get lock".into());
        assert_eq!(err.driver_message(), Some("Deadlock found when trying to get lock"));

        let err = PersistError::ConfigurationError("deadlock".into());
        assert_eq!(err.driver_message(), None);
    }
}
