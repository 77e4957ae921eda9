pub mod error;
pub mod types;
pub mod value;

pub use error::{PersistError, Result};
pub use types::{Column, ColumnValues, TableSchema};
pub use value::{DataType, Value};
