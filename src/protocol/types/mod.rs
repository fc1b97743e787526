//! Teradata data types for binds and query results.

mod value;
mod sql_type;
mod column;
mod row;

pub use value::{Value, DATE_FORMAT, TIMESTAMP_FORMAT, TIMESTAMP_PARSE_FORMAT};
pub use sql_type::SqlType;
pub use column::{ColumnDescription, Description};
pub use row::Row;
