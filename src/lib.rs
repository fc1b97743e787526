//! Teradata SQL driver for Rust
//!
//! An async driver with the connection/cursor interface familiar from other
//! Teradata SQL drivers. Sessions run on an injected [`DriverBinding`];
//! [`MemoryBinding`] is an in-process binding with a Teradata-flavoured SQL
//! engine.
//!
//! Request text may carry escape functions such as
//! `{fn teradata_fake_result_sets}` or `{fn teradata_write_csv(out.csv)}`
//! that the driver interprets before anything reaches the binding.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use teradatasql_rs::{ConnectParams, Connection, Cursor, Error, MemoryBinding, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let params = ConnectParams::new("whomooz")
//!         .with_user("guest")
//!         .with_password("please");
//!     let conn = Connection::connect(Arc::new(MemoryBinding::new()), params).await?;
//!     let mut cursor = conn.cursor().await?;
//!
//!     match cursor.execute("select * from no_such_table", ()).await {
//!         Err(err @ Error::Operational { .. }) => println!("database error: {}", err.message()),
//!         other => other?,
//!     }
//!
//!     cursor.execute("{fn teradata_nativesql}Database version {fn teradata_database_version}", ()).await?;
//!     if let Some(row) = cursor.fetchone().await? {
//!         println!("{:?}", row.get(0));
//!     }
//!
//!     cursor.close().await?;
//!     conn.close().await?;
//!     Ok(())
//! }
//! ```

pub mod binding;
pub mod connection;
pub mod csv_file;
pub mod cursor;
pub mod error;
pub mod logging;
pub mod password;
pub mod protocol;

// Re-export main types
pub use binding::{DriverBinding, MemoryBinding};
pub use connection::Connection;
pub use cursor::{Cursor, CursorStreamExt, Params, RowCursor};
pub use error::{Error, ErrorKind, Result};
pub use protocol::connect::{ConnectParams, TransactionMode};
pub use protocol::types::{ColumnDescription, Description, Row, SqlType, Value};
