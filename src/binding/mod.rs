//! Driver binding: the layer that talks to the database.
//!
//! A [`DriverBinding`] owns sessions and request results and exchanges
//! values with the driver layer in the tagged codec of
//! [`crate::protocol::codec`]. The driver layer never sees the binding's
//! internals, only opaque handles. [`MemoryBinding`] is the in-process
//! implementation.

use bytes::Bytes;
use std::future::Future;

use crate::error::Result;
use crate::protocol::connect::{ClientAttributes, ConnectParams};
use crate::protocol::types::SqlType;

mod memory;

pub use memory::{MemoryBinding, DEFAULT_DATABASE_VERSION};

/// Opaque session handle.
pub type ConnectionHandle = u64;

/// Opaque request-result handle.
pub type RowsHandle = u64;

/// A request submitted with [`DriverBinding::create_rows`].
#[derive(Debug, Clone, Default)]
pub struct RowsRequest {
    /// Request text with escape functions already processed.
    pub sql: String,
    /// Bind rows in codec form.
    pub bind: Bytes,
    /// Prepare without executing.
    pub prepare_only: bool,
    /// Declared parameter types by 0-based marker index.
    pub param_types: Vec<(usize, SqlType)>,
}

/// Metadata of the current result of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultMetadata {
    /// Rows affected or returned.
    pub activity_count: u64,
    /// Numeric statement kind.
    pub activity_type: u16,
    /// Statement kind name, e.g. `Select`.
    pub activity_name: String,
    pub warning_code: u32,
    pub warning_message: String,
    /// Column metadata in codec form; `None` when the statement returns no
    /// rows.
    pub column_metadata: Option<Bytes>,
    /// Parameter metadata in codec form.
    pub parameter_metadata: Bytes,
}

/// The native-library surface a session runs on.
///
/// Calls on one connection handle are never issued concurrently by the
/// driver layer.
pub trait DriverBinding: Send + Sync + 'static {
    /// Log on and return a session handle.
    fn create_connection(
        &self,
        params: &ConnectParams,
        client: &ClientAttributes,
    ) -> impl Future<Output = Result<ConnectionHandle>> + Send;

    /// Log off. Open results of the session are released.
    fn close_connection(&self, conn: ConnectionHandle) -> impl Future<Output = Result<()>> + Send;

    /// Submit a request and return a handle positioned on its first result.
    fn create_rows(
        &self,
        conn: ConnectionHandle,
        request: &RowsRequest,
    ) -> impl Future<Output = Result<RowsHandle>> + Send;

    /// Describe the current result.
    fn result_metadata(&self, rows: RowsHandle) -> impl Future<Output = Result<ResultMetadata>> + Send;

    /// Next row of the current result in codec form; `None` when exhausted.
    fn fetch_row(&self, rows: RowsHandle) -> impl Future<Output = Result<Option<Bytes>>> + Send;

    /// Advance to the next result. Returns `false` when there is none.
    fn next_result(&self, rows: RowsHandle) -> impl Future<Output = Result<bool>> + Send;

    /// Release a request result.
    fn close_rows(&self, rows: RowsHandle) -> impl Future<Output = Result<()>> + Send;

    fn commit(&self, conn: ConnectionHandle) -> impl Future<Output = Result<()>> + Send;

    fn rollback(&self, conn: ConnectionHandle) -> impl Future<Output = Result<()>> + Send;

    /// Switch implicit commits on or off.
    fn set_autocommit(
        &self,
        conn: ConnectionHandle,
        autocommit: bool,
    ) -> impl Future<Output = Result<()>> + Send;

    fn database_version(&self, conn: ConnectionHandle) -> impl Future<Output = Result<String>> + Send;

    fn session_number(&self, conn: ConnectionHandle) -> impl Future<Output = Result<u64>> + Send;
}
