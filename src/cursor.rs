//! Cursors: request execution and result iteration.
//!
//! The `Cursor` trait defines the common fetch interface; [`RowCursor`] is
//! the implementation returned by [`Connection::cursor`]. A request may
//! produce several result sets, traversed with [`RowCursor::nextset`].
//!
//! [`Connection::cursor`]: crate::connection::Connection::cursor

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use futures::Stream;

use crate::binding::{DriverBinding, ResultMetadata, RowsHandle, RowsRequest};
use crate::connection::Session;
use crate::csv_file;
use crate::error::{Error, Result};
use crate::logging::MethodScope;
use crate::protocol::codec::{decode_column_metadata, decode_row, encode_bind_rows};
use crate::protocol::constants::DRIVER_VERSION;
use crate::protocol::escape::{Directive, EscapedRequest, SessionValues};
use crate::protocol::types::{ColumnDescription, Description, Row, SqlType, Value};

/// Width reported for the JSON and text columns of synthetic result sets.
const SYNTHETIC_VARCHAR: u32 = 32000;

/// Bind values for [`RowCursor::execute`].
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Params {
    /// No parameter markers.
    #[default]
    None,
    /// One row of values.
    Row(Vec<Value>),
    /// One execution per row, in order.
    Batch(Vec<Vec<Value>>),
}

impl Params {
    fn into_rows(self) -> Vec<Vec<Value>> {
        match self {
            Params::None => Vec::new(),
            Params::Row(row) if row.is_empty() => Vec::new(),
            Params::Row(row) => vec![row],
            Params::Batch(rows) => rows,
        }
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Params::None
    }
}

impl From<Vec<Value>> for Params {
    fn from(row: Vec<Value>) -> Self {
        Params::Row(row)
    }
}

impl From<Vec<Vec<Value>>> for Params {
    fn from(rows: Vec<Vec<Value>>) -> Self {
        Params::Batch(rows)
    }
}

/// Base trait for cursor types.
///
/// # Example
///
/// ```no_run
/// use teradatasql_rs::{Cursor, Row};
///
/// async fn count_rows<C: Cursor<Item = Row>>(cursor: &mut C) -> teradatasql_rs::Result<u64> {
///     let mut count = 0;
///     while cursor.fetchone().await?.is_some() {
///         count += 1;
///     }
///     Ok(count)
/// }
/// ```
pub trait Cursor {
    /// The type of item this cursor yields.
    type Item;

    /// Columns of the current result set; `None` when it has no rows to
    /// return.
    fn description(&self) -> Option<&Description>;

    /// Activity count of the current result, or -1 when there is none.
    fn rowcount(&self) -> i64;

    fn is_closed(&self) -> bool;

    /// Default row count of [`Cursor::fetchmany`].
    fn arraysize(&self) -> usize;

    fn set_arraysize(&mut self, size: usize);

    /// Close the cursor and release its result.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Next row of the current result set, or `Ok(None)` when exhausted.
    fn fetchone(&mut self) -> impl Future<Output = Result<Option<Self::Item>>> + Send;

    /// Up to `size` rows (default: `arraysize`).
    fn fetchmany(&mut self, size: Option<usize>) -> impl Future<Output = Result<Vec<Self::Item>>> + Send;

    /// All remaining rows of the current result set.
    fn fetchall(&mut self) -> impl Future<Output = Result<Vec<Self::Item>>> + Send;
}

/// Where the rows of the current result set come from.
#[derive(Debug)]
enum Source {
    /// Rows produced by the driver itself.
    Local(VecDeque<Vec<Value>>),
    /// Rows fetched from the binding on demand.
    Binding(RowsHandle),
    /// No rows.
    Empty,
}

#[derive(Debug)]
struct ResultSet {
    description: Option<Arc<Description>>,
    source: Source,
    rowcount: i64,
    rownumber: u64,
}

impl ResultSet {
    /// The position after the last result set.
    fn finished() -> Self {
        Self {
            description: None,
            source: Source::Empty,
            rowcount: -1,
            rownumber: 0,
        }
    }

    fn local(description: Description, rows: Vec<Vec<Value>>) -> Self {
        Self {
            description: Some(Arc::new(description)),
            rowcount: rows.len() as i64,
            source: Source::Local(rows.into()),
            rownumber: 0,
        }
    }

    /// The result the binding is positioned on.
    fn from_binding(meta: ResultMetadata, rows: RowsHandle) -> Result<Self> {
        let description = match meta.column_metadata {
            Some(data) => Some(Arc::new(Description::new(decode_column_metadata(data)?))),
            None => None,
        };
        Ok(Self {
            source: if description.is_some() {
                Source::Binding(rows)
            } else {
                Source::Empty
            },
            description,
            rowcount: meta.activity_count as i64,
            rownumber: 0,
        })
    }

    /// The synthetic result set describing the result the binding is
    /// positioned on.
    fn fake(meta: &ResultMetadata) -> Result<Self> {
        let columns = match &meta.column_metadata {
            Some(data) => Some(decode_column_metadata(data.clone())?),
            None => None,
        };
        let parameters = decode_column_metadata(meta.parameter_metadata.clone())?;
        let text = |s: &str| {
            if s.is_empty() {
                Value::Null
            } else {
                Value::String(s.to_string())
            }
        };
        let row = vec![
            Value::BigInt(meta.activity_count as i64),
            Value::Integer(i32::from(meta.activity_type)),
            Value::String(meta.activity_name.clone()),
            Value::Null,
            Value::BigInt(i64::from(meta.warning_code)),
            text(&meta.warning_message),
            Value::Integer(columns.as_ref().map_or(0, Vec::len) as i32),
            match &columns {
                Some(columns) => Value::String(serde_json::to_string(columns)?),
                None => Value::Null,
            },
            Value::String(serde_json::to_string(&parameters)?),
        ];
        Ok(Self::local(fake_description(), vec![row]))
    }
}

fn fake_description() -> Description {
    let column = |name: &str, ty: SqlType, nullable: bool| {
        ColumnDescription::from_sql_type(name, &ty, Some(nullable))
    };
    Description::new(vec![
        column("ActivityCount", SqlType::BigInt, false),
        column("ActivityType", SqlType::Integer, false),
        column("ActivityName", SqlType::Varchar(100), false),
        column("KeyColumnName", SqlType::Varchar(128), true),
        column("WarningCode", SqlType::BigInt, false),
        column("WarningMessage", SqlType::Varchar(SYNTHETIC_VARCHAR), true),
        column("ColumnCount", SqlType::Integer, false),
        column("ColumnMetadata", SqlType::Varchar(SYNTHETIC_VARCHAR), true),
        column("ParameterMetadata", SqlType::Varchar(SYNTHETIC_VARCHAR), false),
    ])
}

/// The request behind the current result set.
#[derive(Debug)]
struct Pending {
    rows: Option<RowsHandle>,
    fake: bool,
    /// Set once the real result at the binding's position has been shown,
    /// or when it is never shown.
    real_shown: bool,
    plan_only: bool,
    done: bool,
}

/// Cursor over the results of requests on one session.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use teradatasql_rs::{ConnectParams, Connection, Cursor, MemoryBinding, Value};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let conn = Connection::connect(Arc::new(MemoryBinding::new()), ConnectParams::new("localhost")).await?;
///     let mut cursor = conn.cursor().await?;
///
///     cursor.execute("create volatile table voltab (c1 integer, c2 varchar(10)) on commit preserve rows", ()).await?;
///     cursor
///         .execute(
///             "insert into voltab (?, ?)",
///             vec![
///                 vec![Value::from(1), Value::from("abc")],
///                 vec![Value::from(2), Value::from("def")],
///             ],
///         )
///         .await?;
///     cursor.execute("select * from voltab order by 1", ()).await?;
///     while let Some(row) = cursor.fetchone().await? {
///         println!("{:?}", row.values());
///     }
///
///     cursor.close().await?;
///     conn.close().await?;
///     Ok(())
/// }
/// ```
pub struct RowCursor<B: DriverBinding> {
    session: Arc<Session<B>>,
    closed: bool,
    arraysize: usize,
    pending: Option<Pending>,
    current: Option<ResultSet>,
    rowcount: i64,
}

impl<B: DriverBinding> RowCursor<B> {
    pub(crate) fn new(session: Arc<Session<B>>) -> Self {
        Self {
            session,
            closed: false,
            arraysize: 1,
            pending: None,
            current: None,
            rowcount: -1,
        }
    }

    async fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::CursorClosed);
        }
        self.session.state.lock().await.handle().map(|_| ())
    }

    /// Execute a request.
    ///
    /// `sql` may hold several statements separated by `;` and escape
    /// functions. `params` is `()`, one row of values, or a batch of rows
    /// executed in order. The previous result is released only after the
    /// bind values have been validated.
    pub async fn execute(&mut self, sql: &str, params: impl Into<Params>) -> Result<()> {
        let _scope = MethodScope::new(self.session.log, "execute");
        self.ensure_open().await?;
        let log = self.session.log;

        let request = EscapedRequest::parse(sql)?;
        if !request.directives.is_empty() {
            log.debug(|| {
                let names: Vec<String> = request.directives.iter().map(ToString::to_string).collect();
                format!("escape functions: {}", names.join(" "))
            });
        }

        let mut rows = params.into().into_rows();
        if let Some(path) = request.read_csv() {
            if !rows.is_empty() {
                return Err(Error::bind(
                    "teradata_read_csv cannot be combined with bound parameter values",
                ));
            }
            rows = csv_file::read_csv(path).await?;
        }
        if let Some(first) = rows.first() {
            let width = first.len();
            if let Some(index) = rows.iter().position(|row| row.len() != width) {
                return Err(Error::bind(format!(
                    "Batch row {} has {} values, expected {}",
                    index + 1,
                    rows[index].len(),
                    width
                )));
            }
        }
        let param_types = request.parameter_types();
        for row in &mut rows {
            let width = row.len();
            for (index, sql_type) in &param_types {
                let value = row.get_mut(*index).ok_or_else(|| {
                    Error::bind(format!(
                        "teradata_parameter index {} exceeds the {} bound values",
                        index + 1,
                        width
                    ))
                })?;
                *value = sql_type.coerce(value)?;
            }
        }
        log.debug(|| format!("bind values: {:?}", rows));
        let bind = encode_bind_rows(&rows)?;

        self.release().await?;

        let session = Arc::clone(&self.session);
        let mut state = session.state.lock().await;
        let conn = state.handle()?;
        for directive in &request.directives {
            match directive {
                Directive::Commit => session.commit(&state).await?,
                Directive::Rollback => session.rollback(&state).await?,
                Directive::AutocommitOn => session.set_autocommit(&mut state, true).await?,
                Directive::AutocommitOff => session.set_autocommit(&mut state, false).await?,
                _ => {}
            }
        }
        let text = request.render(&SessionValues {
            driver_version: DRIVER_VERSION.to_string(),
            database_version: state.database_version.clone(),
            session_number: state.session_number,
            autocommit: state.autocommit,
        });

        if request.native_sql() {
            let description = Description::new(vec![ColumnDescription::from_sql_type(
                "NativeSQL",
                &SqlType::Varchar(SYNTHETIC_VARCHAR),
                Some(false),
            )]);
            self.show(ResultSet::local(description, vec![vec![Value::String(text)]]));
            self.pending = Some(Pending {
                rows: None,
                fake: false,
                real_shown: true,
                plan_only: false,
                done: false,
            });
        } else if !request.directives.is_empty() && text.trim().is_empty() {
            // Only escape functions; nothing to send.
            return Ok(());
        } else {
            let fake = request.fake_result_sets() || session.fake_result_sets;
            let plan_only = request.request_plan_only();
            let submitted = RowsRequest {
                sql: text,
                bind,
                prepare_only: plan_only,
                param_types,
            };
            let handle = session
                .timed(session.binding.create_rows(conn, &submitted))
                .await?;
            self.pending = Some(Pending {
                rows: Some(handle),
                fake,
                // With request-plan-only, fake result sets replace the real ones.
                real_shown: !fake || plan_only,
                plan_only,
                done: false,
            });
            let meta = session.timed(session.binding.result_metadata(handle)).await?;
            let set = if fake {
                ResultSet::fake(&meta)?
            } else {
                ResultSet::from_binding(meta, handle)?
            };
            self.show(set);
        }
        drop(state);

        if let Some(path) = request.write_csv() {
            self.export(path).await?;
        }
        Ok(())
    }

    /// Execute `sql` once per row of `rows`.
    pub async fn executemany(&mut self, sql: &str, rows: Vec<Vec<Value>>) -> Result<()> {
        self.execute(sql, Params::Batch(rows)).await
    }

    /// Call a stored procedure with one parameter marker per value.
    pub async fn callproc(&mut self, name: &str, params: Vec<Value>) -> Result<()> {
        let markers = vec!["?"; params.len()].join(", ");
        self.execute(&format!("{{call {}({})}}", name, markers), Params::Row(params))
            .await
    }

    /// Advance to the next result set of the last request.
    ///
    /// Returns `false` when there is none; the cursor then has no
    /// description and fetches return nothing.
    pub async fn nextset(&mut self) -> Result<bool> {
        let _scope = MethodScope::new(self.session.log, "nextset");
        self.ensure_open().await?;
        let pending = self
            .pending
            .as_mut()
            .ok_or_else(|| Error::invalid_state("No result set; execute a request first"))?;
        if pending.done {
            return Ok(false);
        }
        let Some(handle) = pending.rows else {
            pending.done = true;
            self.show(ResultSet::finished());
            return Ok(false);
        };
        let (fake, plan_only) = (pending.fake, pending.plan_only);

        let session = Arc::clone(&self.session);
        let state = session.state.lock().await;
        state.handle()?;
        if !pending.real_shown {
            pending.real_shown = true;
            let meta = session.timed(session.binding.result_metadata(handle)).await?;
            self.show(ResultSet::from_binding(meta, handle)?);
            return Ok(true);
        }
        if !session.timed(session.binding.next_result(handle)).await? {
            pending.done = true;
            self.show(ResultSet::finished());
            return Ok(false);
        }
        pending.real_shown = !fake || plan_only;
        let meta = session.timed(session.binding.result_metadata(handle)).await?;
        let set = if fake {
            ResultSet::fake(&meta)?
        } else {
            ResultSet::from_binding(meta, handle)?
        };
        self.show(set);
        Ok(true)
    }

    /// Rows fetched from the current result set.
    pub fn rownumber(&self) -> Option<u64> {
        self.current
            .as_ref()
            .filter(|set| set.description.is_some())
            .map(|set| set.rownumber)
    }

    fn show(&mut self, set: ResultSet) {
        self.rowcount = set.rowcount;
        self.current = Some(set);
    }

    /// Write every remaining result set with rows to numbered CSV files and
    /// drop the result. `rowcount` becomes the number of rows written.
    async fn export(&mut self, path: &std::path::Path) -> Result<()> {
        let mut index = 0;
        let mut written = 0;
        loop {
            let description = self.current.as_ref().and_then(|set| set.description.clone());
            if let Some(description) = description {
                let mut rows = Vec::new();
                while let Some(values) = self.next_values().await? {
                    rows.push(values);
                }
                written += csv_file::write_csv(&csv_file::numbered_path(path, index), &description, &rows).await?;
                index += 1;
            }
            if !self.nextset().await? {
                break;
            }
        }
        self.release().await?;
        self.rowcount = written as i64;
        Ok(())
    }

    /// Release the binding result, if any.
    async fn release(&mut self) -> Result<()> {
        self.current = None;
        self.rowcount = -1;
        if let Some(Pending {
            rows: Some(handle), ..
        }) = self.pending.take()
        {
            let state = self.session.state.lock().await;
            if state.is_open() {
                self.session
                    .timed(self.session.binding.close_rows(handle))
                    .await?;
            }
        }
        Ok(())
    }

    async fn next_values(&mut self) -> Result<Option<Vec<Value>>> {
        let set = self
            .current
            .as_mut()
            .ok_or_else(|| Error::invalid_state("No result set; execute a request first"))?;
        let values = match &mut set.source {
            Source::Empty => None,
            Source::Local(rows) => rows.pop_front(),
            Source::Binding(handle) => {
                let handle = *handle;
                let state = self.session.state.lock().await;
                state.handle()?;
                match self
                    .session
                    .timed(self.session.binding.fetch_row(handle))
                    .await?
                {
                    Some(data) => Some(decode_row(data)?),
                    None => {
                        set.source = Source::Empty;
                        None
                    }
                }
            }
        };
        if values.is_some() {
            set.rownumber += 1;
        }
        Ok(values)
    }
}

impl<B: DriverBinding> Cursor for RowCursor<B> {
    type Item = Row;

    fn description(&self) -> Option<&Description> {
        self.current.as_ref()?.description.as_deref()
    }

    fn rowcount(&self) -> i64 {
        self.rowcount
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn arraysize(&self) -> usize {
        self.arraysize
    }

    fn set_arraysize(&mut self, size: usize) {
        self.arraysize = size.max(1);
    }

    async fn close(&mut self) -> Result<()> {
        if let Err(err) = self.ensure_open().await {
            if matches!(err, Error::ConnectionClosed) {
                // The session already dropped its results.
                self.current = None;
                self.pending = None;
                self.closed = true;
            }
            return Err(err);
        }
        self.release().await?;
        self.closed = true;
        Ok(())
    }

    async fn fetchone(&mut self) -> Result<Option<Row>> {
        let _scope = MethodScope::new(self.session.log, "fetchone");
        self.ensure_open().await?;
        let Some(values) = self.next_values().await? else {
            return Ok(None);
        };
        let description = self
            .current
            .as_ref()
            .and_then(|set| set.description.clone())
            .unwrap_or_default();
        self.session.log.dump(|| format!("row: {:?}", values));
        Ok(Some(Row::new(values, description)))
    }

    async fn fetchmany(&mut self, size: Option<usize>) -> Result<Vec<Row>> {
        let size = size.unwrap_or(self.arraysize);
        let mut rows = Vec::with_capacity(size);
        while rows.len() < size {
            match self.fetchone().await? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    async fn fetchall(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetchone().await? {
            rows.push(row);
        }
        Ok(rows)
    }
}

/// Extension trait for converting Cursor to Stream.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use futures::stream::TryStreamExt;
/// use teradatasql_rs::{ConnectParams, Connection, CursorStreamExt, MemoryBinding};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let conn = Connection::connect(Arc::new(MemoryBinding::new()), ConnectParams::new("localhost")).await?;
///     let mut cursor = conn.cursor().await?;
///     cursor.execute("select InfoKey from dbc.dbcinfo order by 1", ()).await?;
///
///     let keys: Vec<String> = cursor
///         .into_stream()
///         .map_ok(|row| row.get(0).map(|v| v.to_string()).unwrap_or_default())
///         .try_collect()
///         .await?;
///     Ok(())
/// }
/// ```
pub trait CursorStreamExt: Cursor + Sized {
    /// Convert this cursor into a Stream yielding `Result<Item>`.
    ///
    /// The stream takes ownership of the cursor and ends with the current
    /// result set.
    fn into_stream(self) -> impl Stream<Item = Result<Self::Item>>;
}

impl<C: Cursor + Unpin> CursorStreamExt for C {
    fn into_stream(self) -> impl Stream<Item = Result<Self::Item>> {
        use futures::stream;

        stream::unfold(Some(self), |opt_cursor| async move {
            let mut cursor = opt_cursor?;
            match cursor.fetchone().await {
                Ok(Some(item)) => Some((Ok(item), Some(cursor))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::MemoryBinding;
    use crate::connection::Connection;
    use crate::error::ErrorKind;
    use crate::protocol::connect::ConnectParams;
    use crate::protocol::constants::ERR_SYNTAX;

    async fn open() -> (Connection<MemoryBinding>, RowCursor<MemoryBinding>) {
        let conn = Connection::connect(Arc::new(MemoryBinding::new()), ConnectParams::new("localhost"))
            .await
            .unwrap();
        let cursor = conn.cursor().await.unwrap();
        (conn, cursor)
    }

    #[test]
    fn test_params_into_rows() {
        assert!(Params::from(()).into_rows().is_empty());
        assert!(Params::Row(vec![]).into_rows().is_empty());
        assert_eq!(Params::from(vec![Value::from(1)]).into_rows().len(), 1);
        assert_eq!(
            Params::from(vec![vec![Value::from(1)], vec![Value::from(2)]]).into_rows().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_fetch_before_execute_is_state_error() {
        let (_conn, mut cursor) = open().await;
        assert_eq!(cursor.fetchone().await.unwrap_err().kind(), ErrorKind::State);
        assert_eq!(cursor.nextset().await.unwrap_err().kind(), ErrorKind::State);
        assert!(cursor.description().is_none());
        assert_eq!(cursor.rowcount(), -1);
    }

    #[tokio::test]
    async fn test_ddl_has_no_description() {
        let (_conn, mut cursor) = open().await;
        cursor.execute("create table t (c integer)", ()).await.unwrap();
        assert!(cursor.description().is_none());
        assert!(cursor.fetchone().await.unwrap().is_none());
        assert!(cursor.fetchall().await.unwrap().is_empty());
        assert_eq!(cursor.rownumber(), None);
    }

    #[tokio::test]
    async fn test_fetchmany_and_rownumber() {
        let (_conn, mut cursor) = open().await;
        cursor.execute("create table t (c integer)", ()).await.unwrap();
        let batch: Vec<Vec<Value>> = (1..=5).map(|i| vec![Value::from(i)]).collect();
        cursor.executemany("insert into t (?)", batch).await.unwrap();
        assert_eq!(cursor.rowcount(), 5);

        cursor.execute("select c from t order by c", ()).await.unwrap();
        assert_eq!(cursor.rowcount(), 5);
        assert_eq!(cursor.fetchmany(None).await.unwrap().len(), 1);
        cursor.set_arraysize(3);
        assert_eq!(cursor.fetchmany(None).await.unwrap().len(), 3);
        assert_eq!(cursor.rownumber(), Some(4));
        assert_eq!(cursor.fetchmany(Some(10)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_bind_keeps_previous_result() {
        let (_conn, mut cursor) = open().await;
        cursor.execute("select InfoKey from dbc.dbcinfo order by 1", ()).await.unwrap();
        let err = cursor
            .execute(
                "select ?",
                Params::Batch(vec![vec![Value::from(1)], vec![Value::from(1), Value::from(2)]]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Interface);
        let row = cursor.fetchone().await.unwrap().unwrap();
        assert_eq!(row.get(0), Some(&Value::from("LANGUAGE SUPPORT MODE")));
    }

    #[tokio::test]
    async fn test_nativesql_and_escape_only_requests() {
        let (conn, mut cursor) = open().await;
        cursor
            .execute("{fn teradata_nativesql}{fn teradata_session_number}", ())
            .await
            .unwrap();
        let number = conn.session_number().await.unwrap();
        let row = cursor.fetchone().await.unwrap().unwrap();
        assert_eq!(row.get(0), Some(&Value::String(number.to_string())));
        assert_eq!(cursor.description().unwrap().column_names(), vec!["NativeSQL"]);
        assert!(!cursor.nextset().await.unwrap());

        cursor.execute("{fn teradata_autocommit_off}", ()).await.unwrap();
        assert!(!conn.autocommit().await.unwrap());
        assert!(cursor.description().is_none());

        for sql in ["", "   ;  "] {
            let err = cursor.execute(sql, ()).await.unwrap_err();
            assert_eq!(err.code(), Some(ERR_SYNTAX), "{:?}", sql);
        }
    }

    #[tokio::test]
    async fn test_parameter_index_beyond_bind_row() {
        let (_conn, mut cursor) = open().await;
        let err = cursor
            .execute("{fn teradata_parameter(2, INTEGER)}select ?", vec![Value::from("7")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Interface);
        assert!(err.message().contains("index 2"), "{}", err);

        cursor
            .execute("{fn teradata_parameter(1, INTEGER)}select ?", vec![Value::from("7")])
            .await
            .unwrap();
        assert_eq!(cursor.fetchone().await.unwrap().unwrap().get(0), Some(&Value::Integer(7)));
    }

    #[tokio::test]
    async fn test_fake_warning_code_is_bigint() {
        let (_conn, mut cursor) = open().await;
        cursor
            .execute("{fn teradata_fake_result_sets}select 1", ())
            .await
            .unwrap();
        let description = cursor.description().unwrap();
        let index = description.find_by_name("WarningCode").unwrap();
        assert_eq!(description.get(index).unwrap().type_name, "BIGINT");
        let row = cursor.fetchone().await.unwrap().unwrap();
        assert_eq!(row.get_by_name("WarningCode"), Some(&Value::BigInt(0)));
    }

    #[tokio::test]
    async fn test_rpo_with_fake_result_sets_returns_only_metadata() {
        let (_conn, mut cursor) = open().await;
        cursor
            .execute("{fn teradata_rpo(S)}{fn teradata_fake_result_sets}select * from dbc.dbcinfo", ())
            .await
            .unwrap();
        assert_eq!(cursor.description().unwrap().get(0).unwrap().name, "ActivityCount");
        assert!(cursor.fetchone().await.unwrap().is_some());
        assert!(!cursor.nextset().await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_cursor() {
        let (conn, mut cursor) = open().await;
        cursor.close().await.unwrap();
        assert!(cursor.is_closed());
        assert!(matches!(cursor.close().await, Err(Error::CursorClosed)));
        assert!(matches!(cursor.execute("select 1", ()).await, Err(Error::CursorClosed)));

        let mut other = conn.cursor().await.unwrap();
        other.execute("select 1", ()).await.unwrap();
        conn.close().await.unwrap();
        assert!(matches!(other.fetchone().await, Err(Error::ConnectionClosed)));
        assert!(matches!(other.fetchall().await, Err(Error::ConnectionClosed)));
        assert!(matches!(other.nextset().await, Err(Error::ConnectionClosed)));
        assert!(matches!(other.execute("select 1", ()).await, Err(Error::ConnectionClosed)));
        assert!(matches!(other.close().await, Err(Error::ConnectionClosed)));
        assert!(other.is_closed());
    }
}
