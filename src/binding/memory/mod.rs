//! In-process driver binding.
//!
//! [`MemoryBinding`] runs a Teradata-flavoured SQL dialect against in-memory
//! tables. Tables are shared by every session of one binding; a session's
//! changes live in working copies until its transaction commits. Volatile
//! tables belong to the session that created them.
//!
//! Transaction semantics follow the session's transaction mode. In TERA mode
//! a failed request rolls back the whole open transaction; in ANSI mode only
//! the failed request is undone.

mod engine;
mod sql;

use std::collections::{BTreeSet, HashMap, HashSet};

use bytes::Bytes;
use chrono::{Local, NaiveDateTime};
use tokio::sync::Mutex;

use self::engine::{Catalog, Env, SessionInfo, TableSpace};
use self::sql::{Request, Statement};
use super::{ConnectionHandle, DriverBinding, ResultMetadata, RowsHandle, RowsRequest};
use crate::error::{Error, Result};
use crate::protocol::codec::{decode_bind_rows, encode_column_metadata, encode_row};
use crate::protocol::connect::{ClientAttributes, ConnectParams, TransactionMode};
use crate::protocol::constants::{
    ERR_LOGON_FAILED, ERR_PARAM_COUNT, ERR_TOO_MANY_ET, ERR_UNSUPPORTED,
};
use crate::protocol::types::{ColumnDescription, SqlType, Value};

/// Version reported by a binding unless configured otherwise.
pub const DEFAULT_DATABASE_VERSION: &str = "17.20.03.09";

/// User name of sessions that log on without one.
const DEFAULT_USER: &str = "dbc";

const FIRST_SESSION_NUMBER: u64 = 1000;

#[derive(Debug, Clone, Default)]
struct Transaction {
    working: Catalog,
    touched: BTreeSet<String>,
    /// Volatile tables as they were when the transaction began.
    volatile_undo: Catalog,
    /// Open `BT` statements.
    depth: u32,
}

impl Transaction {
    fn begin(volatile: &Catalog) -> Self {
        Self {
            volatile_undo: volatile.clone(),
            ..Self::default()
        }
    }
}

fn commit_transaction(txn: &mut Option<Transaction>, volatile: &mut Catalog, shared: &mut Catalog) {
    let Some(Transaction {
        mut working,
        touched,
        ..
    }) = txn.take()
    else {
        return;
    };
    for key in touched {
        match working.remove(&key) {
            Some(table) => shared.insert(key, table),
            None => {
                shared.remove(&key);
            }
        }
    }
    for table in volatile.tables_mut() {
        if !table.preserve_rows {
            table.rows.clear();
        }
    }
}

fn rollback_transaction(txn: &mut Option<Transaction>, volatile: &mut Catalog) {
    if let Some(open) = txn.take() {
        *volatile = open.volatile_undo;
    }
}

#[derive(Debug)]
struct Session {
    number: u64,
    user: String,
    account: String,
    database: String,
    mode: TransactionMode,
    autocommit: bool,
    client: ClientAttributes,
    logon: NaiveDateTime,
    volatile: Catalog,
    txn: Option<Transaction>,
    results: HashSet<RowsHandle>,
}

/// One statement's result within a request.
#[derive(Debug)]
struct StatementResult {
    activity_type: u16,
    activity_name: &'static str,
    activity_count: u64,
    columns: Option<Vec<ColumnDescription>>,
    rows: Vec<Vec<Value>>,
    position: usize,
}

impl StatementResult {
    fn new(statement: &Statement) -> Self {
        let (activity_type, activity_name) = engine::activity(statement);
        Self {
            activity_type,
            activity_name,
            activity_count: 0,
            columns: None,
            rows: Vec::new(),
            position: 0,
        }
    }

    fn absorb(&mut self, outcome: engine::Outcome) {
        self.activity_count += outcome.activity_count;
        if self.columns.is_none() {
            self.columns = outcome.columns;
        }
        self.rows.extend(outcome.rows);
    }
}

#[derive(Debug)]
struct RequestResult {
    conn: ConnectionHandle,
    results: Vec<StatementResult>,
    current: usize,
    parameters: Vec<ColumnDescription>,
}

impl RequestResult {
    fn current(&mut self) -> Result<&mut StatementResult> {
        self.results
            .get_mut(self.current)
            .ok_or_else(|| Error::invalid_state("Request has no current result"))
    }
}

#[derive(Debug)]
struct State {
    shared: Catalog,
    sessions: HashMap<ConnectionHandle, Session>,
    results: HashMap<RowsHandle, RequestResult>,
    next_handle: u64,
    next_session_number: u64,
}

impl State {
    fn new(database_version: &str) -> Self {
        Self {
            shared: engine::system_catalog(database_version),
            sessions: HashMap::new(),
            results: HashMap::new(),
            next_handle: 1,
            next_session_number: FIRST_SESSION_NUMBER,
        }
    }

    fn allocate_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn session(&mut self, conn: ConnectionHandle) -> Result<&mut Session> {
        self.sessions.get_mut(&conn).ok_or(Error::ConnectionClosed)
    }

    fn result(&mut self, rows: RowsHandle) -> Result<&mut RequestResult> {
        self.results
            .get_mut(&rows)
            .ok_or_else(|| Error::invalid_state(format!("Unknown result handle {}", rows)))
    }
}

/// In-process [`DriverBinding`].
///
/// ```no_run
/// use std::sync::Arc;
/// use teradatasql_rs::{ConnectParams, Connection, MemoryBinding};
///
/// # async fn example() -> teradatasql_rs::Result<()> {
/// let binding = Arc::new(MemoryBinding::new().with_user("guest", "please"));
/// let params = ConnectParams::new("localhost")
///     .with_user("guest")
///     .with_password("please");
/// let conn = Connection::connect(binding, params).await?;
/// conn.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryBinding {
    hosts: Option<HashSet<String>>,
    /// Registered passwords by upper-cased user name.
    users: HashMap<String, String>,
    database_version: String,
    state: Mutex<State>,
}

impl Default for MemoryBinding {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBinding {
    /// A binding that accepts any host and any credentials.
    pub fn new() -> Self {
        Self {
            hosts: None,
            users: HashMap::new(),
            database_version: DEFAULT_DATABASE_VERSION.to_string(),
            state: Mutex::new(State::new(DEFAULT_DATABASE_VERSION)),
        }
    }

    /// Accept only registered hosts. Other hosts are refused.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.hosts
            .get_or_insert_with(HashSet::new)
            .insert(host.into().to_ascii_lowercase());
        self
    }

    /// Register a user. Once any user is registered, logons must match a
    /// registered user and password.
    pub fn with_user(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.users
            .insert(user.into().to_ascii_uppercase(), password.into());
        self
    }

    pub fn with_database_version(mut self, version: impl Into<String>) -> Self {
        self.database_version = version.into();
        self.state.get_mut().shared = engine::system_catalog(&self.database_version);
        self
    }

    /// Number of open sessions.
    pub async fn open_sessions(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    /// Number of unreleased request results.
    pub async fn open_results(&self) -> usize {
        self.state.lock().await.results.len()
    }

    /// Resolve the logon user and password from the logon mechanism.
    fn credentials(params: &ConnectParams) -> Result<(String, String)> {
        let mechanism = params
            .logmech
            .as_deref()
            .unwrap_or("TD2")
            .trim()
            .to_ascii_uppercase();
        match mechanism.as_str() {
            "" | "TD2" | "TDNEGO" => Ok((
                params
                    .user
                    .clone()
                    .filter(|u| !u.is_empty())
                    .unwrap_or_else(|| DEFAULT_USER.to_string()),
                params.password.clone().unwrap_or_default(),
            )),
            "LDAP" => {
                let logdata = params.logdata.as_deref().unwrap_or_default();
                let field = |key: &str| {
                    logdata.split_whitespace().find_map(|pair| {
                        let (k, v) = pair.split_once('=')?;
                        k.eq_ignore_ascii_case(key).then(|| v.to_string())
                    })
                };
                let user = field("authcid").ok_or_else(|| Error::AuthenticationFailed {
                    message: "LDAP logdata has no authcid".to_string(),
                })?;
                Ok((user, field("password").unwrap_or_default()))
            }
            other => Err(Error::connect_param(
                "logmech",
                format!("Unsupported logon mechanism {}", other),
            )),
        }
    }
}

fn param_count_mismatch() -> Error {
    Error::operational(
        ERR_PARAM_COUNT,
        "There is a mismatch between the number of parameters specified and the number of parameters required.",
    )
}

fn session_info<'s>(
    number: u64,
    user: &'s str,
    account: &'s str,
    database: &'s str,
    mode: TransactionMode,
    logon: NaiveDateTime,
    client: &'s ClientAttributes,
) -> SessionInfo<'s> {
    SessionInfo {
        user,
        account,
        database,
        session_number: number,
        mode,
        logon,
        client,
    }
}

/// Parameter metadata and, when not preparing, the execution of every
/// statement once per bind row.
fn run_request(
    shared: &mut Catalog,
    session: &mut Session,
    request: &Request,
    binds: &[Vec<Value>],
    param_types: &[(usize, SqlType)],
    prepare_only: bool,
) -> Result<(Vec<StatementResult>, Vec<ColumnDescription>)> {
    let Session {
        number,
        user,
        account,
        database,
        mode,
        client,
        logon,
        volatile,
        txn,
        ..
    } = session;
    let info = session_info(*number, user, account, database, *mode, *logon, client);
    let first_row = binds.first().map(Vec::as_slice).unwrap_or_default();

    let mut results: Vec<StatementResult> = request.statements.iter().map(StatementResult::new).collect();
    let parameters = {
        let mut scratch = Transaction::default();
        let view = txn.as_mut().unwrap_or(&mut scratch);
        let space = TableSpace {
            shared: &*shared,
            working: &mut view.working,
            touched: &mut view.touched,
            volatile: &mut *volatile,
        };
        let env = Env {
            session: &info,
            params: first_row,
            param_types,
        };
        if prepare_only {
            for (statement, result) in request.statements.iter().zip(results.iter_mut()) {
                result.columns = engine::describe(statement, &space, &env)?;
            }
        }
        engine::parameter_metadata(&request.statements, request.param_count, &space, &env)
    };
    if prepare_only {
        return Ok((results, parameters));
    }

    let no_params: &[Value] = &[];
    let rows: Vec<&[Value]> = if binds.is_empty() {
        vec![no_params]
    } else {
        binds.iter().map(Vec::as_slice).collect()
    };
    for params in rows {
        let env = Env {
            session: &info,
            params,
            param_types,
        };
        for (statement, result) in request.statements.iter().zip(results.iter_mut()) {
            match statement {
                Statement::BeginTransaction => {
                    if *mode == TransactionMode::Ansi {
                        return Err(Error::operational(
                            ERR_UNSUPPORTED,
                            "BEGIN TRANSACTION is not valid in ANSI mode.",
                        ));
                    }
                    txn.get_or_insert_with(|| Transaction::begin(volatile)).depth += 1;
                }
                Statement::EndTransaction => match txn.as_mut() {
                    Some(open) if open.depth > 0 => {
                        open.depth -= 1;
                        if open.depth == 0 {
                            commit_transaction(txn, volatile, shared);
                        }
                    }
                    _ => {
                        return Err(Error::operational(
                            ERR_TOO_MANY_ET,
                            "Too many END TRANSACTION statements.",
                        ))
                    }
                },
                Statement::Commit => commit_transaction(txn, volatile, shared),
                Statement::Rollback => rollback_transaction(txn, volatile),
                _ => {
                    let open = txn.get_or_insert_with(|| Transaction::begin(volatile));
                    let mut space = TableSpace {
                        shared: &*shared,
                        working: &mut open.working,
                        touched: &mut open.touched,
                        volatile: &mut *volatile,
                    };
                    result.absorb(engine::execute(statement, &mut space, &env)?);
                }
            }
        }
    }
    Ok((results, parameters))
}

impl DriverBinding for MemoryBinding {
    async fn create_connection(&self, params: &ConnectParams, client: &ClientAttributes) -> Result<ConnectionHandle> {
        if let Some(hosts) = &self.hosts {
            if !hosts.contains(&params.host.trim().to_ascii_lowercase()) {
                return Err(Error::ConnectionRefused {
                    host: params.host.clone(),
                    message: "Hostname lookup failed".to_string(),
                });
            }
        }
        let (user, password) = Self::credentials(params)?;
        if !self.users.is_empty() {
            match self.users.get(&user.to_ascii_uppercase()) {
                Some(expected) if *expected == password => {}
                _ => {
                    return Err(Error::AuthenticationFailed {
                        message: format!(
                            "[Error {}] The UserId, Password or Account is invalid.",
                            ERR_LOGON_FAILED
                        ),
                    })
                }
            }
        }
        let mode = params.transaction_mode()?;

        let mut state = self.state.lock().await;
        let handle = state.allocate_handle();
        let number = state.next_session_number;
        state.next_session_number += 1;
        state.sessions.insert(
            handle,
            Session {
                number,
                database: user.clone(),
                user,
                account: params.account.clone().unwrap_or_default(),
                mode,
                autocommit: true,
                client: client.clone(),
                logon: Local::now().naive_local(),
                volatile: Catalog::default(),
                txn: None,
                results: HashSet::new(),
            },
        );
        tracing::debug!(session = number, "memory session logged on");
        Ok(handle)
    }

    async fn close_connection(&self, conn: ConnectionHandle) -> Result<()> {
        let mut state = self.state.lock().await;
        // Logoff discards uncommitted work and the session's volatile tables.
        let session = state.sessions.remove(&conn).ok_or(Error::ConnectionClosed)?;
        for rows in &session.results {
            state.results.remove(rows);
        }
        tracing::debug!(session = session.number, "memory session logged off");
        Ok(())
    }

    async fn create_rows(&self, conn: ConnectionHandle, request: &RowsRequest) -> Result<RowsHandle> {
        let parsed = sql::parse_request(&request.sql)?;
        let binds = decode_bind_rows(request.bind.clone())?;
        if !request.prepare_only {
            let mismatch = if binds.is_empty() {
                parsed.param_count > 0
            } else {
                binds.iter().any(|row| row.len() != parsed.param_count)
            };
            if mismatch {
                return Err(param_count_mismatch());
            }
        }

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let session = state.sessions.get_mut(&conn).ok_or(Error::ConnectionClosed)?;

        let savepoint = (session.txn.clone(), session.volatile.clone());
        let outcome = run_request(
            &mut state.shared,
            session,
            &parsed,
            &binds,
            &request.param_types,
            request.prepare_only,
        );
        let (results, parameters) = match outcome {
            Ok(done) => {
                let implicit = session.txn.as_ref().is_some_and(|t| t.depth == 0);
                if session.autocommit && implicit {
                    commit_transaction(&mut session.txn, &mut session.volatile, &mut state.shared);
                }
                done
            }
            Err(err) => {
                match session.mode {
                    TransactionMode::Tera => {
                        rollback_transaction(&mut session.txn, &mut session.volatile)
                    }
                    TransactionMode::Ansi => {
                        (session.txn, session.volatile) = savepoint;
                    }
                }
                return Err(err);
            }
        };

        let handle = state.next_handle;
        state.next_handle += 1;
        session.results.insert(handle);
        state.results.insert(
            handle,
            RequestResult {
                conn,
                results,
                current: 0,
                parameters,
            },
        );
        Ok(handle)
    }

    async fn result_metadata(&self, rows: RowsHandle) -> Result<ResultMetadata> {
        let mut state = self.state.lock().await;
        let request = state.result(rows)?;
        let parameter_metadata = encode_column_metadata(&request.parameters)?;
        let current = request.current()?;
        let column_metadata = match &current.columns {
            Some(columns) => Some(encode_column_metadata(columns)?),
            None => None,
        };
        Ok(ResultMetadata {
            activity_count: current.activity_count,
            activity_type: current.activity_type,
            activity_name: current.activity_name.to_string(),
            warning_code: 0,
            warning_message: String::new(),
            column_metadata,
            parameter_metadata,
        })
    }

    async fn fetch_row(&self, rows: RowsHandle) -> Result<Option<Bytes>> {
        let mut state = self.state.lock().await;
        let current = state.result(rows)?.current()?;
        match current.rows.get(current.position) {
            Some(row) => {
                let encoded = encode_row(row)?;
                current.position += 1;
                Ok(Some(encoded))
            }
            None => Ok(None),
        }
    }

    async fn next_result(&self, rows: RowsHandle) -> Result<bool> {
        let mut state = self.state.lock().await;
        let request = state.result(rows)?;
        if request.current + 1 < request.results.len() {
            request.current += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Releasing an unknown handle is a no-op; results are already gone once
    /// their session logs off.
    async fn close_rows(&self, rows: RowsHandle) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(request) = state.results.remove(&rows) {
            if let Some(session) = state.sessions.get_mut(&request.conn) {
                session.results.remove(&rows);
            }
        }
        Ok(())
    }

    async fn commit(&self, conn: ConnectionHandle) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let session = state.sessions.get_mut(&conn).ok_or(Error::ConnectionClosed)?;
        commit_transaction(&mut session.txn, &mut session.volatile, &mut state.shared);
        Ok(())
    }

    async fn rollback(&self, conn: ConnectionHandle) -> Result<()> {
        let mut state = self.state.lock().await;
        let session = state.session(conn)?;
        rollback_transaction(&mut session.txn, &mut session.volatile);
        Ok(())
    }

    async fn set_autocommit(&self, conn: ConnectionHandle, autocommit: bool) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let session = state.sessions.get_mut(&conn).ok_or(Error::ConnectionClosed)?;
        if autocommit && !session.autocommit {
            commit_transaction(&mut session.txn, &mut session.volatile, &mut state.shared);
        }
        session.autocommit = autocommit;
        Ok(())
    }

    async fn database_version(&self, conn: ConnectionHandle) -> Result<String> {
        let mut state = self.state.lock().await;
        state.session(conn)?;
        Ok(self.database_version.clone())
    }

    async fn session_number(&self, conn: ConnectionHandle) -> Result<u64> {
        let mut state = self.state.lock().await;
        Ok(state.session(conn)?.number)
    }
}
