//! Tables, expression evaluation and statement execution.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{Local, NaiveDateTime};

use super::sql::{
    BinaryOp, ColumnDef, CompareOp, Expr, OrderKey, Predicate, Select, SelectItem, Statement,
    TableName,
};
use crate::error::{Error, Result};
use crate::protocol::connect::{ClientAttributes, TransactionMode};
use crate::protocol::constants::{
    ACTIVITY_BEGIN_TRANSACTION, ACTIVITY_CREATE_TABLE, ACTIVITY_DELETE, ACTIVITY_DROP_TABLE,
    ACTIVITY_END_TRANSACTION, ACTIVITY_HELP, ACTIVITY_INSERT, ACTIVITY_ROLLBACK, ACTIVITY_SELECT,
    ACTIVITY_UPDATE, ERR_BAD_CONVERSION, ERR_COLUMN_MISSING, ERR_DATABASE_MISSING,
    ERR_DIVIDE_BY_ZERO, ERR_DUPLICATE_COLUMN, ERR_DUPLICATE_ROW, ERR_NOT_NULL_MISSING,
    ERR_NO_ACCESS, ERR_NULL_NOT_ALLOWED, ERR_NUMERIC_OVERFLOW, ERR_OBJECT_MISSING, ERR_PARAM_COUNT,
    ERR_STRING_TRUNCATION, ERR_SYNTAX, ERR_TABLE_EXISTS, ERR_TOO_FEW_VALUES, ERR_TOO_MANY_VALUES,
    MAX_CHAR_LENGTH,
};
use crate::protocol::types::{ColumnDescription, SqlType, Value};

/// Database holding the read-only system tables.
pub(crate) const SYSTEM_DATABASE: &str = "DBC";

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Table {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Vec<Value>>,
    /// SET tables reject duplicate rows.
    pub set_table: bool,
    pub volatile: bool,
    /// Volatile tables without `ON COMMIT PRESERVE ROWS` lose their rows at
    /// commit.
    pub preserve_rows: bool,
}

impl Table {
    fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| column_missing(name))
    }

    fn describe(&self) -> Vec<ColumnDescription> {
        self.columns
            .iter()
            .map(|c| ColumnDescription::from_sql_type(c.name.clone(), &c.sql_type, Some(c.nullable)))
            .collect()
    }
}

/// Tables by upper-cased name.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Catalog {
    tables: BTreeMap<String, Table>,
}

impl Catalog {
    pub fn get(&self, key: &str) -> Option<&Table> {
        self.tables.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Table> {
        self.tables.get_mut(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.tables.contains_key(key)
    }

    pub fn insert(&mut self, key: String, table: Table) {
        self.tables.insert(key, table);
    }

    pub fn remove(&mut self, key: &str) -> Option<Table> {
        self.tables.remove(key)
    }

    pub fn tables_mut(&mut self) -> impl Iterator<Item = &mut Table> {
        self.tables.values_mut()
    }
}

/// The system tables every binding starts with.
pub(crate) fn system_catalog(database_version: &str) -> Catalog {
    let varchar = |n| SqlType::Varchar(n);
    let info = Table {
        name: "DBCInfo".to_string(),
        columns: vec![
            ColumnDef {
                name: "InfoKey".to_string(),
                sql_type: varchar(30),
                nullable: false,
            },
            ColumnDef {
                name: "InfoData".to_string(),
                sql_type: varchar(16384),
                nullable: true,
            },
        ],
        rows: [
            ("LANGUAGE SUPPORT MODE", "Standard"),
            ("RELEASE", database_version),
            ("VERSION", database_version),
        ]
        .into_iter()
        .map(|(k, v)| vec![Value::String(k.to_string()), Value::String(v.to_string())])
        .collect(),
        set_table: true,
        volatile: false,
        preserve_rows: true,
    };
    let mut catalog = Catalog::default();
    catalog.insert(format!("{}.DBCINFO", SYSTEM_DATABASE), info);
    catalog
}

/// Tables visible to one session: its volatile tables, its uncommitted
/// working copies, and the committed shared tables it has not touched.
pub(crate) struct TableSpace<'a> {
    pub shared: &'a Catalog,
    pub working: &'a mut Catalog,
    /// Shared table names with a working copy or a pending drop.
    pub touched: &'a mut BTreeSet<String>,
    pub volatile: &'a mut Catalog,
}

impl TableSpace<'_> {
    pub fn get(&self, key: &str) -> Option<&Table> {
        if let Some(table) = self.volatile.get(key) {
            return Some(table);
        }
        if self.touched.contains(key) {
            self.working.get(key)
        } else {
            self.shared.get(key)
        }
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut Table> {
        if self.volatile.contains(key) {
            return self.volatile.get_mut(key);
        }
        if !self.touched.contains(key) {
            let table = self.shared.get(key)?.clone();
            self.working.insert(key.to_string(), table);
            self.touched.insert(key.to_string());
        }
        self.working.get_mut(key)
    }

    fn create(&mut self, key: String, table: Table) -> Result<()> {
        if self.get(&key).is_some() {
            return Err(Error::operational(
                ERR_TABLE_EXISTS,
                format!("Table '{}' already exists.", table.name),
            ));
        }
        if table.volatile {
            self.volatile.insert(key, table);
        } else {
            self.touched.insert(key.clone());
            self.working.insert(key, table);
        }
        Ok(())
    }

    fn drop_table(&mut self, key: &str) -> bool {
        if self.volatile.remove(key).is_some() {
            return true;
        }
        if self.get(key).is_none() {
            return false;
        }
        self.working.remove(key);
        self.touched.insert(key.to_string());
        true
    }
}

/// Session attributes visible to SQL.
pub(crate) struct SessionInfo<'a> {
    pub user: &'a str,
    pub account: &'a str,
    pub database: &'a str,
    pub session_number: u64,
    pub mode: TransactionMode,
    pub logon: NaiveDateTime,
    pub client: &'a ClientAttributes,
}

/// Evaluation environment of one statement execution.
pub(crate) struct Env<'a> {
    pub session: &'a SessionInfo<'a>,
    /// Current bind row.
    pub params: &'a [Value],
    /// Declared parameter types by 0-based marker index.
    pub param_types: &'a [(usize, SqlType)],
}

/// Result of executing one statement once.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Outcome {
    pub activity_count: u64,
    pub columns: Option<Vec<ColumnDescription>>,
    pub rows: Vec<Vec<Value>>,
}

/// Activity type and name reported for a statement.
pub(crate) fn activity(statement: &Statement) -> (u16, &'static str) {
    match statement {
        Statement::CreateTable { .. } => (ACTIVITY_CREATE_TABLE, "Create Table"),
        Statement::DropTable { .. } => (ACTIVITY_DROP_TABLE, "Drop Table"),
        Statement::Insert { .. } => (ACTIVITY_INSERT, "Insert"),
        Statement::Update { .. } => (ACTIVITY_UPDATE, "Update"),
        Statement::Delete { .. } => (ACTIVITY_DELETE, "Delete"),
        Statement::Select(_) => (ACTIVITY_SELECT, "Select"),
        Statement::BeginTransaction => (ACTIVITY_BEGIN_TRANSACTION, "Begin Transaction"),
        Statement::EndTransaction => (ACTIVITY_END_TRANSACTION, "End Transaction"),
        Statement::Commit => (ACTIVITY_END_TRANSACTION, "Commit Work"),
        Statement::Rollback => (ACTIVITY_ROLLBACK, "Rollback"),
        Statement::HelpSession => (ACTIVITY_HELP, "Help"),
    }
}

fn column_missing(name: &str) -> Error {
    Error::operational(ERR_COLUMN_MISSING, format!("Column '{}' does not exist.", name))
}

fn object_missing(name: &TableName) -> Error {
    Error::operational(
        ERR_OBJECT_MISSING,
        format!("Object '{}' does not exist.", display_name(name)),
    )
}

fn display_name(name: &TableName) -> String {
    match &name.database {
        Some(db) => format!("{}.{}", db, name.name),
        None => name.name.clone(),
    }
}

/// Map a value conversion failure to the database error it raises.
fn conversion_failure(err: Error) -> Error {
    match err {
        Error::TypeConversion { message } if message.contains("truncation") => {
            Error::operational(ERR_STRING_TRUNCATION, "Right truncation of string data.")
        }
        Error::TypeConversion { message } if message.contains("overflow") => Error::operational(
            ERR_NUMERIC_OVERFLOW,
            "Numeric overflow occurred during computation.",
        ),
        Error::TypeConversion { message } => Error::operational(
            ERR_BAD_CONVERSION,
            format!("The format or data contains a bad character. {}", message),
        ),
        other => other,
    }
}

fn numeric_overflow() -> Error {
    Error::operational(ERR_NUMERIC_OVERFLOW, "Numeric overflow occurred during computation.")
}

fn bad_data() -> Error {
    Error::operational(ERR_BAD_CONVERSION, "The format or data contains a bad character.")
}

/// Catalog key of a table reference.
pub(crate) fn table_key(name: &TableName, session: &SessionInfo<'_>) -> Result<String> {
    match &name.database {
        Some(db) if db.eq_ignore_ascii_case(SYSTEM_DATABASE) => Ok(format!(
            "{}.{}",
            SYSTEM_DATABASE,
            name.name.to_ascii_uppercase()
        )),
        Some(db)
            if !db.eq_ignore_ascii_case(session.database) && !db.eq_ignore_ascii_case(session.user) =>
        {
            Err(Error::operational(
                ERR_DATABASE_MISSING,
                format!("Database '{}' does not exist.", db),
            ))
        }
        _ => Ok(name.name.to_ascii_uppercase()),
    }
}

fn check_writable(key: &str, access: &str, name: &TableName) -> Result<()> {
    if key.strip_prefix(SYSTEM_DATABASE).is_some_and(|rest| rest.starts_with('.')) {
        return Err(Error::operational(
            ERR_NO_ACCESS,
            format!("The user does not have {} access to {}.", access, display_name(name)),
        ));
    }
    Ok(())
}

fn lookup<'s>(space: &'s TableSpace<'_>, name: &TableName, env: &Env<'_>) -> Result<&'s Table> {
    let key = table_key(name, env.session)?;
    space.get(&key).ok_or_else(|| object_missing(name))
}

/// Execute a data statement. Transaction control statements are the
/// caller's business and produce an empty outcome here.
pub(crate) fn execute(statement: &Statement, space: &mut TableSpace<'_>, env: &Env<'_>) -> Result<Outcome> {
    match statement {
        Statement::CreateTable {
            table,
            set,
            volatile,
            columns,
            preserve_rows,
        } => create_table(table, *set, *volatile, columns, *preserve_rows, space, env),
        Statement::DropTable { table } => {
            let key = table_key(table, env.session)?;
            check_writable(&key, "DROP TABLE", table)?;
            if !space.drop_table(&key) {
                return Err(object_missing(table));
            }
            Ok(Outcome::default())
        }
        Statement::Insert {
            table,
            columns,
            values,
        } => insert(table, columns.as_deref(), values, space, env),
        Statement::Update {
            table,
            assignments,
            filter,
        } => update(table, assignments, filter, space, env),
        Statement::Delete { table, filter } => delete(table, filter, space, env),
        Statement::Select(select) => run_select(select, space, env),
        Statement::HelpSession => Ok(help_session(env.session)),
        Statement::BeginTransaction
        | Statement::EndTransaction
        | Statement::Commit
        | Statement::Rollback => Ok(Outcome::default()),
    }
}

/// Column metadata of a statement without executing it. Referenced tables
/// must exist.
pub(crate) fn describe(statement: &Statement, space: &TableSpace<'_>, env: &Env<'_>) -> Result<Option<Vec<ColumnDescription>>> {
    match statement {
        Statement::Select(select) => {
            let table = match &select.from {
                Some(name) => Some(lookup(space, name, env)?),
                None => None,
            };
            select_columns(select, table, env).map(Some)
        }
        Statement::HelpSession => Ok(help_session(env.session).columns),
        Statement::Insert { table, .. }
        | Statement::Update { table, .. }
        | Statement::Delete { table, .. }
        | Statement::DropTable { table } => {
            lookup(space, table, env)?;
            Ok(None)
        }
        _ => Ok(None),
    }
}

fn create_table(
    name: &TableName,
    set: Option<bool>,
    volatile: bool,
    columns: &[ColumnDef],
    preserve_rows: bool,
    space: &mut TableSpace<'_>,
    env: &Env<'_>,
) -> Result<Outcome> {
    let key = table_key(name, env.session)?;
    check_writable(&key, "CREATE TABLE", name)?;
    for (i, column) in columns.iter().enumerate() {
        if columns[..i].iter().any(|c| c.name.eq_ignore_ascii_case(&column.name)) {
            return Err(Error::operational(
                ERR_DUPLICATE_COLUMN,
                format!("Column '{}' specified more than once in '{}'.", column.name, name.name),
            ));
        }
    }
    let table = Table {
        name: name.name.clone(),
        columns: columns.to_vec(),
        rows: Vec::new(),
        set_table: set.unwrap_or(env.session.mode == TransactionMode::Tera),
        volatile,
        preserve_rows: !volatile || preserve_rows,
    };
    space.create(key, table)?;
    Ok(Outcome::default())
}

fn check_value_count(given: usize, expected: usize) -> Result<()> {
    match given.cmp(&expected) {
        Ordering::Less => Err(Error::operational(
            ERR_TOO_FEW_VALUES,
            "The positional assignment list has too few values.",
        )),
        Ordering::Greater => Err(Error::operational(
            ERR_TOO_MANY_VALUES,
            "The positional assignment list has too many values.",
        )),
        Ordering::Equal => Ok(()),
    }
}

/// Convert a value to a column's type.
fn conform(column: &ColumnDef, value: &Value) -> Result<Value> {
    let value = column.sql_type.coerce(value).map_err(conversion_failure)?;
    if value.is_null() && !column.nullable {
        return Err(Error::operational(
            ERR_NULL_NOT_ALLOWED,
            "Cannot place a null value in a NOT NULL field.",
        ));
    }
    Ok(value)
}

fn insert(
    name: &TableName,
    columns: Option<&[String]>,
    values: &[Expr],
    space: &mut TableSpace<'_>,
    env: &Env<'_>,
) -> Result<Outcome> {
    let key = table_key(name, env.session)?;
    check_writable(&key, "INSERT", name)?;
    let evaluated = values
        .iter()
        .map(|e| eval(e, Scope::EMPTY, env))
        .collect::<Result<Vec<_>>>()?;
    let table = space.get_mut(&key).ok_or_else(|| object_missing(name))?;

    let width = table.columns.len();
    let mut row = vec![Value::Null; width];
    let mut supplied = vec![columns.is_none(); width];
    match columns {
        None => {
            check_value_count(evaluated.len(), width)?;
            row = evaluated;
        }
        Some(names) => {
            check_value_count(evaluated.len(), names.len())?;
            for (name, value) in names.iter().zip(evaluated) {
                let index = table.column_index(name)?;
                row[index] = value;
                supplied[index] = true;
            }
        }
    }

    let mut conformed = Vec::with_capacity(width);
    for ((column, value), supplied) in table.columns.iter().zip(&row).zip(&supplied) {
        if !supplied && !column.nullable {
            return Err(Error::operational(
                ERR_NOT_NULL_MISSING,
                format!("Column '{}' is NOT NULL. Give the column a value.", column.name),
            ));
        }
        conformed.push(conform(column, value)?);
    }
    if table.set_table && table.rows.contains(&conformed) {
        return Err(Error::operational(
            ERR_DUPLICATE_ROW,
            format!("Duplicate row error in {}.", table.name),
        ));
    }
    table.rows.push(conformed);
    Ok(Outcome {
        activity_count: 1,
        ..Outcome::default()
    })
}

fn update(
    name: &TableName,
    assignments: &[(String, Expr)],
    filter: &[Predicate],
    space: &mut TableSpace<'_>,
    env: &Env<'_>,
) -> Result<Outcome> {
    let key = table_key(name, env.session)?;
    check_writable(&key, "UPDATE", name)?;
    let table = space.get_mut(&key).ok_or_else(|| object_missing(name))?;
    let targets = assignments
        .iter()
        .map(|(column, expr)| Ok((table.column_index(column)?, expr)))
        .collect::<Result<Vec<_>>>()?;

    let mut count = 0;
    for i in 0..table.rows.len() {
        let changes = {
            let scope = Scope {
                table: Some(&*table),
                row: &table.rows[i],
            };
            if !accepts(filter, scope, env)? {
                continue;
            }
            targets
                .iter()
                .map(|(index, expr)| conform(&table.columns[*index], &eval(expr, scope, env)?))
                .collect::<Result<Vec<_>>>()?
        };
        for ((index, _), value) in targets.iter().zip(changes) {
            table.rows[i][*index] = value;
        }
        count += 1;
    }
    Ok(Outcome {
        activity_count: count,
        ..Outcome::default()
    })
}

fn delete(
    name: &TableName,
    filter: &[Predicate],
    space: &mut TableSpace<'_>,
    env: &Env<'_>,
) -> Result<Outcome> {
    let key = table_key(name, env.session)?;
    check_writable(&key, "DELETE", name)?;
    let table = space.get_mut(&key).ok_or_else(|| object_missing(name))?;
    let keep = table
        .rows
        .iter()
        .map(|row| {
            let scope = Scope {
                table: Some(&*table),
                row,
            };
            accepts(filter, scope, env).map(|hit| !hit)
        })
        .collect::<Result<Vec<bool>>>()?;
    let before = table.rows.len();
    let mut keep = keep.into_iter();
    table.rows.retain(|_| keep.next().unwrap_or(true));
    Ok(Outcome {
        activity_count: (before - table.rows.len()) as u64,
        ..Outcome::default()
    })
}

fn help_session(session: &SessionInfo<'_>) -> Outcome {
    let text = |s: &str| Value::String(s.to_string());
    let semantics = match session.mode {
        TransactionMode::Tera => "Teradata",
        TransactionMode::Ansi => "ANSI",
    };
    let fields = vec![
        ("User Name", SqlType::Varchar(128), text(session.user)),
        ("Account Name", SqlType::Varchar(128), text(session.account)),
        ("Logon Date", SqlType::Date, Value::Date(session.logon.date())),
        (
            "Logon Time",
            SqlType::Varchar(8),
            Value::String(session.logon.format("%H:%M:%S").to_string()),
        ),
        ("Current DataBase", SqlType::Varchar(128), text(session.database)),
        ("Collation", SqlType::Varchar(10), text("ASCII")),
        ("Character Set", SqlType::Varchar(30), text("UTF8")),
        ("Transaction Semantics", SqlType::Varchar(8), text(semantics)),
        (
            "Session Number",
            SqlType::BigInt,
            Value::BigInt(session.session_number as i64),
        ),
        (
            "Client Program Name",
            SqlType::Varchar(128),
            text(&session.client.program_name),
        ),
        (
            "Client Driver Version",
            SqlType::Varchar(32),
            text(&session.client.driver_version),
        ),
        ("Client User", SqlType::Varchar(128), text(&session.client.os_user)),
        ("Client Host", SqlType::Varchar(128), text(&session.client.client_host)),
        (
            "Client Process ID",
            SqlType::BigInt,
            Value::BigInt(session.client.process_id as i64),
        ),
    ];
    let columns = fields
        .iter()
        .map(|(name, ty, _)| ColumnDescription::from_sql_type(*name, ty, Some(true)))
        .collect();
    let row = fields.into_iter().map(|(_, _, value)| value).collect();
    Outcome {
        activity_count: 1,
        columns: Some(columns),
        rows: vec![row],
    }
}

#[derive(Clone, Copy)]
struct Scope<'t> {
    table: Option<&'t Table>,
    row: &'t [Value],
}

impl Scope<'static> {
    const EMPTY: Scope<'static> = Scope {
        table: None,
        row: &[],
    };
}

fn accepts(filter: &[Predicate], scope: Scope<'_>, env: &Env<'_>) -> Result<bool> {
    for predicate in filter {
        let hit = match predicate {
            Predicate::IsNull { expr, negated } => eval(expr, scope, env)?.is_null() != *negated,
            Predicate::Compare(left, op, right) => {
                let left = eval(left, scope, env)?;
                let right = eval(right, scope, env)?;
                match compare(&left, &right)? {
                    None => false,
                    Some(ordering) => match op {
                        CompareOp::Eq => ordering == Ordering::Equal,
                        CompareOp::Ne => ordering != Ordering::Equal,
                        CompareOp::Lt => ordering == Ordering::Less,
                        CompareOp::Le => ordering != Ordering::Greater,
                        CompareOp::Gt => ordering == Ordering::Greater,
                        CompareOp::Ge => ordering != Ordering::Less,
                    },
                }
            }
        };
        if !hit {
            return Ok(false);
        }
    }
    Ok(true)
}

/// SQL comparison; `None` when either side is NULL.
fn compare(left: &Value, right: &Value) -> Result<Option<Ordering>> {
    if left.is_null() || right.is_null() {
        return Ok(None);
    }
    let as_type = |ty: SqlType, v: &Value| ty.coerce(v).map_err(conversion_failure);
    let ordering = match (left, right) {
        (Value::Date(_), Value::String(_)) => left.sql_cmp(&as_type(SqlType::Date, right)?),
        (Value::String(_), Value::Date(_)) => as_type(SqlType::Date, left)?.sql_cmp(right),
        (Value::Timestamp(_), Value::String(_)) => {
            left.sql_cmp(&as_type(SqlType::Timestamp { with_time_zone: false }, right)?)
        }
        (Value::String(_), Value::Timestamp(_)) => {
            as_type(SqlType::Timestamp { with_time_zone: false }, left)?.sql_cmp(right)
        }
        _ => left.sql_cmp(right),
    };
    ordering.map(Some).ok_or_else(bad_data)
}

fn eval(expr: &Expr, scope: Scope<'_>, env: &Env<'_>) -> Result<Value> {
    let value = match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Column(name) => {
            let table = scope.table.ok_or_else(|| column_missing(name))?;
            let index = table.column_index(name)?;
            scope.row.get(index).cloned().unwrap_or(Value::Null)
        }
        Expr::Param(index) => env.params.get(*index).cloned().ok_or_else(|| {
            Error::operational(
                ERR_PARAM_COUNT,
                format!("Parameter {} has no bind value.", index + 1),
            )
        })?,
        Expr::User => Value::String(env.session.user.to_string()),
        Expr::Database => Value::String(env.session.database.to_string()),
        Expr::Session => Value::BigInt(env.session.session_number as i64),
        Expr::CurrentDate => Value::Date(Local::now().date_naive()),
        Expr::CurrentTimestamp => Value::TimestampWithTimeZone(
            Local::now().format("%Y-%m-%d %H:%M:%S%.6f%:z").to_string(),
        ),
        Expr::Negate(inner) => negate(eval(inner, scope, env)?)?,
        Expr::Cast(inner, ty) => ty.coerce(&eval(inner, scope, env)?).map_err(conversion_failure)?,
        Expr::Binary(left, op, right) => {
            binary(eval(left, scope, env)?, *op, eval(right, scope, env)?)?
        }
    };
    Ok(value)
}

fn negate(value: Value) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Integer(n) => n.checked_neg().map(Value::Integer).ok_or_else(numeric_overflow),
        Value::BigInt(n) => n.checked_neg().map(Value::BigInt).ok_or_else(numeric_overflow),
        Value::Double(d) => Ok(Value::Double(-d)),
        Value::Number(s) => Ok(Value::Number(match s.strip_prefix('-') {
            Some(rest) => rest.to_string(),
            None => format!("-{}", s),
        })),
        other => other.to_f64().map(|d| Value::Double(-d)).ok_or_else(bad_data),
    }
}

fn integral(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(n) => Some(*n as i64),
        Value::BigInt(n) => Some(*n),
        _ => None,
    }
}

fn decimal_scale(value: &Value) -> usize {
    match value {
        Value::Number(s) => s.split_once('.').map_or(0, |(_, f)| f.len()),
        _ => 0,
    }
}

fn binary(left: Value, op: BinaryOp, right: Value) -> Result<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    if op == BinaryOp::Concat {
        return Ok(Value::String(format!("{}{}", left, right)));
    }
    let divide_by_zero = || Error::operational(ERR_DIVIDE_BY_ZERO, "Invalid calculation: division by zero.");

    if let (Some(a), Some(b)) = (integral(&left), integral(&right)) {
        let n = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            _ => {
                if b == 0 {
                    return Err(divide_by_zero());
                }
                a.checked_div(b)
            }
        }
        .ok_or_else(numeric_overflow)?;
        let both_integer = matches!(left, Value::Integer(_)) && matches!(right, Value::Integer(_));
        return Ok(match i32::try_from(n) {
            Ok(small) if both_integer => Value::Integer(small),
            _ => Value::BigInt(n),
        });
    }

    let a = left.to_f64().ok_or_else(bad_data)?;
    let b = right.to_f64().ok_or_else(bad_data)?;
    if op == BinaryOp::Div && b == 0.0 {
        return Err(divide_by_zero());
    }
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        _ => a / b,
    };
    let exact = |v: &Value| matches!(v, Value::Integer(_) | Value::BigInt(_) | Value::Number(_));
    if exact(&left) && exact(&right) {
        let (sa, sb) = (decimal_scale(&left), decimal_scale(&right));
        let scale = match op {
            BinaryOp::Mul => sa + sb,
            BinaryOp::Div => sa.max(sb).max(2),
            _ => sa.max(sb),
        }
        .min(38);
        Ok(Value::Number(format!("{:.*}", scale, result)))
    } else {
        Ok(Value::Double(result))
    }
}

fn param_type(index: usize, env: &Env<'_>) -> SqlType {
    env.param_types
        .iter()
        .find(|(i, _)| *i == index)
        .map(|(_, ty)| ty.clone())
        .or_else(|| env.params.get(index).map(SqlType::of_value))
        .unwrap_or(SqlType::Varchar(1))
}

fn char_length(ty: &SqlType) -> u32 {
    match ty {
        SqlType::Char(n) | SqlType::Varchar(n) => *n,
        _ => 20,
    }
}

fn combine(left: &SqlType, op: BinaryOp, right: &SqlType) -> SqlType {
    use SqlType::*;
    if op == BinaryOp::Concat {
        return Varchar(char_length(left).saturating_add(char_length(right)).min(MAX_CHAR_LENGTH));
    }
    match (left, right) {
        (Float, _) | (_, Float) => Float,
        (Char(_) | Varchar(_), _) | (_, Char(_) | Varchar(_)) => Float,
        (Number, _) | (_, Number) => Number,
        (Decimal { .. }, _) | (_, Decimal { .. }) => {
            let precision = (left.precision().max(right.precision()) + 1).min(38);
            let scale = match op {
                BinaryOp::Mul => left.scale() + right.scale(),
                BinaryOp::Div => left.scale().max(right.scale()).max(2),
                _ => left.scale().max(right.scale()),
            }
            .min(precision);
            Decimal {
                precision: precision as u8,
                scale: scale as u8,
            }
        }
        (BigInt, _) | (_, BigInt) => BigInt,
        _ => Integer,
    }
}

/// Type and nullability of an expression.
fn expr_type(expr: &Expr, table: Option<&Table>, env: &Env<'_>) -> Result<(SqlType, bool)> {
    let typed = match expr {
        Expr::Literal(value) => (SqlType::of_value(value), value.is_null()),
        Expr::Column(name) => {
            let table = table.ok_or_else(|| column_missing(name))?;
            let column = &table.columns[table.column_index(name)?];
            (column.sql_type.clone(), column.nullable)
        }
        Expr::Param(index) => (param_type(*index, env), true),
        Expr::User | Expr::Database => (SqlType::Varchar(128), false),
        Expr::Session => (SqlType::BigInt, false),
        Expr::CurrentDate => (SqlType::Date, false),
        Expr::CurrentTimestamp => (SqlType::Timestamp { with_time_zone: true }, false),
        Expr::Negate(inner) => expr_type(inner, table, env)?,
        Expr::Cast(inner, ty) => (ty.clone(), expr_type(inner, table, env)?.1),
        Expr::Binary(left, op, right) => {
            let (lt, ln) = expr_type(left, table, env)?;
            let (rt, rn) = expr_type(right, table, env)?;
            (combine(&lt, *op, &rt), ln || rn)
        }
    };
    Ok(typed)
}

fn wildcard_without_table() -> Error {
    Error::operational(ERR_SYNTAX, "Syntax error: '*' requires a FROM clause.")
}

fn select_columns(select: &Select, table: Option<&Table>, env: &Env<'_>) -> Result<Vec<ColumnDescription>> {
    let mut columns = Vec::new();
    for item in &select.items {
        match item {
            SelectItem::Wildcard => {
                columns.extend(table.ok_or_else(wildcard_without_table)?.describe());
            }
            SelectItem::Expr { expr, title, alias } => {
                let (ty, nullable) = expr_type(expr, table, env)?;
                let name = match (alias, expr, table) {
                    (Some(alias), _, _) => alias.clone(),
                    (None, Expr::Column(name), Some(table)) => {
                        table.columns[table.column_index(name)?].name.clone()
                    }
                    _ => title.clone(),
                };
                columns.push(ColumnDescription::from_sql_type(name, &ty, Some(nullable)));
            }
        }
    }
    Ok(columns)
}

enum SortSource {
    Output(usize),
    Source(usize),
}

fn run_select(select: &Select, space: &TableSpace<'_>, env: &Env<'_>) -> Result<Outcome> {
    let table = match &select.from {
        Some(name) => Some(lookup(space, name, env)?),
        None => None,
    };
    let columns = select_columns(select, table, env)?;

    let mut projection = Vec::new();
    for item in &select.items {
        match item {
            SelectItem::Wildcard => {
                let table = table.ok_or_else(wildcard_without_table)?;
                projection.extend(table.columns.iter().map(|c| Expr::Column(c.name.clone())));
            }
            SelectItem::Expr { expr, .. } => projection.push(expr.clone()),
        }
    }

    let mut order = Vec::with_capacity(select.order_by.len());
    for key in &select.order_by {
        let source = match &key.key {
            OrderKey::Position(position) if *position <= columns.len() => {
                SortSource::Output(position - 1)
            }
            OrderKey::Position(position) => {
                return Err(Error::operational(
                    ERR_SYNTAX,
                    format!("Syntax error: ORDER BY position {} is out of range.", position),
                ))
            }
            OrderKey::Column(name) => {
                match columns.iter().position(|c| c.name.eq_ignore_ascii_case(name)) {
                    Some(index) => SortSource::Output(index),
                    None => SortSource::Source(
                        table.ok_or_else(|| column_missing(name))?.column_index(name)?,
                    ),
                }
            }
        };
        order.push((source, key.descending));
    }

    let source_rows: Vec<&[Value]> = match table {
        Some(table) => table.rows.iter().map(Vec::as_slice).collect(),
        None => vec![Scope::EMPTY.row],
    };
    let mut output = Vec::new();
    for row in source_rows {
        let scope = Scope { table, row };
        if !accepts(&select.filter, scope, env)? {
            continue;
        }
        let values = projection
            .iter()
            .map(|e| eval(e, scope, env))
            .collect::<Result<Vec<_>>>()?;
        let keys: Vec<Value> = order
            .iter()
            .map(|(source, _)| {
                let value = match source {
                    SortSource::Output(i) => values.get(*i),
                    SortSource::Source(i) => row.get(*i),
                };
                value.cloned().unwrap_or(Value::Null)
            })
            .collect();
        output.push((values, keys));
    }

    if !order.is_empty() {
        output.sort_by(|(_, a), (_, b)| {
            for (k, (_, descending)) in order.iter().enumerate() {
                let ordering = a[k].sql_cmp(&b[k]).unwrap_or(Ordering::Equal);
                let ordering = if *descending { ordering.reverse() } else { ordering };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    let rows: Vec<Vec<Value>> = output.into_iter().map(|(values, _)| values).collect();
    Ok(Outcome {
        activity_count: rows.len() as u64,
        columns: Some(columns),
        rows,
    })
}

/// Metadata of the parameter markers of a request. Types come from the
/// declared type, else the column the marker is assigned to or compared
/// with, else the bound value.
pub(crate) fn parameter_metadata(
    statements: &[Statement],
    param_count: usize,
    space: &TableSpace<'_>,
    env: &Env<'_>,
) -> Vec<ColumnDescription> {
    fn note<'t>(inferred: &mut [Option<&'t ColumnDef>], expr: &Expr, column: Option<&'t ColumnDef>) {
        if let (Expr::Param(index), Some(column)) = (expr, column) {
            if let Some(slot) = inferred.get_mut(*index) {
                slot.get_or_insert(column);
            }
        }
    }
    fn find<'t>(table: Option<&'t Table>, name: &str) -> Option<&'t ColumnDef> {
        table.and_then(|t| t.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name)))
    }

    let mut inferred: Vec<Option<&ColumnDef>> = vec![None; param_count];
    let tables: Vec<Option<&Table>> = statements
        .iter()
        .map(|statement| {
            let name = match statement {
                Statement::Insert { table, .. }
                | Statement::Update { table, .. }
                | Statement::Delete { table, .. } => Some(table),
                Statement::Select(select) => select.from.as_ref(),
                _ => None,
            };
            name.and_then(|name| lookup(space, name, env).ok())
        })
        .collect();

    for (statement, table) in statements.iter().zip(tables) {
        let mut filters: &[Predicate] = &[];
        match statement {
            Statement::Insert {
                columns, values, ..
            } => {
                for (position, expr) in values.iter().enumerate() {
                    let column = match columns {
                        Some(names) => names.get(position).and_then(|n| find(table, n)),
                        None => table.and_then(|t| t.columns.get(position)),
                    };
                    note(&mut inferred, expr, column);
                }
            }
            Statement::Update {
                assignments,
                filter,
                ..
            } => {
                for (name, expr) in assignments {
                    note(&mut inferred, expr, find(table, name));
                }
                filters = filter;
            }
            Statement::Delete { filter, .. } => filters = filter,
            Statement::Select(select) => filters = &select.filter,
            _ => {}
        }
        for predicate in filters {
            if let Predicate::Compare(left, _, right) = predicate {
                match (left, right) {
                    (Expr::Column(name), param @ Expr::Param(_))
                    | (param @ Expr::Param(_), Expr::Column(name)) => {
                        note(&mut inferred, param, find(table, name))
                    }
                    _ => {}
                }
            }
        }
    }

    (0..param_count)
        .map(|index| {
            let declared = env.param_types.iter().find(|(i, _)| *i == index);
            match (declared, inferred[index]) {
                (Some((_, ty)), column) => ColumnDescription::from_sql_type(
                    column.map(|c| c.name.clone()).unwrap_or_default(),
                    ty,
                    Some(true),
                ),
                (None, Some(column)) => {
                    ColumnDescription::from_sql_type(column.name.clone(), &column.sql_type, Some(true))
                }
                (None, None) => ColumnDescription::from_sql_type("", &param_type(index, env), Some(true)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::memory::sql::parse_request;

    struct Fixture {
        shared: Catalog,
        working: Catalog,
        touched: BTreeSet<String>,
        volatile: Catalog,
        client: ClientAttributes,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                shared: system_catalog("17.20.03.09"),
                working: Catalog::default(),
                touched: BTreeSet::new(),
                volatile: Catalog::default(),
                client: ClientAttributes {
                    program_name: "test".into(),
                    driver_version: "0.0.0".into(),
                    os_user: "tester".into(),
                    client_host: "localhost".into(),
                    process_id: 1,
                },
            }
        }

        fn run_with(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Outcome>> {
            let request = parse_request(sql)?;
            let session = SessionInfo {
                user: "dbc",
                account: "",
                database: "dbc",
                session_number: 1001,
                mode: TransactionMode::Tera,
                logon: Local::now().naive_local(),
                client: &self.client,
            };
            let env = Env {
                session: &session,
                params,
                param_types: &[],
            };
            let mut space = TableSpace {
                shared: &self.shared,
                working: &mut self.working,
                touched: &mut self.touched,
                volatile: &mut self.volatile,
            };
            request
                .statements
                .iter()
                .map(|s| execute(s, &mut space, &env))
                .collect()
        }

        fn run(&mut self, sql: &str) -> Result<Vec<Outcome>> {
            self.run_with(sql, &[])
        }

        fn rows(&mut self, sql: &str) -> Vec<Vec<Value>> {
            self.run(sql).unwrap().pop().unwrap().rows
        }
    }

    #[test]
    fn test_insert_select_order_by() {
        let mut db = Fixture::new();
        db.run("create table t (c1 integer, c2 varchar(10))").unwrap();
        db.run("insert into t (3, 'c'); insert into t (1, 'a'); insert into t values (2, null)")
            .unwrap();

        let rows = db.rows("select c2, c1 from t order by c1");
        assert_eq!(
            rows,
            vec![
                vec![Value::String("a".into()), Value::Integer(1)],
                vec![Value::Null, Value::Integer(2)],
                vec![Value::String("c".into()), Value::Integer(3)],
            ]
        );

        let rows = db.rows("select c1 from t where c2 is not null order by 1 desc");
        assert_eq!(rows, vec![vec![Value::Integer(3)], vec![Value::Integer(1)]]);

        let outcome = db.run("select * from t where c1 >= 2").unwrap().remove(0);
        assert_eq!(outcome.activity_count, 2);
        let columns = outcome.columns.unwrap();
        assert_eq!(columns[0].name, "c1");
        assert_eq!(columns[1].type_name, "VARCHAR(10)");
    }

    #[test]
    fn test_select_without_table() {
        let mut db = Fixture::new();
        let outcome = db.run("select 1 + 2 as n, 'x' || 'y', user, session").unwrap().remove(0);
        assert_eq!(
            outcome.rows,
            vec![vec![
                Value::Integer(3),
                Value::String("xy".into()),
                Value::String("dbc".into()),
                Value::BigInt(1001),
            ]]
        );
        let columns = outcome.columns.unwrap();
        assert_eq!(columns[0].name, "n");
        assert_eq!(columns[1].name, "'x' || 'y'");
        assert_eq!(columns[3].type_name, "BIGINT");
    }

    #[test]
    fn test_update_and_delete_counts() {
        let mut db = Fixture::new();
        db.run("create multiset table t (k integer, v decimal(5,2))").unwrap();
        for k in 1..=4 {
            db.run_with("insert into t (?, ?)", &[Value::Integer(k), Value::String("1.005".into())])
                .unwrap();
        }
        let updated = db.run("update t set v = v * 2 where k > 2").unwrap().remove(0);
        assert_eq!(updated.activity_count, 2);
        let rows = db.rows("select v from t where k = 4");
        assert_eq!(rows, vec![vec![Value::Number("2.02".into())]]);

        let deleted = db.run("delete from t where k <> 1").unwrap().remove(0);
        assert_eq!(deleted.activity_count, 3);
        assert_eq!(db.rows("select k from t"), vec![vec![Value::Integer(1)]]);
    }

    #[test]
    fn test_constraint_errors() {
        let mut db = Fixture::new();
        db.run("create set table t (k integer not null, s char(3))").unwrap();
        db.run("insert into t (1, 'a')").unwrap();

        let err = db.run("insert into t (1, 'a')").unwrap_err();
        assert_eq!(err.code(), Some(ERR_DUPLICATE_ROW));
        let err = db.run("insert into t (null, 'b')").unwrap_err();
        assert_eq!(err.code(), Some(ERR_NULL_NOT_ALLOWED));
        let err = db.run("insert into t (s) values ('b')").unwrap_err();
        assert_eq!(err.code(), Some(ERR_NOT_NULL_MISSING));
        let err = db.run("insert into t (2, 'abcd')").unwrap_err();
        assert_eq!(err.code(), Some(ERR_STRING_TRUNCATION));
        let err = db.run("insert into t ('x', 'b')").unwrap_err();
        assert_eq!(err.code(), Some(ERR_BAD_CONVERSION));
        let err = db.run("insert into t (2)").unwrap_err();
        assert_eq!(err.code(), Some(ERR_TOO_FEW_VALUES));
        let err = db.run("insert into t (2, 'b', 3)").unwrap_err();
        assert_eq!(err.code(), Some(ERR_TOO_MANY_VALUES));
        let err = db.run("create table t (x integer)").unwrap_err();
        assert_eq!(err.code(), Some(ERR_TABLE_EXISTS));
        let err = db.run("select nope from t").unwrap_err();
        assert_eq!(err.code(), Some(ERR_COLUMN_MISSING));
        let err = db.run("drop table missing").unwrap_err();
        assert_eq!(err.code(), Some(ERR_OBJECT_MISSING));
        let err = db.run("select * from nodb.t").unwrap_err();
        assert_eq!(err.code(), Some(ERR_DATABASE_MISSING));
        let err = db.run("select 1 / 0").unwrap_err();
        assert_eq!(err.code(), Some(ERR_DIVIDE_BY_ZERO));

        // CHAR values are padded and compare without trailing blanks.
        assert_eq!(db.rows("select s from t where s = 'a'"), vec![vec![Value::String("a  ".into())]]);
    }

    #[test]
    fn test_character_lengths_are_bounded() {
        let mut db = Fixture::new();
        let err = db.run("create table big (a varchar(4294967295))").unwrap_err();
        assert_eq!(err.code(), Some(ERR_SYNTAX));

        db.run("create table t (a varchar(64000))").unwrap();
        db.run("insert into t ('x')").unwrap();
        let outcome = db.run("select a || a from t").unwrap().remove(0);
        assert_eq!(outcome.columns.unwrap()[0].type_name, "VARCHAR(64000)");
        assert_eq!(outcome.rows, vec![vec![Value::String("xx".into())]]);

        let wide = SqlType::Varchar(u32::MAX);
        assert_eq!(combine(&wide, BinaryOp::Concat, &wide), SqlType::Varchar(MAX_CHAR_LENGTH));
    }

    #[test]
    fn test_working_copy_isolated_from_shared() {
        let mut db = Fixture::new();
        db.shared.insert(
            "T".into(),
            Table {
                name: "t".into(),
                columns: vec![ColumnDef {
                    name: "c".into(),
                    sql_type: SqlType::Integer,
                    nullable: true,
                }],
                rows: vec![],
                set_table: false,
                volatile: false,
                preserve_rows: true,
            },
        );
        db.run("insert into t (1)").unwrap();
        assert!(db.shared.get("T").unwrap().rows.is_empty());
        assert_eq!(db.working.get("T").unwrap().rows.len(), 1);
        assert!(db.touched.contains("T"));

        db.run("drop table t").unwrap();
        assert!(db.shared.contains("T"));
        assert_eq!(db.run("select * from t").unwrap_err().code(), Some(ERR_OBJECT_MISSING));
    }

    #[test]
    fn test_system_table_is_read_only() {
        let mut db = Fixture::new();
        let rows = db.rows("select InfoData from dbc.dbcinfo where InfoKey = 'VERSION'");
        assert_eq!(rows, vec![vec![Value::String("17.20.03.09".into())]]);
        let err = db.run("delete from dbc.dbcinfo").unwrap_err();
        assert_eq!(err.code(), Some(ERR_NO_ACCESS));
    }

    #[test]
    fn test_help_session() {
        let mut db = Fixture::new();
        let outcome = db.run("help session").unwrap().remove(0);
        let columns = outcome.columns.unwrap();
        assert_eq!(columns[0].name, "User Name");
        let semantics = columns
            .iter()
            .position(|c| c.name == "Transaction Semantics")
            .unwrap();
        assert_eq!(outcome.rows[0][semantics], Value::String("Teradata".into()));
    }

    #[test]
    fn test_parameter_metadata_from_columns() {
        let mut db = Fixture::new();
        db.run("create table t (a integer, b varchar(20), c date)").unwrap();
        let request = parse_request("insert into t (c, a) values (?, ?); select b from t where b = ? and ? > 1")
            .unwrap();
        let session = SessionInfo {
            user: "dbc",
            account: "",
            database: "dbc",
            session_number: 1,
            mode: TransactionMode::Tera,
            logon: Local::now().naive_local(),
            client: &db.client,
        };
        let declared = [(3, SqlType::SmallInt)];
        let env = Env {
            session: &session,
            params: &[],
            param_types: &declared,
        };
        let space = TableSpace {
            shared: &db.shared,
            working: &mut db.working,
            touched: &mut db.touched,
            volatile: &mut db.volatile,
        };
        let params = parameter_metadata(&request.statements, request.param_count, &space, &env);
        let types: Vec<&str> = params.iter().map(|p| p.type_name.as_str()).collect();
        assert_eq!(types, vec!["DATE", "INTEGER", "VARCHAR(20)", "SMALLINT"]);
        assert_eq!(params[0].name, "c");
        assert_eq!(params[3].name, "");
    }
}
