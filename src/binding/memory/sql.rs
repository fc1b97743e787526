//! Lexer and parser for the SQL dialect of the in-process engine.
//!
//! A request is tokenized once, parameter markers are numbered across the
//! whole request, and the token stream is split on `;` into statements.

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{Error, Result};
use crate::protocol::constants::{
    ERR_COLUMN_MISSING, ERR_STRING_UNTERMINATED, ERR_SYNTAX, ERR_UNEXPECTED_TOKEN, ERR_UNSUPPORTED,
};
use crate::protocol::types::{SqlType, Value, DATE_FORMAT, TIMESTAMP_PARSE_FORMAT};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Unquoted identifier or keyword, as written.
    Word(String),
    /// `"delimited identifier"`.
    Quoted(String),
    Str(String),
    /// `'0A1B'XB` byte literal.
    Hex(Vec<u8>),
    Num(String),
    /// Parameter marker with its 0-based position in the request.
    Param(usize),
    Sym(&'static str),
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    start: usize,
    end: usize,
}

/// A table reference, optionally qualified with a database name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TableName {
    pub database: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ColumnDef {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Column(String),
    Param(usize),
    User,
    Session,
    Database,
    CurrentDate,
    CurrentTimestamp,
    Negate(Box<Expr>),
    Cast(Box<Expr>, SqlType),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Predicate {
    Compare(Expr, CompareOp, Expr),
    IsNull { expr: Expr, negated: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SelectItem {
    Wildcard,
    Expr {
        expr: Expr,
        /// Source text of the expression, used as the column title.
        title: String,
        alias: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum OrderKey {
    /// 1-based select-list position.
    Position(usize),
    Column(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OrderBy {
    pub key: OrderKey,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Select {
    pub items: Vec<SelectItem>,
    pub from: Option<TableName>,
    pub filter: Vec<Predicate>,
    pub order_by: Vec<OrderBy>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Statement {
    CreateTable {
        table: TableName,
        /// `Some(true)` for SET, `Some(false)` for MULTISET, `None` for the
        /// session default.
        set: Option<bool>,
        volatile: bool,
        columns: Vec<ColumnDef>,
        preserve_rows: bool,
    },
    DropTable {
        table: TableName,
    },
    Insert {
        table: TableName,
        columns: Option<Vec<String>>,
        values: Vec<Expr>,
    },
    Update {
        table: TableName,
        assignments: Vec<(String, Expr)>,
        filter: Vec<Predicate>,
    },
    Delete {
        table: TableName,
        filter: Vec<Predicate>,
    },
    Select(Select),
    BeginTransaction,
    EndTransaction,
    Commit,
    Rollback,
    HelpSession,
}

/// A parsed request.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Request {
    pub statements: Vec<Statement>,
    /// Number of parameter markers across all statements.
    pub param_count: usize,
}

/// Parse a request of one or more `;`-separated statements.
pub(crate) fn parse_request(sql: &str) -> Result<Request> {
    let tokens = tokenize(sql)?;
    let param_count = tokens
        .iter()
        .filter(|t| matches!(t.token, Token::Param(_)))
        .count();

    let mut statements = Vec::new();
    for chunk in tokens.split(|t| t.token == Token::Sym(";")) {
        if chunk.is_empty() {
            continue;
        }
        let mut parser = Parser {
            sql,
            tokens: chunk,
            pos: 0,
        };
        let statement = parser.statement()?;
        if !parser.at_end() {
            return Err(parser.unexpected("';' or end of request"));
        }
        statements.push(statement);
    }
    if statements.is_empty() {
        return Err(Error::operational(ERR_SYNTAX, "Syntax error: request contains no statements."));
    }
    Ok(Request {
        statements,
        param_count,
    })
}

fn syntax(message: impl Into<String>) -> Error {
    Error::operational(ERR_SYNTAX, message)
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$' | b'#') || b >= 0x80
}

fn tokenize(sql: &str) -> Result<Vec<Spanned>> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut params = 0;
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        let c = bytes[i];
        let token = match c {
            b' ' | b'\t' | b'\r' | b'\n' => {
                i += 1;
                continue;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                match sql[i + 2..].find("*/") {
                    Some(offset) => i += offset + 4,
                    None => return Err(syntax("Syntax error: comment not terminated.")),
                }
                continue;
            }
            b'\'' => {
                let (text, end) = scan_quoted(sql, i, b'\'')?;
                i = end;
                if sql.get(i..i + 2).is_some_and(|s| s.eq_ignore_ascii_case("XB")) {
                    i += 2;
                    while i < bytes.len() && is_word_byte(bytes[i]) {
                        i += 1;
                    }
                    let decoded = crate::protocol::crypto::hex_to_bytes(&text)
                        .ok_or_else(|| syntax(format!("Syntax error: invalid hexadecimal literal '{}'.", text)))?;
                    Token::Hex(decoded)
                } else {
                    Token::Str(text)
                }
            }
            b'"' => {
                let (text, end) = scan_quoted(sql, i, b'"')?;
                i = end;
                Token::Quoted(text)
            }
            b'0'..=b'9' => {
                i = scan_number(bytes, i);
                Token::Num(sql[start..i].to_string())
            }
            b'.' if bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => {
                i = scan_number(bytes, i);
                Token::Num(sql[start..i].to_string())
            }
            b'?' => {
                i += 1;
                params += 1;
                Token::Param(params - 1)
            }
            b if is_word_byte(b) => {
                while i < bytes.len() && is_word_byte(bytes[i]) {
                    i += 1;
                }
                Token::Word(sql[start..i].to_string())
            }
            _ => {
                let two = sql.get(i..i + 2).unwrap_or("");
                let sym = ["<>", "<=", ">=", "!=", "||"]
                    .into_iter()
                    .find(|s| *s == two)
                    .or_else(|| {
                        ["(", ")", ",", ";", "*", "=", "<", ">", ".", "+", "-", "/"]
                            .into_iter()
                            .find(|s| s.as_bytes()[0] == c)
                    });
                match sym {
                    Some(sym) => {
                        i += sym.len();
                        Token::Sym(sym)
                    }
                    None => {
                        let ch = sql[i..].chars().next().unwrap_or('?');
                        return Err(syntax(format!("Syntax error: invalid character '{}'.", ch)));
                    }
                }
            }
        };
        tokens.push(Spanned {
            token,
            start,
            end: i,
        });
    }
    Ok(tokens)
}

fn scan_quoted(sql: &str, start: usize, quote: u8) -> Result<(String, usize)> {
    let bytes = sql.as_bytes();
    let mut out = String::new();
    let mut i = start + 1;
    let mut segment = i;
    loop {
        match bytes.get(i) {
            None => {
                return Err(Error::operational(
                    ERR_STRING_UNTERMINATED,
                    "String not terminated before end of text.",
                ))
            }
            Some(&b) if b == quote => {
                out.push_str(&sql[segment..i]);
                if bytes.get(i + 1) == Some(&quote) {
                    out.push(quote as char);
                    i += 2;
                    segment = i;
                } else {
                    return Ok((out, i + 1));
                }
            }
            Some(_) => i += 1,
        }
    }
}

fn scan_number(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < bytes.len() && matches!(bytes[i], b'e' | b'E') {
        let mut j = i + 1;
        if j < bytes.len() && matches!(bytes[j], b'+' | b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            i = j;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }
    }
    i
}

/// Literal value of a numeric token: INTEGER when it fits, then BIGINT, then
/// DECIMAL; FLOAT when written with an exponent.
fn numeric_literal(text: &str) -> Value {
    if text.contains(['e', 'E']) {
        return text.parse().map(Value::Double).unwrap_or_else(|_| Value::Number(text.to_string()));
    }
    if !text.contains('.') {
        if let Ok(n) = text.parse::<i32>() {
            return Value::Integer(n);
        }
        if let Ok(n) = text.parse::<i64>() {
            return Value::BigInt(n);
        }
    }
    let text = if text.starts_with('.') {
        format!("0{}", text)
    } else {
        text.to_string()
    };
    Value::Number(text)
}

fn negate_literal(value: Value) -> Value {
    match value {
        Value::Integer(n) => Value::Integer(-n),
        Value::BigInt(n) => Value::BigInt(-n),
        Value::Double(d) => Value::Double(-d),
        Value::Number(s) => Value::Number(format!("-{}", s)),
        other => other,
    }
}

/// Words that end a select item when no `AS` precedes an alias.
const CLAUSE_WORDS: &[&str] = &["FROM", "WHERE", "ORDER", "AND", "SET", "VALUES"];

struct Parser<'a> {
    sql: &'a str,
    tokens: &'a [Spanned],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn advance(&mut self) -> Option<&'a Spanned> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", keyword)))
        }
    }

    fn eat_sym(&mut self, sym: &str) -> bool {
        if matches!(self.peek(), Some(Token::Sym(s)) if *s == sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_sym(&mut self, sym: &str) -> Result<()> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", sym)))
        }
    }

    fn unexpected(&self, expected: &str) -> Error {
        match self.tokens.get(self.pos) {
            Some(token) => Error::operational(
                ERR_UNEXPECTED_TOKEN,
                format!(
                    "Syntax error, expected something like {} before '{}'.",
                    expected,
                    &self.sql[token.start..token.end]
                ),
            ),
            None => Error::operational(
                ERR_UNEXPECTED_TOKEN,
                format!(
                    "Syntax error, expected something like {} at end of statement.",
                    expected
                ),
            ),
        }
    }

    /// Source text from the token at `from` up to the current position.
    fn text_since(&self, from: usize) -> String {
        match (self.tokens.get(from), self.tokens.get(self.pos.saturating_sub(1))) {
            (Some(first), Some(last)) if self.pos > from => {
                self.sql[first.start..last.end].to_string()
            }
            _ => String::new(),
        }
    }

    fn identifier(&mut self) -> Result<String> {
        match self.peek() {
            Some(Token::Word(w)) | Some(Token::Quoted(w)) => {
                self.pos += 1;
                Ok(w.clone())
            }
            _ => Err(self.unexpected("a name")),
        }
    }

    fn table_name(&mut self) -> Result<TableName> {
        let first = self.identifier()?;
        if self.eat_sym(".") {
            let name = self.identifier()?;
            Ok(TableName {
                database: Some(first),
                name,
            })
        } else {
            Ok(TableName {
                database: None,
                name: first,
            })
        }
    }

    fn unsupported(keyword: &str) -> Error {
        Error::operational(
            ERR_UNSUPPORTED,
            format!("The {} statement is not supported.", keyword.to_ascii_uppercase()),
        )
    }

    fn statement(&mut self) -> Result<Statement> {
        let keyword = match self.peek() {
            Some(Token::Word(w)) => w.to_ascii_uppercase(),
            _ => return Err(self.unexpected("a statement keyword")),
        };
        match keyword.as_str() {
            "CREATE" => self.create_table(),
            "DROP" => self.drop_table(),
            "INSERT" | "INS" => self.insert(),
            "UPDATE" | "UPD" => self.update(),
            "DELETE" | "DEL" => self.delete(),
            "SELECT" | "SEL" => self.select().map(Statement::Select),
            "BT" => {
                self.pos += 1;
                Ok(Statement::BeginTransaction)
            }
            "BEGIN" => {
                self.pos += 1;
                self.expect_keyword("TRANSACTION")?;
                Ok(Statement::BeginTransaction)
            }
            "ET" => {
                self.pos += 1;
                Ok(Statement::EndTransaction)
            }
            "END" => {
                self.pos += 1;
                self.expect_keyword("TRANSACTION")?;
                Ok(Statement::EndTransaction)
            }
            "COMMIT" => {
                self.pos += 1;
                self.eat_keyword("WORK");
                Ok(Statement::Commit)
            }
            "ROLLBACK" | "ABORT" => {
                self.pos += 1;
                self.eat_keyword("WORK");
                Ok(Statement::Rollback)
            }
            "HELP" => {
                self.pos += 1;
                if self.eat_keyword("SESSION") {
                    Ok(Statement::HelpSession)
                } else {
                    Err(Self::unsupported("HELP"))
                }
            }
            "CALL" | "REPLACE" | "EXEC" | "EXECUTE" | "MERGE" | "ALTER" | "RENAME" | "GRANT"
            | "REVOKE" | "COLLECT" | "LOCKING" | "LOCK" | "EXPLAIN" | "SHOW" | "DATABASE"
            | "SET" | "MODIFY" | "USING" => Err(Self::unsupported(&keyword)),
            _ => Err(self.unexpected("a statement keyword")),
        }
    }

    fn create_table(&mut self) -> Result<Statement> {
        self.expect_keyword("CREATE")?;
        let set = if self.eat_keyword("SET") {
            Some(true)
        } else if self.eat_keyword("MULTISET") {
            Some(false)
        } else {
            None
        };
        let volatile = self.eat_keyword("VOLATILE");
        if !self.peek_keyword("TABLE") {
            let keyword = match self.peek() {
                Some(Token::Word(w)) => format!("CREATE {}", w),
                _ => return Err(self.unexpected("'TABLE'")),
            };
            return Err(Self::unsupported(&keyword));
        }
        self.pos += 1;
        let table = self.table_name()?;

        // Table options such as `, NO FALLBACK`.
        while self.eat_sym(",") {
            let mut words = 0;
            while matches!(self.peek(), Some(Token::Word(_)) | Some(Token::Sym("="))) {
                self.pos += 1;
                words += 1;
            }
            if words == 0 {
                return Err(self.unexpected("a table option"));
            }
        }

        self.expect_sym("(")?;
        let mut columns = Vec::new();
        loop {
            columns.push(self.column_def()?);
            if !self.eat_sym(",") {
                break;
            }
        }
        self.expect_sym(")")?;

        let mut preserve_rows = false;
        loop {
            if self.eat_keyword("NO") {
                self.expect_keyword("PRIMARY")?;
                self.expect_keyword("INDEX")?;
            } else if self.peek_keyword("UNIQUE") || self.peek_keyword("PRIMARY") {
                self.eat_keyword("UNIQUE");
                self.expect_keyword("PRIMARY")?;
                self.expect_keyword("INDEX")?;
                if !self.eat_sym("(") {
                    self.identifier()?;
                    self.expect_sym("(")?;
                }
                loop {
                    let name = self.identifier()?;
                    if !columns.iter().any(|c| c.name.eq_ignore_ascii_case(&name)) {
                        return Err(Error::operational(
                            ERR_COLUMN_MISSING,
                            format!("Column '{}' does not exist.", name),
                        ));
                    }
                    if !self.eat_sym(",") {
                        break;
                    }
                }
                self.expect_sym(")")?;
            } else if self.eat_keyword("ON") {
                self.expect_keyword("COMMIT")?;
                if self.eat_keyword("PRESERVE") {
                    preserve_rows = true;
                } else {
                    self.expect_keyword("DELETE")?;
                    preserve_rows = false;
                }
                self.expect_keyword("ROWS")?;
            } else {
                break;
            }
            self.eat_sym(",");
        }

        Ok(Statement::CreateTable {
            table,
            set,
            volatile,
            columns,
            preserve_rows,
        })
    }

    fn column_def(&mut self) -> Result<ColumnDef> {
        let name = self.identifier()?;
        let sql_type = self.data_type()?;
        let mut nullable = true;
        loop {
            if self.eat_keyword("NOT") {
                if self.eat_keyword("NULL") {
                    nullable = false;
                } else if !self.eat_keyword("CASESPECIFIC") {
                    return Err(self.unexpected("'NULL'"));
                }
            } else if self.eat_keyword("NULL")
                || self.eat_keyword("CASESPECIFIC")
                || self.eat_keyword("UPPERCASE")
            {
            } else if self.eat_keyword("CHARACTER") {
                self.expect_keyword("SET")?;
                self.identifier()?;
            } else if self.eat_keyword("FORMAT") || self.eat_keyword("TITLE") {
                match self.advance().map(|t| &t.token) {
                    Some(Token::Str(_)) => {}
                    _ => return Err(self.unexpected("a string literal")),
                }
            } else {
                break;
            }
        }
        Ok(ColumnDef {
            name,
            sql_type,
            nullable,
        })
    }

    fn data_type(&mut self) -> Result<SqlType> {
        let mut text = match self.peek() {
            Some(Token::Word(w)) => {
                self.pos += 1;
                w.to_ascii_uppercase()
            }
            _ => return Err(self.unexpected("a data type")),
        };
        if text == "DOUBLE" {
            self.expect_keyword("PRECISION")?;
            text.push_str(" PRECISION");
        } else if (text == "CHAR" || text == "CHARACTER") && self.eat_keyword("VARYING") {
            text = "CHARACTER VARYING".to_string();
        }
        if self.eat_sym("(") {
            let mut args = Vec::new();
            loop {
                match self.advance().map(|t| &t.token) {
                    Some(Token::Num(n)) => args.push(n.clone()),
                    _ => return Err(self.unexpected("a number")),
                }
                if !self.eat_sym(",") {
                    break;
                }
            }
            self.expect_sym(")")?;
            text = format!("{}({})", text, args.join(","));
        }
        if self.peek_keyword("WITH") {
            self.pos += 1;
            self.expect_keyword("TIME")?;
            self.expect_keyword("ZONE")?;
            text.push_str(" WITH TIME ZONE");
        }
        SqlType::parse(&text).ok_or_else(|| {
            syntax(format!(
                "Syntax error: Data Type \"{}\" does not match a Defined Type name.",
                text
            ))
        })
    }

    fn drop_table(&mut self) -> Result<Statement> {
        self.expect_keyword("DROP")?;
        if !self.eat_keyword("TABLE") {
            return Err(Self::unsupported("DROP"));
        }
        let table = self.table_name()?;
        Ok(Statement::DropTable { table })
    }

    fn insert(&mut self) -> Result<Statement> {
        self.pos += 1;
        self.eat_keyword("INTO");
        let table = self.table_name()?;

        if self.eat_keyword("VALUES") {
            let values = self.expr_list()?;
            return Ok(Statement::Insert {
                table,
                columns: None,
                values,
            });
        }
        if self.peek_keyword("SELECT") || self.peek_keyword("SEL") {
            return Err(Self::unsupported("INSERT ... SELECT"));
        }

        // Either a column list followed by VALUES, or the shorthand value
        // list `INSERT INTO t (1, 'a')`.
        let list = self.expr_list()?;
        if self.eat_keyword("VALUES") {
            let columns = list
                .into_iter()
                .map(|e| match e {
                    Expr::Column(name) => Ok(name),
                    _ => Err(self.unexpected("a column name")),
                })
                .collect::<Result<Vec<_>>>()?;
            let values = self.expr_list()?;
            Ok(Statement::Insert {
                table,
                columns: Some(columns),
                values,
            })
        } else {
            Ok(Statement::Insert {
                table,
                columns: None,
                values: list,
            })
        }
    }

    fn expr_list(&mut self) -> Result<Vec<Expr>> {
        self.expect_sym("(")?;
        let mut exprs = Vec::new();
        loop {
            exprs.push(self.expr()?);
            if !self.eat_sym(",") {
                break;
            }
        }
        self.expect_sym(")")?;
        Ok(exprs)
    }

    fn update(&mut self) -> Result<Statement> {
        self.pos += 1;
        let table = self.table_name()?;
        self.expect_keyword("SET")?;
        let mut assignments = Vec::new();
        loop {
            let column = self.column_name()?;
            self.expect_sym("=")?;
            assignments.push((column, self.expr()?));
            if !self.eat_sym(",") {
                break;
            }
        }
        let filter = self.where_clause()?;
        Ok(Statement::Update {
            table,
            assignments,
            filter,
        })
    }

    fn delete(&mut self) -> Result<Statement> {
        self.pos += 1;
        self.eat_keyword("FROM");
        let table = self.table_name()?;
        self.eat_keyword("ALL");
        let filter = self.where_clause()?;
        Ok(Statement::Delete { table, filter })
    }

    fn select(&mut self) -> Result<Select> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            if self.eat_sym("*") {
                items.push(SelectItem::Wildcard);
            } else {
                let from = self.pos;
                let expr = self.expr()?;
                let title = self.text_since(from);
                let alias = if self.eat_keyword("AS") {
                    Some(self.identifier()?)
                } else {
                    match self.peek() {
                        Some(Token::Word(w))
                            if !CLAUSE_WORDS.iter().any(|k| w.eq_ignore_ascii_case(k)) =>
                        {
                            Some(self.identifier()?)
                        }
                        Some(Token::Quoted(_)) => Some(self.identifier()?),
                        _ => None,
                    }
                };
                items.push(SelectItem::Expr { expr, title, alias });
            }
            if !self.eat_sym(",") {
                break;
            }
        }

        let from = if self.eat_keyword("FROM") {
            Some(self.table_name()?)
        } else {
            None
        };
        let filter = self.where_clause()?;

        let mut order_by = Vec::new();
        if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            loop {
                let key = match self.peek() {
                    Some(Token::Num(n)) => {
                        let position = n
                            .parse::<usize>()
                            .ok()
                            .filter(|p| *p >= 1)
                            .ok_or_else(|| {
                                syntax(format!("Syntax error: invalid ORDER BY position {}.", n))
                            })?;
                        self.pos += 1;
                        OrderKey::Position(position)
                    }
                    _ => OrderKey::Column(self.column_name()?),
                };
                let descending = if self.eat_keyword("DESC") {
                    true
                } else {
                    self.eat_keyword("ASC");
                    false
                };
                order_by.push(OrderBy { key, descending });
                if !self.eat_sym(",") {
                    break;
                }
            }
        }

        Ok(Select {
            items,
            from,
            filter,
            order_by,
        })
    }

    /// A column reference; a table qualifier is accepted and dropped.
    fn column_name(&mut self) -> Result<String> {
        let mut name = self.identifier()?;
        while self.eat_sym(".") {
            name = self.identifier()?;
        }
        Ok(name)
    }

    fn where_clause(&mut self) -> Result<Vec<Predicate>> {
        let mut predicates = Vec::new();
        if !self.eat_keyword("WHERE") {
            return Ok(predicates);
        }
        loop {
            predicates.push(self.predicate()?);
            if !self.eat_keyword("AND") {
                break;
            }
        }
        Ok(predicates)
    }

    fn predicate(&mut self) -> Result<Predicate> {
        let left = self.expr()?;
        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            self.expect_keyword("NULL")?;
            return Ok(Predicate::IsNull {
                expr: left,
                negated,
            });
        }
        let op = match self.peek() {
            Some(Token::Sym("=")) => CompareOp::Eq,
            Some(Token::Sym("<>")) | Some(Token::Sym("!=")) => CompareOp::Ne,
            Some(Token::Sym("<")) => CompareOp::Lt,
            Some(Token::Sym("<=")) => CompareOp::Le,
            Some(Token::Sym(">")) => CompareOp::Gt,
            Some(Token::Sym(">=")) => CompareOp::Ge,
            _ => return Err(self.unexpected("a comparison operator")),
        };
        self.pos += 1;
        let right = self.expr()?;
        Ok(Predicate::Compare(left, op, right))
    }

    fn expr(&mut self) -> Result<Expr> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Sym("+")) => BinaryOp::Add,
                Some(Token::Sym("-")) => BinaryOp::Sub,
                Some(Token::Sym("||")) => BinaryOp::Concat,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
    }

    fn term(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Sym("*")) => BinaryOp::Mul,
                Some(Token::Sym("/")) => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat_sym("-") {
            return Ok(match self.unary()? {
                Expr::Literal(value) if value.is_numeric() => Expr::Literal(negate_literal(value)),
                other => Expr::Negate(Box::new(other)),
            });
        }
        if self.eat_sym("+") {
            return self.unary();
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        let Some(spanned) = self.tokens.get(self.pos) else {
            return Err(self.unexpected("an expression"));
        };
        let expr = match &spanned.token {
            Token::Num(n) => {
                self.pos += 1;
                Expr::Literal(numeric_literal(n))
            }
            Token::Str(s) => {
                self.pos += 1;
                Expr::Literal(Value::String(s.clone()))
            }
            Token::Hex(b) => {
                self.pos += 1;
                Expr::Literal(Value::Bytes(b.clone()))
            }
            Token::Param(index) => {
                self.pos += 1;
                Expr::Param(*index)
            }
            Token::Sym("(") => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect_sym(")")?;
                inner
            }
            Token::Quoted(_) => Expr::Column(self.column_name()?),
            Token::Word(word) => match word.to_ascii_uppercase().as_str() {
                "NULL" => {
                    self.pos += 1;
                    Expr::Literal(Value::Null)
                }
                "USER" => {
                    self.pos += 1;
                    Expr::User
                }
                "SESSION" => {
                    self.pos += 1;
                    Expr::Session
                }
                "DATABASE" => {
                    self.pos += 1;
                    Expr::Database
                }
                "CURRENT_DATE" => {
                    self.pos += 1;
                    Expr::CurrentDate
                }
                "CURRENT_TIMESTAMP" => {
                    self.pos += 1;
                    Expr::CurrentTimestamp
                }
                "DATE" => {
                    self.pos += 1;
                    match self.peek() {
                        Some(Token::Str(s)) => {
                            let date = NaiveDate::parse_from_str(s, DATE_FORMAT)
                                .map_err(|_| syntax(format!("Syntax error: invalid date literal '{}'.", s)))?;
                            self.pos += 1;
                            Expr::Literal(Value::Date(date))
                        }
                        _ => Expr::CurrentDate,
                    }
                }
                "TIMESTAMP" if matches!(self.tokens.get(self.pos + 1).map(|t| &t.token), Some(Token::Str(_))) => {
                    self.pos += 1;
                    let Some(Token::Str(s)) = self.advance().map(|t| &t.token) else {
                        return Err(self.unexpected("a timestamp literal"));
                    };
                    let ts = NaiveDateTime::parse_from_str(s, TIMESTAMP_PARSE_FORMAT)
                        .map_err(|_| syntax(format!("Syntax error: invalid timestamp literal '{}'.", s)))?;
                    Expr::Literal(Value::Timestamp(ts))
                }
                "CAST" => {
                    self.pos += 1;
                    self.expect_sym("(")?;
                    let inner = self.expr()?;
                    self.expect_keyword("AS")?;
                    let ty = self.data_type()?;
                    self.expect_sym(")")?;
                    Expr::Cast(Box::new(inner), ty)
                }
                _ => Expr::Column(self.column_name()?),
            },
            _ => return Err(self.unexpected("an expression")),
        };
        Ok(expr)
    }
}
