//! Escape-function grammar.
//!
//! Request text may embed `{fn name(args)}` clauses. Clauses whose name
//! starts with `teradata_` are interpreted by the driver and never reach the
//! database: directives are removed from the text, and substitutions are
//! replaced by session values when the request is rendered. `{call ...}` is
//! rewritten to a `CALL` statement. Every other clause passes through as text.
//!
//! Braces inside quoted strings, quoted identifiers and comments are ignored.

use std::fmt;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::protocol::types::SqlType;

const TERADATA_PREFIX: &str = "teradata_";

/// A driver-side effect requested by an escape function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Return the processed request text instead of executing it.
    NativeSql,
    /// Precede each result set with a synthetic metadata result set.
    FakeResultSets,
    /// Prepare the request without executing it.
    RequestPlanOnly,
    /// Bind rows are read from a CSV file.
    ReadCsv(PathBuf),
    /// Result sets are written to CSV files.
    WriteCsv(PathBuf),
    /// Bind parameter `index` (1-based) as the given type.
    Parameter { index: usize, sql_type: SqlType },
    Commit,
    Rollback,
    AutocommitOn,
    AutocommitOff,
}

/// A piece of request text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal request text.
    Text(String),
    /// `{fn teradata_driver_version}`
    DriverVersion,
    /// `{fn teradata_database_version}`
    DatabaseVersion,
    /// `{fn teradata_session_number}`
    SessionNumber,
    /// `{fn teradata_autocommit}`
    Autocommit,
}

/// Values substituted into rendered request text.
#[derive(Debug, Clone, Default)]
pub struct SessionValues {
    pub driver_version: String,
    pub database_version: String,
    pub session_number: u64,
    pub autocommit: bool,
}

/// Request text split into directives and text segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscapedRequest {
    pub directives: Vec<Directive>,
    pub segments: Vec<Segment>,
}

impl EscapedRequest {
    /// Parse request text.
    pub fn parse(sql: &str) -> Result<Self> {
        Parser::new(sql).run()
    }

    pub fn native_sql(&self) -> bool {
        self.directives.contains(&Directive::NativeSql)
    }

    pub fn fake_result_sets(&self) -> bool {
        self.directives.contains(&Directive::FakeResultSets)
    }

    pub fn request_plan_only(&self) -> bool {
        self.directives.contains(&Directive::RequestPlanOnly)
    }

    /// CSV file supplying bind rows.
    pub fn read_csv(&self) -> Option<&PathBuf> {
        self.directives.iter().find_map(|d| match d {
            Directive::ReadCsv(path) => Some(path),
            _ => None,
        })
    }

    /// CSV file receiving result sets.
    pub fn write_csv(&self) -> Option<&PathBuf> {
        self.directives.iter().find_map(|d| match d {
            Directive::WriteCsv(path) => Some(path),
            _ => None,
        })
    }

    /// Parameter type overrides as (0-based index, type).
    pub fn parameter_types(&self) -> Vec<(usize, SqlType)> {
        self.directives
            .iter()
            .filter_map(|d| match d {
                Directive::Parameter { index, sql_type } => Some((index - 1, sql_type.clone())),
                _ => None,
            })
            .collect()
    }

    /// Whether rendering needs values only the binding can supply.
    pub fn needs_session_values(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::DatabaseVersion | Segment::SessionNumber))
    }

    /// Produce the request text with substitutions applied.
    pub fn render(&self, values: &SessionValues) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::DriverVersion => out.push_str(&values.driver_version),
                Segment::DatabaseVersion => out.push_str(&values.database_version),
                Segment::SessionNumber => out.push_str(&values.session_number.to_string()),
                Segment::Autocommit => out.push_str(if values.autocommit { "true" } else { "false" }),
            }
        }
        out
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::NativeSql => write!(f, "teradata_nativesql"),
            Directive::FakeResultSets => write!(f, "teradata_fake_result_sets"),
            Directive::RequestPlanOnly => write!(f, "teradata_rpo(S)"),
            Directive::ReadCsv(p) => write!(f, "teradata_read_csv({})", p.display()),
            Directive::WriteCsv(p) => write!(f, "teradata_write_csv({})", p.display()),
            Directive::Parameter { index, sql_type } => {
                write!(f, "teradata_parameter({},{})", index, sql_type.name())
            }
            Directive::Commit => write!(f, "teradata_commit"),
            Directive::Rollback => write!(f, "teradata_rollback"),
            Directive::AutocommitOn => write!(f, "teradata_autocommit_on"),
            Directive::AutocommitOff => write!(f, "teradata_autocommit_off"),
        }
    }
}

enum Clause {
    Directive(Directive),
    Segment(Segment),
    Text(String),
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    text: String,
    out: EscapedRequest,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            text: String::new(),
            out: EscapedRequest::default(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn run(mut self) -> Result<EscapedRequest> {
        while let Some(c) = self.rest().chars().next() {
            match c {
                '\'' | '"' => self.copy_quoted(c)?,
                '-' if self.rest().starts_with("--") => {
                    let end = self.rest().find('\n').map_or(self.src.len(), |i| self.pos + i);
                    self.copy_to(end);
                }
                '/' if self.rest().starts_with("/*") => {
                    let end = self.rest()[2..]
                        .find("*/")
                        .map(|i| self.pos + 2 + i + 2)
                        .ok_or_else(|| Error::escape("Unterminated comment"))?;
                    self.copy_to(end);
                }
                '{' => self.escape_clause()?,
                _ => self.copy_to(self.pos + c.len_utf8()),
            }
        }
        self.flush_text();
        Ok(self.out)
    }

    fn copy_to(&mut self, end: usize) {
        self.text.push_str(&self.src[self.pos..end]);
        self.pos = end;
    }

    fn copy_quoted(&mut self, quote: char) -> Result<()> {
        let bytes = self.src.as_bytes();
        let mut i = self.pos + 1;
        loop {
            match bytes.get(i) {
                None => {
                    return Err(Error::escape(format!(
                        "Unterminated quoted text starting at offset {}",
                        self.pos
                    )))
                }
                Some(b) if *b == quote as u8 => {
                    // doubled quote is an escaped quote
                    if bytes.get(i + 1) == Some(&(quote as u8)) {
                        i += 2;
                    } else {
                        self.copy_to(i + 1);
                        return Ok(());
                    }
                }
                Some(_) => i += 1,
            }
        }
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            self.out
                .segments
                .push(Segment::Text(std::mem::take(&mut self.text)));
        }
    }

    fn escape_clause(&mut self) -> Result<()> {
        let start = self.pos;
        let end = find_clause_end(self.src, start)?;
        let body = self.src[start + 1..end].trim();
        self.pos = end + 1;

        let keyword_len = body
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(body.len());
        let (keyword, after) = body.split_at(keyword_len);
        let clause = match keyword.to_ascii_lowercase().as_str() {
            "fn" => function_clause(after.trim_start(), &self.src[start..=end])?,
            "call" => Clause::Text(format!("CALL {}", after.trim())),
            _ => Clause::Text(self.src[start..=end].to_string()),
        };
        match clause {
            Clause::Directive(directive) => self.out.directives.push(directive),
            Clause::Segment(segment) => {
                self.flush_text();
                self.out.segments.push(segment);
            }
            Clause::Text(text) => self.text.push_str(&text),
        }
        Ok(())
    }
}

/// Offset of the `}` closing the clause opened at `start`.
fn find_clause_end(src: &str, start: usize) -> Result<usize> {
    let bytes = src.as_bytes();
    let mut depth = 0usize;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            q @ (b'\'' | b'"') => {
                i += 1;
                while i < bytes.len() && bytes[i] != q {
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    Err(Error::escape(format!(
        "Unmatched '{{' at offset {}",
        start
    )))
}

fn function_clause(body: &str, original: &str) -> Result<Clause> {
    let name_len = body
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(body.len());
    let (name, after) = body.split_at(name_len);
    if name.is_empty() {
        return Err(Error::escape(format!("Missing function name in {}", original)));
    }
    let lower = name.to_ascii_lowercase();
    if !lower.starts_with(TERADATA_PREFIX) {
        return Ok(Clause::Text(original.to_string()));
    }

    let after = after.trim();
    let args = if after.is_empty() {
        Vec::new()
    } else {
        let inner = after
            .strip_prefix('(')
            .and_then(|a| a.strip_suffix(')'))
            .ok_or_else(|| Error::escape(format!("Malformed arguments in {}", original)))?;
        split_args(inner)
    };

    let expect_args = |n: usize| -> Result<()> {
        if args.len() != n {
            return Err(Error::escape(format!(
                "{} expects {} argument(s), got {}",
                lower,
                n,
                args.len()
            )));
        }
        Ok(())
    };

    let clause = match &lower[TERADATA_PREFIX.len()..] {
        "nativesql" => {
            expect_args(0)?;
            Clause::Directive(Directive::NativeSql)
        }
        "fake_result_sets" => {
            expect_args(0)?;
            Clause::Directive(Directive::FakeResultSets)
        }
        "rpo" => {
            expect_args(1)?;
            if !args[0].eq_ignore_ascii_case("S") {
                return Err(Error::escape(format!(
                    "Unsupported request processing option '{}'",
                    args[0]
                )));
            }
            Clause::Directive(Directive::RequestPlanOnly)
        }
        "read_csv" | "write_csv" => {
            expect_args(1)?;
            if args[0].is_empty() {
                return Err(Error::escape(format!("{} requires a file name", lower)));
            }
            let path = PathBuf::from(&args[0]);
            if lower.ends_with("read_csv") {
                Clause::Directive(Directive::ReadCsv(path))
            } else {
                Clause::Directive(Directive::WriteCsv(path))
            }
        }
        "parameter" => {
            expect_args(2)?;
            let index: usize = args[0]
                .parse()
                .ok()
                .filter(|i| *i >= 1)
                .ok_or_else(|| {
                    Error::escape(format!("Invalid parameter index '{}'", args[0]))
                })?;
            let sql_type = SqlType::parse(&args[1]).ok_or_else(|| {
                Error::escape(format!("Unsupported parameter type '{}'", args[1]))
            })?;
            Clause::Directive(Directive::Parameter { index, sql_type })
        }
        "commit" => {
            expect_args(0)?;
            Clause::Directive(Directive::Commit)
        }
        "rollback" => {
            expect_args(0)?;
            Clause::Directive(Directive::Rollback)
        }
        "autocommit_on" => {
            expect_args(0)?;
            Clause::Directive(Directive::AutocommitOn)
        }
        "autocommit_off" => {
            expect_args(0)?;
            Clause::Directive(Directive::AutocommitOff)
        }
        "autocommit" => {
            expect_args(0)?;
            Clause::Segment(Segment::Autocommit)
        }
        "driver_version" => {
            expect_args(0)?;
            Clause::Segment(Segment::DriverVersion)
        }
        "database_version" => {
            expect_args(0)?;
            Clause::Segment(Segment::DatabaseVersion)
        }
        "session_number" => {
            expect_args(0)?;
            Clause::Segment(Segment::SessionNumber)
        }
        _ => {
            return Err(Error::escape(format!(
                "Unrecognized escape function {}",
                name
            )))
        }
    };
    Ok(clause)
}

/// Split on commas outside parentheses and quotes.
fn split_args(inner: &str) -> Vec<String> {
    if inner.trim().is_empty() {
        return Vec::new();
    }
    let mut args = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut current = String::new();
    for c in inner.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '(') => {
                depth += 1;
                current.push(c);
            }
            (None, ')') => {
                depth -= 1;
                current.push(c);
            }
            (None, ',') if depth == 0 => args.push(std::mem::take(&mut current).trim().to_string()),
            (None, c) => current.push(c),
        }
    }
    args.push(current.trim().to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn values() -> SessionValues {
        SessionValues {
            driver_version: "1.2.3".into(),
            database_version: "17.20.03.09".into(),
            session_number: 1042,
            autocommit: true,
        }
    }

    #[test]
    fn test_plain_sql_is_untouched() {
        let req = EscapedRequest::parse("select * from t where c = '{fn x}'").unwrap();
        assert!(req.directives.is_empty());
        assert_eq!(req.render(&values()), "select * from t where c = '{fn x}'");
    }

    #[test]
    fn test_directives_are_removed() {
        let req = EscapedRequest::parse(
            "{fn teradata_rpo(S)}{fn TERADATA_FAKE_RESULT_SETS}select * from dbc.dbcinfo where infokey=?",
        )
        .unwrap();
        assert!(req.request_plan_only());
        assert!(req.fake_result_sets());
        assert!(!req.native_sql());
        assert_eq!(
            req.render(&values()),
            "select * from dbc.dbcinfo where infokey=?"
        );
    }

    #[test]
    fn test_substitutions() {
        let req = EscapedRequest::parse(
            "{fn teradata_nativesql}Driver version {fn teradata_driver_version}  Database version {fn teradata_database_version}",
        )
        .unwrap();
        assert!(req.native_sql());
        assert!(req.needs_session_values());
        assert_eq!(
            req.render(&values()),
            "Driver version 1.2.3  Database version 17.20.03.09"
        );

        let req = EscapedRequest::parse("{fn teradata_nativesql}{fn teradata_session_number}").unwrap();
        assert_eq!(req.render(&values()), "1042");

        let req = EscapedRequest::parse("{fn teradata_nativesql}{fn teradata_autocommit}").unwrap();
        assert!(!req.needs_session_values());
        assert_eq!(req.render(&values()), "true");
    }

    #[test]
    fn test_csv_and_parameter_arguments() {
        let req = EscapedRequest::parse(
            "{fn teradata_parameter(2, DECIMAL(10,2))}{fn teradata_read_csv(data/in.csv)} insert into t (?, ?)",
        )
        .unwrap();
        assert_eq!(req.read_csv(), Some(&PathBuf::from("data/in.csv")));
        assert_eq!(req.write_csv(), None);
        assert_eq!(
            req.parameter_types(),
            vec![(
                1,
                SqlType::Decimal {
                    precision: 10,
                    scale: 2
                }
            )]
        );
        assert_eq!(req.render(&values()), " insert into t (?, ?)");
    }

    #[test]
    fn test_call_and_foreign_escapes() {
        let req = EscapedRequest::parse("{call myproc(?, ?)}").unwrap();
        assert_eq!(req.render(&values()), "CALL myproc(?, ?)");

        let req = EscapedRequest::parse("select {fn abs(-1)}, {d '2020-01-01'}").unwrap();
        assert_eq!(req.render(&values()), "select {fn abs(-1)}, {d '2020-01-01'}");
    }

    #[test]
    fn test_comments_hide_braces() {
        let req = EscapedRequest::parse("select 1 -- {fn teradata_bogus}\n/* {fn teradata_bogus} */").unwrap();
        assert!(req.directives.is_empty());
    }

    #[test]
    fn test_errors() {
        for sql in [
            "{fn teradata_bogus}select 1",
            "{fn teradata_nativesql select 1",
            "{fn teradata_parameter(0,INTEGER)}select ?",
            "{fn teradata_parameter(1,NOT_A_TYPE)}select ?",
            "{fn teradata_parameter(1, CHAR(200000000))}select ?",
            "{fn teradata_read_csv()}insert into t (?)",
            "{fn teradata_commit(1)}",
            "{fn teradata_rpo(X)}select 1",
            "select 'unterminated",
        ] {
            let err = EscapedRequest::parse(sql).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Interface, "{}", sql);
        }
    }

    #[test]
    fn test_transaction_directives_keep_order() {
        let req = EscapedRequest::parse(
            "{fn teradata_autocommit_off}{fn teradata_commit}{fn teradata_rollback}{fn teradata_autocommit_on}",
        )
        .unwrap();
        assert_eq!(
            req.directives,
            vec![
                Directive::AutocommitOff,
                Directive::Commit,
                Directive::Rollback,
                Directive::AutocommitOn
            ]
        );
        assert!(req.render(&values()).is_empty());
    }
}
