//! Integration tests for escape functions and CSV import/export.

use std::path::PathBuf;
use std::sync::Arc;

use teradatasql_rs::{
    ConnectParams, Connection, Cursor, ErrorKind, MemoryBinding, Params, RowCursor, Value,
};

async fn open() -> (Connection<MemoryBinding>, RowCursor<MemoryBinding>) {
    let conn = Connection::connect(Arc::new(MemoryBinding::new()), ConnectParams::new("localhost"))
        .await
        .unwrap();
    let cursor = conn.cursor().await.unwrap();
    (conn, cursor)
}

/// Scratch directory removed when dropped.
struct ScratchDir(PathBuf);

impl ScratchDir {
    fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("teradatasql-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }

    fn file(&self, name: &str) -> String {
        self.0.join(name).to_string_lossy().into_owned()
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

#[tokio::test]
async fn test_version_substitutions() {
    let (conn, mut cursor) = open().await;
    cursor
        .execute(
            "{fn teradata_nativesql}Driver version {fn teradata_driver_version}  Database version {fn teradata_database_version}",
            (),
        )
        .await
        .unwrap();
    let row = cursor.fetchone().await.unwrap().unwrap();
    let expected = format!(
        "Driver version {}  Database version {}",
        conn.driver_version(),
        conn.database_version().await.unwrap()
    );
    assert_eq!(row.get(0), Some(&Value::String(expected)));

    cursor
        .execute("select {fn teradata_session_number} as n", ())
        .await
        .unwrap();
    let row = cursor.fetchone().await.unwrap().unwrap();
    assert_eq!(
        row.get(0).and_then(Value::to_i64),
        Some(conn.session_number().await.unwrap() as i64)
    );

    cursor
        .execute("select '{fn teradata_database_version}' as v", ())
        .await
        .unwrap();
    let row = cursor.fetchone().await.unwrap().unwrap();
    assert_eq!(row.get(0), Some(&Value::from("{fn teradata_database_version}")));
}

#[tokio::test]
async fn test_escape_syntax_errors_are_interface_errors() {
    let (_conn, mut cursor) = open().await;
    for sql in [
        "{fn teradata_no_such_function}select 1",
        "{fn teradata_rpo(X)}select 1",
        "{fn teradata_parameter(1, NOT_A_TYPE)}select ?",
    ] {
        let err = cursor.execute(sql, ()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Interface, "{}", sql);
    }
}

#[tokio::test]
async fn test_parameter_type_override() {
    let (_conn, mut cursor) = open().await;
    cursor
        .execute("create table t (c1 integer, c2 varchar(20))", ())
        .await
        .unwrap();
    cursor
        .execute(
            "{fn teradata_parameter(1, INTEGER)}insert into t (?, ?)",
            vec![Value::from("42"), Value::from("abc")],
        )
        .await
        .unwrap();

    cursor
        .execute(
            "{fn teradata_rpo(S)}{fn teradata_fake_result_sets}{fn teradata_parameter(1, VARCHAR(5))}select c2 from t where c1 = ?",
            (),
        )
        .await
        .unwrap();
    let row = cursor.fetchone().await.unwrap().unwrap();
    let params = row.get_by_name("ParameterMetadata").and_then(Value::as_str).unwrap();
    assert!(params.contains("\"TypeName\":\"VARCHAR(5)\""), "{}", params);

    let err = cursor
        .execute("{fn teradata_parameter(1, SMALLINT)}insert into t (?, 'x')", vec![Value::from("not a number")])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Interface);

    cursor.execute("select c1 from t", ()).await.unwrap();
    assert_eq!(cursor.fetchall().await.unwrap()[0].get(0), Some(&Value::from(42)));
}

#[tokio::test]
async fn test_csv_round_trip() {
    let dir = ScratchDir::new("csv-round-trip");
    let (_conn, mut cursor) = open().await;
    cursor
        .execute("create table src (c1 integer, c2 varchar(10))", ())
        .await
        .unwrap();
    cursor
        .execute(
            "insert into src (?, ?)",
            vec![
                vec![Value::from(1), Value::from("a, b")],
                vec![Value::from(2), Value::Null],
                vec![Value::from(3), Value::from("")],
                vec![Value::from(4), Value::from("say \"hi\"")],
            ],
        )
        .await
        .unwrap();

    let out = dir.file("export.csv");
    cursor
        .execute(&format!("{{fn teradata_write_csv({})}}select * from src order by 1", out), ())
        .await
        .unwrap();
    assert_eq!(cursor.rowcount(), 4);
    assert!(cursor.description().is_none());
    assert_eq!(cursor.fetchone().await.unwrap_err().kind(), ErrorKind::State);

    cursor
        .execute("create table dst (c1 integer, c2 varchar(10))", ())
        .await
        .unwrap();
    cursor
        .execute(&format!("{{fn teradata_read_csv({})}}insert into dst (?, ?)", out), ())
        .await
        .unwrap();
    assert_eq!(cursor.rowcount(), 4);

    cursor.execute("select * from dst order by 1", ()).await.unwrap();
    let rows: Vec<Vec<Value>> = cursor
        .fetchall()
        .await
        .unwrap()
        .into_iter()
        .map(|row| row.values().to_vec())
        .collect();
    // NULL and the empty string both come back as NULL
    assert_eq!(
        rows,
        vec![
            vec![Value::from(1), Value::from("a, b")],
            vec![Value::from(2), Value::Null],
            vec![Value::from(3), Value::Null],
            vec![Value::from(4), Value::from("say \"hi\"")],
        ]
    );

    let err = cursor
        .execute(
            &format!("{{fn teradata_read_csv({})}}insert into dst (?, ?)", out),
            Params::Row(vec![Value::from(5), Value::from("x")]),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Interface);
}

#[tokio::test]
async fn test_write_csv_numbers_each_result_set() {
    let dir = ScratchDir::new("csv-numbered");
    let (_conn, mut cursor) = open().await;
    let out = dir.file("sets.csv");
    cursor
        .execute(
            &format!(
                "{{fn teradata_write_csv({})}}{{fn teradata_fake_result_sets}}select InfoKey from dbc.dbcinfo order by 1; select 'x' as c",
                out
            ),
            (),
        )
        .await
        .unwrap();
    // fake set, dbcinfo rows, fake set, one row
    assert_eq!(cursor.rowcount(), 6);

    let first = std::fs::read_to_string(dir.file("sets.csv")).unwrap();
    assert!(first.starts_with("ActivityCount,ActivityType,ActivityName"));
    let second = std::fs::read_to_string(dir.file("sets_1.csv")).unwrap();
    assert_eq!(second.lines().collect::<Vec<_>>(), vec!["InfoKey", "LANGUAGE SUPPORT MODE", "RELEASE", "VERSION"]);
    assert!(std::path::Path::new(&dir.file("sets_2.csv")).exists());
    let fourth = std::fs::read_to_string(dir.file("sets_3.csv")).unwrap();
    assert_eq!(fourth.lines().collect::<Vec<_>>(), vec!["c", "x"]);
}
