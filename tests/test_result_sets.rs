//! Integration tests for multi-statement results, batches and metadata.

use std::sync::Arc;

use futures::stream::TryStreamExt;
use serde_json::Value as Json;
use teradatasql_rs::{
    ConnectParams, Connection, Cursor, CursorStreamExt, MemoryBinding, RowCursor, Value,
};

async fn open(params: ConnectParams) -> (Connection<MemoryBinding>, RowCursor<MemoryBinding>) {
    let conn = Connection::connect(Arc::new(MemoryBinding::new()), params)
        .await
        .unwrap();
    let cursor = conn.cursor().await.unwrap();
    (conn, cursor)
}

#[tokio::test]
async fn test_nextset_walks_every_statement() {
    let (_conn, mut cursor) = open(ConnectParams::new("localhost")).await;
    cursor
        .execute("create volatile table voltab (c1 integer, c2 varchar(10)) on commit preserve rows", ())
        .await
        .unwrap();
    assert!(!cursor.nextset().await.unwrap());

    cursor
        .execute("insert into voltab (1, 'abc'); insert into voltab (2, 'def')", ())
        .await
        .unwrap();

    cursor
        .execute(
            "select c1 from voltab order by 1; select c2 from voltab order by 1; select user as u",
            (),
        )
        .await
        .unwrap();
    assert_eq!(cursor.description().unwrap().column_names(), vec!["c1"]);
    assert_eq!(cursor.fetchall().await.unwrap().len(), 2);

    assert!(cursor.nextset().await.unwrap());
    assert_eq!(cursor.description().unwrap().column_names(), vec!["c2"]);
    let row = cursor.fetchone().await.unwrap().unwrap();
    assert_eq!(row.get_by_name("C2"), Some(&Value::from("abc")));

    assert!(cursor.nextset().await.unwrap());
    assert_eq!(cursor.description().unwrap().column_names(), vec!["u"]);

    assert!(!cursor.nextset().await.unwrap());
    assert!(cursor.description().is_none());
    assert!(cursor.fetchone().await.unwrap().is_none());
    assert!(!cursor.nextset().await.unwrap());
}

#[tokio::test]
async fn test_batch_insert_preserves_order() {
    let (_conn, mut cursor) = open(ConnectParams::new("localhost")).await;
    cursor
        .execute("create multiset table batch_tab (seq integer, label varchar(20))", ())
        .await
        .unwrap();

    let rows: Vec<Vec<Value>> = (0..50)
        .map(|i| vec![Value::from(i), Value::from(format!("row {}", 49 - i))])
        .collect();
    cursor.executemany("insert into batch_tab (?, ?)", rows.clone()).await.unwrap();
    assert_eq!(cursor.rowcount(), 50);

    cursor.execute("select seq, label from batch_tab", ()).await.unwrap();
    let fetched: Vec<Vec<Value>> = cursor
        .fetchall()
        .await
        .unwrap()
        .into_iter()
        .map(|row| row.values().to_vec())
        .collect();
    assert_eq!(fetched, rows);
}

#[tokio::test]
async fn test_operational_error_carries_server_message() {
    let (_conn, mut cursor) = open(ConnectParams::new("localhost")).await;
    let err = cursor.execute("select * from missing_tab", ()).await.unwrap_err();
    assert!(err.is_operational());
    assert_eq!(err.code(), Some(3807));
    assert!(err.message().contains("missing_tab"));

    let err = cursor.execute("selec 1", ()).await.unwrap_err();
    assert!(err.is_operational());

    let err = cursor.callproc("myproc", vec![Value::from(1)]).await.unwrap_err();
    assert_eq!(err.code(), Some(5467));
}

#[tokio::test]
async fn test_fake_result_set_metadata_matches_description() {
    let (_conn, mut cursor) = open(ConnectParams::new("localhost")).await;
    cursor
        .execute(
            "create table meta_tab (c1 integer not null, c2 varchar(100), c3 decimal(10,2), c4 date)",
            (),
        )
        .await
        .unwrap();
    cursor
        .execute("insert into meta_tab (1, 'a', 1.25, date '2024-02-29')", ())
        .await
        .unwrap();

    cursor
        .execute("{fn teradata_fake_result_sets}select c1, c2, c3, c4 from meta_tab where c1 = ?", vec![Value::from(1)])
        .await
        .unwrap();
    let names = cursor.description().unwrap().column_names();
    assert_eq!(names[0], "ActivityCount");
    assert_eq!(names[7], "ColumnMetadata");
    let fake = cursor.fetchone().await.unwrap().unwrap();
    assert_eq!(fake.get_by_name("ActivityName"), Some(&Value::from("Select")));
    assert_eq!(fake.get_by_name("ColumnCount"), Some(&Value::from(4)));
    let column_json = fake.get_by_name("ColumnMetadata").and_then(Value::as_str).unwrap().to_string();
    let param_json = fake.get_by_name("ParameterMetadata").and_then(Value::as_str).unwrap().to_string();

    assert!(cursor.nextset().await.unwrap());
    let description = cursor.description().unwrap();
    let columns: Vec<Json> = serde_json::from_str(&column_json).unwrap();
    let json_types: Vec<&str> = columns.iter().map(|c| c["TypeName"].as_str().unwrap()).collect();
    assert_eq!(json_types, description.type_names());
    assert_eq!(json_types, vec!["INTEGER", "VARCHAR(100)", "DECIMAL(10,2)", "DATE"]);
    assert_eq!(columns[0]["Nullable"], Json::Bool(false));

    let params: Vec<Json> = serde_json::from_str(&param_json).unwrap();
    assert_eq!(params.len(), 1);
    assert_eq!(params[0]["TypeName"], "INTEGER");

    assert_eq!(cursor.fetchall().await.unwrap().len(), 1);
    assert!(!cursor.nextset().await.unwrap());
}

#[tokio::test]
async fn test_fake_result_sets_connection_parameter() {
    let (_conn, mut cursor) = open(ConnectParams::new("localhost").with_fake_result_sets(true)).await;
    cursor.execute("create table t (c1 integer); select * from t", ()).await.unwrap();
    let mut activity_names = Vec::new();
    loop {
        let is_fake = cursor
            .description()
            .and_then(|d| d.get(0))
            .is_some_and(|c| c.name == "ActivityCount");
        if is_fake {
            let row = cursor.fetchone().await.unwrap().unwrap();
            activity_names.push(row.get_by_name("ActivityName").cloned().unwrap());
        }
        if !cursor.nextset().await.unwrap() {
            break;
        }
    }
    // one fake set ahead of each statement result
    assert_eq!(activity_names, vec![Value::from("Create Table"), Value::from("Select")]);
}

#[tokio::test]
async fn test_help_session_reports_transaction_semantics() {
    let (conn, mut cursor) = open(ConnectParams::new("localhost").with_tmode("ANSI")).await;
    cursor.execute("help session", ()).await.unwrap();
    let row = cursor.fetchone().await.unwrap().unwrap();
    assert_eq!(row.get_by_name("Transaction Semantics"), Some(&Value::from("ANSI")));
    let number = conn.session_number().await.unwrap();
    assert_eq!(
        row.get_by_name("Session Number").and_then(Value::to_i64),
        Some(number as i64)
    );
}

#[tokio::test]
async fn test_cursor_as_stream() {
    let (_conn, mut cursor) = open(ConnectParams::new("localhost")).await;
    cursor
        .execute("select InfoKey, InfoData from dbc.dbcinfo order by InfoKey", ())
        .await
        .unwrap();
    let keys: Vec<String> = cursor
        .into_stream()
        .map_ok(|row| row.get(0).map(ToString::to_string).unwrap_or_default())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(keys, vec!["LANGUAGE SUPPORT MODE", "RELEASE", "VERSION"]);
}
