//! Integration tests for stored password protection at logon.

use std::path::PathBuf;
use std::sync::Arc;

use teradatasql_rs::password::{encrypt_password_files, EncryptOptions};
use teradatasql_rs::{ConnectParams, Connection, ErrorKind, MemoryBinding};

fn file_pair(tag: &str) -> (PathBuf, PathBuf) {
    let dir = std::env::temp_dir();
    let pid = std::process::id();
    (
        dir.join(format!("tdsql-it-{}-{}-PassKey.properties", tag, pid)),
        dir.join(format!("tdsql-it-{}-{}-EncPass.properties", tag, pid)),
    )
}

fn reference(key_file: &PathBuf, pass_file: &PathBuf) -> String {
    format!(
        "ENCRYPTED_PASSWORD(file:{},file:{})",
        key_file.display(),
        pass_file.display()
    )
}

#[tokio::test]
async fn test_logon_with_encrypted_password() {
    let (key_file, pass_file) = file_pair("logon");
    let opts = EncryptOptions::new("AES/CBC/NoPadding", 256, "HmacSHA256").unwrap();
    encrypt_password_files(&opts, &key_file, &pass_file, "please").await.unwrap();

    let binding = Arc::new(MemoryBinding::new().with_user("guest", "please"));
    let params = ConnectParams::new("localhost")
        .with_user("guest")
        .with_password(reference(&key_file, &pass_file));
    let conn = Connection::connect(Arc::clone(&binding), params).await.unwrap();
    conn.close().await.unwrap();

    let params = ConnectParams::new("localhost")
        .with_logmech("LDAP")
        .with_logdata(format!("authcid=guest password={}", reference(&key_file, &pass_file)));
    let conn = Connection::connect(Arc::clone(&binding), params).await.unwrap();
    conn.close().await.unwrap();

    tokio::fs::remove_file(&key_file).await.unwrap();
    tokio::fs::remove_file(&pass_file).await.unwrap();
}

#[tokio::test]
async fn test_mismatched_files_are_rejected() {
    let (key_a, pass_a) = file_pair("mismatch-a");
    let (key_b, pass_b) = file_pair("mismatch-b");
    let opts = EncryptOptions::new("AES/CBC/PKCS5Padding", 128, "HmacSHA1").unwrap();
    encrypt_password_files(&opts, &key_a, &pass_a, "please").await.unwrap();
    // distinct match values come from the clock
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    encrypt_password_files(&opts, &key_b, &pass_b, "please").await.unwrap();

    let params = ConnectParams::new("localhost")
        .with_user("guest")
        .with_password(reference(&key_a, &pass_b));
    let err = Connection::connect(Arc::new(MemoryBinding::new()), params)
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Interface);

    for file in [key_a, pass_a, key_b, pass_b] {
        tokio::fs::remove_file(&file).await.unwrap();
    }
}

#[tokio::test]
async fn test_missing_key_file() {
    let params = ConnectParams::new("localhost")
        .with_user("guest")
        .with_password("ENCRYPTED_PASSWORD(file:/nonexistent/PassKey.properties,file:/nonexistent/EncPass.properties)");
    let err = Connection::connect(Arc::new(MemoryBinding::new()), params)
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Io);
}
