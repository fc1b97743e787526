//! CSV files behind the `teradata_read_csv` and `teradata_write_csv` escape
//! functions.
//!
//! Files start with a header line of column names. NULL is written as an
//! empty field, and an empty field reads back as NULL, so an empty string
//! does not survive a round trip.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::protocol::types::{Description, Value};

/// File receiving result set `index` of a request: the given path for the
/// first set, then `name_1.ext`, `name_2.ext` and so on.
pub fn numbered_path(base: &Path, index: usize) -> PathBuf {
    if index == 0 {
        return base.to_path_buf();
    }
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match base.extension() {
        Some(ext) => format!("{}_{}.{}", stem, index, ext.to_string_lossy()),
        None => format!("{}_{}", stem, index),
    };
    base.with_file_name(name)
}

/// Write one result set. Returns the number of data rows written.
pub async fn write_csv(path: &Path, description: &Description, rows: &[Vec<Value>]) -> Result<u64> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(description.column_names())?;
    for row in rows {
        writer.write_record(row.iter().map(|v| v.to_text().unwrap_or_default()))?;
    }
    let data = writer
        .into_inner()
        .map_err(|e| Error::Io(e.into_error()))?;
    tokio::fs::write(path, data).await?;
    tracing::debug!(path = %path.display(), rows = rows.len(), "wrote CSV file");
    Ok(rows.len() as u64)
}

/// Read bind rows, skipping the header line.
pub async fn read_csv(path: &Path) -> Result<Vec<Vec<Value>>> {
    let data = tokio::fs::read(path).await?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(data.as_slice());
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        Value::Null
                    } else {
                        Value::String(field.to_string())
                    }
                })
                .collect(),
        );
    }
    if rows.is_empty() {
        return Err(Error::bind(format!(
            "CSV file {} contains no data rows",
            path.display()
        )));
    }
    Ok(rows)
}
