//! Tagged binary codec exchanged with a driver binding.
//!
//! Three buffer shapes share the same field encoding:
//!
//! - bind buffers: each row's fields followed by `Z`, then a final `Z`
//! - row buffers: one row's fields followed by `Z`
//! - column metadata buffers: seven fields per column, then `Z`

use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{Error, Result};
use crate::protocol::buffer::{ReadBuffer, WriteBuffer};
use crate::protocol::constants::*;
use crate::protocol::types::{
    ColumnDescription, Value, DATE_FORMAT, TIMESTAMP_FORMAT, TIMESTAMP_PARSE_FORMAT,
};

/// Append one value to a buffer.
pub fn write_value(buf: &mut WriteBuffer, value: &Value) -> Result<()> {
    match value {
        Value::Null => buf.write_u8(TAG_NULL),
        Value::Integer(n) => {
            buf.write_u8(TAG_INTEGER);
            buf.write_i32_be(*n);
        }
        Value::Double(d) => {
            buf.write_u8(TAG_DOUBLE);
            buf.write_f64_be(*d);
        }
        Value::BigInt(n) => buf.write_field(TAG_LONG, n.to_string().as_bytes())?,
        Value::Number(s) => buf.write_field(TAG_NUMBER, s.as_bytes())?,
        Value::String(s) => buf.write_field(TAG_STRING, s.as_bytes())?,
        Value::Bytes(b) => buf.write_field(TAG_BYTES, b)?,
        Value::Date(d) => buf.write_field(TAG_DATE, d.format(DATE_FORMAT).to_string().as_bytes())?,
        Value::Time(s) => buf.write_field(TAG_TIME, s.as_bytes())?,
        Value::TimeWithTimeZone(s) => buf.write_field(TAG_TIME_WITH_TIME_ZONE, s.as_bytes())?,
        Value::Timestamp(ts) => buf.write_field(
            TAG_TIMESTAMP,
            ts.format(TIMESTAMP_FORMAT).to_string().as_bytes(),
        )?,
        Value::TimestampWithTimeZone(s) => {
            buf.write_field(TAG_TIMESTAMP_WITH_TIME_ZONE, s.as_bytes())?
        }
    }
    Ok(())
}

/// Read one value. The caller has already checked that the next byte is not
/// the row terminator.
pub fn read_value(buf: &mut ReadBuffer) -> Result<Value> {
    let offset = buf.position();
    let tag = buf.read_u8()?;
    let value = match tag {
        TAG_NULL => Value::Null,
        TAG_INTEGER => Value::Integer(buf.read_i32_be()?),
        TAG_DOUBLE => Value::Double(buf.read_f64_be()?),
        TAG_BYTES => Value::Bytes(buf.read_field_payload()?.to_vec()),
        TAG_STRING => Value::String(buf.read_field_str()?),
        TAG_NUMBER => Value::Number(buf.read_field_str()?),
        TAG_LONG => {
            let text = buf.read_field_str()?;
            Value::BigInt(
                text.parse()
                    .map_err(|_| Error::codec(format!("Invalid long value '{}'", text)))?,
            )
        }
        TAG_DATE => {
            let text = buf.read_field_str()?;
            Value::Date(
                NaiveDate::parse_from_str(&text, DATE_FORMAT)
                    .map_err(|_| Error::codec(format!("Invalid date value '{}'", text)))?,
            )
        }
        TAG_TIMESTAMP => {
            let text = buf.read_field_str()?;
            Value::Timestamp(
                NaiveDateTime::parse_from_str(&text, TIMESTAMP_PARSE_FORMAT)
                    .map_err(|_| Error::codec(format!("Invalid timestamp value '{}'", text)))?,
            )
        }
        TAG_TIME => Value::Time(buf.read_field_str()?),
        TAG_TIME_WITH_TIME_ZONE => Value::TimeWithTimeZone(buf.read_field_str()?),
        TAG_TIMESTAMP_WITH_TIME_ZONE => Value::TimestampWithTimeZone(buf.read_field_str()?),
        other => {
            return Err(Error::UnknownTag {
                tag: other as char,
                offset,
            })
        }
    };
    Ok(value)
}

fn read_row_fields(buf: &mut ReadBuffer) -> Result<Vec<Value>> {
    let mut values = Vec::new();
    while buf.peek_u8()? != TAG_ROW_TERMINATOR {
        values.push(read_value(buf)?);
    }
    buf.read_u8()?;
    Ok(values)
}

/// Encode bind rows. Rows of zero values are not representable and yield an
/// empty bind set.
pub fn encode_bind_rows(rows: &[Vec<Value>]) -> Result<Bytes> {
    let mut buf = WriteBuffer::new();
    for row in rows.iter().filter(|r| !r.is_empty()) {
        for value in row {
            write_value(&mut buf, value)?;
        }
        buf.write_terminator();
    }
    buf.write_terminator();
    Ok(buf.freeze())
}

/// Decode a bind buffer back into rows.
pub fn decode_bind_rows(data: Bytes) -> Result<Vec<Vec<Value>>> {
    let mut buf = ReadBuffer::new(data);
    let mut rows = Vec::new();
    loop {
        if buf.peek_u8()? == TAG_ROW_TERMINATOR {
            buf.read_u8()?;
            break;
        }
        rows.push(read_row_fields(&mut buf)?);
    }
    expect_end(&buf)?;
    Ok(rows)
}

/// Encode a single fetched row.
pub fn encode_row(values: &[Value]) -> Result<Bytes> {
    let mut buf = WriteBuffer::with_capacity(64 * values.len().max(1));
    for value in values {
        write_value(&mut buf, value)?;
    }
    buf.write_terminator();
    Ok(buf.freeze())
}

/// Decode a single fetched row.
pub fn decode_row(data: Bytes) -> Result<Vec<Value>> {
    let mut buf = ReadBuffer::new(data);
    let values = read_row_fields(&mut buf)?;
    expect_end(&buf)?;
    Ok(values)
}

/// Encode column (or parameter) metadata.
pub fn encode_column_metadata(columns: &[ColumnDescription]) -> Result<Bytes> {
    let mut buf = WriteBuffer::new();
    for col in columns {
        buf.write_field(TAG_STRING, col.name.as_bytes())?;
        buf.write_field(TAG_STRING, col.type_name.as_bytes())?;
        buf.write_field(TAG_STRING, col.type_code.to_string().as_bytes())?;
        buf.write_field(TAG_LONG, col.byte_count.to_string().as_bytes())?;
        buf.write_field(TAG_LONG, col.precision.to_string().as_bytes())?;
        buf.write_field(TAG_LONG, col.scale.to_string().as_bytes())?;
        buf.write_u8(match col.nullable {
            Some(true) => TAG_TRUE,
            Some(false) => TAG_FALSE,
            None => TAG_NULL,
        });
    }
    buf.write_terminator();
    Ok(buf.freeze())
}

/// Decode column (or parameter) metadata.
pub fn decode_column_metadata(data: Bytes) -> Result<Vec<ColumnDescription>> {
    let mut buf = ReadBuffer::new(data);
    let mut columns = Vec::new();
    while buf.peek_u8()? != TAG_ROW_TERMINATOR {
        let name = read_tagged_str(&mut buf, TAG_STRING)?;
        let type_name = read_tagged_str(&mut buf, TAG_STRING)?;
        let type_code = read_tagged_str(&mut buf, TAG_STRING)?;
        let mut code_chars = type_code.chars();
        let type_code = match (code_chars.next(), code_chars.next()) {
            (Some(c), None) => c,
            _ => return Err(Error::codec(format!("Invalid type code '{}'", type_code))),
        };
        let byte_count = read_tagged_u64(&mut buf)?;
        let precision = read_tagged_u64(&mut buf)?;
        let scale = read_tagged_u64(&mut buf)?;
        let offset = buf.position();
        let nullable = match buf.read_u8()? {
            TAG_TRUE => Some(true),
            TAG_FALSE => Some(false),
            TAG_NULL => None,
            other => {
                return Err(Error::UnknownTag {
                    tag: other as char,
                    offset,
                })
            }
        };
        columns.push(ColumnDescription {
            name,
            type_name,
            type_code,
            byte_count,
            precision,
            scale,
            nullable,
        });
    }
    buf.read_u8()?;
    expect_end(&buf)?;
    Ok(columns)
}

fn read_tagged_str(buf: &mut ReadBuffer, expected: u8) -> Result<String> {
    let offset = buf.position();
    let tag = buf.read_u8()?;
    if tag != expected {
        return Err(Error::UnknownTag {
            tag: tag as char,
            offset,
        });
    }
    buf.read_field_str()
}

fn read_tagged_u64(buf: &mut ReadBuffer) -> Result<u64> {
    let text = read_tagged_str(buf, TAG_LONG)?;
    text.parse()
        .map_err(|_| Error::codec(format!("Invalid metadata number '{}'", text)))
}

fn expect_end(buf: &ReadBuffer) -> Result<()> {
    if buf.remaining() > 0 {
        return Err(Error::codec(format!(
            "{} trailing bytes at offset {}",
            buf.remaining(),
            buf.position()
        )));
    }
    Ok(())
}
