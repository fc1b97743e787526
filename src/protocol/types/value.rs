//! Column and bind values.

use chrono::{NaiveDate, NaiveDateTime};
use std::cmp::Ordering;
use std::fmt;

/// Text format for DATE values.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Text format for TIMESTAMP values when printed.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
/// Text format for TIMESTAMP values when parsed (fraction optional).
pub const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A single column or bind value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL value.
    Null,
    /// 32-bit integer (BYTEINT, SMALLINT, INTEGER).
    Integer(i32),
    /// 64-bit integer (BIGINT).
    BigInt(i64),
    /// Double precision float (FLOAT, REAL, DOUBLE PRECISION).
    Double(f64),
    /// Exact numeric as text (DECIMAL, NUMBER), preserving precision.
    Number(String),
    /// Character data (CHAR, VARCHAR).
    String(String),
    /// Binary data (BYTE, VARBYTE).
    Bytes(Vec<u8>),
    /// DATE.
    Date(NaiveDate),
    /// TIME as text.
    Time(String),
    /// TIME WITH TIME ZONE as text.
    TimeWithTimeZone(String),
    /// TIMESTAMP.
    Timestamp(NaiveDateTime),
    /// TIMESTAMP WITH TIME ZONE as text.
    TimestampWithTimeZone(String),
}

impl Value {
    /// Check if the value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get the value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s)
            | Value::Number(s)
            | Value::Time(s)
            | Value::TimeWithTimeZone(s)
            | Value::TimestampWithTimeZone(s) => Some(s),
            _ => None,
        }
    }

    /// Try to convert to i64.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n as i64),
            Value::BigInt(n) => Some(*n),
            Value::Double(d) if d.fract() == 0.0 => Some(*d as i64),
            Value::Number(s) | Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Try to convert to f64.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::BigInt(n) => Some(*n as f64),
            Value::Double(d) => Some(*d),
            Value::Number(s) | Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Try to get the value as a date.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Try to get the value as a timestamp.
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Try to get the value as raw bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Whether the value is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::Integer(_) | Value::BigInt(_) | Value::Double(_) | Value::Number(_)
        )
    }

    /// Text rendering used for CSV fields; `None` for NULL.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Compare two values the way the database orders them.
    ///
    /// NULL sorts before everything. Numbers compare numerically across
    /// representations. Returns `None` for incomparable kinds.
    pub fn sql_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) => Some(Ordering::Less),
            (_, Value::Null) => Some(Ordering::Greater),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::BigInt(a), Value::BigInt(b)) => Some(a.cmp(b)),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                match (a.to_i64(), b.to_i64()) {
                    (Some(x), Some(y)) => Some(x.cmp(&y)),
                    _ => a.to_f64()?.partial_cmp(&b.to_f64()?),
                }
            }
            (a, b) if a.is_numeric() && matches!(b, Value::String(_)) => {
                a.to_f64()?.partial_cmp(&b.to_f64()?)
            }
            (Value::String(_), b) if b.is_numeric() => {
                self.to_f64()?.partial_cmp(&b.to_f64()?)
            }
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => {
                // CHAR comparisons ignore trailing pad characters
                Some(a.trim_end().cmp(b.trim_end()))
            }
            (a, b) => match (a.as_str(), b.as_str()) {
                (Some(x), Some(y)) => Some(x.cmp(y)),
                _ => None,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(n) => write!(f, "{}", n),
            Value::BigInt(n) => write!(f, "{}", n),
            Value::Double(d) => write!(f, "{}", d),
            Value::Number(s)
            | Value::String(s)
            | Value::Time(s)
            | Value::TimeWithTimeZone(s)
            | Value::TimestampWithTimeZone(s) => write!(f, "{}", s),
            Value::Bytes(bytes) => {
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Value::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_null() {
        let val = Value::Null;
        assert!(val.is_null());
        assert_eq!(val.as_str(), None);
        assert_eq!(val.to_text(), None);
        assert_eq!(format!("{}", val), "NULL");
    }

    #[test]
    fn test_value_number() {
        let val = Value::Number("123.45".to_string());
        assert_eq!(val.to_i64(), None);
        assert_eq!(val.to_f64(), Some(123.45));
        assert_eq!(Value::Number("42".to_string()).to_i64(), Some(42));
    }

    #[test]
    fn test_display_dates_and_bytes() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(Value::Date(d).to_string(), "2024-03-09");
        let ts = d.and_hms_opt(1, 2, 3).unwrap();
        assert_eq!(Value::Timestamp(ts).to_string(), "2024-03-09 01:02:03.000000");
        assert_eq!(Value::Bytes(vec![0x32, 0x37]).to_string(), "3237");
    }

    #[test]
    fn test_sql_cmp_mixed_numeric() {
        assert_eq!(
            Value::Integer(3).sql_cmp(&Value::Number("3.5".into())),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::BigInt(10).sql_cmp(&Value::Integer(10)),
            Some(Ordering::Equal)
        );
        assert_eq!(Value::Null.sql_cmp(&Value::Integer(0)), Some(Ordering::Less));
        assert_eq!(
            Value::String("ab  ".into()).sql_cmp(&Value::String("ab".into())),
            Some(Ordering::Equal)
        );
        assert_eq!(Value::Bytes(vec![1]).sql_cmp(&Value::Integer(1)), None);
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::String("x".into()));
    }
}
