//! Teradata SQL data types and bind-value coercion.
//!
//! Used in two places: the `teradata_parameter` escape function, which forces a
//! parameter marker to a named type, and column definitions in the in-process
//! engine, which coerce inserted values to the column type.

use crate::error::{Error, Result};
use crate::protocol::constants::*;
use chrono::{NaiveDate, NaiveDateTime};

use super::value::{Value, DATE_FORMAT, TIMESTAMP_PARSE_FORMAT};

/// Default precision of DECIMAL without arguments.
const DEFAULT_DECIMAL_PRECISION: u8 = 5;

/// A Teradata SQL data type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
    ByteInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Decimal { precision: u8, scale: u8 },
    Number,
    Char(u32),
    Varchar(u32),
    Byte(u32),
    Varbyte(u32),
    Date,
    Time { with_time_zone: bool },
    Timestamp { with_time_zone: bool },
}

impl SqlType {
    /// Parse a type name such as `INTEGER`, `DECIMAL(18,2)` or
    /// `TIMESTAMP(6) WITH TIME ZONE`.
    ///
    /// Returns `None` for unknown or unsupported types.
    pub fn parse(text: &str) -> Option<Self> {
        let upper = text.trim().to_ascii_uppercase();
        let (with_time_zone, base) = match upper.strip_suffix("WITH TIME ZONE") {
            Some(rest) => (true, rest.trim_end().to_string()),
            None => (false, upper),
        };
        let (name, args) = match base.find('(') {
            Some(open) => {
                let close = base.rfind(')')?;
                if close < open || !base[close + 1..].trim().is_empty() {
                    return None;
                }
                let args: Vec<&str> = base[open + 1..close].split(',').map(str::trim).collect();
                (base[..open].trim().to_string(), args)
            }
            None => (base.trim().to_string(), Vec::new()),
        };
        let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
        let arg = |i: usize| -> Option<u32> { args.get(i).and_then(|a| a.parse().ok()) };
        let length = |default: Option<u32>| -> Option<u32> {
            let n = if args.is_empty() { default? } else { arg(0)? };
            (1..=MAX_CHAR_LENGTH).contains(&n).then_some(n)
        };

        if with_time_zone && name != "TIME" && name != "TIMESTAMP" {
            return None;
        }

        let ty = match name.as_str() {
            "BYTEINT" => SqlType::ByteInt,
            "SMALLINT" => SqlType::SmallInt,
            "INTEGER" | "INT" => SqlType::Integer,
            "BIGINT" => SqlType::BigInt,
            "FLOAT" | "REAL" | "DOUBLE PRECISION" => SqlType::Float,
            "DECIMAL" | "DEC" | "NUMERIC" => {
                let precision = match args.first() {
                    Some(_) => u8::try_from(arg(0)?).ok()?,
                    None => DEFAULT_DECIMAL_PRECISION,
                };
                let scale = match args.get(1) {
                    Some(_) => u8::try_from(arg(1)?).ok()?,
                    None => 0,
                };
                if precision == 0 || precision > 38 || scale > precision {
                    return None;
                }
                SqlType::Decimal { precision, scale }
            }
            "NUMBER" => SqlType::Number,
            "CHAR" | "CHARACTER" => SqlType::Char(length(Some(1))?),
            "VARCHAR" | "CHARACTER VARYING" => SqlType::Varchar(length(None)?),
            "BYTE" => SqlType::Byte(length(Some(1))?),
            "VARBYTE" => SqlType::Varbyte(length(None)?),
            "DATE" => SqlType::Date,
            "TIME" => SqlType::Time { with_time_zone },
            "TIMESTAMP" => SqlType::Timestamp { with_time_zone },
            _ => return None,
        };
        Some(ty)
    }

    /// Type name as reported in column metadata.
    pub fn name(&self) -> String {
        match self {
            SqlType::ByteInt => "BYTEINT".to_string(),
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Float => "FLOAT".to_string(),
            SqlType::Decimal { precision, scale } => format!("DECIMAL({},{})", precision, scale),
            SqlType::Number => "NUMBER".to_string(),
            SqlType::Char(n) => format!("CHAR({})", n),
            SqlType::Varchar(n) => format!("VARCHAR({})", n),
            SqlType::Byte(n) => format!("BYTE({})", n),
            SqlType::Varbyte(n) => format!("VARBYTE({})", n),
            SqlType::Date => "DATE".to_string(),
            SqlType::Time { with_time_zone: false } => "TIME".to_string(),
            SqlType::Time { with_time_zone: true } => "TIME WITH TIME ZONE".to_string(),
            SqlType::Timestamp { with_time_zone: false } => "TIMESTAMP".to_string(),
            SqlType::Timestamp { with_time_zone: true } => "TIMESTAMP WITH TIME ZONE".to_string(),
        }
    }

    /// Single-letter type code carried in column metadata.
    pub fn type_code(&self) -> char {
        match self {
            SqlType::ByteInt | SqlType::SmallInt | SqlType::Integer => TYPE_CODE_INTEGER,
            SqlType::BigInt => TYPE_CODE_LONG,
            SqlType::Float => TYPE_CODE_DOUBLE,
            SqlType::Decimal { .. } | SqlType::Number => TYPE_CODE_NUMBER,
            SqlType::Char(_) | SqlType::Varchar(_) => TYPE_CODE_STRING,
            SqlType::Byte(_) | SqlType::Varbyte(_) => TYPE_CODE_BYTES,
            SqlType::Date => TYPE_CODE_DATE,
            SqlType::Time { with_time_zone: false } => TYPE_CODE_TIME,
            SqlType::Time { with_time_zone: true } => TYPE_CODE_TIME_WITH_TIME_ZONE,
            SqlType::Timestamp { with_time_zone: false } => TYPE_CODE_TIMESTAMP,
            SqlType::Timestamp { with_time_zone: true } => TYPE_CODE_TIMESTAMP_WITH_TIME_ZONE,
        }
    }

    /// Maximum byte count of a value of this type.
    pub fn byte_count(&self) -> u64 {
        match self {
            SqlType::ByteInt => 1,
            SqlType::SmallInt => 2,
            SqlType::Integer => 4,
            SqlType::BigInt | SqlType::Float => 8,
            SqlType::Decimal { precision, .. } => match precision {
                1..=2 => 1,
                3..=4 => 2,
                5..=9 => 4,
                10..=18 => 8,
                _ => 16,
            },
            SqlType::Number => 18,
            SqlType::Char(n) | SqlType::Varchar(n) => *n as u64 * 4,
            SqlType::Byte(n) | SqlType::Varbyte(n) => *n as u64,
            SqlType::Date => 4,
            SqlType::Time { with_time_zone } => if *with_time_zone { 8 } else { 6 },
            SqlType::Timestamp { with_time_zone } => if *with_time_zone { 12 } else { 10 },
        }
    }

    /// Numeric precision (0 when not applicable).
    pub fn precision(&self) -> u64 {
        match self {
            SqlType::ByteInt => 3,
            SqlType::SmallInt => 5,
            SqlType::Integer => 10,
            SqlType::BigInt => 19,
            SqlType::Float => 15,
            SqlType::Decimal { precision, .. } => *precision as u64,
            SqlType::Number => 40,
            SqlType::Time { .. } | SqlType::Timestamp { .. } => 6,
            _ => 0,
        }
    }

    /// Numeric scale (0 when not applicable).
    pub fn scale(&self) -> u64 {
        match self {
            SqlType::Decimal { scale, .. } => *scale as u64,
            _ => 0,
        }
    }

    /// Infer the type that best describes a value, for expressions without a
    /// declared type (literals and parameter markers).
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Null => SqlType::Varchar(1),
            Value::Integer(_) => SqlType::Integer,
            Value::BigInt(_) => SqlType::BigInt,
            Value::Double(_) => SqlType::Float,
            Value::Number(s) => {
                let digits = s.chars().filter(char::is_ascii_digit).count().clamp(1, 38);
                let scale = s
                    .split_once('.')
                    .map(|(_, f)| f.len())
                    .unwrap_or(0)
                    .min(digits);
                SqlType::Decimal {
                    precision: digits as u8,
                    scale: scale as u8,
                }
            }
            Value::String(s) => SqlType::Varchar(s.chars().count().max(1) as u32),
            Value::Bytes(b) => SqlType::Varbyte(b.len().max(1) as u32),
            Value::Date(_) => SqlType::Date,
            Value::Time(_) => SqlType::Time { with_time_zone: false },
            Value::TimeWithTimeZone(_) => SqlType::Time { with_time_zone: true },
            Value::Timestamp(_) => SqlType::Timestamp { with_time_zone: false },
            Value::TimestampWithTimeZone(_) => SqlType::Timestamp { with_time_zone: true },
        }
    }

    /// Convert a value to this type.
    pub fn coerce(&self, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let mismatch = || {
            Error::type_conversion(format!(
                "Cannot convert {} to {}",
                describe(value),
                self.name()
            ))
        };
        match self {
            SqlType::ByteInt | SqlType::SmallInt | SqlType::Integer => {
                let n = integral(value).ok_or_else(mismatch)?;
                let (min, max) = match self {
                    SqlType::ByteInt => (i8::MIN as i64, i8::MAX as i64),
                    SqlType::SmallInt => (i16::MIN as i64, i16::MAX as i64),
                    _ => (i32::MIN as i64, i32::MAX as i64),
                };
                if n < min || n > max {
                    return Err(Error::type_conversion(format!(
                        "Numeric overflow: {} does not fit {}",
                        n,
                        self.name()
                    )));
                }
                Ok(Value::Integer(n as i32))
            }
            SqlType::BigInt => Ok(Value::BigInt(integral(value).ok_or_else(mismatch)?)),
            SqlType::Float => match value {
                Value::Bytes(_) => Err(mismatch()),
                other => Ok(Value::Double(other.to_f64().ok_or_else(mismatch)?)),
            },
            SqlType::Decimal { precision, scale } => {
                let text = numeric_text(value).ok_or_else(mismatch)?;
                let normalized = normalize_decimal(&text, *scale).ok_or_else(mismatch)?;
                let int_digits = normalized
                    .trim_start_matches('-')
                    .split('.')
                    .next()
                    .unwrap_or("")
                    .trim_start_matches('0')
                    .len();
                if int_digits > (*precision - *scale) as usize {
                    return Err(Error::type_conversion(format!(
                        "Numeric overflow: {} does not fit {}",
                        text,
                        self.name()
                    )));
                }
                Ok(Value::Number(normalized))
            }
            SqlType::Number => {
                let text = numeric_text(value).ok_or_else(mismatch)?;
                text.parse::<f64>().map_err(|_| mismatch())?;
                Ok(Value::Number(text))
            }
            SqlType::Char(n) | SqlType::Varchar(n) => {
                let text = match value {
                    Value::Bytes(_) => return Err(mismatch()),
                    other => other.to_string(),
                };
                let len = text.chars().count();
                if len > *n as usize {
                    return Err(Error::type_conversion(format!(
                        "Right truncation of string data: {} characters into {}",
                        len,
                        self.name()
                    )));
                }
                if matches!(self, SqlType::Char(_)) {
                    let mut padded = text;
                    padded.extend(std::iter::repeat(' ').take(*n as usize - len));
                    Ok(Value::String(padded))
                } else {
                    Ok(Value::String(text))
                }
            }
            SqlType::Byte(n) | SqlType::Varbyte(n) => {
                let bytes = value.as_bytes().ok_or_else(mismatch)?;
                if bytes.len() > *n as usize {
                    return Err(Error::type_conversion(format!(
                        "Right truncation of byte data: {} bytes into {}",
                        bytes.len(),
                        self.name()
                    )));
                }
                let mut bytes = bytes.to_vec();
                if matches!(self, SqlType::Byte(_)) {
                    bytes.resize(*n as usize, 0);
                }
                Ok(Value::Bytes(bytes))
            }
            SqlType::Date => match value {
                Value::Date(d) => Ok(Value::Date(*d)),
                Value::Timestamp(ts) => Ok(Value::Date(ts.date())),
                Value::String(s) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                    .map(Value::Date)
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            SqlType::Timestamp { with_time_zone: false } => match value {
                Value::Timestamp(ts) => Ok(Value::Timestamp(*ts)),
                Value::Date(d) => Ok(Value::Timestamp(d.and_time(chrono::NaiveTime::MIN))),
                Value::String(s) => NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_PARSE_FORMAT)
                    .map(Value::Timestamp)
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            SqlType::Timestamp { with_time_zone: true } => match value {
                Value::TimestampWithTimeZone(s) | Value::String(s) => {
                    Ok(Value::TimestampWithTimeZone(s.trim().to_string()))
                }
                _ => Err(mismatch()),
            },
            SqlType::Time { with_time_zone: false } => match value {
                Value::Time(s) | Value::String(s) => Ok(Value::Time(s.trim().to_string())),
                _ => Err(mismatch()),
            },
            SqlType::Time { with_time_zone: true } => match value {
                Value::TimeWithTimeZone(s) | Value::String(s) => {
                    Ok(Value::TimeWithTimeZone(s.trim().to_string()))
                }
                _ => Err(mismatch()),
            },
        }
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Bytes(b) => format!("{} bytes", b.len()),
        other => format!("'{}'", other),
    }
}

fn integral(value: &Value) -> Option<i64> {
    match value {
        Value::Number(s) | Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                let f: f64 = s.parse().ok()?;
                (f.fract() == 0.0).then_some(f as i64)
            })
        }
        other => other.to_i64(),
    }
}

fn numeric_text(value: &Value) -> Option<String> {
    match value {
        Value::Integer(n) => Some(n.to_string()),
        Value::BigInt(n) => Some(n.to_string()),
        Value::Double(d) => Some(d.to_string()),
        Value::Number(s) | Value::String(s) => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Round a decimal literal to `scale` fractional digits, half away from zero.
fn normalize_decimal(text: &str, scale: u8) -> Option<String> {
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }
    let scale = scale as usize;
    let mut digits: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes().chain(std::iter::repeat(b'0')).take(scale))
        .map(|b| b - b'0')
        .collect();
    if digits.is_empty() {
        digits.push(0);
    }
    let round_up = frac_part.as_bytes().get(scale).is_some_and(|d| *d >= b'5');
    if round_up {
        let mut i = digits.len();
        loop {
            if i == 0 {
                digits.insert(0, 1);
                break;
            }
            i -= 1;
            if digits[i] == 9 {
                digits[i] = 0;
            } else {
                digits[i] += 1;
                break;
            }
        }
    }
    let split = digits.len() - scale;
    let int_digits: String = digits[..split].iter().map(|d| (d + b'0') as char).collect();
    let int_digits = match int_digits.trim_start_matches('0') {
        "" => "0".to_string(),
        trimmed => trimmed.to_string(),
    };
    let frac_digits: String = digits[split..].iter().map(|d| (d + b'0') as char).collect();
    let is_zero = int_digits == "0" && frac_digits.chars().all(|c| c == '0');
    let mut out = String::new();
    if negative && !is_zero {
        out.push('-');
    }
    out.push_str(&int_digits);
    if scale > 0 {
        out.push('.');
        out.push_str(&frac_digits);
    }
    Some(out)
}
