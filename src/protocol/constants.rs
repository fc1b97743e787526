//! Binding codec constants.
//!
//! Field tags used in bind, row and metadata buffers, and the single-letter
//! type codes carried in column metadata.

// Field tags
pub const TAG_BYTES: u8 = b'B';
pub const TAG_DOUBLE: u8 = b'D';
pub const TAG_FALSE: u8 = b'F';
pub const TAG_INTEGER: u8 = b'I';
pub const TAG_LONG: u8 = b'L';
pub const TAG_NUMBER: u8 = b'M';
pub const TAG_NULL: u8 = b'N';
pub const TAG_STRING: u8 = b'S';
pub const TAG_TRUE: u8 = b'T';
pub const TAG_DATE: u8 = b'U';
pub const TAG_TIME: u8 = b'V';
pub const TAG_TIME_WITH_TIME_ZONE: u8 = b'W';
pub const TAG_TIMESTAMP: u8 = b'X';
pub const TAG_TIMESTAMP_WITH_TIME_ZONE: u8 = b'Y';
pub const TAG_ROW_TERMINATOR: u8 = b'Z';

/// Size of a length-prefixed field header: tag + high u32 + low u32.
pub const FIELD_HEADER_SIZE: usize = 9;

// Column type codes
pub const TYPE_CODE_BYTES: char = 'b';
pub const TYPE_CODE_DOUBLE: char = 'd';
pub const TYPE_CODE_INTEGER: char = 'i';
pub const TYPE_CODE_LONG: char = 'l';
pub const TYPE_CODE_NUMBER: char = 'm';
pub const TYPE_CODE_STRING: char = 's';
pub const TYPE_CODE_DATE: char = 'u';
pub const TYPE_CODE_TIME: char = 'v';
pub const TYPE_CODE_TIME_WITH_TIME_ZONE: char = 'w';
pub const TYPE_CODE_TIMESTAMP: char = 'x';
pub const TYPE_CODE_TIMESTAMP_WITH_TIME_ZONE: char = 'y';

/// Driver version reported by `{fn teradata_driver_version}`.
pub const DRIVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Client program name sent with each logon.
pub const CLIENT_PROGRAM_NAME: &str = "teradatasql-rs";

// Activity types reported in result metadata.
pub const ACTIVITY_SELECT: u16 = 1;
pub const ACTIVITY_INSERT: u16 = 2;
pub const ACTIVITY_UPDATE: u16 = 3;
pub const ACTIVITY_DELETE: u16 = 4;
pub const ACTIVITY_CREATE_TABLE: u16 = 5;
pub const ACTIVITY_DROP_TABLE: u16 = 6;
pub const ACTIVITY_BEGIN_TRANSACTION: u16 = 7;
pub const ACTIVITY_END_TRANSACTION: u16 = 8;
pub const ACTIVITY_ROLLBACK: u16 = 9;
pub const ACTIVITY_HELP: u16 = 10;
pub const ACTIVITY_NATIVE_SQL: u16 = 100;

/// Largest CHAR, VARCHAR, BYTE or VARBYTE length.
pub const MAX_CHAR_LENGTH: u32 = 64000;

// Database error codes.
pub const ERR_NUMERIC_OVERFLOW: u32 = 2616;
pub const ERR_DIVIDE_BY_ZERO: u32 = 2618;
pub const ERR_BAD_CONVERSION: u32 = 2620;
pub const ERR_DUPLICATE_ROW: u32 = 2802;
pub const ERR_TOO_MANY_ET: u32 = 3510;
pub const ERR_NO_ACCESS: u32 = 3523;
pub const ERR_DUPLICATE_COLUMN: u32 = 3560;
pub const ERR_NULL_NOT_ALLOWED: u32 = 3604;
pub const ERR_SYNTAX: u32 = 3706;
pub const ERR_UNEXPECTED_TOKEN: u32 = 3707;
pub const ERR_STRING_UNTERMINATED: u32 = 3760;
pub const ERR_DATABASE_MISSING: u32 = 3802;
pub const ERR_TABLE_EXISTS: u32 = 3803;
pub const ERR_OBJECT_MISSING: u32 = 3807;
pub const ERR_COLUMN_MISSING: u32 = 3810;
pub const ERR_NOT_NULL_MISSING: u32 = 3811;
pub const ERR_TOO_FEW_VALUES: u32 = 3812;
pub const ERR_TOO_MANY_VALUES: u32 = 3813;
pub const ERR_PARAM_COUNT: u32 = 3939;
pub const ERR_STRING_TRUNCATION: u32 = 3996;
pub const ERR_UNSUPPORTED: u32 = 5467;
pub const ERR_LOGON_FAILED: u32 = 8017;
