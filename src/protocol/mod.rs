//! Driver-side protocol: the binding codec, escape functions and data types.

pub mod buffer;
pub mod codec;
pub mod connect;
pub mod constants;
pub mod crypto;
pub mod escape;
pub mod types;

pub use buffer::{ReadBuffer, WriteBuffer};
pub use escape::{Directive, EscapedRequest, Segment, SessionValues};
pub use types::{ColumnDescription, Description, Row, SqlType, Value};
