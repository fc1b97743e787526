//! Column description types for the user-facing API.
//!
//! A [`ColumnDescription`] is one entry of a cursor's `description`: the
//! column name first, then the type and size attributes reported by the
//! binding's column metadata. The same type serializes to the JSON objects
//! carried in fake result sets.

use serde::{Deserialize, Serialize};

use super::sql_type::SqlType;

/// Metadata for one result column or parameter marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescription {
    /// Column name (or parameter label).
    #[serde(rename = "Name")]
    pub name: String,
    /// Teradata type name, e.g. `VARCHAR(100)`.
    #[serde(rename = "TypeName")]
    pub type_name: String,
    /// Single-letter type code.
    #[serde(rename = "TypeCode")]
    pub type_code: char,
    /// Maximum byte count.
    #[serde(rename = "ByteCount")]
    pub byte_count: u64,
    /// Numeric precision.
    #[serde(rename = "Precision")]
    pub precision: u64,
    /// Numeric scale.
    #[serde(rename = "Scale")]
    pub scale: u64,
    /// Whether NULL values are allowed; `None` when unknown.
    #[serde(rename = "Nullable")]
    pub nullable: Option<bool>,
}

impl ColumnDescription {
    /// Describe a column of the given SQL type.
    pub fn from_sql_type(name: impl Into<String>, ty: &SqlType, nullable: Option<bool>) -> Self {
        Self {
            name: name.into(),
            type_name: ty.name(),
            type_code: ty.type_code(),
            byte_count: ty.byte_count(),
            precision: ty.precision(),
            scale: ty.scale(),
            nullable,
        }
    }

    /// Display size. Never reported.
    pub fn display_size(&self) -> Option<u64> {
        None
    }

    /// Internal size in bytes.
    pub fn internal_size(&self) -> u64 {
        self.byte_count
    }
}

/// Shared column information for all rows of a result set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Description {
    /// Column definitions in result order.
    pub columns: Vec<ColumnDescription>,
}

impl Description {
    /// Create a description from columns.
    pub fn new(columns: Vec<ColumnDescription>) -> Self {
        Self { columns }
    }

    /// Get column names.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Get type names.
    pub fn type_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.type_name.as_str()).collect()
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Get column by index.
    pub fn get(&self, index: usize) -> Option<&ColumnDescription> {
        self.columns.get(index)
    }

    /// Find column index by name (case-insensitive).
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Iterate over columns.
    pub fn iter(&self) -> std::slice::Iter<'_, ColumnDescription> {
        self.columns.iter()
    }
}

impl<'a> IntoIterator for &'a Description {
    type Item = &'a ColumnDescription;
    type IntoIter = std::slice::Iter<'a, ColumnDescription>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}
