//! Rows returned by cursor fetches.

use std::ops::Index;
use std::sync::Arc;

use super::column::Description;
use super::value::Value;

/// One fetched row. Every row of a result set shares the set's description.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Value>,
    description: Arc<Description>,
}

impl Row {
    pub fn new(values: Vec<Value>, description: Arc<Description>) -> Self {
        Self {
            values,
            description,
        }
    }

    /// Value of the column at `index`, 0-based.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value of the column named `name`. Teradata names compare without
    /// regard to case.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.description
            .find_by_name(name)
            .and_then(|index| self.values.get(index))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Description of the result set this row came from.
    pub fn description(&self) -> &Description {
        &self.description
    }
}

impl Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.values[index]
    }
}

impl IntoIterator for Row {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{ColumnDescription, SqlType};

    #[test]
    fn test_lookup_by_name_ignores_case() {
        let description = Arc::new(Description::new(vec![
            ColumnDescription::from_sql_type("ActivityName", &SqlType::Varchar(12), Some(false)),
            ColumnDescription::from_sql_type("ActivityCount", &SqlType::BigInt, Some(false)),
        ]));
        let row = Row::new(vec![Value::from("Insert"), Value::BigInt(3)], description);

        assert_eq!(row.get_by_name("activitycount"), Some(&Value::BigInt(3)));
        assert_eq!(row.get_by_name("ACTIVITYNAME"), row.get(0));
        assert_eq!(row.get_by_name("WarningCode"), None);
        assert_eq!(row[1], Value::BigInt(3));
        assert_eq!(row.description().column_names(), vec!["ActivityName", "ActivityCount"]);
        assert_eq!(row.into_values().len(), 2);
    }
}
