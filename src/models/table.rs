use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// One result row as returned by a driver: column name to value, in column order.
pub type Row = Map<String, Value>;

/// Uniform tabular shape that every preview is normalized into.
///
/// `nrows == rows.len()`, `ncols == column_names.len()` and every row holds
/// exactly `ncols` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub column_names: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub nrows: usize,
    pub ncols: usize,
}

impl Table {
    /// Placeholder table standing in for a query that returned no rows.
    pub fn sentinel() -> Self {
        Self {
            column_names: vec!["NA".to_string()],
            rows: vec![vec![json!("empty table")]],
            nrows: 1,
            ncols: 1,
        }
    }

    /// Normalize driver rows into a table.
    ///
    /// Column names come from the first row. Later rows are projected onto
    /// those columns, so a key missing from a row becomes `null` and extra
    /// keys are dropped. No rows at all gives [`Table::sentinel`].
    pub fn from_rows(rows: &[Row]) -> Self {
        let Some(first) = rows.first() else {
            return Self::sentinel();
        };

        let column_names: Vec<String> = first.keys().cloned().collect();
        let rows: Vec<Vec<Value>> = rows
            .iter()
            .map(|row| {
                column_names
                    .iter()
                    .map(|name| row.get(name).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Self {
            nrows: rows.len(),
            ncols: column_names.len(),
            column_names,
            rows,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        *self == Self::sentinel()
    }
}
