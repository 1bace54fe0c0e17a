use serde::{Deserialize, Serialize};

use super::table::Row;

/// Driver bookkeeping returned next to the rows of a statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    pub row_count: usize,
    pub affected_rows: Option<u64>,
    pub execution_time_ms: u64,
}

/// Driver-native response shape.
///
/// Statements run through `query` come back as rows plus metadata; driver
/// helpers such as "show all schemas" come back as a bare row list. The
/// serialized form keeps that distinction (`[rows, metadata]` vs `rows`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawResult {
    Tuple(Vec<Row>, ResultMetadata),
    Rows(Vec<Row>),
}

impl RawResult {
    pub fn with_metadata(rows: Vec<Row>, affected_rows: Option<u64>, execution_time_ms: u64) -> Self {
        let metadata = ResultMetadata {
            row_count: rows.len(),
            affected_rows,
            execution_time_ms,
        };
        RawResult::Tuple(rows, metadata)
    }

    /// The row list, whichever shape the driver produced.
    pub fn first_positional(&self) -> &[Row] {
        match self {
            RawResult::Tuple(rows, _) => rows,
            RawResult::Rows(rows) => rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.first_positional().is_empty()
    }

    /// Take the sole (or first) field of every row as a name.
    pub fn names(&self) -> Vec<String> {
        self.first_positional()
            .iter()
            .filter_map(|row| row.values().next())
            .map(|value| match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}
