use chrono::Local;
use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};

use super::query::RawResult;
use super::table::Table;
use crate::api::middleware::AppError;

/// Wall-clock format shared by every log and error event.
pub const TIMESTAMP_FORMAT: &str = "%H:%M:%S GMT%z";

pub fn timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub timestamp: String,
}

impl ErrorPayload {
    pub fn from_error(err: &AppError) -> Self {
        let message = match err {
            AppError::Query { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self {
            code: err.code().to_string(),
            message,
            sql: err.sql().map(str::to_string),
            table: None,
            timestamp: timestamp(),
        }
    }
}

/// Everything the gateway pushes to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Log(LogEntry),
    Error(ErrorPayload),
    /// Also tells the consumer to drop the table list it is showing.
    DatabaseList { names: Vec<String> },
    TableList { names: Vec<String> },
    TablePreview { table_name: String, table: Table },
    /// Raw driver result of an ad-hoc query, not normalized.
    QueryResult { rows: RawResult },
    /// Session closed; all databases, tables and rows known so far are stale.
    Disconnected,
}

impl Event {
    pub fn log(message: impl Into<String>) -> Self {
        Event::Log(LogEntry {
            message: message.into(),
            timestamp: timestamp(),
        })
    }

    pub fn error(err: &AppError) -> Self {
        Event::Error(ErrorPayload::from_error(err))
    }

    pub fn table_error(table: &str, err: &AppError) -> Self {
        let mut payload = ErrorPayload::from_error(err);
        payload.table = Some(table.to_string());
        Event::Error(payload)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::Log(_) => "log",
            Event::Error(_) => "error",
            Event::DatabaseList { .. } => "databases",
            Event::TableList { .. } => "tables",
            Event::TablePreview { .. } => "preview",
            Event::QueryResult { .. } => "rows",
            Event::Disconnected => "disconnected",
        }
    }

    /// Wire form: a single mapping with at most one populated payload key.
    ///
    /// Discovery and query events always carry `error: null`, and keys the
    /// consumer must reset are written as explicit nulls instead of being left out.
    pub fn to_json(&self) -> Value {
        match self {
            Event::Log(entry) => json!({ "log": entry }),
            Event::Error(payload) => json!({ "error": payload }),
            Event::DatabaseList { names } => json!({
                "databases": names,
                "error": null,
                "tables": null,
            }),
            Event::TableList { names } => json!({
                "error": null,
                "tables": names,
            }),
            Event::TablePreview { table_name, table } => {
                let mut object = Map::new();
                object.insert("error".to_string(), Value::Null);
                object.insert(table_name.clone(), json!(table));
                Value::Object(object)
            }
            Event::QueryResult { rows } => json!({
                "error": null,
                "rows": rows,
            }),
            Event::Disconnected => json!({
                "databases": null,
                "error": null,
                "rows": null,
                "tables": null,
            }),
        }
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
