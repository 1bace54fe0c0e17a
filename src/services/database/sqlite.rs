// SQLite adapter over a single rusqlite connection
use crate::api::middleware::AppError;
use crate::models::{Credentials, Dialect, RawResult, Row};
use crate::services::database::adapter::DatabaseAdapter;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Instant;
use tokio::sync::Mutex;

const SHOW_ALL_SCHEMAS: &str = "SELECT name FROM sqlite_master \
     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";

/// SQLite is file based; the path comes from `Credentials::database_path`.
/// Uses tokio::Mutex for async-friendly locking
pub struct SqliteAdapter {
    conn: Mutex<Option<Connection>>,
}

impl SqliteAdapter {
    pub async fn connect(credentials: &Credentials) -> Result<Self, AppError> {
        let path = credentials
            .database_path()
            .ok_or_else(|| AppError::Validation("databasePath is required for sqlite".to_string()))?;
        Self::open(path)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(|e| AppError::Connection(format!("Failed to open SQLite database: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    async fn run(&self, sql: &str) -> Result<(Vec<Row>, Option<u64>), AppError> {
        let guard = self.conn.lock().await;
        let conn = guard
            .as_ref()
            .ok_or_else(|| AppError::query(sql, "connection is closed"))?;
        Self::execute(conn, sql).map_err(|e| AppError::query(sql, e))
    }

    /// Statements without result columns report the changed row count instead of rows.
    fn execute(conn: &Connection, sql: &str) -> rusqlite::Result<(Vec<Row>, Option<u64>)> {
        let mut stmt = conn.prepare(sql)?;
        let column_names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        if column_names.is_empty() {
            let changed = stmt.execute([])?;
            return Ok((Vec::new(), Some(changed as u64)));
        }

        let mut rows = stmt.query([])?;
        let mut json_rows = Vec::new();
        while let Some(row) = rows.next()? {
            let mut row_obj = Row::new();
            for (idx, name) in column_names.iter().enumerate() {
                row_obj.insert(name.clone(), Self::value_to_json(row.get_ref(idx)?));
            }
            json_rows.push(row_obj);
        }

        Ok((json_rows, None))
    }

    fn value_to_json(value: ValueRef<'_>) -> Value {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => json!(i),
            ValueRef::Real(f) => json!(f),
            ValueRef::Text(bytes) => json!(String::from_utf8_lossy(bytes)),
            ValueRef::Blob(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => json!(s),
                Err(_) => Value::Null,
            },
        }
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for SqliteAdapter {
    async fn test_connection(&self) -> Result<(), AppError> {
        self.run("SELECT 1")
            .await
            .map(|_| ())
            .map_err(|e| AppError::Connection(e.to_string()))
    }

    async fn query(&self, sql: &str) -> Result<RawResult, AppError> {
        let start_time = Instant::now();
        let (rows, affected_rows) = self.run(sql).await?;
        Ok(RawResult::with_metadata(
            rows,
            affected_rows,
            start_time.elapsed().as_millis() as u64,
        ))
    }

    async fn show_all_schemas(&self) -> Result<RawResult, AppError> {
        let (rows, _) = self.run(SHOW_ALL_SCHEMAS).await?;
        Ok(RawResult::Rows(rows))
    }

    async fn close(&self) {
        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn {
            if let Err((_, e)) = conn.close() {
                tracing::warn!("Failed to close SQLite database: {}", e);
            }
        }
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }
}
