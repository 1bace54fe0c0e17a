// MySQL / MariaDB adapter over a single mysql_async connection
use crate::api::middleware::AppError;
use crate::models::{Credentials, Dialect, RawResult, Row};
use crate::services::database::adapter::DatabaseAdapter;
use mysql_async::consts::ColumnType;
use mysql_async::{prelude::*, Conn, OptsBuilder, Row as MySqlRow, Value as MySqlValue};
use serde_json::{json, Value};
use std::time::Instant;
use tokio::sync::Mutex;

pub struct MySQLAdapter {
    conn: Mutex<Option<Conn>>,
    dialect: Dialect,
}

impl MySQLAdapter {
    /// Serves both `mysql` and `mariadb`; they share the wire protocol.
    pub async fn connect(credentials: &Credentials, dialect: Dialect) -> Result<Self, AppError> {
        let opts = OptsBuilder::default()
            .ip_or_hostname(credentials.host())
            .tcp_port(credentials.port_for(dialect))
            .user(Some(credentials.username()))
            .pass(Some(credentials.password()))
            .db_name(credentials.database());

        let conn = Conn::new(opts)
            .await
            .map_err(|e| AppError::Connection(format!("Failed to connect to {}: {}", dialect, e)))?;

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            dialect,
        })
    }

    async fn run(&self, sql: &str) -> Result<(Vec<Row>, u64), AppError> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| AppError::query(sql, "connection is closed"))?;

        let rows: Vec<MySqlRow> = conn
            .query(sql)
            .await
            .map_err(|e| AppError::query(sql, e))?;
        let affected_rows = conn.affected_rows();

        Ok((rows.iter().map(Self::row_to_json).collect(), affected_rows))
    }

    fn row_to_json(row: &MySqlRow) -> Row {
        let mut row_obj = Row::new();
        for (idx, column) in row.columns_ref().iter().enumerate() {
            let value = match row.as_ref(idx) {
                Some(MySqlValue::Bytes(bytes)) => match std::str::from_utf8(bytes) {
                    Ok(text) => Self::text_value_to_json(column.column_type(), text),
                    Err(_) => Value::Null,
                },
                Some(mysql_val) => Self::mysql_value_to_json(mysql_val),
                None => Value::Null,
            };
            row_obj.insert(column.name_str().to_string(), value);
        }
        row_obj
    }

    /// The text protocol sends every cell as bytes; numeric and JSON columns
    /// are read back into their JSON form. DECIMAL stays a string.
    fn text_value_to_json(column_type: ColumnType, text: &str) -> Value {
        match column_type {
            ColumnType::MYSQL_TYPE_TINY
            | ColumnType::MYSQL_TYPE_SHORT
            | ColumnType::MYSQL_TYPE_LONG
            | ColumnType::MYSQL_TYPE_INT24
            | ColumnType::MYSQL_TYPE_LONGLONG
            | ColumnType::MYSQL_TYPE_YEAR => {
                if let Ok(v) = text.parse::<i64>() {
                    json!(v)
                } else if let Ok(v) = text.parse::<u64>() {
                    json!(v)
                } else {
                    json!(text)
                }
            }
            ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE => text
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| json!(v))
                .unwrap_or_else(|| json!(text)),
            ColumnType::MYSQL_TYPE_JSON => {
                serde_json::from_str(text).unwrap_or_else(|_| json!(text))
            }
            _ => json!(text),
        }
    }

    fn mysql_value_to_json(mysql_val: &MySqlValue) -> Value {
        match mysql_val {
            MySqlValue::NULL => Value::Null,
            MySqlValue::Bytes(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => json!(s),
                Err(_) => Value::Null,
            },
            MySqlValue::Int(i) => json!(i),
            MySqlValue::UInt(u) => json!(u),
            MySqlValue::Float(f) => json!(f),
            MySqlValue::Double(d) => json!(d),
            MySqlValue::Date(y, m, d, h, min, s, _) => {
                json!(format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, m, d, h, min, s))
            }
            MySqlValue::Time(is_neg, d, h, m, s, _) => {
                let sign = if *is_neg { "-" } else { "" };
                let total_hours = d * 24 + *h as u32;
                json!(format!("{}{}:{:02}:{:02}", sign, total_hours, m, s))
            }
        }
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for MySQLAdapter {
    async fn test_connection(&self) -> Result<(), AppError> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| AppError::Connection("connection is closed".to_string()))?;
        conn.ping()
            .await
            .map_err(|e| AppError::Connection(format!("{} ping failed: {}", self.dialect, e)))
    }

    async fn query(&self, sql: &str) -> Result<RawResult, AppError> {
        let start_time = Instant::now();
        let (rows, affected_rows) = self.run(sql).await?;
        Ok(RawResult::with_metadata(
            rows,
            Some(affected_rows),
            start_time.elapsed().as_millis() as u64,
        ))
    }

    async fn show_all_schemas(&self) -> Result<RawResult, AppError> {
        let (rows, _) = self.run("SHOW TABLES").await?;
        Ok(RawResult::Rows(rows))
    }

    async fn close(&self) {
        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn {
            if let Err(e) = conn.disconnect().await {
                tracing::warn!("Failed to disconnect from {}: {}", self.dialect, e);
            }
        }
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mysql_value_to_json() {
        assert_eq!(MySQLAdapter::mysql_value_to_json(&MySqlValue::NULL), Value::Null);
        assert_eq!(
            MySQLAdapter::mysql_value_to_json(&MySqlValue::Bytes(b"users".to_vec())),
            json!("users")
        );
        assert_eq!(MySQLAdapter::mysql_value_to_json(&MySqlValue::Int(-3)), json!(-3));
        assert_eq!(
            MySQLAdapter::mysql_value_to_json(&MySqlValue::Date(2024, 1, 2, 3, 4, 5, 0)),
            json!("2024-01-02 03:04:05")
        );
        assert_eq!(
            MySQLAdapter::mysql_value_to_json(&MySqlValue::Time(true, 1, 2, 3, 4, 0)),
            json!("-26:03:04")
        );
    }

    #[test]
    fn test_text_protocol_values_follow_column_type() {
        let to_json = MySQLAdapter::text_value_to_json;
        assert_eq!(to_json(ColumnType::MYSQL_TYPE_LONG, "42"), json!(42));
        assert_eq!(to_json(ColumnType::MYSQL_TYPE_TINY, "-1"), json!(-1));
        assert_eq!(
            to_json(ColumnType::MYSQL_TYPE_LONGLONG, "18446744073709551615"),
            json!(18446744073709551615u64)
        );
        assert_eq!(to_json(ColumnType::MYSQL_TYPE_DOUBLE, "2.5"), json!(2.5));
        assert_eq!(
            to_json(ColumnType::MYSQL_TYPE_JSON, r#"{"tags":["a"]}"#),
            json!({"tags": ["a"]})
        );
        assert_eq!(to_json(ColumnType::MYSQL_TYPE_NEWDECIMAL, "12.50"), json!("12.50"));
        assert_eq!(to_json(ColumnType::MYSQL_TYPE_VAR_STRING, "42"), json!("42"));
    }
}
