// PostgreSQL adapter over a single tokio-postgres client
use crate::api::middleware::AppError;
use crate::models::{Credentials, Dialect, RawResult, Row};
use crate::services::database::adapter::DatabaseAdapter;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_postgres::types::{FromSql, Kind, Type};
use tokio_postgres::{Client, NoTls, SimpleQueryMessage, SimpleQueryRow};
use uuid::Uuid;

const SHOW_ALL_SCHEMAS: &str = "SELECT schema_name FROM information_schema.schemata \
     WHERE schema_name NOT IN ('information_schema', 'pg_catalog', 'pg_toast') \
     ORDER BY schema_name";

pub struct PostgreSQLAdapter {
    client: Mutex<Option<Client>>,
    connection_task: Mutex<Option<JoinHandle<()>>>,
}

impl PostgreSQLAdapter {
    pub async fn connect(credentials: &Credentials) -> Result<Self, AppError> {
        let mut config = tokio_postgres::Config::new();
        config
            .host(credentials.host())
            .port(credentials.port_for(Dialect::Postgres))
            .user(credentials.username())
            .password(credentials.password())
            .connect_timeout(Duration::from_secs(10));
        if let Some(database) = credentials.database() {
            config.dbname(database);
        }

        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| AppError::Connection(format!("Failed to connect to PostgreSQL: {}", describe_error(&e))))?;

        // The connection object drives the socket; it finishes once the client is dropped.
        let connection_task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!("PostgreSQL connection ended with error: {}", e);
            }
        });

        Ok(Self {
            client: Mutex::new(Some(client)),
            connection_task: Mutex::new(Some(connection_task)),
        })
    }

    /// Cells are decoded from the binary protocol when every result column has
    /// a decoder below; otherwise the statement runs through the simple query
    /// protocol and each cell is read back from the server's text form.
    async fn run(&self, sql: &str) -> Result<Vec<Row>, AppError> {
        let guard = self.client.lock().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| AppError::query(sql, "connection is closed"))?;

        let statement = client
            .prepare(sql)
            .await
            .map_err(|e| AppError::query(sql, describe_error(&e)))?;

        if statement.columns().iter().all(|c| is_binary_decodable(c.type_())) {
            let rows = client
                .query(&statement, &[])
                .await
                .map_err(|e| AppError::query(sql, describe_error(&e)))?;
            return Ok(rows.iter().map(Self::row_to_json).collect());
        }

        let types: Vec<Type> = statement.columns().iter().map(|c| c.type_().clone()).collect();
        let messages = client
            .simple_query(sql)
            .await
            .map_err(|e| AppError::query(sql, describe_error(&e)))?;

        Ok(messages
            .iter()
            .filter_map(|message| match message {
                SimpleQueryMessage::Row(row) => Some(Self::text_row_to_json(row, &types)),
                _ => None,
            })
            .collect())
    }

    fn row_to_json(row: &tokio_postgres::Row) -> Row {
        row.columns()
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let value = match row.try_get::<_, PgValue>(idx) {
                    Ok(PgValue(value)) => value,
                    Err(e) => {
                        tracing::warn!(
                            "Failed to decode column {} ({}): {}",
                            column.name(),
                            column.type_(),
                            e
                        );
                        Value::Null
                    }
                };
                (column.name().to_string(), value)
            })
            .collect()
    }

    fn text_row_to_json(row: &SimpleQueryRow, types: &[Type]) -> Row {
        row.columns()
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let value = match (row.get(idx), types.get(idx)) {
                    (Some(text), Some(ty)) => decode_text(ty, text),
                    (Some(text), None) => json!(text),
                    (None, _) => Value::Null,
                };
                (column.name().to_string(), value)
            })
            .collect()
    }
}

type DecodeError = Box<dyn std::error::Error + Sync + Send>;

/// One cell decoded from the binary wire format.
struct PgValue(Value);

impl<'a> FromSql<'a> for PgValue {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        decode_binary(ty, raw).map(PgValue)
    }

    fn from_sql_null(_: &Type) -> Result<Self, DecodeError> {
        Ok(PgValue(Value::Null))
    }

    fn accepts(ty: &Type) -> bool {
        is_binary_decodable(ty)
    }
}

fn is_binary_decodable(ty: &Type) -> bool {
    match *ty {
        Type::INT2
        | Type::INT4
        | Type::INT8
        | Type::OID
        | Type::FLOAT4
        | Type::FLOAT8
        | Type::BOOL
        | Type::NUMERIC
        | Type::JSON
        | Type::JSONB
        | Type::UUID
        | Type::TIMESTAMP
        | Type::TIMESTAMPTZ
        | Type::DATE
        | Type::TIME
        | Type::BYTEA => true,
        // Enum labels travel as plain UTF-8
        _ => <String as FromSql>::accepts(ty) || matches!(ty.kind(), Kind::Enum(_)),
    }
}

fn decode_binary(ty: &Type, raw: &[u8]) -> Result<Value, DecodeError> {
    let value = match *ty {
        Type::INT2 => json!(i16::from_sql(ty, raw)?),
        Type::INT4 => json!(i32::from_sql(ty, raw)?),
        Type::INT8 => json!(i64::from_sql(ty, raw)?),
        Type::OID => json!(u32::from_sql(ty, raw)?),
        Type::FLOAT4 => json!(f32::from_sql(ty, raw)?),
        Type::FLOAT8 => json!(f64::from_sql(ty, raw)?),
        Type::BOOL => json!(bool::from_sql(ty, raw)?),
        // Rendered as text so no digits are lost
        Type::NUMERIC => json!(Decimal::from_sql(ty, raw)?.to_string()),
        Type::JSON | Type::JSONB => Value::from_sql(ty, raw)?,
        Type::UUID => json!(Uuid::from_sql(ty, raw)?.to_string()),
        Type::TIMESTAMP => json!(NaiveDateTime::from_sql(ty, raw)?.to_string()),
        Type::TIMESTAMPTZ => json!(DateTime::<Utc>::from_sql(ty, raw)?.to_rfc3339()),
        Type::DATE => json!(NaiveDate::from_sql(ty, raw)?.to_string()),
        Type::TIME => json!(NaiveTime::from_sql(ty, raw)?.to_string()),
        Type::BYTEA => match std::str::from_utf8(raw) {
            Ok(s) => json!(s),
            Err(_) => Value::Null,
        },
        _ => json!(std::str::from_utf8(raw)?),
    };
    Ok(value)
}

/// Interpret a cell from the simple query protocol using its column type.
fn decode_text(ty: &Type, text: &str) -> Value {
    match *ty {
        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => text
            .parse::<i64>()
            .map(|v| json!(v))
            .unwrap_or_else(|_| json!(text)),
        Type::FLOAT4 | Type::FLOAT8 => text
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| json!(v))
            .unwrap_or_else(|| json!(text)),
        Type::BOOL => match text {
            "t" => json!(true),
            "f" => json!(false),
            other => json!(other),
        },
        Type::JSON | Type::JSONB => serde_json::from_str(text).unwrap_or_else(|_| json!(text)),
        _ => json!(text),
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for PostgreSQLAdapter {
    async fn test_connection(&self) -> Result<(), AppError> {
        self.run("SELECT 1")
            .await
            .map(|_| ())
            .map_err(|e| AppError::Connection(e.to_string()))
    }

    async fn query(&self, sql: &str) -> Result<RawResult, AppError> {
        let start_time = Instant::now();
        let rows = self.run(sql).await?;
        Ok(RawResult::with_metadata(
            rows,
            None,
            start_time.elapsed().as_millis() as u64,
        ))
    }

    async fn show_all_schemas(&self) -> Result<RawResult, AppError> {
        Ok(RawResult::Rows(self.run(SHOW_ALL_SCHEMAS).await?))
    }

    async fn close(&self) {
        // Dropping the client ends the connection task
        if self.client.lock().await.take().is_none() {
            return;
        }
        if let Some(task) = self.connection_task.lock().await.take() {
            if let Err(e) = task.await {
                tracing::warn!("PostgreSQL connection task failed: {}", e);
            }
        }
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }
}

fn describe_error(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db_error) => format!(
            "Code: {}, Message: {}",
            db_error.code().code(),
            db_error.message()
        ),
        None => e.to_string(),
    }
}
