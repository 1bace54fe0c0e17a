// MS-SQL adapter over a single tiberius client
use crate::api::middleware::AppError;
use crate::models::{Credentials, Dialect, RawResult, Row};
use crate::services::database::adapter::DatabaseAdapter;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{json, Value};
use std::time::Instant;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, FromSql};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

const SHOW_ALL_SCHEMAS: &str = "SELECT TABLE_NAME, TABLE_SCHEMA FROM INFORMATION_SCHEMA.TABLES \
     WHERE TABLE_TYPE = 'BASE TABLE' AND TABLE_SCHEMA = SCHEMA_NAME() \
     ORDER BY TABLE_NAME";

type MssqlClient = Client<Compat<TcpStream>>;

pub struct MssqlAdapter {
    client: Mutex<Option<MssqlClient>>,
}

impl MssqlAdapter {
    pub async fn connect(credentials: &Credentials) -> Result<Self, AppError> {
        let config = Self::to_tiberius_config(credentials);

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| AppError::Connection(format!("TCP connection failed: {}", e)))?;
        tcp.set_nodelay(true)
            .map_err(|e| AppError::Connection(format!("Failed to set TCP_NODELAY: {}", e)))?;

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| AppError::Connection(format!("Failed to connect to MS-SQL: {}", e)))?;

        Ok(Self {
            client: Mutex::new(Some(client)),
        })
    }

    fn to_tiberius_config(credentials: &Credentials) -> Config {
        let mut config = Config::new();
        config.host(credentials.host());
        config.port(credentials.port_for(Dialect::Mssql));
        if let Some(database) = credentials.database() {
            config.database(database);
        }
        config.authentication(AuthMethod::sql_server(
            credentials.username(),
            credentials.password(),
        ));
        config.trust_cert();
        config.encryption(EncryptionLevel::Off);
        config
    }

    async fn run(&self, sql: &str) -> Result<Vec<Row>, AppError> {
        let mut guard = self.client.lock().await;
        let client = guard
            .as_mut()
            .ok_or_else(|| AppError::query(sql, "connection is closed"))?;

        let stream = client
            .simple_query(sql)
            .await
            .map_err(|e| AppError::query(sql, e))?;
        let rows = stream
            .into_first_result()
            .await
            .map_err(|e| AppError::query(sql, e))?;

        Ok(rows.into_iter().map(Self::row_to_json).collect())
    }

    fn row_to_json(row: tiberius::Row) -> Row {
        let names: Vec<String> = row
            .columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect();

        names
            .into_iter()
            .zip(row)
            .map(|(name, data)| (name, Self::column_data_to_json(&data)))
            .collect()
    }

    fn column_data_to_json(data: &ColumnData<'static>) -> Value {
        fn chrono_value<'a, T: FromSql<'a>>(data: &'a ColumnData<'static>, render: impl Fn(T) -> String) -> Value {
            T::from_sql(data)
                .ok()
                .flatten()
                .map(|v| Value::String(render(v)))
                .unwrap_or(Value::Null)
        }

        match data {
            ColumnData::U8(v) => json!(v),
            ColumnData::I16(v) => json!(v),
            ColumnData::I32(v) => json!(v),
            ColumnData::I64(v) => json!(v),
            ColumnData::F32(v) => json!(v),
            ColumnData::F64(v) => json!(v),
            ColumnData::Bit(v) => json!(v),
            ColumnData::String(v) => json!(v.as_deref()),
            ColumnData::Guid(v) => json!(v.as_ref().map(|u| u.to_string())),
            ColumnData::Numeric(v) => json!(v.as_ref().map(|n| f64::from(*n))),
            ColumnData::Binary(v) => v
                .as_deref()
                .and_then(|b| std::str::from_utf8(b).ok())
                .map(|s| json!(s))
                .unwrap_or(Value::Null),
            ColumnData::Xml(v) => json!(v.as_ref().map(|x| x.clone().into_owned().into_string())),
            ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
                chrono_value(data, |v: NaiveDateTime| v.to_string())
            }
            ColumnData::Date(_) => chrono_value(data, |v: NaiveDate| v.to_string()),
            ColumnData::Time(_) => chrono_value(data, |v: NaiveTime| v.to_string()),
            ColumnData::DateTimeOffset(_) => chrono_value(data, |v: DateTime<Utc>| v.to_rfc3339()),
        }
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for MssqlAdapter {
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
        let client = self.client.lock().await.take();
        if let Some(client) = client {
            if let Err(e) = client.close().await {
                tracing::warn!("Failed to close MS-SQL connection: {}", e);
            }
        }
    }

    fn dialect(&self) -> Dialect {
        Dialect::Mssql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn test_column_data_to_json() {
        assert_eq!(MssqlAdapter::column_data_to_json(&ColumnData::I32(Some(7))), json!(7));
        assert_eq!(MssqlAdapter::column_data_to_json(&ColumnData::I32(None)), Value::Null);
        assert_eq!(MssqlAdapter::column_data_to_json(&ColumnData::Bit(Some(true))), json!(true));
        assert_eq!(
            MssqlAdapter::column_data_to_json(&ColumnData::String(Some(Cow::Borrowed("master")))),
            json!("master")
        );
    }

    #[test]
    fn test_config_uses_default_port() {
        let credentials = Credentials {
            engine: "mssql".to_string(),
            database: Some("master".to_string()),
            username: Some("sa".to_string()),
            password: Some("password".to_string()),
            host: Some("localhost".to_string()),
            port: None,
            database_path: None,
        };
        let config = MssqlAdapter::to_tiberius_config(&credentials);
        assert_eq!(config.get_addr(), "localhost:1433");
    }

    #[test]
    fn test_table_listing_is_limited_to_default_schema() {
        assert!(SHOW_ALL_SCHEMAS.contains("TABLE_SCHEMA = SCHEMA_NAME()"));
        assert!(SHOW_ALL_SCHEMAS.contains("TABLE_TYPE = 'BASE TABLE'"));
    }
}
