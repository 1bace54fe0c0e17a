// Database abstraction layer: one adapter per engine
pub mod adapter;
pub mod mssql;
pub mod mysql;
pub mod postgresql;
pub mod sqlite;

#[cfg(test)]
pub mod scripted;

pub use adapter::{Connector, DatabaseAdapter};
pub use mssql::MssqlAdapter;
pub use mysql::MySQLAdapter;
pub use postgresql::PostgreSQLAdapter;
pub use sqlite::SqliteAdapter;

use crate::api::middleware::AppError;
use crate::models::{Credentials, Dialect};

/// Factory function to create the adapter for a dialect
pub async fn create_adapter(
    dialect: Dialect,
    credentials: &Credentials,
) -> Result<Box<dyn DatabaseAdapter>, AppError> {
    match dialect {
        Dialect::Postgres => Ok(Box::new(PostgreSQLAdapter::connect(credentials).await?)),
        Dialect::Mysql | Dialect::Mariadb => {
            Ok(Box::new(MySQLAdapter::connect(credentials, dialect).await?))
        }
        Dialect::Mssql => Ok(Box::new(MssqlAdapter::connect(credentials).await?)),
        Dialect::Sqlite => Ok(Box::new(SqliteAdapter::connect(credentials).await?)),
    }
}

/// Production connector: validates credentials and opens a real driver connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverConnector;

#[async_trait::async_trait]
impl Connector for DriverConnector {
    async fn connect(&self, credentials: &Credentials) -> Result<Box<dyn DatabaseAdapter>, AppError> {
        let dialect = credentials.validate()?;
        tracing::info!("Connecting to {} database: {}", dialect, credentials.masked_url());
        create_adapter(dialect, credentials).await
    }
}
