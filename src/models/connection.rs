use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::api::middleware::AppError;

/// Relational engines the gateway can open a session against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Mysql,
    Mariadb,
    Postgres,
    Mssql,
    Sqlite,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Mysql => "mysql",
            Dialect::Mariadb => "mariadb",
            Dialect::Postgres => "postgres",
            Dialect::Mssql => "mssql",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Port used when the credentials leave it out. File-based engines have none.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Dialect::Mysql | Dialect::Mariadb => Some(3306),
            Dialect::Postgres => Some(5432),
            Dialect::Mssql => Some(1433),
            Dialect::Sqlite => None,
        }
    }

    pub fn is_file_based(&self) -> bool {
        matches!(self, Dialect::Sqlite)
    }
}

impl FromStr for Dialect {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mysql" => Ok(Dialect::Mysql),
            "mariadb" => Ok(Dialect::Mariadb),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mssql" | "sqlserver" => Ok(Dialect::Mssql),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            _ => Err(AppError::Connection(format!(
                "Unsupported database engine: {}. Supported engines: mysql, mariadb, postgres, mssql, sqlite",
                s
            ))),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Login input. Only used to build a session and never stored afterwards.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub engine: String,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default, alias = "portNumber")]
    pub port: Option<u16>,
    #[serde(default)]
    pub database_path: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("engine", &self.engine)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_path", &self.database_path)
            .finish()
    }
}

impl Credentials {
    /// Resolve the engine and check that the fields it needs are present.
    pub fn validate(&self) -> Result<Dialect, AppError> {
        if self.engine.trim().is_empty() {
            return Err(AppError::Validation("engine is required".to_string()));
        }
        let dialect: Dialect = self.engine.parse()?;

        if dialect.is_file_based() {
            if non_empty(&self.database_path).is_none() {
                return Err(AppError::Validation(format!(
                    "databasePath is required for {}",
                    dialect
                )));
            }
        } else {
            if non_empty(&self.host).is_none() {
                return Err(AppError::Validation(format!("host is required for {}", dialect)));
            }
            if non_empty(&self.username).is_none() {
                return Err(AppError::Validation(format!(
                    "username is required for {}",
                    dialect
                )));
            }
        }

        Ok(dialect)
    }

    pub fn host(&self) -> &str {
        non_empty(&self.host).unwrap_or("localhost")
    }

    pub fn port_for(&self, dialect: Dialect) -> u16 {
        self.port.or(dialect.default_port()).unwrap_or_default()
    }

    pub fn username(&self) -> &str {
        non_empty(&self.username).unwrap_or_default()
    }

    pub fn password(&self) -> &str {
        self.password.as_deref().unwrap_or_default()
    }

    pub fn database(&self) -> Option<&str> {
        non_empty(&self.database)
    }

    pub fn database_path(&self) -> Option<&str> {
        non_empty(&self.database_path)
    }

    /// Connection target with the password masked, for log lines.
    pub fn masked_url(&self) -> String {
        let dialect = match self.engine.parse::<Dialect>() {
            Ok(dialect) => dialect,
            Err(_) => return format!("{}://[unsupported]", self.engine),
        };

        if dialect.is_file_based() {
            return format!("{}://{}", dialect, self.database_path().unwrap_or_default());
        }

        let raw = format!("{}://{}:{}", dialect, self.host(), self.port_for(dialect));
        match Url::parse(&raw) {
            Ok(mut url) => {
                let _ = url.set_username(self.username());
                if self.password.is_some() {
                    let _ = url.set_password(Some("***"));
                }
                url.set_path(self.database().unwrap_or_default());
                url.to_string()
            }
            Err(_) => "[invalid-url]".to_string(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Lifecycle of the single session a gateway owns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Unauthenticated,
    Connected,
    Closed,
}

/// Snapshot of the gateway's session, as reported by `/api/status`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub status: SessionStatus,
    pub dialect: Option<Dialect>,
    pub session_id: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
}
