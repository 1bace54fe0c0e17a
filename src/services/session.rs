use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::api::middleware::AppError;
use crate::models::{Dialect, RawResult, SessionInfo, SessionStatus};
use crate::services::database::DatabaseAdapter;
use crate::services::resolver::{NativeCall, QuerySpec};

/// The single authenticated connection a gateway owns.
///
/// `unauthenticated -> connected -> closed`; queries are only accepted while connected.
pub struct ConnectionSession {
    adapter: Option<Box<dyn DatabaseAdapter>>,
    status: SessionStatus,
    dialect: Option<Dialect>,
    id: Option<Uuid>,
    connected_at: Option<DateTime<Utc>>,
    close_timeout: Duration,
}

impl ConnectionSession {
    pub fn unauthenticated(close_timeout: Duration) -> Self {
        Self {
            adapter: None,
            status: SessionStatus::Unauthenticated,
            dialect: None,
            id: None,
            connected_at: None,
            close_timeout,
        }
    }

    /// Run the liveness check on a freshly built adapter and wrap it in a session.
    /// A failed check releases the adapter before returning.
    pub async fn authenticate(
        adapter: Box<dyn DatabaseAdapter>,
        close_timeout: Duration,
    ) -> Result<Self, AppError> {
        if let Err(e) = adapter.test_connection().await {
            release(adapter, close_timeout).await;
            return Err(match e {
                AppError::Connection(_) => e,
                other => AppError::Connection(other.to_string()),
            });
        }

        let id = Uuid::new_v4();
        let dialect = adapter.dialect();
        tracing::info!("Session {} connected to {}", id, dialect);

        Ok(Self {
            adapter: Some(adapter),
            status: SessionStatus::Connected,
            dialect: Some(dialect),
            id: Some(id),
            connected_at: Some(Utc::now()),
            close_timeout,
        })
    }

    fn connected_adapter(&self, sql: &str) -> Result<&dyn DatabaseAdapter, AppError> {
        match (&self.status, &self.adapter) {
            (SessionStatus::Connected, Some(adapter)) => Ok(adapter.as_ref()),
            _ => Err(AppError::query(sql, "connection is not open")),
        }
    }

    pub async fn query(&self, sql: &str) -> Result<RawResult, AppError> {
        self.connected_adapter(sql)?.query(sql).await
    }

    /// Execute a resolved discovery query, literal or driver-native.
    pub async fn run(&self, spec: QuerySpec) -> Result<RawResult, AppError> {
        match spec {
            QuerySpec::Literal(sql) => self.query(sql).await,
            QuerySpec::DriverNative(NativeCall::ShowAllSchemas) => {
                self.connected_adapter("<show all schemas>")?
                    .show_all_schemas()
                    .await
            }
        }
    }

    /// Release the connection. A no-op unless connected.
    pub async fn close(&mut self) {
        if self.status != SessionStatus::Connected {
            return;
        }
        if let Some(adapter) = self.adapter.take() {
            release(adapter, self.close_timeout).await;
        }
        self.status = SessionStatus::Closed;
        if let Some(id) = self.id {
            tracing::info!("Session {} closed", id);
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn dialect(&self) -> Option<Dialect> {
        match self.status {
            SessionStatus::Connected => self.dialect,
            _ => None,
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            status: self.status,
            dialect: self.dialect,
            session_id: self.id.map(|id| id.to_string()),
            connected_at: self.connected_at,
        }
    }
}

/// Close an adapter without waiting forever on a driver that never acknowledges.
async fn release(adapter: Box<dyn DatabaseAdapter>, close_timeout: Duration) {
    let dialect = adapter.dialect();
    if tokio::time::timeout(close_timeout, adapter.close()).await.is_err() {
        tracing::warn!(
            "{} driver did not confirm close within {:?}; dropping connection",
            dialect,
            close_timeout
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::database::scripted::{rows, ScriptedAdapter};
    use crate::services::database::SqliteAdapter;
    use crate::models::Credentials;

    const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

    /// Adapter whose close never completes.
    struct HangingClose;

    #[async_trait::async_trait]
    impl DatabaseAdapter for HangingClose {
        async fn test_connection(&self) -> Result<(), AppError> {
            Ok(())
        }
        async fn query(&self, sql: &str) -> Result<RawResult, AppError> {
            Err(AppError::query(sql, "unused"))
        }
        async fn show_all_schemas(&self) -> Result<RawResult, AppError> {
            Ok(RawResult::Rows(Vec::new()))
        }
        async fn close(&self) {
            futures::future::pending::<()>().await
        }
        fn dialect(&self) -> Dialect {
            Dialect::Mysql
        }
    }

    #[tokio::test]
    async fn test_authenticate_and_query() {
        let adapter = ScriptedAdapter::new(Dialect::Mysql).respond("SELECT 1", rows("1", &["1"]));
        let session = tokio_test::assert_ok!(
            ConnectionSession::authenticate(Box::new(adapter), CLOSE_TIMEOUT).await
        );

        assert_eq!(session.status(), SessionStatus::Connected);
        assert_eq!(session.dialect(), Some(Dialect::Mysql));
        assert!(session.info().session_id.is_some());
        let result = tokio_test::assert_ok!(session.query("SELECT 1").await);
        assert_eq!(result.names(), vec!["1"]);
    }

    #[tokio::test]
    async fn test_failed_liveness_check_releases_adapter() {
        let adapter = ScriptedAdapter::new(Dialect::Postgres).unreachable();
        let tracker = adapter.tracker();

        let err = ConnectionSession::authenticate(Box::new(adapter), CLOSE_TIMEOUT)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Connection(msg) if msg.contains("ENOTFOUND")));
        assert_eq!(tracker.closes(), 1);
    }

    #[tokio::test]
    async fn test_query_requires_connected_session() {
        let session = ConnectionSession::unauthenticated(CLOSE_TIMEOUT);
        let err = session.query("SELECT 1").await.unwrap_err();
        assert!(matches!(err, AppError::Query { ref sql, .. } if sql == "SELECT 1"));
        assert_eq!(session.dialect(), None);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let adapter = ScriptedAdapter::new(Dialect::Sqlite);
        let tracker = adapter.tracker();
        let mut session = ConnectionSession::authenticate(Box::new(adapter), CLOSE_TIMEOUT)
            .await
            .unwrap();

        session.close().await;
        session.close().await;

        assert_eq!(session.status(), SessionStatus::Closed);
        assert_eq!(tracker.closes(), 1);
        assert!(session.query("SELECT 1").await.is_err());

        let mut never_opened = ConnectionSession::unauthenticated(CLOSE_TIMEOUT);
        never_opened.close().await;
        assert_eq!(never_opened.status(), SessionStatus::Unauthenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_does_not_wait_for_silent_driver() {
        let mut session = ConnectionSession::authenticate(Box::new(HangingClose), CLOSE_TIMEOUT)
            .await
            .unwrap();
        session.close().await;
        assert_eq!(session.status(), SessionStatus::Closed);
    }

    #[tokio::test]
    async fn test_driver_native_call_on_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("app.db");
        rusqlite::Connection::open(&db_path)
            .unwrap()
            .execute_batch("CREATE TABLE events (id INTEGER)")
            .unwrap();

        let credentials = Credentials {
            engine: "sqlite".to_string(),
            database: None,
            username: None,
            password: None,
            host: None,
            port: None,
            database_path: Some(db_path.to_string_lossy().to_string()),
        };
        let adapter = SqliteAdapter::connect(&credentials).await.unwrap();
        let session = ConnectionSession::authenticate(Box::new(adapter), CLOSE_TIMEOUT)
            .await
            .unwrap();

        let result = session
            .run(QuerySpec::DriverNative(NativeCall::ShowAllSchemas))
            .await
            .unwrap();
        assert_eq!(result.names(), vec!["events"]);
    }
}
