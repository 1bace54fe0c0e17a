// Database adapter trait for multi-engine support
use crate::api::middleware::AppError;
use crate::models::{Credentials, Dialect, RawResult};

/// Database adapter trait - one open connection to one engine
#[async_trait::async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Liveness check against the target engine
    async fn test_connection(&self) -> Result<(), AppError>;

    /// Execute a single statement. No retries.
    async fn query(&self, sql: &str) -> Result<RawResult, AppError>;

    /// Driver-native table listing ("show all schemas")
    async fn show_all_schemas(&self) -> Result<RawResult, AppError>;

    /// Release the connection. Calling it again is a no-op.
    async fn close(&self);

    fn dialect(&self) -> Dialect;
}

/// Builds an adapter from login credentials.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, credentials: &Credentials) -> Result<Box<dyn DatabaseAdapter>, AppError>;
}
