use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::api::middleware::AppError;
use crate::config::GatewayConfig;
use crate::models::{Credentials, Event, SessionInfo, Table};
use crate::services::database::Connector;
use crate::services::pipeline::{IntrospectionPipeline, PreviewBatch};
use crate::services::session::ConnectionSession;
use crate::services::sink::{Emitter, EventSink};

#[derive(Debug, Clone, Copy)]
pub struct GatewaySettings {
    pub preview_limit: u64,
    pub close_timeout: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            preview_limit: 5,
            close_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&GatewayConfig> for GatewaySettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            preview_limit: config.preview_limit,
            close_timeout: Duration::from_secs(config.close_timeout_secs),
        }
    }
}

/// Entry point for consumers: one session at a time, results and failures
/// delivered as events.
///
/// Only `login` and dialect-resolution failures come back as `Err`; every other
/// failure is turned into an `Error` event on the caller's sink.
pub struct QueryGateway {
    connector: Arc<dyn Connector>,
    session: Mutex<ConnectionSession>,
    settings: GatewaySettings,
}

impl QueryGateway {
    pub fn new(connector: Arc<dyn Connector>, settings: GatewaySettings) -> Self {
        Self {
            connector,
            session: Mutex::new(ConnectionSession::unauthenticated(settings.close_timeout)),
            settings,
        }
    }

    /// Open a session for `credentials`, replacing the current one.
    ///
    /// The previous session stays usable if the new login fails.
    pub async fn login(&self, credentials: &Credentials) -> Result<SessionInfo, AppError> {
        let adapter = self.connector.connect(credentials).await?;
        let fresh = ConnectionSession::authenticate(adapter, self.settings.close_timeout).await?;

        let mut session = self.session.lock().await;
        session.close().await;
        *session = fresh;
        Ok(session.info())
    }

    pub async fn show_databases(&self, sink: &dyn EventSink) -> Result<(), AppError> {
        let emitter = Emitter::new(sink);
        let session = self.session.lock().await;
        let pipeline = IntrospectionPipeline::new(&session, emitter, self.settings.preview_limit);

        report(emitter, pipeline.list_databases().await)?;
        Ok(())
    }

    /// List tables, then preview each. Returns the settled batch, or `None`
    /// when the listing itself failed and was reported.
    pub async fn show_tables(&self, sink: &dyn EventSink) -> Result<Option<PreviewBatch>, AppError> {
        let emitter = Emitter::new(sink);
        let session = self.session.lock().await;
        let pipeline = IntrospectionPipeline::new(&session, emitter, self.settings.preview_limit);

        report(emitter, pipeline.show_tables().await)
    }

    pub async fn send_query(&self, sink: &dyn EventSink, sql: &str) -> Result<(), AppError> {
        let emitter = Emitter::new(sink);
        let session = self.session.lock().await;
        let pipeline = IntrospectionPipeline::new(&session, emitter, self.settings.preview_limit);

        report(emitter, pipeline.send_query(sql).await)?;
        Ok(())
    }

    /// Run a query for an external requester. The parsed table (or the failure)
    /// goes back to the requester; the application sink sees the raw rows or
    /// the error event.
    pub async fn receive_server_query(&self, app_sink: &dyn EventSink, sql: &str) -> Result<Table, AppError> {
        let emitter = Emitter::new(app_sink);
        let session = self.session.lock().await;
        let pipeline = IntrospectionPipeline::new(&session, emitter, self.settings.preview_limit);

        pipeline.server_query(sql).await.inspect_err(|e| emitter.error(e))
    }

    /// Close the session and tell the consumer to drop everything it shows.
    /// A no-op when no session is open.
    pub async fn disconnect(&self, sink: &dyn EventSink) {
        let mut session = self.session.lock().await;
        if session.dialect().is_none() {
            tracing::debug!("Disconnect requested with no open session");
            return;
        }
        session.close().await;
        Emitter::new(sink).emit(Event::Disconnected);
    }

    pub async fn status(&self) -> SessionInfo {
        self.session.lock().await.info()
    }
}

/// Turn runtime failures into an `Error` event. Dialect-resolution failures are
/// a configuration defect and go back to the caller instead.
fn report<T>(emitter: Emitter<'_>, result: Result<T, AppError>) -> Result<Option<T>, AppError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e @ AppError::UnsupportedDialect { .. }) => Err(e),
        Err(e) => {
            emitter.error(&e);
            Ok(None)
        }
    }
}
