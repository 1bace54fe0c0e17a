use crate::api::middleware::AppError;
use crate::models::{Dialect, Event, RawResult, Table};
use crate::services::resolver::{self, DiscoveryIntent};
use crate::services::session::ConnectionSession;
use crate::services::sink::Emitter;
use crate::validation::SqlValidator;

/// How a single table preview settled.
#[derive(Debug)]
pub enum PreviewOutcome {
    Loaded { nrows: usize },
    Empty,
    Failed(AppError),
}

impl PreviewOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, PreviewOutcome::Failed(_))
    }
}

/// Per-table results of one `show_tables` run.
///
/// Each member is reported the moment it settles; the batch itself is only
/// complete once every discovered table has an outcome.
#[derive(Debug, Default)]
pub struct PreviewBatch {
    pub tables: Vec<String>,
    pub outcomes: Vec<(String, PreviewOutcome)>,
}

impl PreviewBatch {
    fn new(tables: Vec<String>) -> Self {
        Self {
            outcomes: Vec::with_capacity(tables.len()),
            tables,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.outcomes.len() == self.tables.len()
    }

    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_failed()).count()
    }

    pub fn outcome(&self, table: &str) -> Option<&PreviewOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, outcome)| outcome)
    }
}

/// Discovery and query workflows over one session, reporting through an emitter.
pub struct IntrospectionPipeline<'a> {
    session: &'a ConnectionSession,
    emitter: Emitter<'a>,
    preview_limit: u64,
}

impl<'a> IntrospectionPipeline<'a> {
    pub fn new(session: &'a ConnectionSession, emitter: Emitter<'a>, preview_limit: u64) -> Self {
        Self {
            session,
            emitter,
            preview_limit,
        }
    }

    fn dialect(&self) -> Result<Dialect, AppError> {
        self.session.dialect().ok_or(AppError::NotConnected)
    }

    /// Emit the database names. `DatabaseList` also clears the consumer's table list.
    pub async fn list_databases(&self) -> Result<Vec<String>, AppError> {
        let spec = resolver::resolve(DiscoveryIntent::ListDatabases, self.dialect()?)?;
        let names = self.session.run(spec).await?.names();

        self.emitter.emit(Event::DatabaseList {
            names: names.clone(),
        });
        Ok(names)
    }

    pub async fn list_tables(&self) -> Result<Vec<String>, AppError> {
        let spec = resolver::resolve(DiscoveryIntent::ListTables, self.dialect()?)?;
        let names = self.session.run(spec).await?.names();

        self.emitter.emit(Event::TableList {
            names: names.clone(),
        });
        Ok(names)
    }

    /// Fetch and emit the first rows of one table. Failures are reported
    /// against the table and never escape.
    pub async fn preview_table(&self, table: &str, dialect: Dialect) -> PreviewOutcome {
        match self.load_preview(table, dialect).await {
            Ok(Some(preview)) => {
                let nrows = preview.nrows;
                self.emit_preview(table, preview);
                PreviewOutcome::Loaded { nrows }
            }
            Ok(None) => {
                self.emitter
                    .log(format!("NOTE: table [{}] seems to be empty", table));
                self.emit_preview(table, Table::sentinel());
                PreviewOutcome::Empty
            }
            Err(e) => {
                self.emitter.table_error(table, &e);
                PreviewOutcome::Failed(e)
            }
        }
    }

    async fn load_preview(&self, table: &str, dialect: Dialect) -> Result<Option<Table>, AppError> {
        let sql = resolver::render_preview(table, dialect, self.preview_limit);
        self.run_preview(&sql, dialect).await
    }

    /// Log the statement, then check and run it.
    async fn run_preview(&self, sql: &str, dialect: Dialect) -> Result<Option<Table>, AppError> {
        self.emitter.log(sql);
        SqlValidator::validate_single_select(sql, dialect)?;

        let result = self.session.query(sql).await?;
        if result.is_empty() {
            return Ok(None);
        }
        Ok(Some(Table::from_rows(result.first_positional())))
    }

    fn emit_preview(&self, table: &str, preview: Table) {
        self.emitter.emit(Event::TablePreview {
            table_name: table.to_string(),
            table: preview,
        });
    }

    /// Preview each table in turn; a failing table does not stop the rest.
    pub async fn preview_tables(&self, tables: Vec<String>) -> Result<PreviewBatch, AppError> {
        let dialect = self.dialect()?;
        let mut batch = PreviewBatch::new(tables);

        for table in batch.tables.clone() {
            let outcome = self.preview_table(&table, dialect).await;
            batch.outcomes.push((table, outcome));
        }

        tracing::debug!(
            "Preview batch settled: {} tables, {} failed",
            batch.tables.len(),
            batch.failures()
        );
        Ok(batch)
    }

    /// List tables, then preview each. A failed listing stops before any preview.
    pub async fn show_tables(&self) -> Result<PreviewBatch, AppError> {
        let tables = self.list_tables().await?;
        self.preview_tables(tables).await
    }

    /// Run user SQL as-is and emit the raw driver result.
    pub async fn send_query(&self, sql: &str) -> Result<RawResult, AppError> {
        self.emitter.log(sql);
        let rows = self.session.query(sql).await?;

        self.emitter.emit(Event::QueryResult { rows: rows.clone() });
        Ok(rows)
    }

    /// Run SQL for an external requester: the parsed table goes back to the
    /// caller, the raw result to the application sink.
    pub async fn server_query(&self, sql: &str) -> Result<Table, AppError> {
        let rows = self.session.query(sql).await?;
        let table = Table::from_rows(rows.first_positional());

        self.emitter.emit(Event::QueryResult { rows });
        Ok(table)
    }
}
