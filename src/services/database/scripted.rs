// In-memory adapter answering from a fixed script, for pipeline and gateway tests
use crate::api::middleware::AppError;
use crate::models::{Credentials, Dialect, RawResult, Row};
use crate::services::database::adapter::{Connector, DatabaseAdapter};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn rows(column: &str, values: &[&str]) -> Vec<Row> {
    values
        .iter()
        .map(|v| {
            let mut row = Row::new();
            row.insert(column.to_string(), Value::String(v.to_string()));
            row
        })
        .collect()
}

pub fn record(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Observable side of a scripted adapter, shared with the test.
#[derive(Default)]
pub struct Tracker {
    pub executed: Mutex<Vec<String>>,
    pub closes: AtomicUsize,
}

impl Tracker {
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub struct ScriptedAdapter {
    dialect: Dialect,
    responses: HashMap<String, Result<Vec<Row>, String>>,
    schemas: Result<Vec<Row>, String>,
    alive: bool,
    closed: AtomicBool,
    tracker: Arc<Tracker>,
}

impl ScriptedAdapter {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            responses: HashMap::new(),
            schemas: Ok(Vec::new()),
            alive: true,
            closed: AtomicBool::new(false),
            tracker: Arc::new(Tracker::default()),
        }
    }

    pub fn respond(mut self, sql: &str, rows: Vec<Row>) -> Self {
        self.responses.insert(sql.to_string(), Ok(rows));
        self
    }

    pub fn fail(mut self, sql: &str, message: &str) -> Self {
        self.responses.insert(sql.to_string(), Err(message.to_string()));
        self
    }

    pub fn schemas(mut self, rows: Vec<Row>) -> Self {
        self.schemas = Ok(rows);
        self
    }

    pub fn schemas_fail(mut self, message: &str) -> Self {
        self.schemas = Err(message.to_string());
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.alive = false;
        self
    }

    pub fn tracker(&self) -> Arc<Tracker> {
        self.tracker.clone()
    }

    fn check_open(&self, sql: &str) -> Result<(), AppError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AppError::query(sql, "connection is closed"));
        }
        self.tracker.executed.lock().unwrap().push(sql.to_string());
        Ok(())
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for ScriptedAdapter {
    async fn test_connection(&self) -> Result<(), AppError> {
        if self.alive {
            Ok(())
        } else {
            Err(AppError::Connection("getaddrinfo ENOTFOUND db.invalid".to_string()))
        }
    }

    async fn query(&self, sql: &str) -> Result<RawResult, AppError> {
        self.check_open(sql)?;
        match self.responses.get(sql) {
            Some(Ok(rows)) => Ok(RawResult::with_metadata(rows.clone(), None, 1)),
            Some(Err(message)) => Err(AppError::query(sql, message)),
            None => Err(AppError::query(sql, format!("no such table in script: {}", sql))),
        }
    }

    async fn show_all_schemas(&self) -> Result<RawResult, AppError> {
        self.check_open("<show all schemas>")?;
        match &self.schemas {
            Ok(rows) => Ok(RawResult::Rows(rows.clone())),
            Err(message) => Err(AppError::query("<show all schemas>", message)),
        }
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.tracker.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }
}

/// Hands out queued adapters in login order.
#[derive(Default)]
pub struct ScriptedConnector {
    adapters: Mutex<Vec<ScriptedAdapter>>,
}

impl ScriptedConnector {
    pub fn new(adapters: Vec<ScriptedAdapter>) -> Self {
        Self {
            adapters: Mutex::new(adapters),
        }
    }
}

#[async_trait::async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, credentials: &Credentials) -> Result<Box<dyn DatabaseAdapter>, AppError> {
        credentials.validate()?;
        let mut adapters = self.adapters.lock().unwrap();
        if adapters.is_empty() {
            return Err(AppError::Connection("no scripted adapter left".to_string()));
        }
        Ok(Box::new(adapters.remove(0)))
    }
}

pub fn credentials(engine: &str) -> Credentials {
    Credentials {
        engine: engine.to_string(),
        database: Some("shop".to_string()),
        username: Some("admin".to_string()),
        password: Some("secret".to_string()),
        host: Some("db.local".to_string()),
        port: None,
        database_path: Some("/tmp/shop.db".to_string()),
    }
}
