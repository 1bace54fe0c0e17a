use axum::{
    extract::State,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::api::middleware::AppError;
use crate::models::{Credentials, Event, QueryRequest, SessionInfo, Table};
use crate::services::QueryGateway;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<QueryGateway>,
    /// Every event emitted by any call, for `/api/events` subscribers.
    pub events: broadcast::Sender<Event>,
}

impl AppState {
    pub fn new(gateway: QueryGateway, event_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            gateway: Arc::new(gateway),
            events,
        }
    }

    /// Sink for one request: events go to the response and to the broadcast.
    fn request_sink(&self) -> (RequestSink, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        ((tx, self.events.clone()), rx)
    }
}

type RequestSink = (mpsc::UnboundedSender<Event>, broadcast::Sender<Event>);

fn collect(sink: RequestSink, mut rx: mpsc::UnboundedReceiver<Event>) -> Json<Vec<Event>> {
    drop(sink);
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    Json(events)
}

fn require_query(payload: &QueryRequest) -> Result<&str, AppError> {
    let sql = payload.query.trim();
    if sql.is_empty() {
        return Err(AppError::Validation("SQL query cannot be empty".to_string()));
    }
    Ok(sql)
}

/// Authenticate and replace the current session
pub async fn login(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<SessionInfo>, AppError> {
    tracing::info!("Login requested for engine: {}", credentials.engine);
    let info = state.gateway.login(&credentials).await?;
    Ok(Json(info))
}

pub async fn status(State(state): State<AppState>) -> Json<SessionInfo> {
    Json(state.gateway.status().await)
}

pub async fn show_databases(State(state): State<AppState>) -> Result<Json<Vec<Event>>, AppError> {
    let (sink, rx) = state.request_sink();
    state.gateway.show_databases(&sink).await?;
    Ok(collect(sink, rx))
}

/// List tables and preview each of them
pub async fn show_tables(State(state): State<AppState>) -> Result<Json<Vec<Event>>, AppError> {
    let (sink, rx) = state.request_sink();
    if let Some(batch) = state.gateway.show_tables(&sink).await? {
        tracing::info!(
            "Previewed {} tables ({} failed)",
            batch.tables.len(),
            batch.failures()
        );
    }
    Ok(collect(sink, rx))
}

pub async fn send_query(
    State(state): State<AppState>,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<Vec<Event>>, AppError> {
    let sql = require_query(&payload)?;
    let (sink, rx) = state.request_sink();
    state.gateway.send_query(&sink, sql).await?;
    Ok(collect(sink, rx))
}

/// Query on behalf of an external requester; the parsed table is the response
/// body and the raw rows go out on the event stream.
pub async fn server_query(
    State(state): State<AppState>,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<Table>, AppError> {
    let sql = require_query(&payload)?;
    let table = state.gateway.receive_server_query(&state.events, sql).await?;
    Ok(Json(table))
}

pub async fn disconnect(State(state): State<AppState>) -> Json<Vec<Event>> {
    let (sink, rx) = state.request_sink();
    state.gateway.disconnect(&sink).await;
    collect(sink, rx)
}

/// Server-sent stream of every event emitted from now on
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = state.events.subscribe();

    let stream = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let frame = SseEvent::default()
                        .event(event.kind())
                        .data(event.to_json().to_string());
                    return Some((Ok(frame), receiver));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event subscriber lagged; {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
