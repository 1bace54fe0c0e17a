use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad credentials, unreachable host or a failed liveness check.
    #[error("Connection error: {0}")]
    Connection(String),

    /// No introspection query is known for this dialect. Thrown to the caller,
    /// never converted into an error event.
    #[error("Unsupported dialect '{dialect}' for {operation}")]
    UnsupportedDialect { dialect: String, operation: String },

    #[error("Query failed: {message}")]
    Query { sql: String, message: String },

    #[error("No active connection")]
    NotConnected,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn query(sql: impl Into<String>, message: impl ToString) -> Self {
        AppError::Query {
            sql: sql.into(),
            message: message.to_string(),
        }
    }

    /// Stable machine-readable code, shared by HTTP responses and error events.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Connection(_) => "CONNECTION_ERROR",
            AppError::UnsupportedDialect { .. } => "UNSUPPORTED_DIALECT",
            AppError::Query { .. } => "QUERY_ERROR",
            AppError::NotConnected => "NOT_CONNECTED",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// The SQL text involved in the failure, if any.
    pub fn sql(&self) -> Option<&str> {
        match self {
            AppError::Query { sql, .. } => Some(sql),
            _ => None,
        }
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, error_detail) = match &self {
            AppError::Connection(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new(code, msg.clone()),
            ),
            AppError::UnsupportedDialect { .. } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new(code, self.to_string()),
            ),
            AppError::Query { sql, message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(code, message.clone()).with_details(format!("SQL: {}", sql)),
            ),
            AppError::NotConnected => (
                StatusCode::CONFLICT,
                ErrorDetail::new(code, "Log in before running queries."),
            ),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new(code, msg.clone()),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(code, msg.clone()),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_detail,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_format() {
        let error = AppError::Validation("engine is required".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unsupported_dialect_is_client_error() {
        let error = AppError::UnsupportedDialect {
            dialect: "sqlite".to_string(),
            operation: "list databases".to_string(),
        };
        assert_eq!(error.code(), "UNSUPPORTED_DIALECT");
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_query_error_keeps_sql() {
        let error = AppError::query("SELECT 1", "connection reset");
        assert_eq!(error.sql(), Some("SELECT 1"));
        assert_eq!(error.to_string(), "Query failed: connection reset");
    }

    #[test]
    fn test_error_detail_creation() {
        let detail = ErrorDetail::new("TEST_CODE", "Test message");
        assert_eq!(detail.code, "TEST_CODE");
        assert_eq!(detail.message, "Test message");
        assert!(detail.details.is_none());
    }
}
