use actix_web::{http::{header, StatusCode}, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use std::fmt::Display;

use crate::permissions::DenyReason;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database connection error: {0}")]
    DatabaseConnection(#[from] scylla::errors::NewSessionError),

    #[error("Database execution error: {0}")]
    DatabaseExecution(#[from] scylla::errors::ExecutionError),

    #[error("Database result error: {0}")]
    DatabaseIntoRows(#[from] scylla::errors::IntoRowsResultError),

    #[error("Database row error: {0}")]
    DatabaseRows(#[from] scylla::errors::RowsError),

    #[error("Database Deserialization error: {0}")]
    DatabaseDeserialization(#[from] scylla::errors::DeserializationError),

    #[error("Database prepare error: {0}")]
    DatabasePrepare(#[from] scylla::errors::PrepareError),

    #[error("Storage did not respond within {0} ms")]
    StorageTimeout(u64),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PermissionDenied(DenyReason),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Storage failures a caller may retry; everything else is final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::DatabaseConnection(_)
                | AppError::DatabaseExecution(_)
                | AppError::DatabaseIntoRows(_)
                | AppError::DatabaseRows(_)
                | AppError::DatabaseDeserialization(_)
                | AppError::DatabasePrepare(_)
                | AppError::StorageTimeout(_)
                | AppError::Internal(_)
        )
    }
}

/// Failure half of the `{ success, ... }` envelope.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PermissionDenied(DenyReason::AuthenticationRequired) => StatusCode::UNAUTHORIZED,
            AppError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AppError::StorageTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // Driver details stay in the `error` field; the message is what a client shows.
        let body = if status.is_server_error() {
            let message = if self.is_retryable() {
                "Server error, please retry"
            } else {
                "Server error"
            };
            ErrorEnvelope {
                success: false,
                message: message.to_string(),
                error: Some(self.to_string()),
            }
        } else {
            ErrorEnvelope {
                success: false,
                message: self.to_string(),
                error: None,
            }
        };

        let mut builder = HttpResponse::build(status);
        if self.is_retryable() {
            builder.insert_header((header::RETRY_AFTER, "1"));
        }
        builder.json(body)
    }
}


pub trait TraceErr<T, E> {
    #[track_caller]
    fn trace_err(self, context: &'static str) -> std::result::Result<T, E>;
}

impl<T, E: Display> TraceErr<T, E> for std::result::Result<T, E> {
    #[track_caller]
    fn trace_err(self, context: &'static str) -> std::result::Result<T, E> {
        if let Err(ref e) = self {
            let location = std::panic::Location::caller();
            error!(
                "{}:{}: error in {}: {}",
                location.file(),
                location.line(),
                context,
                e
            );
        }
        self
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        assert_eq!(AppError::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::PermissionDenied(DenyReason::AuthenticationRequired).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::PermissionDenied(DenyReason::InsufficientRole { allowed: vec![Role::Admin] }).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AppError::StorageTimeout(10).status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn only_storage_failures_are_retryable() {
        assert!(AppError::StorageTimeout(10).is_retryable());
        assert!(!AppError::NotFound("gone".into()).is_retryable());
        assert!(!AppError::Validation("bad".into()).is_retryable());
    }

    #[test]
    fn timeout_response_carries_retry_after() {
        let resp = AppError::StorageTimeout(10).error_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(resp.headers().contains_key(header::RETRY_AFTER));
    }

    #[test]
    fn config_failures_are_not_offered_a_retry() {
        let err = AppError::Config("bad keyspace".into());
        assert!(!err.is_retryable());
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!resp.headers().contains_key(header::RETRY_AFTER));
    }
}
