//! The error envelope: a small closed set of codes, one JSON shape. Every
//! error response carries the same trace object as successes, so a caller
//! can correlate a failure with logs by request id.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use aisle_runtime::{Trace, TurnError};

#[derive(Debug)]
pub struct ApiError {
    http: StatusCode,
    status: &'static str,
    code: &'static str,
    message: String,
    trace: Trace,
}

impl ApiError {
    /// Bad input outside the orchestrator (e.g. unknown session id).
    /// These mint a fresh trace; no turn ran.
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            http: StatusCode::NOT_FOUND,
            status: "INVALID",
            code: "VALIDATION_ERROR",
            message: message.into(),
            trace: Trace::new(),
        }
    }

    pub fn backend_unavailable(message: impl Into<String>, trace: Trace) -> Self {
        Self {
            http: StatusCode::SERVICE_UNAVAILABLE,
            status: "ERROR",
            code: "BACKEND_UNAVAILABLE",
            message: message.into(),
            trace,
        }
    }

    pub fn internal(message: impl Into<String>, trace: Trace) -> Self {
        Self {
            http: StatusCode::INTERNAL_SERVER_ERROR,
            status: "ERROR",
            code: "INTERNAL_ERROR",
            message: message.into(),
            trace,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.trace.request_id
    }

    pub fn body(&self) -> serde_json::Value {
        json!({
            "status": self.status,
            "error": {
                "code": self.code,
                "message": self.message,
                "details": null,
            },
            "trace": &self.trace,
        })
    }
}

impl From<TurnError> for ApiError {
    fn from(turn_error: TurnError) -> Self {
        let message = turn_error.to_string();
        match turn_error {
            TurnError::BackendUnavailable { trace, .. } => Self::backend_unavailable(message, trace),
            TurnError::Internal { trace, .. } => Self::internal(message, trace),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.code == "INTERNAL_ERROR" {
            error!(request_id = %self.trace.request_id, message = %self.message, "internal error surfaced");
        }
        (self.http, Json(self.body())).into_response()
    }
}
