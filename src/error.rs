//! Unified application error model and mapping helpers.
//! This module provides a common error enum used by the HTTP surface, the
//! hosted-service client wrappers and the session lifecycle, along with the
//! mapping to HTTP statuses and response bodies.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    Validation { code: String, message: String },
    Auth { code: String, message: String },
    Forbidden { code: String, message: String },
    Upstream { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Validation { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::Upstream { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Validation { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::Upstream { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn validation<S: Into<String>>(code: S, msg: S) -> Self { AppError::Validation { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn upstream<S: Into<String>>(code: S, msg: S) -> Self { AppError::Upstream { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Validation { .. } => 400,
            AppError::Auth { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::Upstream { .. } => 500,
            AppError::Internal { .. } => 500,
        }
    }

    /// JSON body for the HTTP surface. Upstream failures keep the generic
    /// message and attach the upstream detail for diagnostics; validation
    /// errors carry their message verbatim.
    pub fn http_body(&self) -> serde_json::Value {
        match self {
            AppError::Validation { message, .. } => serde_json::json!({ "message": message }),
            AppError::Auth { message, .. } => serde_json::json!({ "success": false, "message": message }),
            AppError::Forbidden { message, .. } => serde_json::json!({ "success": false, "message": message }),
            AppError::Upstream { message, .. } => {
                serde_json::json!({ "message": "Internal server error", "details": message })
            }
            AppError::Internal { .. } => serde_json::json!({ "message": "Internal server error" }),
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Default mapping: any unexpected failure from the hosted service
        AppError::Upstream { code: "upstream_error".into(), message: err.to_string() }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = axum::http::StatusCode::from_u16(self.http_status())
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        (status, axum::Json(self.http_body())).into_response()
    }
}
