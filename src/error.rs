//! Unified application error model and mapping helpers.
//! Domain modules keep their own `thiserror` enums; this type is what the HTTP
//! frontend turns them into, along with the status mapping.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Stable body returned for every unexpected fault. Details only go to the log.
pub const SERVER_ERROR_CODE: &str = "server_error";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    NotImplemented { code: String, message: String },
    Upstream { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::NotImplemented { code, .. }
            | AppError::Upstream { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::NotImplemented { message, .. }
            | AppError::Upstream { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self {
        AppError::UserInput { code: code.into(), message: msg.into() }
    }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self {
        AppError::NotFound { code: code.into(), message: msg.into() }
    }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self {
        AppError::Conflict { code: code.into(), message: msg.into() }
    }
    pub fn not_implemented<S: Into<String>>(code: S, msg: S) -> Self {
        AppError::NotImplemented { code: code.into(), message: msg.into() }
    }
    pub fn upstream<S: Into<String>>(code: S, msg: S) -> Self {
        AppError::Upstream { code: code.into(), message: msg.into() }
    }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self {
        AppError::Internal { code: code.into(), message: msg.into() }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::NotImplemented { .. } => 501,
            AppError::Upstream { .. } => 502,
            AppError::Internal { .. } => 500,
        }
    }

    /// Text written to the response body. Internal faults never leak their message.
    pub fn public_body(&self) -> &str {
        match self {
            AppError::Internal { .. } => SERVER_ERROR_CODE,
            other => other.message(),
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
        AppError::Internal { code: SERVER_ERROR_CODE.into(), message: format!("{err:#}") }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if let AppError::Internal { message, .. } = &self {
            tracing::error!(code = self.code_str(), "{}", message);
        }
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.public_body().to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
