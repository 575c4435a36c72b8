//! Error types and HTTP mapping for the weather service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Main error type for request handling
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Malformed or out-of-range request fields
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// The upstream provider answered with an empty result set
    #[error("No data found")]
    NoData,

    /// Network failure, non-2xx upstream status, or unexpected payload shape
    #[error("Upstream error: {message}")]
    Upstream { message: String },

    /// Chart rendering or image encoding failed
    #[error("Render error: {message}")]
    Render { message: String },

    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ServiceError {
    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new upstream error
    pub fn upstream<S: Into<String>>(message: S) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    /// Create a new render error
    pub fn render<S: Into<String>>(message: S) -> Self {
        Self::Render {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::NoData => StatusCode::NOT_FOUND,
            ServiceError::Upstream { .. }
            | ServiceError::Render { .. }
            | ServiceError::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message placed in the `detail` field of the response body
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            ServiceError::Validation { message }
            | ServiceError::Upstream { message }
            | ServiceError::Render { message }
            | ServiceError::Config { message } => message.clone(),
            ServiceError::NoData => "No data found".to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{self}");
        } else {
            tracing::debug!("{self}");
        }
        (status, Json(json!({ "detail": self.detail() }))).into_response()
    }
}

/// Render an error and all of its sources as one line.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}
