use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::config::ConfigError;
use crate::jobs::JobError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    TooLarge(String),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed form data: {0}")]
    Multipart(#[from] MultipartError),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => AppError::NotFound(e.to_string()),
            StoreError::Io(e) => AppError::Io(e),
        }
    }
}

impl AppError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Multipart(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Job(JobError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Job(JobError::Malformed { .. }) => StatusCode::BAD_GATEWAY,
            AppError::Job(_) | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{self}");
        } else {
            tracing::info!("request rejected: {self}");
        }
        (status, self.to_string()).into_response()
    }
}

/// Failures that prevent the server from starting.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cannot prepare data directory or socket: {0}")]
    Io(#[from] std::io::Error),
}
