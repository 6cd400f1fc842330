// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mapping of core errors onto HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;
use vigil_core::CoreError;

use crate::api::DefaultJsonResponse;

/// Error returned by every handler.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Error raised by the registry or request validation.
    #[error("{0}")]
    Core(#[from] CoreError),

    /// The request could not be decoded.
    #[error("{0}")]
    BadRequest(String),
}

/// Result type for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Status code this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Core(e) => match e {
                CoreError::ValidationError { .. } => StatusCode::BAD_REQUEST,
                CoreError::EarlyTerminationUnsupported { .. } => StatusCode::BAD_REQUEST,
                CoreError::InstanceNotFound { .. } => StatusCode::NOT_FOUND,
                CoreError::InstanceAlreadyExists { .. } => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "Request failed");
            "internal error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(DefaultJsonResponse::error(message))).into_response()
    }
}
