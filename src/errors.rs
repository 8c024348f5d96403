//! API error type shared by the HTTP handlers and the WebSocket loop.
//!
//! Component errors (`CatalogError`, `StateError`, `PersistenceError`)
//! convert into `ApiError`, which decides the status code and what the
//! client is allowed to see.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::catalog::CatalogError;
use crate::session::StateError;
use crate::store::PersistenceError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unknown level '{0}'")]
    UnknownLevel(String),

    #[error("unknown challenge {0}")]
    UnknownChallenge(u32),

    #[error("unknown session {0}")]
    UnknownSession(Uuid),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Standard JSON error body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::UnknownLevel(_) => StatusCode::NOT_FOUND,
            ApiError::UnknownChallenge(_) => StatusCode::NOT_FOUND,
            ApiError::UnknownSession(_) => StatusCode::NOT_FOUND,
            ApiError::State(StateError::NoLevelSelected) => StatusCode::CONFLICT,
            ApiError::State(_) => StatusCode::NOT_FOUND,
            ApiError::Catalog(CatalogError::InvalidLevel { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Catalog(_) => StatusCode::NOT_FOUND,
            ApiError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Store failures carry paths and io details; in release builds the
    /// client only learns that storage failed.
    fn should_expose_details(&self) -> bool {
        cfg!(debug_assertions) || !self.status_code().is_server_error()
    }

    /// The message sent to clients, over HTTP and over the socket.
    pub fn user_message(&self) -> String {
        if self.should_expose_details() {
            self.to_string()
        } else {
            match self {
                ApiError::Persistence(_) => "progress storage error".to_string(),
                _ => self.to_string(),
            }
        }
    }

    fn error_details(&self) -> Option<String> {
        if !self.should_expose_details() {
            return None;
        }
        match self {
            ApiError::Persistence(e) => Some(format!("storage: {e}")),
            _ => None,
        }
    }

    fn log_error(&self) {
        let code = self.status_code();
        if code.is_server_error() {
            tracing::error!(target: "poo_backend", error = %self, status = %code, "Server error");
        } else {
            tracing::debug!(target: "poo_backend", error = %self, status = %code, "Client error");
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log_error();

        let status = self.status_code();
        let body = Json(ErrorResponse {
            error: self.user_message(),
            details: self.error_details(),
        });

        (status, body).into_response()
    }
}
