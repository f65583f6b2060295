// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error types.
//!
//! `AppError` is returned by the companion server's handlers and converts to
//! a JSON response. `ClientError` is produced by the client-side pipeline and
//! is always caught by the state machine and turned into a user message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::TokenExchange(msg) => {
                tracing::error!(error = %msg, "Token exchange failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "token_exchange_failed",
                    Some(msg.clone()),
                )
            }
            AppError::TokenRefresh(msg) => {
                tracing::error!(error = %msg, "Token refresh failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "token_refresh_failed",
                    Some(msg.clone()),
                )
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;

/// Errors raised by the client-side pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    #[error("Could not obtain authorization URL: {0}")]
    AuthInit(String),

    #[error("Authorization was rejected: {0}")]
    AuthRejected(String),

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("Token response did not contain an access token")]
    EmptyToken,

    #[error("Token expiry is out of range")]
    InvalidExpiry,

    #[error("No stored credentials")]
    MissingToken,

    #[error("Access token rejected by Strava")]
    Unauthorized,

    #[error("Activity fetch failed: {0}")]
    Network(String),

    #[error("Token storage error: {0}")]
    Storage(String),

    #[error("Session ended before the operation finished")]
    SignedOut,
}

impl ClientError {
    /// The message shown to the user for this error.
    pub fn user_message(&self) -> &'static str {
        match self {
            ClientError::AuthInit(_) => "Failed to initialize login",
            ClientError::AuthRejected(_)
            | ClientError::TokenExchange(_)
            | ClientError::EmptyToken
            | ClientError::InvalidExpiry => "Authentication failed. Please try again.",
            ClientError::TokenRefresh(_)
            | ClientError::MissingToken
            | ClientError::Unauthorized => {
                "Failed to refresh authentication. Please log in again."
            }
            ClientError::Network(_) => "Failed to fetch activities. Please try again.",
            ClientError::Storage(_) => "Could not access saved credentials.",
            ClientError::SignedOut => "Signed out.",
        }
    }

    /// Whether this error invalidates the stored credentials.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            ClientError::TokenRefresh(_) | ClientError::MissingToken | ClientError::Unauthorized
        )
    }
}
