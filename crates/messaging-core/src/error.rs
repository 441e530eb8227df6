// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the messaging core.
//!
//! Frame-format, authorization, and back-pressure errors (see the error
//! table in the design notes) are logged and dropped at the call site —
//! they never reach here. `CoreError` covers the smaller set of failures
//! that a caller explicitly asked for a `Result` on: registry conflicts,
//! bus lifecycle, and the WS upgrade path.

use std::fmt;

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

/// Error codes surfaced to callers of the core's public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoreError {
    Unauthorized,
    TopicConflict,
    InvalidTopicName,
    BusClosed,
    ShutdownTimeout,
}

impl CoreError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::TopicConflict | Self::InvalidTopicName => 400,
            Self::BusClosed | Self::ShutdownTimeout => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::TopicConflict => "TOPIC_CONFLICT",
            Self::InvalidTopicName => "INVALID_TOPIC_NAME",
            Self::BusClosed => "BUS_CLOSED",
            Self::ShutdownTimeout => "SHUTDOWN_TIMEOUT",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for CoreError {}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
