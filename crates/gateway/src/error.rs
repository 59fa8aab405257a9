// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for the gateway API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayError {
    /// The node registry's backing store could not be read.
    RegistryUnavailable,
    /// The requested node id is not in the enabled set.
    PropertyNotFound,
    /// The node id parameter is not a well-formed identifier.
    InvalidIdentifier,
    /// The node answered with a non-2xx status.
    UpstreamRejected,
    /// The node could not be reached (network, DNS, or timeout).
    Unreachable,
    Unauthorized,
    BadRequest,
    Unprocessable,
    Internal,
}

impl GatewayError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::RegistryUnavailable => 503,
            Self::PropertyNotFound => 404,
            Self::InvalidIdentifier => 400,
            Self::UpstreamRejected => 502,
            Self::Unreachable => 502,
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::Unprocessable => 422,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegistryUnavailable => "REGISTRY_UNAVAILABLE",
            Self::PropertyNotFound => "PROPERTY_NOT_FOUND",
            Self::InvalidIdentifier => "INVALID_IDENTIFIER",
            Self::UpstreamRejected => "UPSTREAM_REJECTED",
            Self::Unreachable => "UNREACHABLE",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::Unprocessable => "UNPROCESSABLE",
            Self::Internal => "INTERNAL",
        }
    }

    /// Default client-facing message for this code.
    pub fn message(&self) -> &'static str {
        match self {
            Self::RegistryUnavailable => "Property registry unavailable",
            Self::PropertyNotFound => "Property not found",
            Self::InvalidIdentifier => "Invalid property ID",
            Self::UpstreamRejected => "PBX API error",
            Self::Unreachable => "PBX unreachable",
            Self::Unauthorized => "unauthorized",
            Self::BadRequest => "bad request",
            Self::Unprocessable => "unprocessable request",
            Self::Internal => "internal error",
        }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse { error: message.into() }))
    }

    /// Response carrying this code's default message.
    pub fn to_default_response(&self) -> (StatusCode, Json<ErrorResponse>) {
        self.to_http_response(self.message())
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for GatewayError {}

/// An error code paired with the message shown to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: GatewayError,
    pub message: String,
}

impl ApiError {
    pub fn new(code: GatewayError, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl From<GatewayError> for ApiError {
    fn from(code: GatewayError) -> Self {
        Self::new(code, code.message())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.code.to_http_response(self.message).into_response()
    }
}

/// Top-level error response envelope: `{"error": "<message>"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
