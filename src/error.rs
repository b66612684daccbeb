// Error handling module
// Defines gateway and refresh error types

use thiserror::Error;

/// Why a credential refresh did not produce a new token
///
/// Cloneable so a single outcome can be handed to every parked request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// Network failure or timeout talking to the refresh endpoint
    #[error("refresh request failed: {0}")]
    Transport(String),

    /// Refresh endpoint answered with a non-success status
    #[error("refresh rejected: {status} - {body}")]
    Rejected { status: u16, body: String },

    /// Response parsed but carried no usable credential
    #[error("refresh response does not contain {0}")]
    MissingToken(String),

    /// Response body was not the expected JSON
    #[error("refresh response could not be parsed: {0}")]
    Malformed(String),

    /// The request driving the refresh was dropped before it settled
    #[error("refresh was abandoned before completing")]
    Abandoned,
}

/// Errors surfaced to callers of the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Authentication failed and cannot be recovered by a refresh
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Refresh failed; the session has been torn down
    #[error("Session expired: {0}")]
    SessionExpired(#[from] RefreshError),

    /// Non-auth error status from the Quizzard API
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// Network-level failure sending the request
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// HTTP status associated with this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::AuthError(_) | GatewayError::SessionExpired(_) => Some(401),
            GatewayError::ApiError { status, .. } => Some(*status),
            GatewayError::Transport(e) => e.status().map(|s| s.as_u16()),
            GatewayError::ConfigError(_) | GatewayError::Internal(_) => None,
        }
    }

    /// True when the caller has to log in again
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            GatewayError::AuthError(_) | GatewayError::SessionExpired(_)
        )
    }
}

/// Categorize a transport error for logging
pub fn transport_error_kind(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection_failed"
    } else if e.is_request() {
        "request_error"
    } else if e.is_body() {
        "body_error"
    } else if e.is_decode() {
        "decode_error"
    } else {
        "unknown"
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
