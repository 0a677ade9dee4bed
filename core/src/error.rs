//! Error types for the task dashboard client.
//!
//! # Design
//! Every failure that can reach a caller is an `ApiError`. The variants follow
//! the failure taxonomy the stores reason about (authentication, validation,
//! transport, missing record) plus the decoding failures the envelope layer
//! can raise. Regardless of variant, callers can always collapse an error
//! into the normalized `{message, statusCode}` shape through `ApiError::body`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors returned by the API client and the stores built on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Invalid credentials, or an expired/invalid bearer token (401/403).
    /// `status` is `None` when the request was refused locally for lack of
    /// a token.
    Auth { status: Option<u16>, message: String },

    /// The backend rejected the payload (400/409/422), or a payload was
    /// rejected locally before being sent (`status` is `None`).
    Validation { status: Option<u16>, message: String },

    /// The request never produced an HTTP response.
    Network(String),

    /// The backend returned 404 for the addressed record.
    NotFound { message: String },

    /// Any other non-2xx status.
    Http { status: u16, message: String },

    /// The response body was JSON but matched none of the known envelopes.
    UnrecognizedEnvelope(String),

    /// A document came back without an `id`.
    MissingId,

    /// The response body could not be deserialized into the expected type.
    Deserialization(String),

    /// The request payload could not be serialized to JSON.
    Serialization(String),

    /// The persisted token could not be read or written.
    Storage(String),
}

/// The normalized error shape handed to the view layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub message: String,
    pub status_code: Option<u16>,
}

impl ApiError {
    /// Map a non-2xx status and the backend's message to an error variant.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => ApiError::Auth {
                status: Some(status),
                message,
            },
            404 => ApiError::NotFound { message },
            400 | 409 | 422 => ApiError::Validation {
                status: Some(status),
                message,
            },
            _ => ApiError::Http { status, message },
        }
    }

    /// An authentication failure detected before any request was sent.
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        ApiError::Auth {
            status: None,
            message: message.into(),
        }
    }

    /// A payload rejected before any request was sent.
    pub fn invalid(message: impl Into<String>) -> Self {
        ApiError::Validation {
            status: None,
            message: message.into(),
        }
    }

    /// HTTP status associated with this error, if it came from a response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Auth { status, .. } | ApiError::Validation { status, .. } => *status,
            ApiError::NotFound { .. } => Some(404),
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Human-readable message without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            ApiError::Network(msg)
            | ApiError::UnrecognizedEnvelope(msg)
            | ApiError::Deserialization(msg)
            | ApiError::Serialization(msg)
            | ApiError::Storage(msg) => msg.clone(),
            ApiError::Auth { message, .. }
            | ApiError::Validation { message, .. }
            | ApiError::NotFound { message }
            | ApiError::Http { message, .. } => message.clone(),
            ApiError::MissingId => "document is missing an id".to_string(),
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            message: self.message(),
            status_code: self.status_code(),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth { .. })
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Auth { message, .. } => write!(f, "authentication failed: {message}"),
            ApiError::Validation { message, .. } => write!(f, "invalid request: {message}"),
            ApiError::Network(msg) => write!(f, "network error: {msg}"),
            ApiError::NotFound { message } => write!(f, "not found: {message}"),
            ApiError::Http { status, message } => write!(f, "HTTP {status}: {message}"),
            ApiError::UnrecognizedEnvelope(msg) => {
                write!(f, "unrecognized response envelope: {msg}")
            }
            ApiError::MissingId => write!(f, "document is missing an id"),
            ApiError::Deserialization(msg) => write!(f, "deserialization failed: {msg}"),
            ApiError::Serialization(msg) => write!(f, "serialization failed: {msg}"),
            ApiError::Storage(msg) => write!(f, "token storage failed: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Deserialization(e.to_string())
    }
}
