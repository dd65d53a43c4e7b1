// src/core/errors.rs

//! Defines the primary error type for the entire application.

use axum::http::StatusCode;
use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the edge proxy.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug, Clone)]
pub enum OpalEdgeError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Cache backend error: {0}")]
    CacheBackend(String),

    #[error("Control plane error: {0}")]
    ControlPlane(String),

    #[error("Domain not configured: {0}")]
    DomainNotConfigured(String),

    #[error("Domain is not active: {0}")]
    DomainInactive(String),

    #[error("Origin unreachable: {0}")]
    OriginUnreachable(String),

    #[error("Origin response body too large: {length} bytes (max {max})")]
    BodyTooLarge { length: usize, max: usize },

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl OpalEdgeError {
    /// Maps the error to the HTTP status code surfaced to the client.
    pub fn status_code(&self) -> StatusCode {
        match self {
            OpalEdgeError::DomainNotConfigured(_) => StatusCode::NOT_FOUND,
            OpalEdgeError::DomainInactive(_) => StatusCode::SERVICE_UNAVAILABLE,
            OpalEdgeError::OriginUnreachable(_)
            | OpalEdgeError::BodyTooLarge { .. }
            | OpalEdgeError::HttpClient(_) => StatusCode::BAD_GATEWAY,
            OpalEdgeError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            OpalEdgeError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            OpalEdgeError::Io(_)
            | OpalEdgeError::CacheBackend(_)
            | OpalEdgeError::ControlPlane(_)
            | OpalEdgeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for OpalEdgeError {
    fn from(e: std::io::Error) -> Self {
        OpalEdgeError::Io(Arc::new(e))
    }
}

impl From<reqwest::Error> for OpalEdgeError {
    fn from(e: reqwest::Error) -> Self {
        OpalEdgeError::HttpClient(e.to_string())
    }
}

impl From<redis::RedisError> for OpalEdgeError {
    fn from(e: redis::RedisError) -> Self {
        OpalEdgeError::CacheBackend(e.to_string())
    }
}

impl From<serde_json::Error> for OpalEdgeError {
    fn from(e: serde_json::Error) -> Self {
        OpalEdgeError::Internal(format!("JSON serialization/deserialization error: {e}"))
    }
}
