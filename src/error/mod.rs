//! Error types and handlers for registry operations

pub mod handlers;

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

/// A single entry of a registry `errors` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

/// A response whose status was not one the caller expected
#[derive(Debug, Clone)]
pub struct HttpError {
    pub status: StatusCode,
    pub url: String,
    pub headers: HeaderMap,
    /// Structured errors reported by the registry, possibly empty
    pub errors: Vec<ErrorEntry>,
    /// Best available human-readable description
    pub message: String,
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.status.as_u16())
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Malformed challenge or digest header, never retried
    #[error("Parse error: {0}")]
    Parse(String),

    /// Integrity mismatch; any data already delivered must be discarded
    #[error("Bad digest: {0}")]
    BadDigest(String),

    #[error("HTTP error: {0}")]
    Http(HttpError),

    #[error("Unauthorized: {0}")]
    Unauthorized(HttpError),

    #[error("Forbidden: {0}")]
    Forbidden(HttpError),

    #[error("Not found: {0}")]
    NotFound(HttpError),

    /// Push-path failure with a fixed message wrapping the cause
    #[error("{message}")]
    Upload {
        message: String,
        #[source]
        source: Option<Box<RegistryError>>,
    },

    #[error("maximum number of redirects ({max}) hit when requesting {url}")]
    TooManyRedirects { max: usize, url: String },

    #[error("Authentication error: {0}")]
    Auth(String),

    /// The peer answered with something the protocol does not allow
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Stream ended after {received} of {expected} bytes")]
    Truncated { expected: u64, received: u64 },

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Transport failure: no response was received
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    pub fn upload(message: &str, source: RegistryError) -> Self {
        RegistryError::Upload {
            message: message.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// The response error carried by this error, if any
    pub fn http_error(&self) -> Option<&HttpError> {
        match self {
            RegistryError::Http(e)
            | RegistryError::Unauthorized(e)
            | RegistryError::Forbidden(e)
            | RegistryError::NotFound(e) => Some(e),
            RegistryError::Upload {
                source: Some(source),
                ..
            } => source.http_error(),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.http_error().map(|e| e.status)
    }

    /// True when the request never produced a response
    pub fn is_transport(&self) -> bool {
        match self {
            RegistryError::Network(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Parse(format!("invalid JSON ({:?}): {}", err.classify(), err))
    }
}

impl From<url::ParseError> for RegistryError {
    fn from(err: url::ParseError) -> Self {
        RegistryError::Validation(format!("invalid URL: {}", err))
    }
}

impl From<reqwest::header::ToStrError> for RegistryError {
    fn from(err: reqwest::header::ToStrError) -> Self {
        RegistryError::Parse(format!("non-ASCII header value: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_errors_are_not_transport_failures() {
        let err = reqwest::Client::new().get("not a url").build().unwrap_err();
        assert!(err.is_builder());
        assert!(!RegistryError::Network(err).is_transport());
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = reqwest::get(format!("http://{}/v2/", addr)).await.unwrap_err();
        assert!(RegistryError::Network(err).is_transport());
        assert!(!RegistryError::Protocol("no token".to_string()).is_transport());
    }
}
