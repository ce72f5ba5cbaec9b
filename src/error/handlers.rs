//! Turning unexpected registry responses into errors
//!
//! Registries report failures in several JSON shapes. Each shape has a named
//! decoder below, and decoders are tried in a fixed order so the precedence is
//! visible in one place and each decoder can be tested on its own.

use crate::error::{ErrorEntry, HttpError, RegistryError};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use serde_json::Value;

/// Raw bodies are truncated to this many bytes when used as a message
pub const MAX_RAW_MESSAGE_BYTES: usize = 512;

/// Decodes one structured error-body shape into a list of candidate entries
pub struct ErrorBodyDecoder {
    pub name: &'static str,
    pub decode: fn(&Value) -> Option<Vec<Value>>,
}

/// Error-body shapes in the order they are tried
pub const ERROR_BODY_DECODERS: &[ErrorBodyDecoder] = &[
    ErrorBodyDecoder {
        name: "error-object",
        decode: decode_error_object,
    },
    ErrorBodyDecoder {
        name: "errors-array",
        decode: decode_errors_array,
    },
    ErrorBodyDecoder {
        name: "bare-object",
        decode: decode_bare_object,
    },
];

/// Extracts a single message from a token-endpoint failure body
pub struct MessageDecoder {
    pub name: &'static str,
    pub decode: fn(&Value) -> Option<String>,
}

/// Token failure message sources in priority order; raw body text is the last resort
pub const AUTH_MESSAGE_DECODERS: &[MessageDecoder] = &[
    MessageDecoder {
        name: "errors[0].message",
        decode: first_error_message,
    },
    MessageDecoder {
        name: "details",
        decode: details_field,
    },
    MessageDecoder {
        name: "message",
        decode: message_field,
    },
];

fn decode_error_object(body: &Value) -> Option<Vec<Value>> {
    body.get("error")
        .filter(|e| e.is_object())
        .map(|e| vec![e.clone()])
}

fn decode_errors_array(body: &Value) -> Option<Vec<Value>> {
    body.get("errors").and_then(Value::as_array).cloned()
}

fn decode_bare_object(body: &Value) -> Option<Vec<Value>> {
    body.is_object().then(|| vec![body.clone()])
}

fn first_error_message(body: &Value) -> Option<String> {
    body.get("errors")?
        .get(0)?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

fn details_field(body: &Value) -> Option<String> {
    body.get("details")?.as_str().map(str::to_string)
}

fn message_field(body: &Value) -> Option<String> {
    body.get("message")?.as_str().map(str::to_string)
}

/// Converts a decoded candidate into an entry; entries without a string message are dropped
fn to_entry(candidate: &Value) -> Option<ErrorEntry> {
    let message = candidate.get("message")?.as_str()?.to_string();
    Some(ErrorEntry {
        code: candidate
            .get("code")
            .and_then(Value::as_str)
            .map(str::to_string),
        message,
        detail: candidate.get("detail").cloned(),
    })
}

/// Structured registry errors found in a response body
pub fn decode_error_entries(body: &[u8]) -> Vec<ErrorEntry> {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return Vec::new();
    };

    ERROR_BODY_DECODERS
        .iter()
        .find_map(|decoder| (decoder.decode)(&value))
        .map(|candidates| candidates.iter().filter_map(to_entry).collect())
        .unwrap_or_default()
}

/// Message for a failed token request, following [`AUTH_MESSAGE_DECODERS`]
pub fn extract_auth_message(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        if let Some(message) = AUTH_MESSAGE_DECODERS
            .iter()
            .find_map(|decoder| (decoder.decode)(&value))
        {
            return message;
        }
        if let Value::String(s) = value {
            return s;
        }
    }
    String::from_utf8_lossy(body).trim().to_string()
}

/// "404 Not Found" style rendering of a status
pub fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("text/html"))
}

fn raw_message(body: &[u8]) -> String {
    let end = body.len().min(MAX_RAW_MESSAGE_BYTES);
    String::from_utf8_lossy(&body[..end]).trim().to_string()
}

/// Standard error handler for HTTP responses
pub struct HttpErrorHandler;

impl HttpErrorHandler {
    /// Reads the body of an unexpected response once and builds the matching error
    pub async fn from_response(response: reqwest::Response) -> RegistryError {
        let status = response.status();
        let url = response.url().to_string();
        let headers = response.headers().clone();

        // HTML error pages are drained without being inspected
        let body = match response.bytes().await {
            Ok(body) if !is_html(&headers) => body,
            _ => bytes::Bytes::new(),
        };

        Self::from_parts(status, url, headers, &body)
    }

    /// Builds the error for a response whose body has already been read
    pub fn from_parts(status: StatusCode, url: String, headers: HeaderMap, body: &[u8]) -> RegistryError {
        let (errors, message) = if is_html(&headers) {
            (Vec::new(), format!("{} (w/ HTML body)", status_line(status)))
        } else {
            let errors = decode_error_entries(body);
            let message = if !errors.is_empty() {
                errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ")
            } else {
                let raw = raw_message(body);
                if raw.is_empty() { status_line(status) } else { raw }
            };
            (errors, message)
        };

        Self::classify(HttpError {
            status,
            url,
            headers,
            errors,
            message,
        })
    }

    /// Refines a response error by status code
    pub fn classify(error: HttpError) -> RegistryError {
        match error.status {
            StatusCode::UNAUTHORIZED => RegistryError::Unauthorized(error),
            StatusCode::FORBIDDEN => RegistryError::Forbidden(error),
            StatusCode::NOT_FOUND => RegistryError::NotFound(error),
            _ => RegistryError::Http(error),
        }
    }
}
