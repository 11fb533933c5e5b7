//! Error types for the Jenkins API client.
//!
//! # Design
//! `Request` is the terminal outcome of a call that the client could not
//! recover from. Its display is the composed message: the status line plus,
//! when one could be extracted, the server's own error text. Crumb failures
//! get a dedicated variant because they leave the client unusable until it is
//! re-initialized.

use thiserror::Error;

use crate::http::HttpMethod;

/// Errors returned by `ApiClient`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A request was attempted before `init` obtained a crumb.
    #[error("client is not initialized: call init() before issuing requests")]
    NotInitialized,

    /// The crumb issuer could not be reached or returned an unusable body.
    #[error(
        "could not obtain a CSRF crumb; CSRF protection may be disabled on the server \
         or this client may be stale and need re-initializing: {0}"
    )]
    CrumbUnavailable(#[source] Box<ApiError>),

    /// The server answered with a non-2xx status that was not recovered.
    #[error("{}", display_request(.status, .detail))]
    Request {
        method: HttpMethod,
        url: String,
        status: u16,
        body: String,
        detail: Option<String>,
    },

    /// The transport failed before a response was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// Missing or invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The request payload could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),
}

impl ApiError {
    /// HTTP status of a terminal request failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Request { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn display_request(status: &u16, detail: &Option<String>) -> String {
    compose_message(*status, detail.as_deref())
}

/// `request failed with status code <status>`, optionally followed by the
/// extracted server message in parentheses.
pub fn compose_message(status: u16, detail: Option<&str>) -> String {
    let message = format!("request failed with status code {status}");
    match detail {
        Some(detail) => format!("{message} (html error message:{detail})"),
        None => message,
    }
}
