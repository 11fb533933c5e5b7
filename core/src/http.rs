//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data. The client
//! builds `HttpRequest` values and classifies `HttpResponse` values; a
//! `Transport` implementation performs the actual I/O. Keeping the wire
//! exchange as data lets the retry logic be exercised with a scripted
//! transport and no network.

use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP request described as plain data.
///
/// `url` is absolute. Headers already include authorization and the crumb.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// An HTTP response described as plain data.
///
/// `url` is the URL that produced this response, after any redirects the
/// transport followed.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body).map_err(|e| ApiError::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            url: "http://localhost:8080/api/json".to_string(),
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn success_covers_2xx_only() {
        assert!(response(200, "").is_success());
        assert!(response(201, "").is_success());
        assert!(response(299, "").is_success());
        assert!(!response(302, "").is_success());
        assert!(!response(404, "").is_success());
    }

    #[test]
    fn json_parses_body() {
        let value: serde_json::Value = response(200, r#"{"mode":"NORMAL"}"#).json().unwrap();
        assert_eq!(value["mode"], "NORMAL");
    }

    #[test]
    fn json_reports_bad_body() {
        let err = response(200, "<html/>").json::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, ApiError::Deserialization(_)));
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = HttpRequest {
            method: HttpMethod::Get,
            url: "http://localhost".to_string(),
            headers: vec![("Jenkins-Crumb".to_string(), "abc".to_string())],
            body: None,
        };
        assert_eq!(req.header("jenkins-crumb"), Some("abc"));
        assert_eq!(req.header("authorization"), None);
    }
}
