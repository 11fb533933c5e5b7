//! The I/O seam between `ApiClient` and the network.

use ureq::config::RedirectAuthHeaders;
use ureq::{Agent, ResponseExt};

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Executes one `HttpRequest`.
///
/// Implementations return non-2xx responses as data, never as `Err`; `Err`
/// is reserved for failures where no response was received.
pub trait Transport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        (**self).send(request)
    }
}

/// Blocking transport backed by a `ureq` agent.
///
/// Follows redirects, keeping auth headers on same-host hops, and reports
/// the final URL on the response. Response bodies are read in full; deep
/// `api/json?depth=N` trees on large instances run well past ureq's 10 MiB
/// default, so no limit applies unless one is set with `body_limit`.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: Agent,
    body_limit: u64,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .redirect_auth_headers(RedirectAuthHeaders::SameHost)
            .build()
            .new_agent();
        Self {
            agent,
            body_limit: u64::MAX,
        }
    }

    /// Cap response bodies at `bytes`; larger ones fail as transport errors.
    pub fn body_limit(mut self, bytes: u64) -> Self {
        self.body_limit = bytes;
        self
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let transport_err = |e: ureq::Error| ApiError::Transport(e.to_string());

        let mut response = match request.method {
            HttpMethod::Get => {
                let mut builder = self.agent.get(&request.url);
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.call()
            }
            HttpMethod::Post => {
                let mut builder = self.agent.post(&request.url);
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                match &request.body {
                    Some(body) => builder.send(body.as_bytes()),
                    None => builder.send_empty(),
                }
            }
        }
        .map_err(transport_err)?;

        let status = response.status().as_u16();
        let url = response.get_uri().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .with_config()
            .limit(self.body_limit)
            .read_to_string()
            .map_err(transport_err)?;

        Ok(HttpResponse {
            status,
            url,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;

    use super::*;

    /// Serve one `200` response with `body` and return the URL to hit.
    fn serve_once(body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
                line.clear();
            }
            let mut stream = reader.into_inner();
            // The client may hang up early when it enforces a limit.
            let _ = write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            )
            .and_then(|()| stream.write_all(body.as_bytes()));
        });
        format!("http://{addr}/api/json?depth=2")
    }

    fn get(url: String) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    fn large_json() -> String {
        // A bit over 11 MiB of job entries.
        let job = r#"{"name":"job-with-a-reasonably-long-name","color":"blue"},"#;
        let count = 11 * 1024 * 1024 / job.len() + 1;
        format!("{{\"jobs\":[{}{{}}]}}", job.repeat(count))
    }

    #[test]
    fn reads_bodies_past_ten_mebibytes() {
        let body = large_json();
        let response = UreqTransport::new().send(&get(serve_once(body.clone()))).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body.len(), body.len());
        let parsed: serde_json::Value = response.json().unwrap();
        assert!(parsed["jobs"].as_array().unwrap().len() > 1000);
    }

    #[test]
    fn configured_limit_rejects_larger_body() {
        let url = serve_once("x".repeat(2048));
        let err = UreqTransport::new().body_limit(1024).send(&get(url)).unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
