//! Blocking client core for the Jenkins REST API.
//!
//! # Overview
//! `ApiClient` wraps a `Transport` with the pieces every Jenkins call needs:
//! basic auth, the CSRF crumb header, `/api/json` path normalization for
//! reads, and a single bounded retry when the crumb has gone stale (401/403)
//! or a read lands on an unsuffixed path (404).
//!
//! # Design
//! - Requests and responses cross the `Transport` seam as plain data
//!   (`HttpRequest` / `HttpResponse`), so the retry logic is testable with a
//!   scripted transport. `UreqTransport` is the network implementation.
//! - The crumb is owned by the client, replaced wholesale on refresh, and
//!   refreshes triggered by concurrent auth failures are coalesced.
//! - Form payloads that embed a `json` object are a distinct `Payload`
//!   variant so crumb injection is explicit.

pub mod client;
pub mod config;
pub mod crumb;
pub mod error;
pub mod extract;
pub mod http;
pub mod payload;
pub mod request;
pub mod transport;

pub use client::ApiClient;
pub use config::ClientConfig;
pub use crumb::Crumb;
pub use error::ApiError;
pub use extract::extract_error_message;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use payload::{Payload, RequestOptions};
pub use request::{normalize_json_path, JSON_API_SUFFIX};
pub use transport::{Transport, UreqTransport};
