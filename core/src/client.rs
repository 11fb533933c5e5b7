//! The Jenkins API client: crumb handling and the bounded retry.
//!
//! # Design
//! Every call goes through `execute`: build the wire request from a
//! `PendingRequest` (normalize the path, merge auth and crumb headers, encode
//! the body), send it, and on failure classify the response. A 401/403
//! refreshes the crumb and a 404 on an unsuffixed GET rewrites the path;
//! either way the request is sent exactly once more and that outcome is
//! final. Anything else is logged and surfaced as `ApiError::Request`.

use tracing::{debug, error, info};

use crate::config::ClientConfig;
use crate::crumb::{parse_crumb, Crumb, CrumbStore, CRUMB_ISSUER_PATH};
use crate::error::ApiError;
use crate::extract::extract_error_message;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::payload::{Body, Payload, RequestOptions, FORM_CONTENT_TYPE, XML_CONTENT_TYPE};
use crate::request::{has_json_suffix, normalize_json_path, path_of, PendingRequest, Target};
use crate::transport::{Transport, UreqTransport};

/// What to do about a failed response.
#[derive(Debug, PartialEq, Eq)]
enum Recovery {
    /// Fetch a new crumb, then resend.
    RefreshCrumb,
    /// Resend to this origin-rooted path.
    RewritePath(String),
    Fail,
}

/// Whether a 401/403 may trigger a crumb refresh. Off for the crumb fetch
/// itself so an auth failure there cannot recurse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthRetry {
    Allowed,
    Disabled,
}

/// A wire request plus the crumb generation it carries.
struct Attempt {
    request: HttpRequest,
    generation: u64,
}

/// Client for a Jenkins server's REST API.
///
/// Construction performs no I/O. Call `init` once to obtain a crumb before
/// issuing requests.
pub struct ApiClient<T: Transport = UreqTransport> {
    config: ClientConfig,
    transport: T,
    crumb: CrumbStore,
}

impl ApiClient<UreqTransport> {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, UreqTransport::new())
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            crumb: CrumbStore::default(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The crumb currently attached to requests.
    pub fn crumb(&self) -> Option<Crumb> {
        self.crumb.snapshot().0
    }

    /// Fetch the initial crumb. Fails with `ApiError::CrumbUnavailable` if
    /// the server will not issue one; the client stays unusable until a
    /// later `init` succeeds.
    pub fn init(&self) -> Result<(), ApiError> {
        self.refresh_crumb()?;
        info!(base_url = %self.config.base_url(), "jenkins client initialized");
        Ok(())
    }

    /// Fetch a crumb from the issuer and replace the stored one.
    pub fn refresh_crumb(&self) -> Result<Crumb, ApiError> {
        let _guard = self.crumb.refresh_guard();
        self.fetch_crumb()
    }

    pub fn get(&self, path: &str, options: RequestOptions) -> Result<HttpResponse, ApiError> {
        self.ensure_initialized()?;
        self.execute(
            self.pending(HttpMethod::Get, path, options, None, Body::Empty),
            AuthRetry::Allowed,
        )
    }

    /// Form post. A `JsonEnvelope` payload gets the crumb injected into its
    /// json object.
    pub fn post(
        &self,
        path: &str,
        payload: Payload,
        options: RequestOptions,
    ) -> Result<HttpResponse, ApiError> {
        self.ensure_initialized()?;
        self.execute(
            self.pending(
                HttpMethod::Post,
                path,
                options,
                Some(FORM_CONTENT_TYPE),
                Body::Form(payload),
            ),
            AuthRetry::Allowed,
        )
    }

    /// Post an opaque body, typically job `config.xml`.
    pub fn post_config(
        &self,
        path: &str,
        body: impl Into<String>,
        options: RequestOptions,
    ) -> Result<HttpResponse, ApiError> {
        self.ensure_initialized()?;
        self.execute(
            self.pending(
                HttpMethod::Post,
                path,
                options,
                Some(XML_CONTENT_TYPE),
                Body::Raw(body.into()),
            ),
            AuthRetry::Allowed,
        )
    }

    fn ensure_initialized(&self) -> Result<(), ApiError> {
        match self.crumb.snapshot().0 {
            Some(_) => Ok(()),
            None => Err(ApiError::NotInitialized),
        }
    }

    fn pending(
        &self,
        method: HttpMethod,
        path: &str,
        options: RequestOptions,
        default_content_type: Option<&str>,
        body: Body,
    ) -> PendingRequest {
        PendingRequest {
            method,
            target: Target::Base(path.to_string()),
            headers: options.headers,
            content_type: options
                .content_type
                .or_else(|| default_content_type.map(str::to_string)),
            body,
        }
    }

    /// Caller must hold the refresh guard.
    fn fetch_crumb(&self) -> Result<Crumb, ApiError> {
        let pending = self.pending(
            HttpMethod::Get,
            CRUMB_ISSUER_PATH,
            RequestOptions::default(),
            None,
            Body::Empty,
        );
        let crumb = self
            .execute(pending, AuthRetry::Disabled)
            .and_then(|response| parse_crumb(&response.body))
            .map_err(|e| ApiError::CrumbUnavailable(Box::new(e)))?;
        let generation = self.crumb.replace(crumb.clone());
        debug!(field = %crumb.field, token = %crumb.token, generation, "refreshed crumb");
        Ok(crumb)
    }

    /// Refresh after an auth failure seen with crumb `generation`. If another
    /// caller replaced the crumb meanwhile, reuse theirs.
    fn refresh_after(&self, generation: u64) -> Result<(), ApiError> {
        let _guard = self.crumb.refresh_guard();
        if self.crumb.generation() != generation {
            debug!("crumb already refreshed by a concurrent request");
            return Ok(());
        }
        self.fetch_crumb().map(|_| ())
    }

    fn prepare(&self, pending: &PendingRequest) -> Result<Attempt, ApiError> {
        let (crumb, generation) = self.crumb.snapshot();
        let url = pending.normalized_target().resolve(self.config.base_url())?;

        let mut headers = vec![("Authorization".to_string(), self.config.authorization())];
        let caller_content_type = pending
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
        if let Some(content_type) = pending.content_type.as_ref().filter(|_| !caller_content_type) {
            headers.push(("Content-Type".to_string(), content_type.clone()));
        }
        if let Some(crumb) = &crumb {
            headers.push(crumb.header());
        }
        headers.extend(pending.headers.iter().cloned());

        let body = pending.body.encode(crumb.as_ref())?;
        Ok(Attempt {
            request: HttpRequest {
                method: pending.method,
                url,
                headers,
                body,
            },
            generation,
        })
    }

    fn send(&self, attempt: &Attempt) -> Result<HttpResponse, ApiError> {
        let request = &attempt.request;
        self.transport.send(request).map_err(|e| {
            error!(method = %request.method, url = %request.url, error = %e, "api invoke failed");
            e
        })
    }

    fn execute(&self, pending: PendingRequest, auth: AuthRetry) -> Result<HttpResponse, ApiError> {
        let attempt = self.prepare(&pending)?;
        let response = self.send(&attempt)?;
        if response.is_success() {
            return Ok(self.succeed(&attempt.request, response));
        }

        let retry = match classify(&attempt.request, &response, auth)? {
            Recovery::RefreshCrumb => {
                info!(
                    status = response.status,
                    url = %attempt.request.url,
                    "auth failure, refreshing crumb and retrying"
                );
                self.refresh_after(attempt.generation)?;
                PendingRequest {
                    target: Target::Origin(path_of(&attempt.request.url)?),
                    ..pending
                }
            }
            Recovery::RewritePath(path) => {
                info!(url = %response.url, retry_path = %path, "not found, retrying with json api suffix");
                PendingRequest {
                    target: Target::Origin(path),
                    ..pending
                }
            }
            Recovery::Fail => return Err(self.fail(&attempt.request, response)),
        };

        let attempt = self.prepare(&retry)?;
        let response = self.send(&attempt)?;
        if response.is_success() {
            Ok(self.succeed(&attempt.request, response))
        } else {
            Err(self.fail(&attempt.request, response))
        }
    }

    fn succeed(&self, request: &HttpRequest, response: HttpResponse) -> HttpResponse {
        debug!(url = %request.url, status = response.status, response = %response.body, "api response");
        response
    }

    fn fail(&self, request: &HttpRequest, response: HttpResponse) -> ApiError {
        error!(
            method = %request.method,
            url = %request.url,
            status = response.status,
            body = %response.body,
            "api invoke failed"
        );
        ApiError::Request {
            method: request.method,
            url: request.url.clone(),
            status: response.status,
            detail: extract_error_message(&response.body),
            body: response.body,
        }
    }
}

fn classify(
    request: &HttpRequest,
    response: &HttpResponse,
    auth: AuthRetry,
) -> Result<Recovery, ApiError> {
    match response.status {
        401 | 403 if auth == AuthRetry::Allowed => Ok(Recovery::RefreshCrumb),
        404 if request.method == HttpMethod::Get => {
            let served = if response.url.is_empty() {
                &request.url
            } else {
                &response.url
            };
            let path = path_of(served)?;
            if has_json_suffix(&path) {
                Ok(Recovery::Fail)
            } else {
                Ok(Recovery::RewritePath(normalize_json_path(&path)))
            }
        }
        _ => Ok(Recovery::Fail),
    }
}
