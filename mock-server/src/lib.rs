//! An in-memory stand-in for the Jenkins endpoints the client talks to.
//!
//! Enforces basic auth on every routed endpoint and a valid crumb header on
//! every POST, and answers errors with Jenkins-style HTML pages so error
//! extraction can be exercised end-to-end.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use uuid::Uuid;

pub const CRUMB_FIELD: &str = "Jenkins-Crumb";
pub const DEFAULT_USER: &str = "admin";
pub const DEFAULT_API_TOKEN: &str = "11aa22bb33cc44dd";

/// A job as served by `/job/{name}/api/json`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Job {
    pub name: String,
    pub url: String,
    #[serde(rename = "nextBuildNumber")]
    pub next_build_number: u32,
}

#[derive(Debug)]
struct Inner {
    username: String,
    api_token: String,
    crumb: String,
    crumb_requests: usize,
    crumb_as_string: bool,
    csrf_enabled: bool,
    jobs: BTreeMap<String, String>,
    builds: HashMap<String, u32>,
    build_parameters: HashMap<String, Value>,
    requests: Vec<String>,
}

/// Shared server state. Clones refer to the same server.
#[derive(Clone, Debug)]
pub struct MockJenkins {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MockJenkins {
    fn default() -> Self {
        Self::new(DEFAULT_USER, DEFAULT_API_TOKEN)
    }
}

impl MockJenkins {
    pub fn new(username: &str, api_token: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                username: username.to_string(),
                api_token: api_token.to_string(),
                crumb: new_crumb(),
                crumb_requests: 0,
                crumb_as_string: false,
                csrf_enabled: true,
                jobs: BTreeMap::new(),
                builds: HashMap::new(),
                build_parameters: HashMap::new(),
                requests: Vec::new(),
            })),
        }
    }

    pub fn with_job(self, name: &str, config: &str) -> Self {
        self.inner.lock().jobs.insert(name.to_string(), config.to_string());
        self
    }

    pub fn crumb(&self) -> String {
        self.inner.lock().crumb.clone()
    }

    /// Invalidate the current crumb, as a Jenkins restart or session expiry
    /// would. Returns the new one.
    pub fn rotate_crumb(&self) -> String {
        let mut inner = self.inner.lock();
        inner.crumb = new_crumb();
        inner.crumb.clone()
    }

    pub fn crumb_requests(&self) -> usize {
        self.inner.lock().crumb_requests
    }

    /// Serve the crumb issuer body as a JSON-encoded string.
    pub fn set_crumb_as_string(&self, enabled: bool) {
        self.inner.lock().crumb_as_string = enabled;
    }

    /// With CSRF protection off the crumb issuer answers 404 and POSTs no
    /// longer require a crumb.
    pub fn set_csrf_enabled(&self, enabled: bool) {
        self.inner.lock().csrf_enabled = enabled;
    }

    pub fn job_config(&self, name: &str) -> Option<String> {
        self.inner.lock().jobs.get(name).cloned()
    }

    pub fn build_count(&self, name: &str) -> u32 {
        self.inner.lock().builds.get(name).copied().unwrap_or(0)
    }

    pub fn last_build_parameters(&self, name: &str) -> Option<Value> {
        self.inner.lock().build_parameters.get(name).cloned()
    }

    /// `METHOD /path?query` for every request received, in order.
    pub fn requests(&self) -> Vec<String> {
        self.inner.lock().requests.clone()
    }

    fn accepts(&self, credentials: &str) -> bool {
        let inner = self.inner.lock();
        credentials.split_once(':') == Some((inner.username.as_str(), inner.api_token.as_str()))
    }

    fn check_crumb(&self, headers: &HeaderMap) -> Result<(), Response> {
        let inner = self.inner.lock();
        if !inner.csrf_enabled {
            return Ok(());
        }
        let sent = headers.get(CRUMB_FIELD).and_then(|v| v.to_str().ok());
        if sent == Some(inner.crumb.as_str()) {
            Ok(())
        } else {
            Err(error_page(
                StatusCode::FORBIDDEN,
                "No valid crumb was included in the request",
            ))
        }
    }
}

fn new_crumb() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Jenkins-style HTML error page.
pub fn error_page(status: StatusCode, description: &str) -> Response {
    let body = format!(
        "<html><head><title>Error {code}</title></head><body>\n\
         <h1>Oops!</h1>\n\
         <div id=\"error-description\">\n<h2>{description}</h2>\n</div>\n\
         </body></html>",
        code = status.as_u16(),
    );
    (status, [(header::CONTENT_TYPE, "text/html;charset=utf-8")], body).into_response()
}

pub fn app(state: MockJenkins) -> Router {
    Router::new()
        .route("/crumbIssuer/api/json", get(crumb_issuer))
        .route("/api/json", get(list_jobs))
        .route("/job/{name}/api/json", get(get_job))
        .route("/view/{view}/job/{name}/api/json", get(view_alias))
        .route("/job/{name}/build", post(build_job))
        .route("/job/{name}/config.xml", post(update_config))
        .route("/createItem", post(create_item))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_basic_auth))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), record_request))
        .with_state(state)
}

pub async fn run(listener: TcpListener, state: MockJenkins) -> Result<(), std::io::Error> {
    axum::serve(listener, app(state)).await
}

async fn record_request(State(state): State<MockJenkins>, request: Request, next: Next) -> Response {
    let line = format!("{} {}", request.method(), request.uri());
    tracing::debug!(request = %line, "mock jenkins");
    state.inner.lock().requests.push(line);
    next.run(request).await
}

async fn require_basic_auth(
    State(state): State<MockJenkins>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|v| STANDARD.decode(v).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .is_some_and(|credentials| state.accepts(&credentials));
    if !authorized {
        let mut response = error_page(StatusCode::UNAUTHORIZED, "Authentication required");
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            header::HeaderValue::from_static("Basic realm=\"Jenkins\""),
        );
        return response;
    }
    next.run(request).await
}

async fn not_found() -> Response {
    error_page(StatusCode::NOT_FOUND, "Not Found")
}

async fn crumb_issuer(State(state): State<MockJenkins>) -> Response {
    let mut inner = state.inner.lock();
    if !inner.csrf_enabled {
        return error_page(StatusCode::NOT_FOUND, "Not Found");
    }
    inner.crumb_requests += 1;
    let body = json!({
        "_class": "hudson.security.csrf.DefaultCrumbIssuer",
        "crumb": inner.crumb,
        "crumbRequestField": CRUMB_FIELD,
    });
    if inner.crumb_as_string {
        Json(Value::String(body.to_string())).into_response()
    } else {
        Json(body).into_response()
    }
}

async fn list_jobs(State(state): State<MockJenkins>) -> Json<Value> {
    let inner = state.inner.lock();
    let jobs: Vec<Value> = inner
        .jobs
        .keys()
        .map(|name| json!({ "name": name, "url": format!("/job/{name}/") }))
        .collect();
    Json(json!({ "mode": "NORMAL", "jobs": jobs }))
}

async fn get_job(State(state): State<MockJenkins>, Path(name): Path<String>) -> Response {
    let inner = state.inner.lock();
    if !inner.jobs.contains_key(&name) {
        return error_page(StatusCode::NOT_FOUND, &format!("No such job: {name}"));
    }
    let builds = inner.builds.get(&name).copied().unwrap_or(0);
    Json(Job {
        url: format!("/job/{name}/"),
        name,
        next_build_number: builds + 1,
    })
    .into_response()
}

/// Views alias their jobs; the alias redirects to the job page itself.
async fn view_alias(Path((_view, name)): Path<(String, String)>) -> Redirect {
    Redirect::to(&format!("/job/{name}/"))
}

async fn build_job(
    State(state): State<MockJenkins>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    if let Err(response) = state.check_crumb(&headers) {
        return response;
    }
    let mut inner = state.inner.lock();
    if !inner.jobs.contains_key(&name) {
        return error_page(StatusCode::NOT_FOUND, &format!("No such job: {name}"));
    }
    if let Some(raw) = form.get("json") {
        let parameters: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "message": format!("malformed json field: {e}") })),
                )
                    .into_response()
            }
        };
        let carried = parameters.get(CRUMB_FIELD).and_then(Value::as_str);
        if inner.csrf_enabled && carried != Some(inner.crumb.as_str()) {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": "json payload does not carry a valid crumb" })),
            )
                .into_response();
        }
        inner.build_parameters.insert(name.clone(), parameters);
    }
    *inner.builds.entry(name).or_insert(0) += 1;
    StatusCode::CREATED.into_response()
}

#[derive(Deserialize)]
struct CreateItemQuery {
    name: String,
}

async fn create_item(
    State(state): State<MockJenkins>,
    Query(query): Query<CreateItemQuery>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if let Err(response) = state.check_crumb(&headers) {
        return response;
    }
    if !is_xml(&headers) {
        return (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Json(json!({ "message": "config must be posted as xml" })),
        )
            .into_response();
    }
    let mut inner = state.inner.lock();
    if inner.jobs.contains_key(&query.name) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": format!("A job already exists with the name '{}'", query.name) })),
        )
            .into_response();
    }
    inner.jobs.insert(query.name, body);
    StatusCode::OK.into_response()
}

async fn update_config(
    State(state): State<MockJenkins>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if let Err(response) = state.check_crumb(&headers) {
        return response;
    }
    let mut inner = state.inner.lock();
    match inner.jobs.get_mut(&name) {
        Some(config) => {
            *config = body;
            StatusCode::OK.into_response()
        }
        None => error_page(StatusCode::NOT_FOUND, &format!("No such job: {name}")),
    }
}

fn is_xml(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("xml"))
}
