//! Request targets and JSON-API path normalization.

use url::Url;

use crate::error::ApiError;
use crate::http::HttpMethod;
use crate::payload::Body;

/// Suffix that asks Jenkins for the JSON representation of a resource.
pub const JSON_API_SUFFIX: &str = "/api/json";

/// Append `/api/json` to `path` unless it already carries it.
///
/// Only the path part is inspected; a query string is kept after the suffix.
/// A trailing `/` is folded into the suffix so `job/x/` becomes
/// `job/x/api/json`.
pub fn normalize_json_path(path: &str) -> String {
    let (path_part, query) = match path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path, None),
    };
    if has_json_suffix(path_part) {
        return path.to_string();
    }
    let mut out = path_part.trim_end_matches('/').to_string();
    out.push_str(JSON_API_SUFFIX);
    if let Some(q) = query {
        out.push('?');
        out.push_str(q);
    }
    out
}

/// Whether the path part of `path` already contains the JSON-API suffix.
pub fn has_json_suffix(path: &str) -> bool {
    let path_part = path.split_once('?').map_or(path, |(p, _)| p);
    path_part.contains(JSON_API_SUFFIX)
}

/// Where a pending request is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    /// Path appended to the configured base URL.
    Base(String),
    /// Path rooted at the server origin, base URL ignored.
    Origin(String),
}

impl Target {
    pub(crate) fn path(&self) -> &str {
        match self {
            Target::Base(p) | Target::Origin(p) => p,
        }
    }

    fn with_path(&self, path: String) -> Self {
        match self {
            Target::Base(_) => Target::Base(path),
            Target::Origin(_) => Target::Origin(path),
        }
    }

    /// Absolute URL for this target.
    pub(crate) fn resolve(&self, base_url: &str) -> Result<String, ApiError> {
        match self {
            Target::Base(path) => Ok(join(base_url, path)),
            Target::Origin(path) => {
                let base = Url::parse(base_url).map_err(|e| ApiError::InvalidUrl {
                    url: base_url.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(join(&base.origin().ascii_serialization(), path))
            }
        }
    }
}

fn join(root: &str, path: &str) -> String {
    let root = root.trim_end_matches('/');
    if path.is_empty() {
        root.to_string()
    } else if path.starts_with('/') {
        format!("{root}{path}")
    } else {
        format!("{root}/{path}")
    }
}

/// Path and query of an absolute URL, as the server saw it.
pub(crate) fn path_of(url: &str) -> Result<String, ApiError> {
    let parsed = Url::parse(url).map_err(|e| ApiError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    Ok(match parsed.query() {
        Some(q) => format!("{}?{q}", parsed.path()),
        None => parsed.path().to_string(),
    })
}

/// A call in flight. Lives for one `get`/`post`/`post_config` including its
/// single retry; the body stays unencoded so each attempt picks up the
/// current crumb.
#[derive(Debug, Clone)]
pub(crate) struct PendingRequest {
    pub method: HttpMethod,
    pub target: Target,
    pub headers: Vec<(String, String)>,
    pub content_type: Option<String>,
    pub body: Body,
}

impl PendingRequest {
    /// Target after normalization: GETs always ask for JSON.
    pub(crate) fn normalized_target(&self) -> Target {
        match self.method {
            HttpMethod::Get => self.target.with_path(normalize_json_path(self.target.path())),
            HttpMethod::Post => self.target.clone(),
        }
    }
}
