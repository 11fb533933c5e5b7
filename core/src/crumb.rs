//! CSRF crumb parsing and storage.
//!
//! # Design
//! The store holds the current crumb together with a generation number that
//! increments on every replacement. A request records the generation it was
//! sent with; when it comes back 401/403 the client refreshes only if nobody
//! else has replaced the crumb since. Refreshes are serialized through a
//! separate guard so concurrent auth failures share one fetch.

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::Deserialize;

use crate::error::ApiError;

/// Path of the crumb issuer, relative to the base URL.
pub const CRUMB_ISSUER_PATH: &str = "/crumbIssuer/api/json";

/// A single `field name -> token` pair sent as a request header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crumb {
    pub field: String,
    pub token: String,
}

impl Crumb {
    pub fn new(field: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            token: token.into(),
        }
    }

    /// The crumb as a header pair.
    pub fn header(&self) -> (String, String) {
        (self.field.clone(), self.token.clone())
    }
}

#[derive(Deserialize)]
struct CrumbIssuerBody {
    #[serde(rename = "crumbRequestField")]
    field: String,
    crumb: String,
}

/// Parse a crumb issuer body. Some servers (and proxies) hand back the JSON
/// object encoded as a JSON string, which is unwrapped first.
pub fn parse_crumb(body: &str) -> Result<Crumb, ApiError> {
    let mut value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| ApiError::Deserialization(e.to_string()))?;
    if let serde_json::Value::String(inner) = value {
        value = serde_json::from_str(&inner).map_err(|e| ApiError::Deserialization(e.to_string()))?;
    }
    let parsed: CrumbIssuerBody =
        serde_json::from_value(value).map_err(|e| ApiError::Deserialization(e.to_string()))?;
    if parsed.field.is_empty() || parsed.crumb.is_empty() {
        return Err(ApiError::Deserialization(
            "crumb issuer returned an empty crumb".to_string(),
        ));
    }
    Ok(Crumb::new(parsed.field, parsed.crumb))
}

#[derive(Debug, Default)]
struct Slot {
    crumb: Option<Crumb>,
    generation: u64,
}

/// Current crumb plus the refresh guard.
#[derive(Debug, Default)]
pub(crate) struct CrumbStore {
    slot: RwLock<Slot>,
    refresh: Mutex<()>,
}

impl CrumbStore {
    /// Current crumb and the generation it belongs to.
    pub(crate) fn snapshot(&self) -> (Option<Crumb>, u64) {
        let slot = self.slot.read();
        (slot.crumb.clone(), slot.generation)
    }

    pub(crate) fn generation(&self) -> u64 {
        self.slot.read().generation
    }

    /// Replace the crumb wholesale and bump the generation.
    pub(crate) fn replace(&self, crumb: Crumb) -> u64 {
        let mut slot = self.slot.write();
        slot.crumb = Some(crumb);
        slot.generation += 1;
        slot.generation
    }

    /// Serialize refreshes. Holders check `generation()` against what they
    /// saw before fetching.
    pub(crate) fn refresh_guard(&self) -> MutexGuard<'_, ()> {
        self.refresh.lock()
    }
}
