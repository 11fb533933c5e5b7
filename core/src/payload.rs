//! Request bodies and per-call options.
//!
//! # Design
//! Jenkins form posts optionally carry a `json` field holding a serialized
//! object that must include the crumb. `Payload::JsonEnvelope` makes that
//! case explicit, so crumb injection works on a typed branch instead of
//! probing for a field.

use serde_json::{Map, Value};
use url::form_urlencoded;

use crate::crumb::Crumb;
use crate::error::ApiError;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
pub const XML_CONTENT_TYPE: &str = "text/xml";

/// Body of a `post` call.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Plain form fields.
    Form(Vec<(String, String)>),
    /// Form fields plus a `json` field built from `json`, with the crumb
    /// injected before it is serialized.
    JsonEnvelope {
        fields: Vec<(String, String)>,
        json: Map<String, Value>,
    },
}

impl Payload {
    pub fn form<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Payload::Form(fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Envelope with no extra form fields.
    pub fn json(json: Map<String, Value>) -> Self {
        Payload::JsonEnvelope {
            fields: Vec::new(),
            json,
        }
    }

    /// Form-encode the payload, injecting `crumb` into the json envelope.
    pub fn encode(&self, crumb: Option<&Crumb>) -> Result<String, ApiError> {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        match self {
            Payload::Form(fields) => {
                serializer.extend_pairs(fields);
            }
            Payload::JsonEnvelope { fields, json } => {
                let mut json = json.clone();
                if let Some(crumb) = crumb {
                    json.insert(crumb.field.clone(), Value::String(crumb.token.clone()));
                }
                let json = serde_json::to_string(&json)
                    .map_err(|e| ApiError::Serialization(e.to_string()))?;
                serializer.extend_pairs(fields);
                serializer.append_pair("json", &json);
            }
        }
        Ok(serializer.finish())
    }
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Form(Vec::new())
    }
}

/// Body kept on a pending request.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Body {
    Empty,
    Form(Payload),
    Raw(String),
}

impl Body {
    pub(crate) fn encode(&self, crumb: Option<&Crumb>) -> Result<Option<String>, ApiError> {
        match self {
            Body::Empty => Ok(None),
            Body::Form(payload) => payload.encode(crumb).map(Some),
            Body::Raw(raw) => Ok(Some(raw.clone())),
        }
    }
}

/// Per-call overrides.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Replaces the operation's default content type.
    pub content_type: Option<String>,
    /// Extra headers, sent alongside the crumb.
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}
