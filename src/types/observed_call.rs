use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;

/// Body of an observed call. Only text bodies are ever captured; anything
/// else (form data objects, blobs, absent bodies) is carried as raw JSON.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CallBody {
    Text(String),
    Other(serde_json::Value),
}

impl Default for CallBody {
    fn default() -> Self {
        CallBody::Other(serde_json::Value::Null)
    }
}

impl CallBody {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CallBody::Text(s) => Some(s),
            CallBody::Other(_) => None,
        }
    }
}

/// An outbound call reported by the network hook, as `(url, method, body)`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ObservedCall {
    pub url: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub body: CallBody,
    /// When the hook saw the call, if it recorded one (Unix milliseconds).
    #[serde(
        default,
        rename = "timestamp",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub observed_at: Option<DateTime<Utc>>,
}

impl ObservedCall {
    pub fn new(url: impl Into<String>, method: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Some(method.into()),
            body: CallBody::Text(body.into()),
            observed_at: None,
        }
    }

    /// The hook layer only forwards POST calls with a text body.
    pub fn is_capturable(&self) -> bool {
        let is_post = self
            .method
            .as_deref()
            .map_or(false, |m| m.eq_ignore_ascii_case("POST"));
        is_post && self.body.as_text().is_some()
    }
}

/// Snapshot of the page the calls are observed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    /// Full location of the page (`location.href`); used as the referer.
    pub location: Url,
    pub user_agent: String,
    pub accept_language: String,
}

impl PageContext {
    pub fn new(
        location: Url,
        user_agent: impl Into<String>,
        accept_language: impl Into<String>,
    ) -> Self {
        Self {
            location,
            user_agent: user_agent.into(),
            accept_language: accept_language.into(),
        }
    }

    pub fn origin(&self) -> String {
        self.location.origin().ascii_serialization()
    }

    /// Resolve a possibly relative call URL against the page origin.
    ///
    /// Anything that does not start with `http` is treated as origin-relative.
    pub fn absolute_url(&self, raw: &str) -> String {
        if raw.starts_with("http") {
            raw.to_string()
        } else {
            format!("{}{}", self.origin(), raw)
        }
    }
}
