//! Error types for the ad library client.
//!
//! Transport and contract errors propagate to callers. Per-record navigation
//! failures are contained inside the extraction pipeline and never surface
//! here except through logs.

use crate::session::{HttpMethod, Params};
use serde_json::Value;
use std::fmt;

/// Convenience result alias used across the crate.
pub type Result<T> = std::result::Result<T, AdLibraryError>;

/// All errors produced by the ad library client.
#[derive(thiserror::Error, Debug)]
pub enum AdLibraryError {
    /// The platform answered with a non-2xx status.
    #[error(transparent)]
    Transport(#[from] Box<PlatformRequestError>),

    /// The HTTP call itself failed (connection, TLS, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("navigation to {url} timed out after {timeout_ms}ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    /// Interception proved media traffic existed but the document structure
    /// yielded no media element.
    #[error("creative structure not recognised for '{url}': {violation}")]
    ExtractionContract {
        url: String,
        violation: ContractViolation,
    },

    #[error("malformed page response: {0}")]
    MalformedPage(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Raised by the creative parser when a single-creative document resolves to
/// a status ad while the page requested media.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{} intercepted video(s) and {} intercepted image(s) but no media slot matched", .video_urls.len(), .image_urls.len())]
pub struct ContractViolation {
    pub video_urls: Vec<String>,
    pub image_urls: Vec<String>,
}

/// The request that produced a response, kept for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub method: HttpMethod,
    pub path: String,
    pub params: Params,
    pub headers: Params,
}

/// Error details reported by the Graph API in an `error` object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiErrorDetails {
    pub message: Option<String>,
    pub error_type: Option<String>,
    pub code: Option<i64>,
    pub error_subcode: Option<i64>,
    pub is_transient: bool,
    pub blame_field_specs: Option<Value>,
}

impl ApiErrorDetails {
    /// Parse the `error` object of a response body, if any.
    pub fn from_body(body: &Value) -> Option<Self> {
        let error = body.get("error")?;

        // error_data is sometimes a JSON-encoded string
        let error_data = match error.get("error_data") {
            Some(Value::String(raw)) => serde_json::from_str::<Value>(raw).ok(),
            Some(other) => Some(other.clone()),
            None => None,
        };

        Some(Self {
            message: error
                .get("message")
                .and_then(|m| m.as_str())
                .map(|s| s.to_string()),
            error_type: error
                .get("type")
                .and_then(|t| t.as_str())
                .map(|s| s.to_string()),
            code: error.get("code").and_then(|c| c.as_i64()),
            error_subcode: error.get("error_subcode").and_then(|c| c.as_i64()),
            is_transient: error
                .get("is_transient")
                .and_then(|t| t.as_bool())
                .unwrap_or(false),
            blame_field_specs: error_data
                .as_ref()
                .and_then(|d| d.get("blame_field_specs"))
                .cloned(),
        })
    }
}

/// A platform request that completed with a failure status.
#[derive(Debug, Clone)]
pub struct PlatformRequestError {
    pub message: String,
    pub request: RequestContext,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Response body, parsed as JSON when possible.
    pub body: Value,
    pub api_error: Option<ApiErrorDetails>,
}

impl PlatformRequestError {
    pub fn new(
        message: impl Into<String>,
        request: RequestContext,
        status: u16,
        headers: Vec<(String, String)>,
        raw_body: &str,
    ) -> Self {
        let body = serde_json::from_str::<Value>(raw_body)
            .unwrap_or_else(|_| Value::String(raw_body.to_string()));
        let api_error = ApiErrorDetails::from_body(&body);
        Self {
            message: message.into(),
            request,
            status,
            headers,
            body,
            api_error,
        }
    }

    /// Whether the platform flagged the failure as transient.
    pub fn is_transient(&self) -> bool {
        self.api_error.as_ref().is_some_and(|e| e.is_transient)
    }
}

/// Params that must never be printed.
const SECRET_PARAMS: &[&str] = &["access_token", "appsecret_proof"];

impl fmt::Display for PlatformRequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .request
            .params
            .iter()
            .map(|(k, v)| {
                if SECRET_PARAMS.contains(&k.as_str()) {
                    format!("{k}=<redacted>")
                } else {
                    format!("{k}={v}")
                }
            })
            .collect();
        let body = serde_json::to_string_pretty(&self.body)
            .unwrap_or_default()
            .replace('\n', "\n    ");

        writeln!(f)?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Method:  {}", self.request.method)?;
        writeln!(f, "  Path:    {}", self.request.path)?;
        writeln!(f, "  Params:  {}", params.join("&"))?;
        writeln!(f)?;
        writeln!(f, "  Status:  {}", self.status)?;
        write!(f, "  Response:\n    {body}")
    }
}

impl std::error::Error for PlatformRequestError {}

impl From<PlatformRequestError> for AdLibraryError {
    fn from(err: PlatformRequestError) -> Self {
        AdLibraryError::Transport(Box::new(err))
    }
}
