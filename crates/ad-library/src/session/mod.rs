//! Query sessions: the seam between the paged cursor and the HTTP transport.
//!
//! A [`SessionProvider`] carries the accumulated query params and headers of
//! one logical query. Cursors never share a session: each one works on its
//! own [`SessionProvider::duplicate`] so that writing the `after` token into
//! its params cannot leak into sibling cursors.

pub mod http;
pub mod meta;

pub use http::{ApiSession, SessionConfig};
pub use meta::MetaGraphSession;

use crate::error::{AdLibraryError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Query params or headers, kept sorted for stable request rendering.
pub type Params = BTreeMap<String, String>;

/// Raw response of one HTTP call.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Requested URL.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Response body as text.
    pub body: String,
}

/// Available HTTP methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 9] = [
        HttpMethod::Get,
        HttpMethod::Head,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Connect,
        HttpMethod::Options,
        HttpMethod::Trace,
        HttpMethod::Patch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Connect => "CONNECT",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Patch => "PATCH",
        }
    }

    /// Whether params travel in the query string rather than the body.
    pub fn sends_query_params(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Head | HttpMethod::Delete)
    }

    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Connect => reqwest::Method::CONNECT,
            HttpMethod::Options => reqwest::Method::OPTIONS,
            HttpMethod::Trace => reqwest::Method::TRACE,
            HttpMethod::Patch => reqwest::Method::PATCH,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = AdLibraryError;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        HttpMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == upper)
            .ok_or_else(|| {
                let valid: Vec<&str> = HttpMethod::ALL.iter().map(|m| m.as_str()).collect();
                AdLibraryError::Config(format!(
                    "{s} is not a valid HTTP method; expected one of {}",
                    valid.join(", ")
                ))
            })
    }
}

/// An authenticated query session.
///
/// Implementations own their params and headers. `duplicate` must return an
/// independent session with identical configuration: mutating the copy never
/// affects the original.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Write authentication params (tokens, proofs) into the session.
    fn authenticate(&mut self);

    fn params(&self) -> &Params;

    /// Merge `params` into the session params, overwriting existing keys.
    fn update_params(&mut self, params: Params);

    fn clean_params(&mut self);

    fn headers(&self) -> &Params;

    /// Merge `headers` into the session headers, overwriting existing keys.
    fn update_headers(&mut self, headers: Params);

    /// Execute one request with the current params and headers.
    async fn execute(&self, method: HttpMethod, url: &str) -> Result<HttpResponse>;

    /// Fork an independent session with identical configuration.
    fn duplicate(&self) -> Box<dyn SessionProvider>;
}
