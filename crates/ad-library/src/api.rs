//! Query facade over the Ad Library API.

use crate::config::{resolve_api_version, Platform};
use crate::cursor::ResultCursor;
use crate::error::{PlatformRequestError, RequestContext, Result};
use crate::extraction::ExtractionPipeline;
use crate::session::{HttpMethod, HttpResponse, Params, SessionProvider};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// `User-Agent` sent with every query issued through [`AdLibraryApi::call`].
pub const USER_AGENT: &str = concat!("AdLibrary/", env!("CARGO_PKG_VERSION"));

// ── Responses ───────────────────────────────────────────────────────────────

/// A completed platform call and the request that produced it.
#[derive(Debug, Clone)]
pub struct PlatformResponse {
    body: String,
    status: u16,
    headers: Vec<(String, String)>,
    request: RequestContext,
}

impl PlatformResponse {
    pub fn new(response: HttpResponse, request: RequestContext) -> Self {
        Self {
            body: response.body,
            status: response.status,
            headers: response.headers,
            request,
        }
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// The body as JSON, or as a JSON string when it does not parse.
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or_else(|_| Value::String(self.body.clone()))
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    pub fn raise_for_status(&self) -> Result<()> {
        if self.is_success() {
            return Ok(());
        }
        Err(PlatformRequestError::new(
            "Call was not successful",
            self.request.clone(),
            self.status,
            self.headers.clone(),
            &self.body,
        )
        .into())
    }
}

/// Request counters shared by an API facade and its cursors.
#[derive(Debug, Default)]
pub struct RequestStats {
    attempted: AtomicUsize,
    succeeded: AtomicUsize,
}

impl RequestStats {
    pub fn attempted(&self) -> usize {
        self.attempted.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::Relaxed)
    }
}

/// Method and URL of one query, callable with any session.
#[derive(Debug, Clone)]
pub struct QueryEndpoint {
    pub method: HttpMethod,
    pub url: String,
    stats: Arc<RequestStats>,
}

impl QueryEndpoint {
    pub fn new(method: HttpMethod, url: impl Into<String>, stats: Arc<RequestStats>) -> Self {
        Self {
            method,
            url: url.into(),
            stats,
        }
    }

    /// Execute the query with `session`'s params and headers. Failure
    /// statuses are returned, not raised.
    pub async fn call(&self, session: &dyn SessionProvider) -> Result<PlatformResponse> {
        self.stats.attempted.fetch_add(1, Ordering::Relaxed);

        let response = session.execute(self.method, &self.url).await?;
        let request = RequestContext {
            method: self.method,
            path: self.url.clone(),
            params: session.params().clone(),
            headers: session.headers().clone(),
        };
        let response = PlatformResponse::new(response, request);

        if response.is_success() {
            self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
        }
        debug!(status = response.status(), url = %self.url, "query answered");
        Ok(response)
    }
}

// ── Query ───────────────────────────────────────────────────────────────────

/// Encode payload values as request params.
///
/// Strings are sent raw and numbers in their decimal form. Booleans, arrays
/// and objects are sent as compact JSON with sorted keys. Nulls are dropped.
pub fn encode_top_level_params(payload: &Map<String, Value>) -> Params {
    payload
        .iter()
        .filter_map(|(key, value)| {
            let encoded = match value {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                other => other.to_string(),
            };
            Some((key.clone(), encoded))
        })
        .collect()
}

/// One Ad Library search: platform, API version, HTTP method and payload.
#[derive(Debug, Clone)]
pub struct AdLibraryQuery {
    platform: Platform,
    api_version: String,
    method: HttpMethod,
    payload: Map<String, Value>,
    base_url: Option<String>,
}

impl AdLibraryQuery {
    /// A GET query against the platform's latest supported version.
    pub fn new(platform: Platform, payload: Map<String, Value>) -> Self {
        Self {
            platform,
            api_version: platform.default_api_version().to_string(),
            method: HttpMethod::Get,
            payload,
            base_url: None,
        }
    }

    pub fn with_api_version(mut self, version: &str) -> Result<Self> {
        self.set_api_version(version)?;
        Ok(self)
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Query a different host than the platform's, e.g. a local mock.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn set_api_version(&mut self, version: &str) -> Result<()> {
        self.api_version = resolve_api_version(version, self.platform.default_api_version())?;
        Ok(())
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn final_url(&self) -> String {
        let base = self
            .base_url
            .as_deref()
            .unwrap_or_else(|| self.platform.base_url())
            .trim_end_matches('/');
        format!("{base}/{}/{}", self.api_version, self.platform.endpoint())
    }
}

// ── Facade ──────────────────────────────────────────────────────────────────

/// Authenticated entry point: runs a query and hands out result cursors.
pub struct AdLibraryApi {
    session: Box<dyn SessionProvider>,
    query: AdLibraryQuery,
    pipeline: Option<Arc<ExtractionPipeline>>,
    stats: Arc<RequestStats>,
}

impl AdLibraryApi {
    /// Wrap `session`, authenticating it for `query`.
    pub fn new(mut session: Box<dyn SessionProvider>, query: AdLibraryQuery) -> Self {
        session.authenticate();
        Self {
            session,
            query,
            pipeline: None,
            stats: Arc::new(RequestStats::default()),
        }
    }

    /// Attach creative data to every record delivered by cursors.
    pub fn with_pipeline(mut self, pipeline: Arc<ExtractionPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn session(&self) -> &dyn SessionProvider {
        self.session.as_ref()
    }

    pub fn query(&self) -> &AdLibraryQuery {
        &self.query
    }

    pub fn api_version(&self) -> &str {
        self.query.api_version()
    }

    pub fn update_api_version(&mut self, version: &str) -> Result<()> {
        self.query.set_api_version(version)
    }

    pub fn http_method(&self) -> HttpMethod {
        self.query.method()
    }

    pub fn update_http_method(&mut self, method: HttpMethod) {
        self.query.method = method;
    }

    pub fn payload(&self) -> &Map<String, Value> {
        self.query.payload()
    }

    /// Start over with a new payload, keeping version, method and host.
    pub fn reload_payload(&mut self, payload: Map<String, Value>) {
        self.session.clean_params();
        self.session.authenticate();
        self.query.payload = payload;
    }

    pub fn requests_attempted(&self) -> usize {
        self.stats.attempted()
    }

    pub fn requests_succeeded(&self) -> usize {
        self.stats.succeeded()
    }

    fn endpoint(&self) -> QueryEndpoint {
        QueryEndpoint::new(self.query.method(), self.query.final_url(), Arc::clone(&self.stats))
    }

    /// Call the query endpoint.
    ///
    /// Without an explicit session, the main session is used after merging
    /// the default headers and the encoded payload into it.
    pub async fn call(&mut self, session: Option<&dyn SessionProvider>) -> Result<PlatformResponse> {
        let endpoint = self.endpoint();
        match session {
            Some(session) => endpoint.call(session).await,
            None => {
                self.session.update_headers(Params::from([(
                    "User-Agent".to_string(),
                    USER_AGENT.to_string(),
                )]));
                self.session
                    .update_params(encode_top_level_params(self.query.payload()));
                endpoint.call(self.session.as_ref()).await
            }
        }
    }

    /// Run the query and return a cursor over every result page.
    pub async fn results(&mut self) -> Result<ResultCursor> {
        let response = self.call(None).await?;
        response.raise_for_status()?;

        ResultCursor::new(
            self.session.as_ref(),
            Arc::new(self.endpoint()),
            self.pipeline.clone(),
            response.json(),
        )
        .await
    }
}
