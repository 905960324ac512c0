//! reqwest-backed query session.
//!
//! Handles redirects, timeouts, retry on 5xx and backoff on 429. Params are
//! sent as the query string for GET/HEAD/DELETE and as a form body otherwise.

use super::{HttpMethod, HttpResponse, Params, SessionProvider};
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Statuses retried with exponential backoff.
const RETRY_STATUSES: [u16; 4] = [500, 502, 503, 504];

/// Upper bound on a server-provided `retry-after` delay.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(10);

/// Transport configuration shared by a session and all of its duplicates.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Per-request timeout. `None` leaves reqwest's default (no timeout).
    pub timeout: Option<Duration>,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `backoff_factor * 2^(n-1)`.
    pub backoff_factor: Duration,
    /// Headers every request starts with.
    pub default_headers: Params,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            max_retries: 5,
            backoff_factor: Duration::from_secs(1),
            default_headers: Params::from([
                ("Accept".to_string(), "application/json".to_string()),
                ("Content-Type".to_string(), "application/json".to_string()),
            ]),
        }
    }
}

/// Generic query session: params + headers over a shared reqwest client.
#[derive(Clone)]
pub struct ApiSession {
    client: reqwest::Client,
    config: SessionConfig,
    params: Params,
    headers: Params,
}

impl ApiSession {
    pub fn new(config: SessionConfig) -> Result<Self> {
        let mut builder =
            reqwest::Client::builder().redirect(reqwest::redirect::Policy::limited(5));
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        debug!(
            max_retries = config.max_retries,
            timeout_ms = config.timeout.map(|t| t.as_millis() as u64),
            "new API session"
        );

        Ok(Self {
            client,
            headers: config.default_headers.clone(),
            config,
            params: Params::new(),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn backoff(&self, retries: u32) -> Duration {
        self.config.backoff_factor * 2u32.saturating_pow(retries.saturating_sub(1))
    }

    async fn send_once(
        &self,
        method: HttpMethod,
        url: &str,
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let mut request = self.client.request(method.to_reqwest(), url);

        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        if !self.params.is_empty() {
            request = if method.sends_query_params() {
                request.query(&self.params)
            } else {
                request.form(&self.params)
            };
        }

        request.send().await
    }
}

#[async_trait]
impl SessionProvider for ApiSession {
    fn authenticate(&mut self) {}

    fn params(&self) -> &Params {
        &self.params
    }

    fn update_params(&mut self, params: Params) {
        if !params.is_empty() {
            self.params.extend(params);
        }
    }

    fn clean_params(&mut self) {
        self.params.clear();
    }

    fn headers(&self) -> &Params {
        &self.headers
    }

    fn update_headers(&mut self, headers: Params) {
        if !headers.is_empty() {
            self.headers.extend(headers);
        }
    }

    async fn execute(&self, method: HttpMethod, url: &str) -> Result<HttpResponse> {
        let mut retries = 0u32;

        loop {
            match self.send_once(method, url).await {
                Ok(r) => {
                    let status = r.status().as_u16();

                    // Retry on 5xx
                    if RETRY_STATUSES.contains(&status) && retries < self.config.max_retries {
                        retries += 1;
                        let delay = self.backoff(retries);
                        warn!(status, retries, url, "server error, retrying in {delay:?}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    // Backoff on 429
                    if status == 429 && retries < self.config.max_retries {
                        retries += 1;
                        let delay = r
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .map(Duration::from_secs)
                            .unwrap_or_else(|| self.backoff(retries))
                            .min(MAX_RETRY_AFTER);
                        warn!(retries, url, "rate limited, retrying in {delay:?}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    let final_url = r.url().to_string();
                    let headers: Vec<(String, String)> = r
                        .headers()
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                        .collect();
                    let body = r.text().await?;

                    debug!(status, %method, url, "request complete");

                    return Ok(HttpResponse {
                        url: url.to_string(),
                        final_url,
                        status,
                        headers,
                        body,
                    });
                }
                Err(e) => {
                    if retries < self.config.max_retries && !e.is_builder() {
                        retries += 1;
                        let delay = self.backoff(retries);
                        warn!(retries, url, "request failed ({e}), retrying in {delay:?}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
    }

    fn duplicate(&self) -> Box<dyn SessionProvider> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_creation_applies_default_headers() {
        let session = ApiSession::new(SessionConfig::default()).unwrap();
        assert_eq!(
            session.headers().get("Accept").map(String::as_str),
            Some("application/json")
        );
        assert!(session.params().is_empty());
    }

    #[test]
    fn test_backoff_doubles() {
        let session = ApiSession::new(SessionConfig {
            backoff_factor: Duration::from_millis(100),
            ..SessionConfig::default()
        })
        .unwrap();
        assert_eq!(session.backoff(1), Duration::from_millis(100));
        assert_eq!(session.backoff(2), Duration::from_millis(200));
        assert_eq!(session.backoff(4), Duration::from_millis(800));
    }

    #[test]
    fn test_duplicate_is_independent() {
        let mut original = ApiSession::new(SessionConfig::default()).unwrap();
        original.update_params(Params::from([("q".to_string(), "shoes".to_string())]));

        let mut copy = original.duplicate();
        copy.update_params(Params::from([("after".to_string(), "X".to_string())]));
        copy.update_headers(Params::from([("X-Trace".to_string(), "1".to_string())]));

        assert_eq!(copy.params().get("q").map(String::as_str), Some("shoes"));
        assert!(original.params().get("after").is_none());
        assert!(original.headers().get("X-Trace").is_none());
    }

    #[test]
    fn test_clean_params() {
        let mut session = ApiSession::new(SessionConfig::default()).unwrap();
        session.update_params(Params::from([("q".to_string(), "shoes".to_string())]));
        session.clean_params();
        assert!(session.params().is_empty());
    }
}
