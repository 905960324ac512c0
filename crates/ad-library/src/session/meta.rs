//! Graph API session: access token plus optional app secret proof.

use super::{ApiSession, HttpMethod, HttpResponse, Params, SessionConfig, SessionProvider};
use crate::error::{AdLibraryError, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Session for the Meta Graph API.
#[derive(Clone)]
pub struct MetaGraphSession {
    inner: ApiSession,
    access_token: String,
    app_secret: Option<String>,
}

impl MetaGraphSession {
    pub fn new(
        access_token: impl Into<String>,
        app_secret: Option<String>,
        config: SessionConfig,
    ) -> Result<Self> {
        let access_token = access_token.into();
        if access_token.trim().is_empty() {
            return Err(AdLibraryError::Config(
                "an access token is required to query the Graph API".to_string(),
            ));
        }

        Ok(Self {
            inner: ApiSession::new(config)?,
            access_token,
            app_secret: app_secret.filter(|s| !s.is_empty()),
        })
    }
}

/// `hex(HMAC-SHA256(key = app_secret, message = access_token))`.
pub fn appsecret_proof(app_secret: &str, access_token: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(app_secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(access_token.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[async_trait]
impl SessionProvider for MetaGraphSession {
    fn authenticate(&mut self) {
        let mut params = Params::from([("access_token".to_string(), self.access_token.clone())]);
        if let Some(secret) = &self.app_secret {
            params.insert(
                "appsecret_proof".to_string(),
                appsecret_proof(secret, &self.access_token),
            );
        }
        self.inner.update_params(params);
    }

    fn params(&self) -> &Params {
        self.inner.params()
    }

    fn update_params(&mut self, params: Params) {
        self.inner.update_params(params);
    }

    fn clean_params(&mut self) {
        self.inner.clean_params();
    }

    fn headers(&self) -> &Params {
        self.inner.headers()
    }

    fn update_headers(&mut self, headers: Params) {
        self.inner.update_headers(headers);
    }

    async fn execute(&self, method: HttpMethod, url: &str) -> Result<HttpResponse> {
        self.inner.execute(method, url).await
    }

    fn duplicate(&self) -> Box<dyn SessionProvider> {
        Box::new(self.clone())
    }
}
