//! Chromium-backed browser capabilities using chromiumoxide.

use super::interceptor::{RequestVerdict, TrafficInterceptor};
use super::{
    BrowserLauncher, BrowserSession, IsolationContext, NavigationError, NavigationResult,
    PageSurface,
};
use crate::config::ExtractionConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::ErrorReason;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Environment variable pointing at the Chromium binary.
pub const CHROMIUM_PATH_ENV: &str = "AD_LIBRARY_CHROMIUM_PATH";

const PATH_NAMES: [&str; 3] = ["google-chrome", "chromium", "chromium-browser"];

/// Preview rendering flags. A fixed locale keeps call-to-action labels and
/// captions in the language the layout was mapped with; media never plays
/// since videos are blocked anyway.
const PREVIEW_ARGS: [&str; 6] = [
    "--disable-gpu",
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--mute-audio",
    "--autoplay-policy=user-gesture-required",
    "--lang=en-US",
];

/// Chromium for Testing layouts under `~/.ad-library/chromium/`.
fn install_dir_candidates(root: &Path) -> Vec<PathBuf> {
    let testing_app = "Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing";
    let mut candidates = if cfg!(target_os = "macos") {
        vec![
            root.join("chrome-mac-arm64").join(testing_app),
            root.join("chrome-mac-x64").join(testing_app),
        ]
    } else {
        vec![root.join("chrome-linux64/chrome")]
    };
    candidates.push(root.join("chrome"));
    candidates
}

/// Resolve the Chromium binary to launch.
///
/// A configured path is authoritative: if it does not exist the lookup fails
/// instead of silently picking another browser. Otherwise
/// [`CHROMIUM_PATH_ENV`], `~/.ad-library/chromium/`, `PATH` and the default
/// macOS install are tried in that order.
pub fn locate_chromium(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        return if path.exists() {
            Ok(path.to_path_buf())
        } else {
            Err(anyhow!("configured Chromium {} does not exist", path.display()))
        };
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(p) = std::env::var(CHROMIUM_PATH_ENV) {
        candidates.push(PathBuf::from(p));
    }
    if let Some(home) = dirs::home_dir() {
        candidates.extend(install_dir_candidates(&home.join(".ad-library/chromium")));
    }
    candidates.extend(PATH_NAMES.iter().filter_map(|name| which::which(name).ok()));
    if cfg!(target_os = "macos") {
        candidates.push(PathBuf::from(
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        ));
    }

    candidates
        .into_iter()
        .find(|c| c.exists())
        .with_context(|| format!("Chromium not found. Set {CHROMIUM_PATH_ENV}."))
}

/// Launches a local Chromium for each extraction batch.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    executable: Option<PathBuf>,
    headless: bool,
    settle_window: Duration,
}

impl ChromiumLauncher {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            executable: config.chromium_path.clone(),
            headless: config.headless,
            settle_window: config.settle_window,
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let chrome_path = locate_chromium(self.executable.as_deref())?;
        debug!(path = %chrome_path.display(), "using Chromium");

        let builder = BrowserConfig::builder().chrome_executable(chrome_path);
        let builder = if self.headless {
            builder.new_headless_mode()
        } else {
            builder.with_head()
        };
        let config = builder
            .args(PREVIEW_ARGS)
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    trace!("browser handler: {e}");
                }
            }
        });
        debug!(headless = self.headless, "Chromium launched");

        Ok(Box::new(ChromiumSession {
            browser: Arc::new(browser),
            handler,
            settle_window: self.settle_window,
        }))
    }
}

/// A running Chromium instance.
pub struct ChromiumSession {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
    settle_window: Duration,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn new_context(&self) -> Result<Box<dyn IsolationContext>> {
        let created = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .context("failed to create browser context")?;

        Ok(Box::new(ChromiumContext {
            browser: Arc::clone(&self.browser),
            id: created.result.browser_context_id.clone(),
            settle_window: self.settle_window,
        }))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let ChromiumSession {
            browser, handler, ..
        } = *self;

        let closed = match Arc::try_unwrap(browser) {
            Ok(mut browser) => match browser.close().await {
                Ok(_) => {
                    let _ = browser.wait().await;
                    Ok(())
                }
                Err(e) => Err(anyhow!("failed to close Chromium: {e}")),
            },
            Err(_) => {
                warn!("browser still in use at shutdown, dropping it");
                Ok(())
            }
        };
        handler.abort();
        closed
    }
}

/// A CDP browser context.
pub struct ChromiumContext {
    browser: Arc<Browser>,
    id: BrowserContextId,
    settle_window: Duration,
}

#[async_trait]
impl IsolationContext for ChromiumContext {
    async fn new_page(&self) -> Result<Box<dyn PageSurface>> {
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(self.id.clone())
            .build()
            .map_err(|e| anyhow!("invalid target parameters: {e}"))?;

        let page = self
            .browser
            .new_page(params)
            .await
            .context("failed to create new page")?;

        Ok(Box::new(ChromiumPage {
            page,
            settle_window: self.settle_window,
            interceptor: None,
            listener: None,
        }))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.browser
            .execute(DisposeBrowserContextParams::new(self.id.clone()))
            .await
            .context("failed to dispose browser context")?;
        Ok(())
    }
}

/// A single Chromium page with request interception.
pub struct ChromiumPage {
    page: Page,
    settle_window: Duration,
    interceptor: Option<Arc<TrafficInterceptor>>,
    listener: Option<JoinHandle<()>>,
}

/// Wait until no request has been seen for `window`.
async fn settle(interceptor: Option<&TrafficInterceptor>, window: Duration) {
    let Some(interceptor) = interceptor else {
        tokio::time::sleep(window).await;
        return;
    };
    while let Some(idle) = interceptor.idle_for() {
        if idle >= window {
            break;
        }
        tokio::time::sleep(window - idle).await;
    }
}

#[async_trait]
impl PageSurface for ChromiumPage {
    async fn install_interceptor(&mut self, interceptor: Arc<TrafficInterceptor>) -> Result<()> {
        let mut paused = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .context("failed to listen for paused requests")?;

        let page = self.page.clone();
        let tap = Arc::clone(&interceptor);
        let listener = tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let id = event.request_id.clone();
                let sent = match tap.intercept(&event.request.url) {
                    RequestVerdict::Block => page
                        .execute(FailRequestParams::new(id, ErrorReason::BlockedByClient))
                        .await
                        .map(|_| ()),
                    RequestVerdict::Allow => {
                        page.execute(ContinueRequestParams::new(id)).await.map(|_| ())
                    }
                };
                if let Err(e) = sent {
                    trace!("request verdict not delivered: {e}");
                }
            }
        });

        self.page
            .execute(EnableParams::default())
            .await
            .context("failed to enable request interception")?;

        self.interceptor = Some(interceptor);
        if let Some(previous) = self.listener.replace(listener) {
            previous.abort();
        }
        Ok(())
    }

    async fn navigate(
        &mut self,
        url: &str,
        timeout: Duration,
    ) -> std::result::Result<NavigationResult, NavigationError> {
        let start = Instant::now();
        let page = &self.page;
        let interceptor = self.interceptor.as_deref();
        let settle_window = self.settle_window;

        let loaded = tokio::time::timeout(timeout, async move {
            page.goto(url).await.context("navigation failed")?;
            settle(interceptor, settle_window).await;
            let final_url = page.url().await.ok().flatten();
            Ok::<_, anyhow::Error>(final_url)
        })
        .await;

        match loaded {
            Ok(Ok(final_url)) => Ok(NavigationResult {
                final_url: final_url.unwrap_or_else(|| url.to_string()),
                load_time_ms: start.elapsed().as_millis() as u64,
            }),
            Ok(Err(e)) => Err(NavigationError::Failed(e)),
            Err(_) => Err(NavigationError::TimedOut {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn content(&self) -> Result<String> {
        self.page.content().await.context("failed to get HTML")
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let ChromiumPage { page, listener, .. } = *self;
        if let Some(listener) = listener {
            listener.abort();
        }
        page.close().await.context("failed to close page")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ExtractionConfig {
        ExtractionConfig {
            settle_window: Duration::from_millis(200),
            ..ExtractionConfig::default()
        }
    }

    #[test]
    fn test_configured_path_is_authoritative() {
        let missing = Path::new("/nonexistent/ad-library/chrome");
        let err = locate_chromium(Some(missing)).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/ad-library/chrome"));

        let existing = std::env::current_exe().unwrap();
        assert_eq!(locate_chromium(Some(existing.as_path())).unwrap(), existing);
    }

    #[test]
    fn test_install_dir_layouts() {
        let root = Path::new("/home/u/.ad-library/chromium");
        let candidates = install_dir_candidates(root);
        assert_eq!(candidates.last(), Some(&root.join("chrome")));
        assert!(candidates.iter().all(|c| c.starts_with(root)));
    }

    #[tokio::test]
    async fn test_launch_fails_for_missing_executable() {
        let launcher = ChromiumLauncher::new(&ExtractionConfig {
            chromium_path: Some(PathBuf::from("/nonexistent/ad-library/chrome")),
            ..config()
        });
        assert!(launcher.launch().await.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_intercepts_and_renders() {
        let launcher = ChromiumLauncher::new(&config());
        let browser = launcher.launch().await.expect("failed to launch");
        let context = browser.new_context().await.expect("failed to create context");
        let mut page = context.new_page().await.expect("failed to open page");

        let tap = Arc::new(TrafficInterceptor::new());
        page.install_interceptor(Arc::clone(&tap))
            .await
            .expect("failed to install interceptor");

        let html = "data:text/html,<h1>Hello</h1><video src=\"https://video.example/clip.mp4\"></video>";
        let nav = page
            .navigate(html, Duration::from_secs(10))
            .await
            .expect("navigation failed");
        assert!(nav.load_time_ms < 10_000);

        let content = page.content().await.expect("content failed");
        assert!(content.contains("<h1>Hello</h1>"));
        assert!(tap.requests_seen() >= 1);

        page.close().await.expect("page close failed");
        context.close().await.expect("context close failed");
        browser.close().await.expect("browser close failed");
    }
}
