//! Shared fakes for integration tests: a scripted session and an in-memory
//! browser that serves canned preview documents.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ad_library::extraction::{
    BrowserLauncher, BrowserSession, IsolationContext, NavigationError, NavigationResult,
    PageSurface, TrafficInterceptor,
};
use ad_library::session::{HttpMethod, HttpResponse, Params, SessionProvider};
use ad_library::{AdLibraryError, Record};
use async_trait::async_trait;
use serde_json::{json, Value};

// ─────────────────────── records ───────────────────────

pub fn record(value: Value) -> Record {
    Record::from_value(value).unwrap()
}

pub fn preview_url(id: &str) -> String {
    format!("https://preview.example/ads/{id}")
}

/// A record with a preview URL and one unrelated platform field.
pub fn ad_record(id: &str) -> Record {
    record(json!({
        "id": id,
        "page_name": format!("Page {id}"),
        "ad_snapshot_url": preview_url(id)
    }))
}

pub fn ids(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.id().map(|s| s.to_string()))
        .collect()
}

// ─────────────────────── documents ───────────────────────

fn captions() -> String {
    "<div><div>\
     <div><div><div>Caption</div></div></div>\
     <div><div><div>Title</div></div></div>\
     <div><div><div>Description</div></div></div>\
     </div><div><div><div><span><div><div><div>Learn more</div></div></div></span></div></div></div></div>"
        .to_string()
}

fn document(card: &str) -> String {
    format!(
        "<html><body><div id=\"content\"><div><div><div><div><div><div>{card}</div></div></div></div></div></div></div></body></html>"
    )
}

pub fn image_ad(image: &str) -> String {
    document(&format!(
        "<div></div><div><div>Image ad</div><a href=\"https://shop.example\"><div><img src=\"{image}\"></div>{}</a></div>",
        captions()
    ))
}

/// Video ad whose player was never rendered.
pub fn blocked_video_ad() -> String {
    document(&format!(
        "<div></div><div><div>Video ad</div><div></div><div><a href=\"https://shop.example/v\">{}</a></div></div>",
        captions()
    ))
}

pub fn status_ad() -> String {
    document("<div></div><div><div>Text only</div></div>")
}

// ─────────────────────── session ───────────────────────

/// Session answering from a script shared with all its duplicates. Every
/// executed request's params are logged.
#[derive(Clone, Default)]
pub struct FakeSession {
    params: Params,
    headers: Params,
    script: Arc<Mutex<VecDeque<(u16, Value)>>>,
    requests: Arc<Mutex<Vec<Params>>>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, status: u16, body: Value) -> &Self {
        self.script.lock().unwrap().push_back((status, body));
        self
    }

    /// Params of every executed request, in order.
    pub fn requests(&self) -> Vec<Params> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionProvider for FakeSession {
    fn authenticate(&mut self) {
        self.params
            .insert("access_token".to_string(), "test-token".to_string());
    }

    fn params(&self) -> &Params {
        &self.params
    }

    fn update_params(&mut self, params: Params) {
        self.params.extend(params);
    }

    fn clean_params(&mut self) {
        self.params.clear();
    }

    fn headers(&self) -> &Params {
        &self.headers
    }

    fn update_headers(&mut self, headers: Params) {
        self.headers.extend(headers);
    }

    async fn execute(&self, _method: HttpMethod, url: &str) -> ad_library::Result<HttpResponse> {
        self.requests.lock().unwrap().push(self.params.clone());
        let (status, body) = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AdLibraryError::Config("no scripted response left".to_string()))?;
        Ok(HttpResponse {
            url: url.to_string(),
            final_url: url.to_string(),
            status,
            headers: Vec::new(),
            body: body.to_string(),
        })
    }

    fn duplicate(&self) -> Box<dyn SessionProvider> {
        Box::new(self.clone())
    }
}

// ─────────────────────── browser ───────────────────────

/// What the fake browser does when a preview URL is loaded.
#[derive(Clone)]
pub enum PageScript {
    /// Serve `html` after issuing `requests` through the interceptor.
    Serve { html: String, requests: Vec<String> },
    TimeOut,
    Fail,
}

impl PageScript {
    pub fn html(html: String) -> Self {
        PageScript::Serve {
            html,
            requests: Vec::new(),
        }
    }

    pub fn with_requests(html: String, requests: &[&str]) -> Self {
        PageScript::Serve {
            html,
            requests: requests.iter().map(|r| r.to_string()).collect(),
        }
    }
}

/// Resource counters for the fake browser.
#[derive(Default)]
pub struct BrowserLog {
    pub launches: AtomicUsize,
    pub browsers_closed: AtomicUsize,
    pub contexts_opened: AtomicUsize,
    pub contexts_closed: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub pages_closed: AtomicUsize,
    open_pages: AtomicUsize,
    pub max_open_pages: AtomicUsize,
    /// Context index of every navigated URL.
    pub navigations: Mutex<Vec<(usize, String)>>,
}

impl BrowserLog {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Default)]
pub struct FakeLauncher {
    pub log: Arc<BrowserLog>,
    scripts: Arc<HashMap<String, PageScript>>,
    fail_launch: bool,
}

impl FakeLauncher {
    pub fn new(scripts: HashMap<String, PageScript>) -> Self {
        Self {
            log: Arc::new(BrowserLog::default()),
            scripts: Arc::new(scripts),
            fail_launch: false,
        }
    }

    pub fn broken() -> Self {
        Self {
            fail_launch: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> anyhow::Result<Box<dyn BrowserSession>> {
        if self.fail_launch {
            anyhow::bail!("no browser available");
        }
        self.log.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeBrowser {
            log: Arc::clone(&self.log),
            scripts: Arc::clone(&self.scripts),
        }))
    }
}

struct FakeBrowser {
    log: Arc<BrowserLog>,
    scripts: Arc<HashMap<String, PageScript>>,
}

#[async_trait]
impl BrowserSession for FakeBrowser {
    async fn new_context(&self) -> anyhow::Result<Box<dyn IsolationContext>> {
        let index = self.log.contexts_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeContext {
            index,
            log: Arc::clone(&self.log),
            scripts: Arc::clone(&self.scripts),
        }))
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        self.log.browsers_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeContext {
    index: usize,
    log: Arc<BrowserLog>,
    scripts: Arc<HashMap<String, PageScript>>,
}

#[async_trait]
impl IsolationContext for FakeContext {
    async fn new_page(&self) -> anyhow::Result<Box<dyn PageSurface>> {
        self.log.pages_opened.fetch_add(1, Ordering::SeqCst);
        let open = self.log.open_pages.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.max_open_pages.fetch_max(open, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            context: self.index,
            log: Arc::clone(&self.log),
            scripts: Arc::clone(&self.scripts),
            interceptor: None,
            html: String::new(),
        }))
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        self.log.contexts_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakePage {
    context: usize,
    log: Arc<BrowserLog>,
    scripts: Arc<HashMap<String, PageScript>>,
    interceptor: Option<Arc<TrafficInterceptor>>,
    html: String,
}

#[async_trait]
impl PageSurface for FakePage {
    async fn install_interceptor(&mut self, interceptor: Arc<TrafficInterceptor>) -> anyhow::Result<()> {
        self.interceptor = Some(interceptor);
        Ok(())
    }

    async fn navigate(
        &mut self,
        url: &str,
        timeout: Duration,
    ) -> Result<NavigationResult, NavigationError> {
        self.log
            .navigations
            .lock()
            .unwrap()
            .push((self.context, url.to_string()));
        // Let sibling tasks open their pages before this one settles.
        tokio::task::yield_now().await;

        match self.scripts.get(url).cloned() {
            Some(PageScript::Serve { html, requests }) => {
                if let Some(tap) = &self.interceptor {
                    for request in &requests {
                        tap.intercept(request);
                    }
                }
                self.html = html;
                Ok(NavigationResult {
                    final_url: url.to_string(),
                    load_time_ms: 1,
                })
            }
            Some(PageScript::TimeOut) => Err(NavigationError::TimedOut {
                timeout_ms: timeout.as_millis() as u64,
            }),
            Some(PageScript::Fail) | None => Err(NavigationError::Failed(anyhow::anyhow!(
                "net::ERR_NAME_NOT_RESOLVED at {url}"
            ))),
        }
    }

    async fn content(&self) -> anyhow::Result<String> {
        Ok(self.html.clone())
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        self.log.pages_closed.fetch_add(1, Ordering::SeqCst);
        self.log.open_pages.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
