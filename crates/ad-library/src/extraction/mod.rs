//! Creative extraction: browser capabilities, request interception, document
//! parsing and the batch pipeline that ties them together.
//!
//! The browser is reached only through the capability traits below, one per
//! resource level: a launched browser hands out isolation contexts, a context
//! hands out pages. [`chromium`] implements them on top of chromiumoxide.

pub mod chromium;
pub mod interceptor;
pub mod parser;
pub mod pipeline;
pub mod task;

pub use interceptor::{InterceptedTraffic, RequestVerdict, TrafficInterceptor};
pub use pipeline::{ExtractionPipeline, MAX_BATCH_SIZE};
pub use task::{ExtractionTask, TaskState};

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a settled navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationResult {
    /// URL after redirects.
    pub final_url: String,
    /// Time until network activity settled, in milliseconds.
    pub load_time_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum NavigationError {
    #[error("navigation timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },
    #[error("navigation failed: {0}")]
    Failed(#[from] anyhow::Error),
}

/// Starts a browser. Called once per pipeline batch.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

/// A running browser instance.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Open an independent context (own cookies and cache).
    async fn new_context(&self) -> Result<Box<dyn IsolationContext>>;
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Isolated browsing environment shared by the tasks of one group.
#[async_trait]
pub trait IsolationContext: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn PageSurface>>;
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A single page, exclusive to one extraction task.
#[async_trait]
pub trait PageSurface: Send + Sync {
    /// Route every outgoing request of this page through `interceptor`.
    /// Must be called before [`PageSurface::navigate`].
    async fn install_interceptor(&mut self, interceptor: Arc<TrafficInterceptor>) -> Result<()>;

    /// Load `url` and wait until network activity settles, all within
    /// `timeout`.
    async fn navigate(
        &mut self,
        url: &str,
        timeout: Duration,
    ) -> std::result::Result<NavigationResult, NavigationError>;

    /// Serialized DOM of the loaded document.
    async fn content(&self) -> Result<String>;

    async fn close(self: Box<Self>) -> Result<()>;
}
