//! Extraction of one record's creative data from its preview page.

use super::interceptor::TrafficInterceptor;
use super::parser;
use super::{IsolationContext, NavigationError, PageSurface};
use crate::config::{ExtractionConfig, DELIVERY_START_FIELD, PREVIEW_FIELD};
use crate::error::{AdLibraryError, ContractViolation, Result};
use crate::record::{AdElements, AdType, Record};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Lifecycle of one extraction task.
///
/// `Pending → Navigating → Loaded → Resolved(type) → Done`, with `TimedOut`
/// reachable from `Navigating` and `ExtractionFailed` from any later state.
/// Skipped records go straight from `Pending` to `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Navigating,
    Loaded,
    Resolved(AdType),
    Done,
    TimedOut,
    ExtractionFailed,
}

enum Failure {
    Page(anyhow::Error),
    Navigation(NavigationError),
    Contract(ContractViolation),
}

/// Drives one record through navigation and parsing.
pub struct ExtractionTask<'c> {
    config: &'c ExtractionConfig,
    record: Record,
    state: TaskState,
}

impl<'c> ExtractionTask<'c> {
    pub fn new(config: &'c ExtractionConfig, record: Record) -> Self {
        Self {
            config,
            record,
            state: TaskState::Pending,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    fn transition(&mut self, next: TaskState) {
        debug!(
            record = self.record.id().unwrap_or("-"),
            from = ?self.state,
            to = ?next,
            "extraction task"
        );
        self.state = next;
    }

    /// Preview URL to navigate to, or `None` when the record is skipped:
    /// no preview URL, or a delivery date outside the configured window.
    pub fn preview_url(&self) -> Option<&str> {
        let url = self.record.get_str(PREVIEW_FIELD).filter(|u| !u.is_empty())?;

        if self.config.has_delivery_window() {
            let started = self
                .record
                .get_str(DELIVERY_START_FIELD)
                .and_then(|raw| raw.get(..10))
                .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok());
            match started {
                Some(date) if self.config.in_delivery_window(date) => {}
                _ => return None,
            }
        }

        Some(url)
    }

    /// Run the task on a page of `context`.
    ///
    /// Always returns the record with `ad_elements` attached, empty when the
    /// record was skipped or its page failed. Only a contract violation is
    /// returned as an error.
    pub async fn run(mut self, context: &dyn IsolationContext) -> Result<Record> {
        let Some(url) = self.preview_url().map(|u| u.to_string()) else {
            debug!(
                record = self.record.id().unwrap_or("-"),
                "no eligible preview, skipping extraction"
            );
            return Ok(self.finish(AdElements::default()));
        };

        let mut page = match context.new_page().await {
            Ok(page) => page,
            Err(e) => {
                warn!(url = %url, "could not open page: {e:#}");
                self.transition(TaskState::ExtractionFailed);
                return Ok(self.finish(AdElements::default()));
            }
        };

        let interceptor = Arc::new(TrafficInterceptor::new());
        let outcome = self.extract(page.as_mut(), &url, interceptor).await;

        if let Err(e) = page.close().await {
            warn!(url = %url, "failed to close page: {e:#}");
        }

        match outcome {
            Ok(elements) => Ok(self.finish(elements)),
            Err(Failure::Navigation(NavigationError::TimedOut { timeout_ms })) => {
                self.transition(TaskState::TimedOut);
                let e = AdLibraryError::NavigationTimeout { url, timeout_ms };
                warn!("{e}; keeping record without creative data");
                Ok(self.finish(AdElements::default()))
            }
            Err(Failure::Navigation(e)) => {
                self.transition(TaskState::ExtractionFailed);
                warn!(url = %url, "{e:#}");
                Ok(self.finish(AdElements::default()))
            }
            Err(Failure::Page(e)) => {
                self.transition(TaskState::ExtractionFailed);
                warn!(url = %url, "extraction failed: {e:#}");
                Ok(self.finish(AdElements::default()))
            }
            Err(Failure::Contract(violation)) => {
                self.transition(TaskState::ExtractionFailed);
                error!(url = %url, "{violation}");
                Err(AdLibraryError::ExtractionContract { url, violation })
            }
        }
    }

    async fn extract(
        &mut self,
        page: &mut dyn PageSurface,
        url: &str,
        interceptor: Arc<TrafficInterceptor>,
    ) -> std::result::Result<AdElements, Failure> {
        page.install_interceptor(Arc::clone(&interceptor))
            .await
            .map_err(Failure::Page)?;

        self.transition(TaskState::Navigating);
        let nav = page
            .navigate(url, self.config.navigation_timeout)
            .await
            .map_err(Failure::Navigation)?;
        self.transition(TaskState::Loaded);
        debug!(
            final_url = %nav.final_url,
            load_time_ms = nav.load_time_ms,
            requests = interceptor.requests_seen(),
            "preview settled"
        );

        let html = page.content().await.map_err(Failure::Page)?;
        let elements = parser::parse(&html, &interceptor.snapshot()).map_err(Failure::Contract)?;

        if let Some(ad_type) = elements.ad_type {
            self.transition(TaskState::Resolved(ad_type));
        }
        Ok(elements)
    }

    fn finish(mut self, elements: AdElements) -> Record {
        self.record.attach_ad_elements(elements);
        if !matches!(self.state, TaskState::TimedOut | TaskState::ExtractionFailed) {
            self.transition(TaskState::Done);
        }
        self.record
    }
}
