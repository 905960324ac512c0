//! Bounded-concurrency creative extraction over a batch of records.

use super::chromium::ChromiumLauncher;
use super::task::ExtractionTask;
use super::{BrowserLauncher, BrowserSession, IsolationContext};
use crate::config::ExtractionConfig;
use crate::error::{AdLibraryError, Result};
use crate::record::Record;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upper bound on records extracted concurrently, i.e. on open pages.
pub const MAX_BATCH_SIZE: usize = 5;

/// Split `records` into consecutive groups of at most [`MAX_BATCH_SIZE`].
pub fn partition(records: Vec<Record>) -> Vec<Vec<Record>> {
    let mut groups = Vec::with_capacity(records.len().div_ceil(MAX_BATCH_SIZE));
    let mut rest = records.into_iter().peekable();
    while rest.peek().is_some() {
        groups.push(rest.by_ref().take(MAX_BATCH_SIZE).collect());
    }
    groups
}

/// Attaches `ad_elements` to every record of a batch.
///
/// One browser is launched per [`ExtractionPipeline::process`] call. Groups
/// run one after the other, each in a fresh isolation context; the records of
/// a group are extracted concurrently, one page each.
pub struct ExtractionPipeline {
    launcher: Arc<dyn BrowserLauncher>,
    config: ExtractionConfig,
}

impl ExtractionPipeline {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, config: ExtractionConfig) -> Self {
        Self { launcher, config }
    }

    /// Pipeline backed by a locally installed Chromium.
    pub fn chromium(config: ExtractionConfig) -> Self {
        let launcher = ChromiumLauncher::new(&config);
        Self::new(Arc::new(launcher), config)
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract creative data for `records`, preserving length and order.
    ///
    /// Per-record failures leave that record with empty `ad_elements`. A
    /// browser launch or context failure, or a creative contract violation,
    /// fails the whole batch.
    pub async fn process(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        if records.is_empty() {
            return Ok(records);
        }

        let browser = self
            .launcher
            .launch()
            .await
            .map_err(|e| AdLibraryError::Browser(format!("{e:#}")))?;

        let outcome = self.process_groups(browser.as_ref(), records).await;

        if let Err(e) = browser.close().await {
            warn!("failed to close browser: {e:#}");
        }
        outcome
    }

    async fn process_groups(
        &self,
        browser: &dyn BrowserSession,
        records: Vec<Record>,
    ) -> Result<Vec<Record>> {
        let total = records.len();
        let groups = partition(records);
        info!(records = total, groups = groups.len(), "extracting creatives");

        let mut enriched = Vec::with_capacity(total);
        for (index, group) in groups.into_iter().enumerate() {
            let context = browser
                .new_context()
                .await
                .map_err(|e| AdLibraryError::Browser(format!("{e:#}")))?;

            debug!(group = index, size = group.len(), "group started");
            let results = self.run_group(context.as_ref(), group).await;

            if let Err(e) = context.close().await {
                warn!(group = index, "failed to close browser context: {e:#}");
            }

            for result in results {
                enriched.push(result?);
            }
        }
        Ok(enriched)
    }

    /// Run every task of one group to completion, results in input order.
    async fn run_group(
        &self,
        context: &dyn IsolationContext,
        group: Vec<Record>,
    ) -> Vec<Result<Record>> {
        join_all(
            group
                .into_iter()
                .map(|record| ExtractionTask::new(&self.config, record).run(context)),
        )
        .await
    }
}
