//! Lazy cursor over token-paginated query results.

use crate::api::QueryEndpoint;
use crate::error::Result;
use crate::extraction::ExtractionPipeline;
use crate::page::PageResponse;
use crate::record::Record;
use crate::session::{Params, SessionProvider};
use futures::Stream;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

/// Walks result pages on demand, one record at a time.
///
/// The cursor owns a duplicate of the caller's session, so advancing it never
/// touches the params of the original session or of sibling cursors. Once the
/// platform stops returning a continuation token the cursor is exhausted for
/// good.
pub struct ResultCursor {
    session: Box<dyn SessionProvider>,
    endpoint: Arc<QueryEndpoint>,
    pipeline: Option<Arc<ExtractionPipeline>>,
    queue: VecDeque<Record>,
    after: Option<String>,
    pages: usize,
}

impl ResultCursor {
    /// Build a cursor from the first page of results.
    pub async fn new(
        session: &dyn SessionProvider,
        endpoint: Arc<QueryEndpoint>,
        pipeline: Option<Arc<ExtractionPipeline>>,
        first_page: Value,
    ) -> Result<Self> {
        let mut cursor = Self {
            session: session.duplicate(),
            endpoint,
            pipeline,
            queue: VecDeque::new(),
            after: None,
            pages: 0,
        };
        cursor.process_page(&first_page).await?;
        Ok(cursor)
    }

    /// Queue the records of one page and keep its continuation token.
    ///
    /// A malformed page ends iteration. An extraction error is returned
    /// without touching the token the page was fetched with, so the next call
    /// fetches that page again.
    async fn process_page(&mut self, body: &Value) -> Result<()> {
        self.pages += 1;

        let page = match PageResponse::parse(body) {
            Ok(page) => page,
            Err(e) => {
                warn!(page = self.pages, "{e}; ending iteration");
                self.after = None;
                return Ok(());
            }
        };
        debug!(
            page = self.pages,
            records = page.records.len(),
            more = page.after.is_some(),
            "page received"
        );

        let records = match &self.pipeline {
            Some(pipeline) => pipeline.process(page.records).await?,
            None => page.records,
        };
        self.queue.extend(records);
        self.after = page.after;
        Ok(())
    }

    /// Next record, fetching further pages as needed. `Ok(None)` once the
    /// last page has been drained, on every later call too.
    ///
    /// A failed page fetch or extraction is returned as an error and leaves
    /// the cursor where it was, so the call can be retried.
    pub async fn next(&mut self) -> Result<Option<Record>> {
        loop {
            if let Some(record) = self.queue.pop_front() {
                return Ok(Some(record));
            }
            let Some(token) = self.after.clone() else {
                return Ok(None);
            };

            self.session
                .update_params(Params::from([("after".to_string(), token.clone())]));
            let response = self.endpoint.call(self.session.as_ref()).await?;
            response.raise_for_status()?;
            self.process_page(&response.json()).await?;

            if self.queue.is_empty() && self.after.as_deref() == Some(token.as_str()) {
                warn!(token = %token, "empty page repeated its own token; ending iteration");
                self.after = None;
            }
        }
    }

    /// Records buffered and not yet returned.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Buffered record at `index`, without consuming it.
    pub fn get(&self, index: usize) -> Option<&Record> {
        self.queue.get(index)
    }

    /// No buffered records and no further page.
    pub fn is_exhausted(&self) -> bool {
        self.queue.is_empty() && self.after.is_none()
    }

    /// Pages received so far, including the first one.
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    pub fn session(&self) -> &dyn SessionProvider {
        self.session.as_ref()
    }

    pub fn into_stream(mut self) -> impl Stream<Item = Result<Record>> + Send {
        async_stream::try_stream! {
            while let Some(record) = self.next().await? {
                yield record;
            }
        }
    }
}
