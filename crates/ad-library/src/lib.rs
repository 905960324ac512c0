// Copyright 2026 Ad Library Contributors
// SPDX-License-Identifier: Apache-2.0

//! Ad Library client: paginated search over the platform's ads archive, with
//! optional browser-based extraction of each ad's creatives.
//!
//! ```no_run
//! # async fn run() -> ad_library::Result<()> {
//! use ad_library::{AdLibraryApi, AdLibraryQuery, MetaGraphSession, Platform, SessionConfig};
//! use serde_json::json;
//!
//! let session = MetaGraphSession::new("token", None, SessionConfig::default())?;
//! let payload = json!({"search_terms": "shoes", "ad_reached_countries": ["FR"]});
//! let query = AdLibraryQuery::new(Platform::Meta, payload.as_object().cloned().unwrap_or_default());
//!
//! let mut api = AdLibraryApi::new(Box::new(session), query);
//! let mut cursor = api.results().await?;
//! while let Some(record) = cursor.next().await? {
//!     println!("{}", record.to_value());
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod cursor;
pub mod error;
pub mod extraction;
pub mod page;
pub mod record;
pub mod session;

pub use api::{encode_top_level_params, AdLibraryApi, AdLibraryQuery, PlatformResponse, QueryEndpoint};
pub use config::{ExtractionConfig, Platform};
pub use cursor::ResultCursor;
pub use error::{AdLibraryError, ContractViolation, PlatformRequestError, Result};
pub use extraction::{ExtractionPipeline, TrafficInterceptor, MAX_BATCH_SIZE};
pub use page::PageResponse;
pub use record::{AdElements, AdType, Creative, Record};
pub use session::{ApiSession, HttpMethod, MetaGraphSession, SessionConfig, SessionProvider};
