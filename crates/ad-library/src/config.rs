//! Platform and extraction configuration.
//!
//! Everything here is passed explicitly at construction time; nothing is read
//! from process-wide state.

use crate::error::{AdLibraryError, Result};
use chrono::NaiveDate;
use regex::Regex;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::warn;

/// Ad Library platforms this client can query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Meta,
}

impl Platform {
    /// Latest API version known to work with this client.
    pub fn default_api_version(&self) -> &'static str {
        match self {
            Platform::Meta => "v21.0",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Platform::Meta => "https://graph.facebook.com",
        }
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            Platform::Meta => "ads_archive",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Meta => f.write_str("Meta"),
        }
    }
}

impl FromStr for Platform {
    type Err = AdLibraryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "meta" | "facebook" => Ok(Platform::Meta),
            _ => Err(AdLibraryError::Config(format!(
                "{s} is not an available Ad Library platform"
            ))),
        }
    }
}

fn version_regex() -> &'static Regex {
    static VERSION: OnceLock<Regex> = OnceLock::new();
    VERSION.get_or_init(|| Regex::new(r"^v(\d+)\.(\d+)").expect("valid regex"))
}

fn split_version(version: &str) -> Option<(u32, u32)> {
    let caps = version_regex().captures(version)?;
    let major = caps.get(1)?.as_str().parse().ok()?;
    let minor = caps.get(2)?.as_str().parse().ok()?;
    Some((major, minor))
}

/// Reject versions not shaped like `v12.34`.
pub fn check_version_format(version: &str) -> Result<()> {
    split_version(version).map(|_| ()).ok_or_else(|| {
        AdLibraryError::Config(format!(
            "{version} does not match the API version pattern (e.g. v21.0)"
        ))
    })
}

/// Pick the version to query with.
///
/// A request for a version newer than `latest` is clamped to `latest` with a
/// warning; older versions are honoured as-is.
pub fn resolve_api_version(requested: &str, latest: &str) -> Result<String> {
    let req = split_version(requested);
    let def = split_version(latest);

    match (req, def) {
        (Some(req), Some(def)) => {
            if req > def {
                warn!(
                    "latest available API version is {latest}, {requested} was requested; using {latest}"
                );
                Ok(latest.to_string())
            } else {
                Ok(requested.to_string())
            }
        }
        (None, _) => Err(AdLibraryError::Config(format!(
            "{requested} does not match the API version pattern (e.g. v21.0)"
        ))),
        (_, None) => Err(AdLibraryError::Config(format!(
            "{latest} does not match the API version pattern (e.g. v21.0)"
        ))),
    }
}

/// Record field holding the URL of the rendered ad preview.
pub const PREVIEW_FIELD: &str = "ad_snapshot_url";

/// Record field holding the delivery start date (`YYYY-MM-DD`).
pub const DELIVERY_START_FIELD: &str = "ad_delivery_start_time";

/// Settings for the creative extraction pipeline.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Upper bound on one preview navigation, including the settle wait.
    pub navigation_timeout: Duration,
    /// Request silence required before a page counts as loaded.
    pub settle_window: Duration,
    /// Only extract ads whose delivery started on or after this date.
    pub download_start_date: Option<NaiveDate>,
    /// Only extract ads whose delivery started on or before this date.
    pub download_end_date: Option<NaiveDate>,
    /// Launch the browser without a visible window.
    pub headless: bool,
    /// Chromium binary to launch instead of searching for one.
    pub chromium_path: Option<PathBuf>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(300),
            settle_window: Duration::from_millis(500),
            download_start_date: None,
            download_end_date: None,
            headless: true,
            chromium_path: None,
        }
    }
}

impl ExtractionConfig {
    /// Parse and set the delivery window from `YYYY-MM-DD` strings.
    pub fn with_delivery_window(mut self, start: Option<&str>, end: Option<&str>) -> Result<Self> {
        self.download_start_date = start.map(parse_date).transpose()?;
        self.download_end_date = end.map(parse_date).transpose()?;
        if let (Some(s), Some(e)) = (self.download_start_date, self.download_end_date) {
            if s > e {
                return Err(AdLibraryError::Config(format!(
                    "download start date {s} is after end date {e}"
                )));
            }
        }
        Ok(self)
    }

    pub fn has_delivery_window(&self) -> bool {
        self.download_start_date.is_some() || self.download_end_date.is_some()
    }

    /// Whether an ad delivered from `date` falls inside the window.
    pub fn in_delivery_window(&self, date: NaiveDate) -> bool {
        self.download_start_date.map_or(true, |s| s <= date)
            && self.download_end_date.map_or(true, |e| date <= e)
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| AdLibraryError::Config(format!("date '{raw}' is not YYYY-MM-DD: {e}")))
}
