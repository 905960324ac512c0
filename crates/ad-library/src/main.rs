// Copyright 2026 Ad Library Contributors
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ad_library::config::{DELIVERY_START_FIELD, PREVIEW_FIELD};
use ad_library::{
    AdLibraryApi, AdLibraryQuery, ExtractionConfig, ExtractionPipeline, HttpMethod,
    MetaGraphSession, Platform, SessionConfig,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use tracing::info;

const DEFAULT_FIELDS: &[&str] = &[
    "id",
    "page_id",
    "page_name",
    "ad_snapshot_url",
    "ad_delivery_start_time",
    "ad_delivery_stop_time",
    "publisher_platforms",
];

#[derive(Parser)]
#[command(
    name = "ad-library",
    about = "Search the Ad Library and extract ad creatives",
    version
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query the ads archive and print each result as a JSON line
    Search {
        /// Graph API access token
        #[arg(long)]
        access_token: String,
        /// App secret, enables appsecret_proof
        #[arg(long)]
        app_secret: Option<String>,
        /// Platform to query
        #[arg(long, default_value = "meta")]
        platform: Platform,
        /// Free-text search terms
        #[arg(long)]
        search_terms: Option<String>,
        /// Reached countries (ISO codes, comma separated)
        #[arg(long, value_delimiter = ',', required = true)]
        countries: Vec<String>,
        /// Restrict to these page ids (comma separated)
        #[arg(long, value_delimiter = ',')]
        page_ids: Vec<String>,
        /// Fields to request (comma separated)
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
        /// API version, e.g. v21.0
        #[arg(long)]
        api_version: Option<String>,
        /// HTTP method used for the query
        #[arg(long, default_value = "GET")]
        method: HttpMethod,
        /// Page size
        #[arg(long, default_value = "25")]
        limit: u32,
        /// Stop after this many records
        #[arg(long)]
        max_results: Option<usize>,
        /// Extract creatives from each ad preview with Chromium
        #[arg(long)]
        download: bool,
        /// Only extract ads delivered from this date (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<String>,
        /// Only extract ads delivered until this date (YYYY-MM-DD)
        #[arg(long)]
        end_date: Option<String>,
        /// Preview navigation timeout in seconds
        #[arg(long, default_value = "300")]
        timeout: u64,
        /// Show the browser window
        #[arg(long)]
        headed: bool,
        /// Chromium binary to use for extraction
        #[arg(long)]
        chromium: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if verbose {
            "ad_library=debug"
        } else {
            "ad_library=info"
        })
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Requested fields, plus the ones extraction reads when it is enabled.
fn query_fields(requested: Vec<String>, download: bool) -> Vec<String> {
    let mut fields = if requested.is_empty() {
        DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect()
    } else {
        requested
    };
    if download {
        for needed in [PREVIEW_FIELD, DELIVERY_START_FIELD] {
            if !fields.iter().any(|f| f == needed) {
                fields.push(needed.to_string());
            }
        }
    }
    fields
}

fn build_payload(
    search_terms: Option<String>,
    countries: Vec<String>,
    page_ids: Vec<String>,
    fields: Vec<String>,
    limit: u32,
) -> Map<String, Value> {
    let mut payload = Map::new();
    if let Some(terms) = search_terms {
        payload.insert("search_terms".into(), json!(terms));
    }
    payload.insert("ad_reached_countries".into(), json!(countries));
    if !page_ids.is_empty() {
        payload.insert("search_page_ids".into(), json!(page_ids));
    }
    payload.insert("fields".into(), json!(fields.join(",")));
    payload.insert("limit".into(), json!(limit));
    payload
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Search {
            access_token,
            app_secret,
            platform,
            search_terms,
            countries,
            page_ids,
            fields,
            api_version,
            method,
            limit,
            max_results,
            download,
            start_date,
            end_date,
            timeout,
            headed,
            chromium,
        } => {
            let fields = query_fields(fields, download);
            let payload = build_payload(search_terms, countries, page_ids, fields, limit);

            let mut query = AdLibraryQuery::new(platform, payload).with_method(method);
            if let Some(version) = api_version {
                query = query.with_api_version(&version)?;
            }

            let session = MetaGraphSession::new(access_token, app_secret, SessionConfig::default())?;
            let mut api = AdLibraryApi::new(Box::new(session), query);

            if download {
                let config = ExtractionConfig {
                    navigation_timeout: Duration::from_secs(timeout),
                    headless: !headed,
                    chromium_path: chromium,
                    ..ExtractionConfig::default()
                }
                .with_delivery_window(start_date.as_deref(), end_date.as_deref())?;
                api = api.with_pipeline(Arc::new(ExtractionPipeline::chromium(config)));
            }

            info!(url = %api.query().final_url(), "querying the ads archive");
            let mut cursor = api.results().await.context("query failed")?;

            let mut printed = 0usize;
            while max_results.map_or(true, |max| printed < max) {
                let Some(record) = cursor.next().await.context("pagination failed")? else {
                    break;
                };
                println!("{}", serde_json::to_string(&record)?);
                printed += 1;
            }

            info!(
                records = printed,
                requests = api.requests_attempted(),
                succeeded = api.requests_succeeded(),
                "done"
            );
        }
    }

    Ok(())
}
