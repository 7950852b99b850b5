use crate::extractor;
use crate::models::Listing;
use anyhow::{Context, Result};
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use regex::Regex;
use reqwest::blocking::Client;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request for {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// Listings gathered for one search.
#[derive(Debug, Clone, Default)]
pub struct FetchedListings {
    pub listings: Vec<Listing>,
    /// Pagination stopped at the page cap while pages still had listings, so
    /// the result set may be incomplete.
    pub truncated: bool,
}

/// Produces the current result set of one search.
///
/// Implementations fail on any page error; a result cut short by a page cap
/// is marked `truncated`.
pub trait ListingFetcher {
    fn name(&self) -> &str;
    fn fetch(&self, search_url: &str) -> Result<FetchedListings>;
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Stop after this many pages even if more are available.
    pub max_pages: Option<usize>,
    /// Base delay between page requests; a random jitter of up to half is added.
    pub page_delay: Duration,
    pub timeout: Duration,
    pub user_agent: String,
    pub show_progress: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_pages: None,
            page_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            show_progress: true,
        }
    }
}

pub struct SuumoFetcher {
    client: Client,
    options: FetchOptions,
}

impl SuumoFetcher {
    pub fn new(options: FetchOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(options.user_agent.clone())
            .timeout(options.timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, options })
    }

    fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        debug!("Fetching listing page: {}", url);

        let response = self.client.get(url).send().map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        response.text().map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })
    }

    fn pause_between_pages(&self) {
        let base = self.options.page_delay.as_millis() as u64;
        if base == 0 {
            return;
        }
        let jitter = rand::thread_rng().gen_range(0..=base / 2);
        std::thread::sleep(Duration::from_millis(base + jitter));
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    }
}

impl ListingFetcher for SuumoFetcher {
    fn name(&self) -> &str {
        "SUUMO"
    }

    fn fetch(&self, search_url: &str) -> Result<FetchedListings> {
        let mut listings = Vec::new();
        let bar = self.progress_bar();
        let mut page = 1;
        let mut truncated = false;

        loop {
            if let Some(max) = self.options.max_pages {
                if page > max {
                    warn!("Reached maximum number of pages ({}), result set may be incomplete", max);
                    truncated = true;
                    break;
                }
            }

            let url = page_url(search_url, page)?;
            bar.set_message(format!("Page {} - {} listings gathered", page, listings.len()));

            let body = self
                .fetch_page(&url)
                .with_context(|| format!("Failed to fetch page {} of {}", page, search_url))?;
            let page_listings = extractor::extract_listings(&body, Local::now().naive_local())?;

            if page_listings.is_empty() {
                debug!("No more listings found on page {}, stopping", page);
                break;
            }

            debug!("Page {}: found {} listings", page, page_listings.len());
            listings.extend(page_listings);
            page += 1;
            self.pause_between_pages();
        }

        bar.finish_and_clear();
        debug!("Fetched {} listings from {} pages", listings.len(), page - 1);
        Ok(FetchedListings { listings, truncated })
    }
}

/// Returns `search_url` pointing at result page `page`.
pub fn page_url(search_url: &str, page: usize) -> Result<String> {
    static PAGE_PARAM: OnceLock<Regex> = OnceLock::new();
    let page_param = match PAGE_PARAM.get() {
        Some(re) => re,
        None => {
            let re = Regex::new(r"([?&])pn=\d*")?;
            PAGE_PARAM.get_or_init(|| re)
        }
    };
    if page_param.is_match(search_url) {
        return Ok(page_param
            .replace(search_url, format!("${{1}}pn={}", page).as_str())
            .into_owned());
    }

    let separator = if search_url.contains('?') { '&' } else { '?' };
    Ok(format!("{}{}pn={}", search_url, separator, page))
}
