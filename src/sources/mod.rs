//! Marketplace adapters producing raw candidate records
//!
//! Each adapter knows its page URLs and how to pull candidate records out of
//! a results page. Fetching is shared in `PageFetcher`.

mod olx;
mod patiotuerca;

pub use olx::Olx;
pub use patiotuerca::PatioTuerca;

use crate::error::{Result, TrackerError};
use crate::models::RawListing;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use reqwest::Client;
use scraper::{ElementRef, Selector};
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// A marketplace that lists used cars across numbered result pages
pub trait ListingSource: Send + Sync {
    /// Name stored as the listing's `source_name`
    fn source_name(&self) -> &'static str;

    /// URL of the 1-based results page
    fn page_url(&self, page: u32) -> String;

    /// Extract candidate records from a results page
    fn parse_page(&self, html: &str) -> Vec<RawListing>;

    /// Pause between consecutive page requests
    fn page_delay(&self) -> Duration;
}

/// Built-in sources in scrape order
pub fn default_sources() -> Vec<Box<dyn ListingSource>> {
    vec![Box::new(PatioTuerca::new()), Box::new(Olx::new())]
}

/// HTTP client shared by all sources
pub struct PageFetcher {
    client: Client,
}

impl PageFetcher {
    pub fn new() -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("es-ES,es;q=0.9,en;q=0.8"),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }

    /// Fetch one results page and parse it into candidate records
    pub async fn fetch_page(&self, source: &dyn ListingSource, page: u32) -> Result<Vec<RawListing>> {
        let url = source.page_url(page);
        log::debug!("Fetching {} page {}: {}", source.source_name(), page, url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(TrackerError::HttpStatus(response.status()));
        }

        let html = response.text().await?;
        let records = source.parse_page(&html);
        log::info!(
            "{} page {}: {} candidate listings",
            source.source_name(),
            page,
            records.len()
        );
        Ok(records)
    }
}

/// Trimmed text of the first element matching `sel`, if any
fn first_text(element: &ElementRef<'_>, sel: &Selector) -> Option<String> {
    element.select(sel).next().map(|e| element_text(&e))
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Resolve a possibly relative href against the site base
fn absolute_url(base: &str, href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}{}", base.trim_end_matches('/'), href)
    }
}
