//! OLX Ecuador car listings

use super::{absolute_url, element_text, first_text, ListingSource};
use crate::models::RawListing;
use chrono::Datelike;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use std::time::Duration;

const BASE_URL: &str = "https://www.olx.com.ec";
const EARLIEST_YEAR: i32 = 1950;

static ITEM: LazyLock<Selector> = LazyLock::new(|| Selector::parse("li.EIR5N").expect("item selector"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h2.fTGKY").expect("title selector"));
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a.fhlkh").expect("link selector"));
static PRICE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span.PXdHY").expect("price selector"));
static DETAILS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.zLvFQ").expect("details selector"));

pub struct Olx {
    base_url: String,
}

impl Olx {
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL)
    }

    /// Point the adapter at another host (used against mock servers)
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for Olx {
    fn default() -> Self {
        Self::new()
    }
}

/// First detail that is a plausible model year
fn find_year(details: &[String], current_year: i32) -> Option<String> {
    details
        .iter()
        .find(|text| {
            !text.is_empty()
                && text.chars().all(|c| c.is_ascii_digit())
                && text
                    .parse::<i32>()
                    .is_ok_and(|year| (EARLIEST_YEAR..=current_year).contains(&year))
        })
        .cloned()
}

impl ListingSource for Olx {
    fn source_name(&self) -> &'static str {
        "OLX"
    }

    fn page_url(&self, page: u32) -> String {
        format!("{}/autos_c378?page={}", self.base_url, page)
    }

    fn parse_page(&self, html: &str) -> Vec<RawListing> {
        let document = Html::parse_document(html);
        let current_year = chrono::Local::now().year();

        document
            .select(&ITEM)
            .map(|item| {
                let url = item
                    .select(&LINK)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .filter(|href| !href.is_empty())
                    .map(|href| absolute_url(&self.base_url, href))
                    .unwrap_or_default();

                let details: Vec<String> = item
                    .select(&DETAILS)
                    .map(|e| element_text(&e))
                    .collect();

                RawListing {
                    source_name: self.source_name().to_string(),
                    source_listing_id: item.value().attr("data-id").unwrap_or("").to_string(),
                    title: first_text(&item, &TITLE).unwrap_or_default(),
                    url,
                    price_text: first_text(&item, &PRICE).unwrap_or_else(|| "0".to_string()),
                    year_text: find_year(&details, current_year),
                    // OLX result cards carry no mileage
                    mileage_text: None,
                    location_text: details.last().cloned(),
                }
            })
            .collect()
    }

    fn page_delay(&self) -> Duration {
        Duration::from_secs(3)
    }
}
