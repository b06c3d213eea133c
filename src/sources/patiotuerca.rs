//! PatioTuerca Ecuador used-car listings

use super::{absolute_url, element_text, first_text, ListingSource};
use crate::models::RawListing;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use std::time::Duration;

const BASE_URL: &str = "https://ecuador.patiotuerca.com";

static CARD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.listing-card").expect("card selector"));
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h2.listing-card__title").expect("title selector"));
static LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.listing-card__link").expect("link selector"));
static PRICE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.listing-card__price").expect("price selector"));
static CHARACTERISTICS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("span.listing-card__characteristics").expect("characteristics selector")
});

pub struct PatioTuerca {
    base_url: String,
}

impl PatioTuerca {
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

impl Default for PatioTuerca {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingSource for PatioTuerca {
    fn source_name(&self) -> &'static str {
        "PatioTuerca"
    }

    fn page_url(&self, page: u32) -> String {
        format!("{}/usados?page={}", self.base_url, page)
    }

    fn parse_page(&self, html: &str) -> Vec<RawListing> {
        let document = Html::parse_document(html);

        document
            .select(&CARD)
            .map(|card| {
                let url = card
                    .select(&LINK)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .map(|href| absolute_url(&self.base_url, href))
                    .unwrap_or_default();

                // Characteristics come in a fixed order: year, mileage, location
                let details: Vec<String> = card
                    .select(&CHARACTERISTICS)
                    .map(|e| element_text(&e))
                    .collect();

                RawListing {
                    source_name: self.source_name().to_string(),
                    source_listing_id: card.value().attr("id").unwrap_or("").to_string(),
                    title: first_text(&card, &TITLE).unwrap_or_default(),
                    url,
                    price_text: first_text(&card, &PRICE).unwrap_or_else(|| "0".to_string()),
                    year_text: details.first().cloned(),
                    mileage_text: details.get(1).cloned(),
                    location_text: details.get(2).cloned(),
                }
            })
            .collect()
    }

    fn page_delay(&self) -> Duration {
        Duration::from_secs(2)
    }
}
