//! Field parsing for raw candidate records.
//!
//! Every parser degrades to a default instead of failing; a `FieldWarning`
//! records each field that had text but could not be parsed.

use crate::models::{NewListing, RawListing};
use log::{debug, warn};

/// Seller type recorded for every listing; adapters do not extract it
pub const UNKNOWN_SELLER: &str = "Unknown";

/// A field that could not be parsed and was stored as its default
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldWarning {
    pub field: &'static str,
    pub raw: String,
}

/// Output of normalizing one raw record
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedListing {
    pub listing: NewListing,
    pub price: f64,
    pub warnings: Vec<FieldWarning>,
}

/// Parses a price by keeping only ASCII digits and dots.
///
/// "$ 12500" -> 12500.0. Returns `None` when nothing parseable remains.
pub fn parse_price(price_text: &str) -> Option<f64> {
    let cleaned: String = price_text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Parses a year that must consist of digits only (e.g. "2018").
pub fn parse_year(year_text: &str) -> Option<i32> {
    let trimmed = year_text.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    trimmed.parse::<i32>().ok()
}

/// Parses mileage by keeping digits only ("85.000 km" -> 85000).
pub fn parse_mileage(mileage_text: &str) -> Option<i64> {
    let digits: String = mileage_text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse::<i64>().ok()
}

/// Splits a title into (make, model) on its first whitespace.
///
/// "Toyota Corolla XEI" -> ("Toyota", "Corolla XEI"). A single word yields an
/// empty model; an empty title yields two empty strings.
pub fn split_title(title: &str) -> (String, String) {
    let title = title.trim();
    match title.split_once(char::is_whitespace) {
        Some((make, model)) => (make.to_string(), model.trim().to_string()),
        None => (title.to_string(), String::new()),
    }
}

/// Normalizes a raw candidate record into typed listing fields and a price.
pub fn normalize_listing(raw: &RawListing) -> NormalizedListing {
    let mut warnings = Vec::new();

    let price = match parse_price(&raw.price_text) {
        Some(price) => price,
        None => {
            degrade(&mut warnings, "price", &raw.price_text);
            0.0
        }
    };

    let year = parse_optional(&mut warnings, "year", raw.year_text.as_deref(), parse_year);
    let mileage = parse_optional(
        &mut warnings,
        "mileage",
        raw.mileage_text.as_deref(),
        parse_mileage,
    );

    let title = raw.title.trim().to_string();
    let (make, model) = split_title(&title);

    let listing = NewListing {
        source_listing_id: raw.source_listing_id.trim().to_string(),
        source_name: raw.source_name.trim().to_string(),
        title,
        make,
        model,
        year,
        mileage,
        location: raw.location_text.as_deref().unwrap_or("").trim().to_string(),
        url: raw.url.trim().to_string(),
        seller_type: UNKNOWN_SELLER.to_string(),
        features: String::new(),
    };

    debug!(
        "Normalized '{}' ({}): price={}, year={}, mileage={}",
        listing.title, listing.url, price, listing.year, listing.mileage
    );

    NormalizedListing {
        listing,
        price,
        warnings,
    }
}

fn parse_optional<T: Default>(
    warnings: &mut Vec<FieldWarning>,
    field: &'static str,
    text: Option<&str>,
    parse: impl Fn(&str) -> Option<T>,
) -> T {
    match text {
        None => T::default(),
        Some(text) => parse(text).unwrap_or_else(|| {
            degrade(warnings, field, text);
            T::default()
        }),
    }
}

/// Blank text is simply "missing" and is not reported.
fn degrade(warnings: &mut Vec<FieldWarning>, field: &'static str, raw: &str) {
    if raw.trim().is_empty() {
        return;
    }
    warn!("Could not parse {} '{}', using default", field, raw);
    warnings.push(FieldWarning {
        field,
        raw: raw.to_string(),
    });
}
