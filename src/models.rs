//! Core data types shared by the store, ingestion and analytics.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned listing identifier, stable for the listing's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListingId(pub i64);

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw candidate record as produced by a source adapter.
///
/// All fields are untrusted text; the ingestion engine owns coercion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    pub source_name: String,
    pub source_listing_id: String,
    pub title: String,
    pub url: String,
    pub price_text: String,
    pub year_text: Option<String>,
    pub mileage_text: Option<String>,
    pub location_text: Option<String>,
}

/// Typed listing fields ready to be written to the store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewListing {
    pub source_listing_id: String,
    pub source_name: String,
    pub title: String,
    pub make: String,
    pub model: String,
    /// 0 when unknown
    pub year: i32,
    /// 0 when unknown
    pub mileage: i64,
    pub location: String,
    pub url: String,
    pub seller_type: String,
    pub features: String,
}

/// A stored listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing {
    pub id: ListingId,
    pub source_listing_id: String,
    pub source_name: String,
    pub title: String,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub mileage: i64,
    pub location: String,
    pub url: String,
    pub seller_type: String,
    pub features: String,
    pub first_seen: NaiveDate,
}

/// One dated price observation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePoint {
    /// Insertion sequence; breaks ties between same-day points
    pub id: i64,
    pub listing_id: ListingId,
    pub price: f64,
    pub date: NaiveDate,
}

/// Short listing description carried by report rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingSummary {
    pub id: ListingId,
    pub title: String,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub url: String,
}

impl ListingSummary {
    /// Display label in the form "Make Model Year"
    pub fn label(&self) -> String {
        format!("{} {} {}", self.make, self.model, self.year)
    }
}

/// Latest and previous price of one listing
#[derive(Debug, Clone, PartialEq)]
pub struct PricePair {
    pub listing: ListingSummary,
    pub latest: PricePoint,
    pub previous: Option<PricePoint>,
}
