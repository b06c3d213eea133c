//! Ingestion engine: reconciles raw candidate records against the listing store
//!
//! A record is keyed by its URL. Unknown URLs create a listing with its first
//! price point; known URLs get a new price point only when the price differs
//! from the latest one.

use crate::database::{append_price, create_listing, find_listing_by_url, latest_price};
use crate::error::{Result, TrackerError};
use crate::models::{ListingId, RawListing};
use crate::normalize::{normalize_listing, NormalizedListing};
use chrono::NaiveDate;
use rusqlite::Connection;

/// Outcome of ingesting one record
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// First sighting of the URL
    Created(ListingId),
    /// Price differs from the latest stored price; a point was appended
    PriceUpdated {
        listing_id: ListingId,
        previous: f64,
        current: f64,
    },
    /// Price equals the latest stored price; nothing written
    Unchanged(ListingId),
}

impl IngestOutcome {
    pub fn listing_id(&self) -> ListingId {
        match self {
            IngestOutcome::Created(id) | IngestOutcome::Unchanged(id) => *id,
            IngestOutcome::PriceUpdated { listing_id, .. } => *listing_id,
        }
    }
}

/// Ingest a single raw record observed on `today`
pub fn ingest(conn: &mut Connection, raw: &RawListing, today: NaiveDate) -> Result<IngestOutcome> {
    let normalized = normalize_listing(raw);
    ingest_normalized(conn, &normalized, today)
}

fn ingest_normalized(
    conn: &mut Connection,
    normalized: &NormalizedListing,
    today: NaiveDate,
) -> Result<IngestOutcome> {
    let listing = &normalized.listing;
    if listing.url.is_empty() {
        return Err(TrackerError::MissingUrl);
    }

    match find_listing_by_url(conn, &listing.url)? {
        Some(existing) => record_price(conn, existing.id, normalized.price, today),
        None => create_or_reuse(conn, normalized, today),
    }
}

/// Create the listing; when another writer stored the URL first, fall back to
/// recording the price against that listing
fn create_or_reuse(
    conn: &mut Connection,
    normalized: &NormalizedListing,
    today: NaiveDate,
) -> Result<IngestOutcome> {
    let listing = &normalized.listing;
    match create_listing(conn, listing, normalized.price, today) {
        Ok(id) => Ok(IngestOutcome::Created(id)),
        Err(TrackerError::ConstraintViolation { url }) => {
            log::debug!("{} was stored concurrently, re-reading", url);
            let existing = find_listing_by_url(conn, &url)?
                .ok_or(TrackerError::ConstraintViolation { url })?;
            record_price(conn, existing.id, normalized.price, today)
        }
        Err(e) => Err(e),
    }
}

/// Append a price point unless it equals the latest one
fn record_price(
    conn: &mut Connection,
    listing_id: ListingId,
    price: f64,
    today: NaiveDate,
) -> Result<IngestOutcome> {
    // An empty history is treated as a change
    let latest = latest_price(conn, listing_id)?;
    match latest {
        Some(point) if point.price == price => Ok(IngestOutcome::Unchanged(listing_id)),
        latest => {
            append_price(conn, listing_id, price, today)?;
            Ok(IngestOutcome::PriceUpdated {
                listing_id,
                previous: latest.map(|p| p.price).unwrap_or(0.0),
                current: price,
            })
        }
    }
}

/// Outcome of one record within a batch
#[derive(Debug)]
pub struct RecordOutcome {
    pub url: String,
    /// Fields that fell back to defaults during normalization
    pub degraded_fields: usize,
    pub result: Result<IngestOutcome>,
}

/// Per-record outcomes of a batch, in input order
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<RecordOutcome>,
}

impl BatchReport {
    pub fn created(&self) -> usize {
        self.count(|o| matches!(o, IngestOutcome::Created(_)))
    }

    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, IngestOutcome::PriceUpdated { .. }))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, IngestOutcome::Unchanged(_)))
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    pub fn degraded(&self) -> usize {
        self.outcomes.iter().map(|o| o.degraded_fields).sum()
    }

    /// Failed records with their URL
    pub fn failures(&self) -> impl Iterator<Item = (&str, &TrackerError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.url.as_str(), e)))
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    fn count(&self, pred: impl Fn(&IngestOutcome) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.result.as_ref().map(&pred).unwrap_or(false))
            .count()
    }
}

/// Ingest a batch of records; a failing record never stops the rest
pub fn ingest_batch(conn: &mut Connection, records: &[RawListing], today: NaiveDate) -> BatchReport {
    let mut report = BatchReport::default();

    for raw in records {
        let normalized = normalize_listing(raw);
        let result = ingest_normalized(conn, &normalized, today);

        match &result {
            Ok(outcome) => log::debug!("{} -> {:?}", normalized.listing.url, outcome),
            Err(e) => log::debug!("{} -> failed: {}", normalized.listing.url, e),
        }

        report.outcomes.push(RecordOutcome {
            url: normalized.listing.url.clone(),
            degraded_fields: normalized.warnings.len(),
            result,
        });
    }

    report
}
