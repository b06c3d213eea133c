//! Car Price Tracker - used-car listing and price history database
//!
//! Harvests used-car listings from marketplace pages into SQLite, records a
//! price point whenever a listing's price changes, and reports price changes
//! and averages on a daily schedule.

pub mod analytics;
pub mod config;
pub mod database;
pub mod error;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod notify;
pub mod report;
pub mod scheduler;
pub mod sources;
pub mod tracker;

pub use config::TrackerConfig;
pub use database::{init_schema, open_database};
pub use error::{Result, TrackerError};
pub use ingest::{ingest, ingest_batch, BatchReport, IngestOutcome};
pub use models::{Listing, ListingId, NewListing, PricePoint, RawListing};
pub use tracker::{notifier_for, run_daemon, RunSummary, Tracker};
