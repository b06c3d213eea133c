//! Listing store: SQLite schema and access for listings and their price history
//!
//! Uses parameterized queries exclusively. Every mutation runs in its own
//! transaction, so a listing is never visible without its first price point.
//!
//! Price points are ordered by `(date DESC, id DESC)`: when several points
//! share a date, the one inserted last is the latest.

use crate::error::{Result, TrackerError};
use crate::models::{Listing, ListingId, ListingSummary, NewListing, PricePair, PricePoint};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;

/// Open (or create) the database file and initialise the schema
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Initialize the database schema
///
/// Creates tables if they don't exist:
/// - `listings`: one row per listing URL
/// - `price_points`: append-only price observations per listing
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS listings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_listing_id TEXT NOT NULL,
            source_name TEXT NOT NULL,
            title TEXT NOT NULL,
            make TEXT NOT NULL,
            model TEXT NOT NULL,
            year INTEGER NOT NULL,
            mileage INTEGER NOT NULL,
            location TEXT NOT NULL,
            url TEXT NOT NULL UNIQUE,
            seller_type TEXT NOT NULL,
            features TEXT NOT NULL,
            first_seen TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_listings_make_model ON listings(make, model, year);

        CREATE TABLE IF NOT EXISTS price_points (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            listing_id INTEGER NOT NULL,
            price REAL NOT NULL,
            date TEXT NOT NULL,
            FOREIGN KEY (listing_id) REFERENCES listings(id)
        );

        CREATE INDEX IF NOT EXISTS idx_price_points_listing_date
            ON price_points(listing_id, date);
        ",
    )?;

    log::info!("Database schema initialized");
    Ok(())
}

const LISTING_COLUMNS: &str = "id, source_listing_id, source_name, title, make, model, year, \
     mileage, location, url, seller_type, features, first_seen";

fn listing_from_row(row: &Row<'_>) -> rusqlite::Result<Listing> {
    Ok(Listing {
        id: ListingId(row.get(0)?),
        source_listing_id: row.get(1)?,
        source_name: row.get(2)?,
        title: row.get(3)?,
        make: row.get(4)?,
        model: row.get(5)?,
        year: row.get(6)?,
        mileage: row.get(7)?,
        location: row.get(8)?,
        url: row.get(9)?,
        seller_type: row.get(10)?,
        features: row.get(11)?,
        first_seen: row.get(12)?,
    })
}

fn price_point_from_row(row: &Row<'_>) -> rusqlite::Result<PricePoint> {
    Ok(PricePoint {
        id: row.get(0)?,
        listing_id: ListingId(row.get(1)?),
        price: row.get(2)?,
        date: row.get(3)?,
    })
}

/// Look up a listing by its exact URL
pub fn find_listing_by_url(conn: &Connection, url: &str) -> Result<Option<Listing>> {
    let sql = format!("SELECT {} FROM listings WHERE url = ?1", LISTING_COLUMNS);
    let listing = conn
        .query_row(&sql, params![url], listing_from_row)
        .optional()?;
    Ok(listing)
}

/// Look up a listing by id
pub fn listing_by_id(conn: &Connection, id: ListingId) -> Result<Option<Listing>> {
    let sql = format!("SELECT {} FROM listings WHERE id = ?1", LISTING_COLUMNS);
    let listing = conn
        .query_row(&sql, params![id.0], listing_from_row)
        .optional()?;
    Ok(listing)
}

/// Create a listing together with its first price point.
///
/// Both rows are written in one transaction. A duplicate URL fails with
/// `ConstraintViolation` and leaves the store untouched.
pub fn create_listing(
    conn: &mut Connection,
    listing: &NewListing,
    price: f64,
    date: NaiveDate,
) -> Result<ListingId> {
    let tx = conn.transaction()?;
    let id = insert_listing_tx(&tx, listing, date)?;
    insert_price_tx(&tx, id, price, date)?;
    tx.commit()?;

    log::debug!("Created listing {} for {}", id, listing.url);
    Ok(id)
}

fn insert_listing_tx(tx: &Transaction<'_>, listing: &NewListing, date: NaiveDate) -> Result<ListingId> {
    let inserted = tx.execute(
        "INSERT INTO listings
         (source_listing_id, source_name, title, make, model, year, mileage,
          location, url, seller_type, features, first_seen)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            &listing.source_listing_id,
            &listing.source_name,
            &listing.title,
            &listing.make,
            &listing.model,
            listing.year,
            listing.mileage,
            &listing.location,
            &listing.url,
            &listing.seller_type,
            &listing.features,
            date,
        ],
    );

    match inserted {
        Ok(_) => Ok(ListingId(tx.last_insert_rowid())),
        Err(e) if is_unique_violation(&e) => Err(TrackerError::ConstraintViolation {
            url: listing.url.clone(),
        }),
        Err(e) => Err(e.into()),
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn insert_price_tx(tx: &Transaction<'_>, id: ListingId, price: f64, date: NaiveDate) -> Result<i64> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO price_points (listing_id, price, date) VALUES (?1, ?2, ?3)",
    )?;
    stmt.execute(params![id.0, price, date])?;
    Ok(tx.last_insert_rowid())
}

/// Append a price point to an existing listing
///
/// Fails with `NotFound` if the listing does not exist.
pub fn append_price(
    conn: &mut Connection,
    id: ListingId,
    price: f64,
    date: NaiveDate,
) -> Result<PricePoint> {
    let tx = conn.transaction()?;

    let exists: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM listings WHERE id = ?1)",
        params![id.0],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(TrackerError::NotFound(id));
    }

    let point_id = insert_price_tx(&tx, id, price, date)?;
    tx.commit()?;

    Ok(PricePoint {
        id: point_id,
        listing_id: id,
        price,
        date,
    })
}

/// Most recent price point of a listing
pub fn latest_price(conn: &Connection, id: ListingId) -> Result<Option<PricePoint>> {
    nth_latest_price(conn, id, 0)
}

/// Second most recent price point, `None` if the listing has only one
pub fn previous_price(conn: &Connection, id: ListingId) -> Result<Option<PricePoint>> {
    nth_latest_price(conn, id, 1)
}

fn nth_latest_price(conn: &Connection, id: ListingId, offset: i64) -> Result<Option<PricePoint>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, listing_id, price, date
         FROM price_points
         WHERE listing_id = ?1
         ORDER BY date DESC, id DESC
         LIMIT 1 OFFSET ?2",
    )?;
    let point = stmt
        .query_row(params![id.0, offset], price_point_from_row)
        .optional()?;
    Ok(point)
}

/// Full price history of a listing, oldest first
pub fn price_history(conn: &Connection, id: ListingId) -> Result<Vec<PricePoint>> {
    let mut stmt = conn.prepare(
        "SELECT id, listing_id, price, date
         FROM price_points
         WHERE listing_id = ?1
         ORDER BY date ASC, id ASC",
    )?;
    let points = stmt
        .query_map(params![id.0], price_point_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(points)
}

/// Latest and previous price of every listing, in listing id order
pub fn latest_price_pairs(conn: &Connection) -> Result<Vec<PricePair>> {
    let mut stmt = conn.prepare(
        "WITH ranked AS (
             SELECT id, listing_id, price, date,
                    ROW_NUMBER() OVER (
                        PARTITION BY listing_id ORDER BY date DESC, id DESC
                    ) AS rn
             FROM price_points
         )
         SELECT l.id, l.title, l.make, l.model, l.year, l.url,
                cur.id, cur.price, cur.date,
                prev.id, prev.price, prev.date
         FROM listings l
         JOIN ranked cur ON cur.listing_id = l.id AND cur.rn = 1
         LEFT JOIN ranked prev ON prev.listing_id = l.id AND prev.rn = 2
         ORDER BY l.id",
    )?;

    let pairs = stmt
        .query_map([], |row| {
            let listing_id = ListingId(row.get(0)?);
            let previous = match row.get::<_, Option<i64>>(9)? {
                Some(point_id) => Some(PricePoint {
                    id: point_id,
                    listing_id,
                    price: row.get(10)?,
                    date: row.get(11)?,
                }),
                None => None,
            };
            Ok(PricePair {
                listing: ListingSummary {
                    id: listing_id,
                    title: row.get(1)?,
                    make: row.get(2)?,
                    model: row.get(3)?,
                    year: row.get(4)?,
                    url: row.get(5)?,
                },
                latest: PricePoint {
                    id: row.get(6)?,
                    listing_id,
                    price: row.get(7)?,
                    date: row.get(8)?,
                },
                previous,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(pairs)
}

/// Get total count of listings
pub fn listing_count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM listings", [], |row| row.get(0))?)
}

/// Count listings with at least two price points
pub fn changed_listing_count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM (
             SELECT listing_id FROM price_points
             GROUP BY listing_id
             HAVING COUNT(*) > 1
         )",
        [],
        |row| row.get(0),
    )?)
}

/// Number of price points recorded for a listing
pub fn price_point_count(conn: &Connection, id: ListingId) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM price_points WHERE listing_id = ?1",
        params![id.0],
        |row| row.get(0),
    )?)
}

/// Listing counts grouped by make, largest first
pub fn count_by_make(conn: &Connection, limit: usize) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT make, COUNT(*) AS count
         FROM listings
         GROUP BY make
         ORDER BY count DESC, make ASC
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit as i64], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Create an in-memory database for testing
    pub(crate) fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    pub(crate) fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    pub(crate) fn make_test_listing(url: &str, make: &str, model: &str, year: i32) -> NewListing {
        NewListing {
            source_listing_id: String::new(),
            source_name: "PatioTuerca".to_string(),
            title: format!("{} {}", make, model),
            make: make.to_string(),
            model: model.to_string(),
            year,
            mileage: 0,
            location: String::new(),
            url: url.to_string(),
            seller_type: "Unknown".to_string(),
            features: String::new(),
        }
    }

    #[test]
    fn init_schema_creates_tables() {
        let conn = test_db();
        for table in ["listings", "price_points"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    params![table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }

    #[test]
    fn init_schema_is_idempotent() {
        let conn = test_db();
        init_schema(&conn).unwrap();
    }

    #[test]
    fn create_listing_writes_first_price() {
        let mut conn = test_db();
        let listing = make_test_listing("https://a/1", "Toyota", "Corolla", 2018);

        let id = create_listing(&mut conn, &listing, 15000.0, date("2026-02-01")).unwrap();

        let stored = find_listing_by_url(&conn, "https://a/1").unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.make, "Toyota");
        assert_eq!(stored.first_seen, date("2026-02-01"));
        assert_eq!(price_point_count(&conn, id).unwrap(), 1);
        assert_eq!(latest_price(&conn, id).unwrap().unwrap().price, 15000.0);
    }

    #[test]
    fn find_listing_by_url_is_exact() {
        let mut conn = test_db();
        let listing = make_test_listing("https://a/1", "Toyota", "Corolla", 2018);
        create_listing(&mut conn, &listing, 1.0, date("2026-02-01")).unwrap();

        assert!(find_listing_by_url(&conn, "https://a/").unwrap().is_none());
        assert!(find_listing_by_url(&conn, "https://a/1/").unwrap().is_none());
    }

    #[test]
    fn duplicate_url_is_constraint_violation() {
        let mut conn = test_db();
        let listing = make_test_listing("https://a/1", "Toyota", "Corolla", 2018);
        create_listing(&mut conn, &listing, 15000.0, date("2026-02-01")).unwrap();

        let err = create_listing(&mut conn, &listing, 9000.0, date("2026-02-02")).unwrap_err();
        assert!(matches!(err, TrackerError::ConstraintViolation { ref url } if url == "https://a/1"));

        // The failed create left no listing and no orphaned price point behind
        assert_eq!(listing_count(&conn).unwrap(), 1);
        let points: i64 = conn
            .query_row("SELECT COUNT(*) FROM price_points", [], |row| row.get(0))
            .unwrap();
        assert_eq!(points, 1);
    }

    #[test]
    fn append_price_to_missing_listing_is_not_found() {
        let mut conn = test_db();
        let err = append_price(&mut conn, ListingId(42), 1.0, date("2026-02-01")).unwrap_err();
        assert!(matches!(err, TrackerError::NotFound(ListingId(42))));
    }

    #[test]
    fn latest_and_previous_follow_date_order() {
        let mut conn = test_db();
        let listing = make_test_listing("https://a/1", "Kia", "Rio", 2020);
        let id = create_listing(&mut conn, &listing, 100.0, date("2026-02-01")).unwrap();
        append_price(&mut conn, id, 90.0, date("2026-02-03")).unwrap();
        // Back-dated observation must not become "latest"
        append_price(&mut conn, id, 95.0, date("2026-02-02")).unwrap();

        assert_eq!(latest_price(&conn, id).unwrap().unwrap().price, 90.0);
        assert_eq!(previous_price(&conn, id).unwrap().unwrap().price, 95.0);
    }

    #[test]
    fn same_day_points_use_insertion_order() {
        let mut conn = test_db();
        let listing = make_test_listing("https://a/1", "Kia", "Rio", 2020);
        let id = create_listing(&mut conn, &listing, 100.0, date("2026-02-01")).unwrap();
        append_price(&mut conn, id, 80.0, date("2026-02-01")).unwrap();
        append_price(&mut conn, id, 70.0, date("2026-02-01")).unwrap();

        assert_eq!(latest_price(&conn, id).unwrap().unwrap().price, 70.0);
        assert_eq!(previous_price(&conn, id).unwrap().unwrap().price, 80.0);
    }

    #[test]
    fn previous_price_is_none_for_single_point() {
        let mut conn = test_db();
        let listing = make_test_listing("https://a/1", "Kia", "Rio", 2020);
        let id = create_listing(&mut conn, &listing, 100.0, date("2026-02-01")).unwrap();
        assert!(previous_price(&conn, id).unwrap().is_none());
    }

    #[test]
    fn price_history_is_chronological() {
        let mut conn = test_db();
        let listing = make_test_listing("https://a/1", "Kia", "Rio", 2020);
        let id = create_listing(&mut conn, &listing, 100.0, date("2026-02-01")).unwrap();
        append_price(&mut conn, id, 90.0, date("2026-02-05")).unwrap();

        let prices: Vec<f64> = price_history(&conn, id)
            .unwrap()
            .iter()
            .map(|p| p.price)
            .collect();
        assert_eq!(prices, vec![100.0, 90.0]);
    }

    #[test]
    fn latest_price_pairs_match_single_lookups() {
        let mut conn = test_db();
        let a = create_listing(
            &mut conn,
            &make_test_listing("https://a/1", "Kia", "Rio", 2020),
            100.0,
            date("2026-02-01"),
        )
        .unwrap();
        let b = create_listing(
            &mut conn,
            &make_test_listing("https://a/2", "Mazda", "3", 2017),
            50.0,
            date("2026-02-01"),
        )
        .unwrap();
        append_price(&mut conn, a, 80.0, date("2026-02-01")).unwrap();
        append_price(&mut conn, a, 75.0, date("2026-02-02")).unwrap();

        let pairs = latest_price_pairs(&conn).unwrap();
        assert_eq!(pairs.len(), 2);

        assert_eq!(pairs[0].listing.id, a);
        assert_eq!(Some(pairs[0].latest.clone()), latest_price(&conn, a).unwrap());
        assert_eq!(pairs[0].previous, previous_price(&conn, a).unwrap());
        assert_eq!(pairs[0].previous.as_ref().unwrap().price, 80.0);

        assert_eq!(pairs[1].listing.id, b);
        assert!(pairs[1].previous.is_none());
    }

    #[test]
    fn counts_reflect_history() {
        let mut conn = test_db();
        assert_eq!(listing_count(&conn).unwrap(), 0);
        assert_eq!(changed_listing_count(&conn).unwrap(), 0);

        let a = create_listing(
            &mut conn,
            &make_test_listing("https://a/1", "Kia", "Rio", 2020),
            100.0,
            date("2026-02-01"),
        )
        .unwrap();
        create_listing(
            &mut conn,
            &make_test_listing("https://a/2", "Kia", "Picanto", 2021),
            100.0,
            date("2026-02-01"),
        )
        .unwrap();
        append_price(&mut conn, a, 90.0, date("2026-02-02")).unwrap();

        assert_eq!(listing_count(&conn).unwrap(), 2);
        assert_eq!(changed_listing_count(&conn).unwrap(), 1);
    }

    #[test]
    fn count_by_make_orders_by_count() {
        let mut conn = test_db();
        for (i, make) in ["Kia", "Toyota", "Kia", "Chevrolet", "Toyota", "Kia"]
            .iter()
            .enumerate()
        {
            let url = format!("https://a/{}", i);
            create_listing(
                &mut conn,
                &make_test_listing(&url, make, "X", 2020),
                1.0,
                date("2026-02-01"),
            )
            .unwrap();
        }

        let rows = count_by_make(&conn, 2).unwrap();
        assert_eq!(
            rows,
            vec![("Kia".to_string(), 3), ("Toyota".to_string(), 2)]
        );
    }
}
