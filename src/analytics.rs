//! Read-only analytics over the listing store.
//!
//! Change reports compare each listing's latest price with its previous one
//! (see `database::latest_price_pairs`); the average report uses latest
//! prices only.

use crate::database::{changed_listing_count, count_by_make, latest_price_pairs, listing_count};
use crate::error::Result;
use crate::models::{ListingSummary, PricePair};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Default row cap of the price-drop report
pub const DEFAULT_DROPS_LIMIT: usize = 10;
/// Row cap of the top-makes table
pub const TOP_MAKES_LIMIT: usize = 10;

/// A listing whose latest price differs from its previous price
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceChange {
    pub listing: ListingSummary,
    pub current_price: f64,
    pub previous_price: f64,
    pub latest_date: NaiveDate,
    /// `None` when the previous price is zero
    pub percent_change: Option<f64>,
}

/// Latest-price statistics for one (make, model, year) group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AveragePrice {
    pub make: String,
    pub model: String,
    pub year: i32,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub count: usize,
}

/// Store-wide counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SummaryCounts {
    pub total_listings: i64,
    /// Listings with at least two price points
    pub listings_with_changes: i64,
}

/// Listing count for one make
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MakeCount {
    pub make: String,
    pub count: i64,
}

/// Relative change from `previous` to `current` in percent.
///
/// Returns `None` when `previous` is zero, where the ratio is undefined.
pub fn percent_change(previous: f64, current: f64) -> Option<f64> {
    if previous == 0.0 {
        return None;
    }
    Some((current - previous) / previous * 100.0)
}

/// Ascending by percent change; rows without a percentage go last
fn by_percent_change(a: &PriceChange, b: &PriceChange) -> Ordering {
    match (a.percent_change, b.percent_change) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn changed_pairs(pairs: Vec<PricePair>) -> impl Iterator<Item = PriceChange> {
    pairs.into_iter().filter_map(|pair| {
        let previous = pair.previous?;
        if previous.price == pair.latest.price {
            return None;
        }
        Some(PriceChange {
            percent_change: percent_change(previous.price, pair.latest.price),
            listing: pair.listing,
            current_price: pair.latest.price,
            previous_price: previous.price,
            latest_date: pair.latest.date,
        })
    })
}

/// Listings whose price changed, with the change recorded within
/// `window_days` of `today`, largest drops first.
pub fn price_changes(conn: &Connection, window_days: i64, today: NaiveDate) -> Result<Vec<PriceChange>> {
    let mut changes: Vec<PriceChange> = changed_pairs(latest_price_pairs(conn)?)
        .filter(|c| (today - c.latest_date).num_days() <= window_days)
        .collect();

    changes.sort_by(by_percent_change);
    log::debug!("{} price changes within {} day(s)", changes.len(), window_days);
    Ok(changes)
}

/// Listings whose latest price is below the previous one, largest drop
/// first, capped at `limit` rows.
pub fn price_drops(conn: &Connection, limit: usize) -> Result<Vec<PriceChange>> {
    let mut drops: Vec<PriceChange> = changed_pairs(latest_price_pairs(conn)?)
        .filter(|c| c.current_price < c.previous_price && c.percent_change.is_some())
        .collect();

    drops.sort_by(by_percent_change);
    drops.truncate(limit);
    Ok(drops)
}

/// Latest-price statistics grouped by (make, model, year), sorted by the
/// same key.
///
/// `model` only filters when `make` is also given.
pub fn average_prices(
    conn: &Connection,
    make: Option<&str>,
    model: Option<&str>,
) -> Result<Vec<AveragePrice>> {
    let model = make.and(model);
    let mut groups: BTreeMap<(String, String, i32), Vec<f64>> = BTreeMap::new();

    for pair in latest_price_pairs(conn)? {
        let listing = pair.listing;
        if make.is_some_and(|m| m != listing.make) || model.is_some_and(|m| m != listing.model) {
            continue;
        }
        groups
            .entry((listing.make, listing.model, listing.year))
            .or_default()
            .push(pair.latest.price);
    }

    let averages = groups
        .into_iter()
        .map(|((make, model, year), prices)| {
            let count = prices.len();
            let sum: f64 = prices.iter().sum();
            AveragePrice {
                make,
                model,
                year,
                avg_price: sum / count as f64,
                min_price: prices.iter().copied().fold(f64::INFINITY, f64::min),
                max_price: prices.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                count,
            }
        })
        .collect();
    Ok(averages)
}

/// Total listings and listings with a recorded change
pub fn summary_counts(conn: &Connection) -> Result<SummaryCounts> {
    Ok(SummaryCounts {
        total_listings: listing_count(conn)?,
        listings_with_changes: changed_listing_count(conn)?,
    })
}

/// Most common makes by listing count, capped at `TOP_MAKES_LIMIT`
pub fn top_makes(conn: &Connection) -> Result<Vec<MakeCount>> {
    Ok(count_by_make(conn, TOP_MAKES_LIMIT)?
        .into_iter()
        .map(|(make, count)| MakeCount { make, count })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::{date, make_test_listing, test_db};
    use crate::database::{append_price, create_listing};
    use crate::models::ListingId;

    fn add(conn: &mut Connection, url: &str, make: &str, model: &str, prices: &[(f64, &str)]) -> ListingId {
        let (first, first_date) = prices[0];
        let id = create_listing(
            conn,
            &make_test_listing(url, make, model, 2018),
            first,
            date(first_date),
        )
        .unwrap();
        for (price, day) in &prices[1..] {
            append_price(conn, id, *price, date(day)).unwrap();
        }
        id
    }

    #[test]
    fn percent_change_is_exact() {
        assert_eq!(percent_change(100.0, 80.0), Some(-20.0));
        assert_eq!(percent_change(200.0, 250.0), Some(25.0));
    }

    #[test]
    fn percent_change_guards_zero_baseline() {
        assert_eq!(percent_change(0.0, 80.0), None);
    }

    #[test]
    fn price_drops_sorted_and_limited() {
        let mut conn = test_db();
        add(&mut conn, "https://a/1", "Kia", "Rio", &[(100.0, "2026-02-01"), (95.0, "2026-02-02")]);
        add(&mut conn, "https://a/2", "Kia", "Rio", &[(100.0, "2026-02-01"), (70.0, "2026-02-02")]);
        add(&mut conn, "https://a/3", "Kia", "Rio", &[(100.0, "2026-02-01"), (90.0, "2026-02-02")]);
        add(&mut conn, "https://a/4", "Kia", "Rio", &[(100.0, "2026-02-01"), (120.0, "2026-02-02")]);

        let drops = price_drops(&conn, 10).unwrap();
        let percents: Vec<f64> = drops.iter().filter_map(|d| d.percent_change).collect();
        assert_eq!(percents, vec![-30.0, -10.0, -5.0]);
        assert_eq!(drops[0].listing.url, "https://a/2");

        assert_eq!(price_drops(&conn, 2).unwrap().len(), 2);
    }

    #[test]
    fn price_drops_skip_zero_baseline() {
        let mut conn = test_db();
        add(&mut conn, "https://a/1", "Kia", "Rio", &[(0.0, "2026-02-01"), (50.0, "2026-02-02")]);
        add(&mut conn, "https://a/2", "Kia", "Rio", &[(100.0, "2026-02-01"), (0.0, "2026-02-02")]);

        let drops = price_drops(&conn, 10).unwrap();
        assert_eq!(drops.len(), 1);
        assert_eq!(drops[0].percent_change, Some(-100.0));
    }

    #[test]
    fn price_changes_include_increases_and_respect_window() {
        let mut conn = test_db();
        add(&mut conn, "https://a/1", "Kia", "Rio", &[(100.0, "2026-02-01"), (110.0, "2026-02-10")]);
        add(&mut conn, "https://a/2", "Kia", "Rio", &[(100.0, "2026-02-01"), (50.0, "2026-02-09")]);
        add(&mut conn, "https://a/3", "Kia", "Rio", &[(100.0, "2026-02-01"), (80.0, "2026-02-01")]);
        add(&mut conn, "https://a/4", "Kia", "Rio", &[(100.0, "2026-02-01")]);

        let changes = price_changes(&conn, 1, date("2026-02-10")).unwrap();
        let urls: Vec<&str> = changes.iter().map(|c| c.listing.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a/2", "https://a/1"]);

        let all = price_changes(&conn, 30, date("2026-02-10")).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].percent_change, Some(-50.0));
    }

    #[test]
    fn price_changes_report_zero_baseline_without_percent() {
        let mut conn = test_db();
        add(&mut conn, "https://a/1", "Kia", "Rio", &[(0.0, "2026-02-01"), (50.0, "2026-02-01")]);
        add(&mut conn, "https://a/2", "Kia", "Rio", &[(100.0, "2026-02-01"), (150.0, "2026-02-01")]);

        let changes = price_changes(&conn, 1, date("2026-02-01")).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].percent_change, Some(50.0));
        assert_eq!(changes[1].percent_change, None);
    }

    #[test]
    fn price_changes_ignore_equal_latest_two() {
        let mut conn = test_db();
        // Repeated price can still be stored when written straight to the store
        add(&mut conn, "https://a/1", "Kia", "Rio", &[(100.0, "2026-02-01"), (100.0, "2026-02-02")]);
        assert!(price_changes(&conn, 5, date("2026-02-02")).unwrap().is_empty());
    }

    #[test]
    fn average_prices_use_latest_price_only() {
        let mut conn = test_db();
        add(&mut conn, "https://a/1", "Toyota", "Corolla", &[(9000.0, "2026-02-01"), (10000.0, "2026-02-02")]);
        add(&mut conn, "https://a/2", "Toyota", "Corolla", &[(12000.0, "2026-02-01")]);
        add(&mut conn, "https://a/3", "Toyota", "Corolla", &[(20000.0, "2026-02-01"), (14000.0, "2026-02-03")]);

        let averages = average_prices(&conn, None, None).unwrap();
        assert_eq!(
            averages,
            vec![AveragePrice {
                make: "Toyota".to_string(),
                model: "Corolla".to_string(),
                year: 2018,
                avg_price: 12000.0,
                min_price: 10000.0,
                max_price: 14000.0,
                count: 3,
            }]
        );
    }

    #[test]
    fn average_prices_sorted_by_make_model_year() {
        let mut conn = test_db();
        add(&mut conn, "https://a/1", "Toyota", "Yaris", &[(1.0, "2026-02-01")]);
        add(&mut conn, "https://a/2", "Kia", "Rio", &[(1.0, "2026-02-01")]);
        add(&mut conn, "https://a/3", "Toyota", "Corolla", &[(1.0, "2026-02-01")]);

        let keys: Vec<(String, String)> = average_prices(&conn, None, None)
            .unwrap()
            .into_iter()
            .map(|a| (a.make, a.model))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("Kia".to_string(), "Rio".to_string()),
                ("Toyota".to_string(), "Corolla".to_string()),
                ("Toyota".to_string(), "Yaris".to_string()),
            ]
        );
    }

    #[test]
    fn average_prices_filter_composition() {
        let mut conn = test_db();
        add(&mut conn, "https://a/1", "Toyota", "Yaris", &[(1.0, "2026-02-01")]);
        add(&mut conn, "https://a/2", "Kia", "Rio", &[(1.0, "2026-02-01")]);
        add(&mut conn, "https://a/3", "Toyota", "Corolla", &[(1.0, "2026-02-01")]);

        assert_eq!(average_prices(&conn, Some("Toyota"), None).unwrap().len(), 2);
        let both = average_prices(&conn, Some("Toyota"), Some("Yaris")).unwrap();
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].model, "Yaris");

        // Model without make is ignored
        assert_eq!(average_prices(&conn, None, Some("Yaris")).unwrap().len(), 3);
    }

    #[test]
    fn summary_counts_and_top_makes() {
        let mut conn = test_db();
        add(&mut conn, "https://a/1", "Toyota", "Yaris", &[(1.0, "2026-02-01"), (2.0, "2026-02-02")]);
        add(&mut conn, "https://a/2", "Toyota", "Corolla", &[(1.0, "2026-02-01")]);
        add(&mut conn, "https://a/3", "Kia", "Rio", &[(1.0, "2026-02-01")]);

        assert_eq!(
            summary_counts(&conn).unwrap(),
            SummaryCounts {
                total_listings: 3,
                listings_with_changes: 1,
            }
        );
        assert_eq!(
            top_makes(&conn).unwrap(),
            vec![
                MakeCount { make: "Toyota".to_string(), count: 2 },
                MakeCount { make: "Kia".to_string(), count: 1 },
            ]
        );
    }

    #[test]
    fn top_makes_capped_at_ten() {
        let mut conn = test_db();
        for i in 0..12 {
            let url = format!("https://a/{}", i);
            let make = format!("Make{:02}", i);
            add(&mut conn, &url, &make, "X", &[(1.0, "2026-02-01")]);
        }
        assert_eq!(top_makes(&conn).unwrap().len(), TOP_MAKES_LIMIT);
    }
}
