//! HTML report of the current store contents

use crate::analytics::{price_drops, summary_counts, top_makes, MakeCount, PriceChange, SummaryCounts};
use crate::error::Result;
use rusqlite::Connection;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const STYLE: &str = "
        body { font-family: Arial, sans-serif; margin: 20px; }
        h1, h2 { color: #333; }
        table { border-collapse: collapse; width: 100%; margin-bottom: 20px; }
        th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }
        th { background-color: #f2f2f2; }
        tr:nth-child(even) { background-color: #f9f9f9; }
        .summary { display: flex; gap: 20px; margin-bottom: 20px; }
        .summary-card { background-color: #f2f2f2; padding: 15px; border-radius: 5px; flex: 1; }
        .price-drop { color: green; }";

/// Everything the report shows
#[derive(Debug, Clone)]
pub struct ReportData {
    /// Already formatted for display (e.g. "2026-02-01 07:00")
    pub generated_at: String,
    pub summary: SummaryCounts,
    pub top_makes: Vec<MakeCount>,
    pub price_drops: Vec<PriceChange>,
}

impl ReportData {
    /// Gather report data from the store
    pub fn collect(conn: &Connection, generated_at: String, drops_limit: usize) -> Result<Self> {
        Ok(Self {
            generated_at,
            summary: summary_counts(conn)?,
            top_makes: top_makes(conn)?,
            price_drops: price_drops(conn, drops_limit)?,
        })
    }
}

/// Escape text for HTML element content and quoted attributes
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the report as a standalone HTML page
pub fn render_html(data: &ReportData) -> String {
    let mut html = String::new();

    // Writing to a String cannot fail
    let _ = write!(
        html,
        "<!DOCTYPE html>
<html>
<head>
    <meta charset=\"utf-8\">
    <title>Used Car Price Report</title>
    <style>{style}
    </style>
</head>
<body>
    <h1>Used Car Price Report</h1>
    <p>Generated on {generated}</p>

    <div class=\"summary\">
        <div class=\"summary-card\">
            <h3>Total Listings</h3>
            <p>{total}</p>
        </div>
        <div class=\"summary-card\">
            <h3>Cars with Price Changes</h3>
            <p>{changed}</p>
        </div>
    </div>

    <h2>Top Car Makes</h2>
    <table>
        <tr><th>Make</th><th>Count</th></tr>
",
        style = STYLE,
        generated = escape_html(&data.generated_at),
        total = data.summary.total_listings,
        changed = data.summary.listings_with_changes,
    );

    for make in &data.top_makes {
        let _ = writeln!(
            html,
            "        <tr><td>{}</td><td>{}</td></tr>",
            escape_html(&make.make),
            make.count
        );
    }

    html.push_str(
        "    </table>

    <h2>Recent Price Drops</h2>
    <table>
        <tr><th>Car</th><th>Old Price ($)</th><th>New Price ($)</th><th>Change (%)</th></tr>
",
    );

    for drop in &data.price_drops {
        let change = drop
            .percent_change
            .map(|p| format!("{:.2}%", p))
            .unwrap_or_else(|| "n/a".to_string());
        let _ = writeln!(
            html,
            "        <tr><td><a href=\"{url}\" target=\"_blank\">{car}</a></td><td>{old:.2}</td><td>{new:.2}</td><td class=\"price-drop\">{change}</td></tr>",
            url = escape_html(&drop.listing.url),
            car = escape_html(&drop.listing.label()),
            old = drop.previous_price,
            new = drop.current_price,
            change = change,
        );
    }

    html.push_str("    </table>\n</body>\n</html>\n");
    html
}

/// Render and write the report, returning the written path
pub fn write_report(path: &Path, data: &ReportData) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, render_html(data))?;
    log::info!("Report generated: {}", path.display());
    Ok(path.to_path_buf())
}
