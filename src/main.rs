//! Car Price Tracker - used-car listing and price history database
//!
//! Scrapes used-car marketplaces into SQLite and writes a daily price report.
//! Runs continuously with a daily schedule unless `--once` is given.

use car_price_tracker::config::{SmtpSettings, DEFAULT_SMTP_PORT};
use car_price_tracker::{open_database, run_daemon, Tracker, TrackerConfig};
use clap::Parser;
use std::path::PathBuf;

/// Used-car price tracker - collects listing prices and reports changes
#[derive(Parser, Debug)]
#[command(name = "car_price_tracker")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, env = "CAR_TRACKER_DATABASE", default_value_t = default_db_path())]
    database: String,

    /// Path of the generated HTML report
    #[arg(short, long, env = "CAR_TRACKER_REPORT", default_value = "car_prices_report.html")]
    report: PathBuf,

    /// Run once and exit (default: run continuously with daily schedule)
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Daily run time (HH:MM) in the configured timezone
    #[arg(long, env = "CAR_TRACKER_RUN_AT", default_value = "07:00")]
    run_at: String,

    /// IANA timezone for the schedule and price dates
    #[arg(long, env = "CAR_TRACKER_TIMEZONE", default_value = "America/Guayaquil")]
    timezone: String,

    /// Results pages fetched per marketplace
    #[arg(long, env = "CAR_TRACKER_MAX_PAGES", default_value_t = 3)]
    max_pages: u32,

    /// Days back to look for price changes in the run log
    #[arg(long, env = "CAR_TRACKER_WINDOW_DAYS", default_value_t = 1)]
    window_days: i64,

    /// Rows in the report's price-drop table
    #[arg(long, env = "CAR_TRACKER_DROPS_LIMIT", default_value_t = 10)]
    drops_limit: usize,

    /// Recipient of the daily notification email (requires --smtp-host)
    #[arg(long, env = "CAR_TRACKER_NOTIFY_EMAIL")]
    notify_email: Option<String>,

    /// SMTP server used for the notification email
    #[arg(long, env = "CAR_TRACKER_SMTP_HOST")]
    smtp_host: Option<String>,

    /// SMTP port (implicit TLS)
    #[arg(long, env = "CAR_TRACKER_SMTP_PORT", default_value_t = DEFAULT_SMTP_PORT)]
    smtp_port: u16,

    /// SMTP login, also the sender unless --smtp-from is given
    #[arg(long, env = "CAR_TRACKER_SMTP_USER")]
    smtp_user: Option<String>,

    /// SMTP password
    #[arg(long, env = "CAR_TRACKER_SMTP_PASSWORD", hide_env_values = true)]
    smtp_password: Option<String>,

    /// Sender address of the notification email
    #[arg(long, env = "CAR_TRACKER_SMTP_FROM")]
    smtp_from: Option<String>,

    /// Webhook that delivers notifications
    #[arg(long, env = "CAR_TRACKER_WEBHOOK_URL")]
    webhook_url: Option<String>,

    /// Bearer token for the webhook
    #[arg(long, env = "CAR_TRACKER_WEBHOOK_TOKEN", hide_env_values = true)]
    webhook_token: Option<String>,
}

/// Returns the default database path: ~/.local/share/car_price_tracker/car_prices.db
fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("car_price_tracker")
        .join("car_prices.db")
        .to_string_lossy()
        .to_string()
}

fn build_config(args: &Args) -> car_price_tracker::Result<TrackerConfig> {
    Ok(TrackerConfig {
        report_path: args.report.clone(),
        max_pages: args.max_pages,
        window_days: args.window_days,
        drops_limit: args.drops_limit,
        run_at: TrackerConfig::parse_run_at(&args.run_at)?,
        timezone: TrackerConfig::parse_timezone(&args.timezone)?,
        page_delay: None,
        notify_email: args.notify_email.clone(),
        smtp: args.smtp_host.as_ref().map(|host| SmtpSettings {
            host: host.clone(),
            port: args.smtp_port,
            username: args.smtp_user.clone(),
            password: args.smtp_password.clone(),
            from: args.smtp_from.clone(),
        }),
        webhook_url: args.webhook_url.clone(),
        webhook_token: args.webhook_token.clone(),
    })
}

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let db_path = PathBuf::from(&args.database);

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(2);
        }
    };

    log::info!("Starting car_price_tracker...");
    log::info!("Database path: {}", db_path.display());

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create database directory: {}", e);
                std::process::exit(1);
            }
            log::info!("Created directory: {}", parent.display());
        }
    }

    let conn = match open_database(&db_path) {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let mut tracker = match Tracker::new(conn, config) {
        Ok(tracker) => tracker,
        Err(e) => {
            log::error!("Failed to set up tracker: {}", e);
            std::process::exit(1);
        }
    };

    if args.once {
        match tracker.run_once().await {
            Ok(summary) => log::info!(
                "Run finished: {} new listings, {} price updates, report at {}",
                summary.totals.new_listings,
                summary.totals.updated_prices,
                summary.report_path.display()
            ),
            Err(e) => {
                log::error!("Scraping job failed: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        log::info!(
            "Running in daemon mode, daily at {} ({})",
            args.run_at,
            args.timezone
        );
        tokio::select! {
            _ = run_daemon(&mut tracker) => {}
            _ = tokio::signal::ctrl_c() => log::info!("Shutting down"),
        }
    }
}
