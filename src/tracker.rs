//! Orchestrator: scrape sources, ingest, report and notify

use crate::analytics::price_changes;
use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::ingest::{ingest_batch, BatchReport};
use crate::notify::{Delivery, LogNotifier, Notification, Notifier, SmtpNotifier, WebhookNotifier};
use crate::report::{write_report, ReportData};
use crate::scheduler::until_next_run;
use crate::sources::{default_sources, ListingSource, PageFetcher};
use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// Totals of one source or of a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeTotals {
    pub new_listings: usize,
    pub updated_prices: usize,
    pub unchanged: usize,
    pub failed_records: usize,
    pub failed_pages: usize,
}

impl ScrapeTotals {
    fn add_batch(&mut self, batch: &BatchReport) {
        self.new_listings += batch.created();
        self.updated_prices += batch.updated();
        self.unchanged += batch.unchanged();
        self.failed_records += batch.failed();
    }

    fn merge(&mut self, other: &ScrapeTotals) {
        self.new_listings += other.new_listings;
        self.updated_prices += other.updated_prices;
        self.unchanged += other.unchanged;
        self.failed_records += other.failed_records;
        self.failed_pages += other.failed_pages;
    }
}

/// Result of a full run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub totals: ScrapeTotals,
    pub report_path: PathBuf,
    /// True only when a channel accepted the notification
    pub notified: bool,
}

/// Notifier implied by `config`: webhook, then email, else the log
pub fn notifier_for(config: &TrackerConfig) -> Result<Box<dyn Notifier>> {
    if let Some(url) = &config.webhook_url {
        return Ok(Box::new(WebhookNotifier::new(
            url.clone(),
            config.webhook_token.clone(),
        )));
    }
    match (&config.notify_email, &config.smtp) {
        (Some(recipient), Some(smtp)) => Ok(Box::new(SmtpNotifier::new(smtp, recipient)?)),
        (Some(_), None) => Err(TrackerError::Config(
            "a notification email needs an SMTP host".to_string(),
        )),
        (None, _) => Ok(Box::new(LogNotifier)),
    }
}

/// Owns the store connection and the collaborators of a run
pub struct Tracker {
    conn: Connection,
    fetcher: PageFetcher,
    sources: Vec<Box<dyn ListingSource>>,
    notifier: Option<Box<dyn Notifier>>,
    config: TrackerConfig,
}

impl Tracker {
    /// Tracker over the built-in marketplaces with the notifier implied by `config`
    pub fn new(conn: Connection, config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        let notifier = notifier_for(&config)?;
        log::info!("Notifications via {}", notifier.channel());
        Self::with_parts(conn, config, default_sources(), Some(notifier))
    }

    /// Tracker with explicit sources and notifier
    pub fn with_parts(
        conn: Connection,
        config: TrackerConfig,
        sources: Vec<Box<dyn ListingSource>>,
        notifier: Option<Box<dyn Notifier>>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            conn,
            fetcher: PageFetcher::new()?,
            sources,
            notifier,
            config,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Scrape every page of one source into the store.
    ///
    /// A page that fails to load is logged and skipped.
    async fn scrape_source(&mut self, index: usize, today: NaiveDate) -> ScrapeTotals {
        let source = &self.sources[index];
        let delay = self.config.page_delay.unwrap_or_else(|| source.page_delay());
        let mut totals = ScrapeTotals::default();

        for page in 1..=self.config.max_pages {
            match self.fetcher.fetch_page(source.as_ref(), page).await {
                Ok(records) => {
                    let batch = ingest_batch(&mut self.conn, &records, today);
                    for (url, err) in batch.failures() {
                        log::error!("Error processing {} listing {}: {}", source.source_name(), url, err);
                    }
                    totals.add_batch(&batch);
                }
                Err(e) => {
                    log::error!(
                        "Failed to get page {} from {}: {}",
                        page,
                        source.source_name(),
                        e
                    );
                    totals.failed_pages += 1;
                }
            }

            if page < self.config.max_pages && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        log::info!(
            "{}: {} new listings, {} price updates",
            source.source_name(),
            totals.new_listings,
            totals.updated_prices
        );
        totals
    }

    /// Run one full job: scrape, ingest, report, notify
    pub async fn run_once(&mut self) -> Result<RunSummary> {
        log::info!("Starting scraping job");
        let today = self.config.today();
        let mut totals = ScrapeTotals::default();

        for index in 0..self.sources.len() {
            let source_totals = self.scrape_source(index, today).await;
            totals.merge(&source_totals);
        }

        log::info!(
            "Scraping completed: {} new listings, {} price updates, {} failed records",
            totals.new_listings,
            totals.updated_prices,
            totals.failed_records
        );

        let changes = price_changes(&self.conn, self.config.window_days, today)?;
        for change in &changes {
            log::info!(
                "Price change: {} {:.2} -> {:.2} ({})",
                change.listing.label(),
                change.previous_price,
                change.current_price,
                change
                    .percent_change
                    .map(|p| format!("{:+.2}%", p))
                    .unwrap_or_else(|| "n/a".to_string())
            );
        }

        let generated_at = Utc::now()
            .with_timezone(&self.config.timezone)
            .format("%Y-%m-%d %H:%M")
            .to_string();
        let data = ReportData::collect(&self.conn, generated_at, self.config.drops_limit)?;
        let report_path = write_report(&self.config.report_path, &data)?;

        let notified = self.send_notification(today, &totals, &report_path).await;

        Ok(RunSummary {
            totals,
            report_path,
            notified,
        })
    }

    /// Notification failures are logged, never propagated
    async fn send_notification(
        &self,
        today: NaiveDate,
        totals: &ScrapeTotals,
        report_path: &Path,
    ) -> bool {
        let Some(notifier) = &self.notifier else {
            return false;
        };

        let notification = Notification::daily(
            today,
            self.config.notify_email.clone(),
            totals.new_listings,
            totals.updated_prices,
            Some(report_path.to_path_buf()),
        );
        match notifier.notify(&notification).await {
            Ok(Delivery::Sent) => true,
            Ok(Delivery::Logged) => false,
            Err(e) => {
                log::error!("Failed to send notification: {}", e);
                false
            }
        }
    }
}

/// Run immediately, then once a day at the configured time
pub async fn run_daemon(tracker: &mut Tracker) {
    loop {
        if let Err(e) = tracker.run_once().await {
            log::error!("Scraping job failed: {}", e);
        }

        let now = Utc::now().with_timezone(&tracker.config.timezone);
        let wait = until_next_run(&now, tracker.config.run_at);
        log::info!(
            "Next run at {} {} (in {} min)",
            tracker.config.run_at.format("%H:%M"),
            tracker.config.timezone,
            wait.as_secs() / 60
        );
        tokio::time::sleep(wait).await;
    }
}
