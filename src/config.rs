//! Runtime configuration for a tracker run

use crate::error::{Result, TrackerError};
use crate::scheduler::parse_run_at;
use chrono::{NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Implicit-TLS submission port
pub const DEFAULT_SMTP_PORT: u16 = 465;

/// Mail server used to deliver notifications
#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Sender address; defaults to `username`
    pub from: Option<String>,
}

impl SmtpSettings {
    pub fn sender(&self) -> Option<&str> {
        self.from.as_deref().or(self.username.as_deref())
    }
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("from", &self.from)
            .finish()
    }
}

/// Validated settings consumed by the orchestrator
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Where the HTML report is written
    pub report_path: PathBuf,
    /// Results pages fetched per source
    pub max_pages: u32,
    /// Window for the price-change log summary
    pub window_days: i64,
    /// Rows in the report's price-drop table
    pub drops_limit: usize,
    /// Daily run time in `timezone`
    pub run_at: NaiveTime,
    /// Zone that defines "today" and the schedule
    pub timezone: Tz,
    /// Overrides each source's own delay between pages
    pub page_delay: Option<Duration>,
    /// Recipient of the daily email; needs `smtp`
    pub notify_email: Option<String>,
    pub smtp: Option<SmtpSettings>,
    pub webhook_url: Option<String>,
    pub webhook_token: Option<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            report_path: PathBuf::from("car_prices_report.html"),
            max_pages: 3,
            window_days: 1,
            drops_limit: crate::analytics::DEFAULT_DROPS_LIMIT,
            run_at: NaiveTime::from_hms_opt(7, 0, 0).unwrap_or_default(),
            timezone: chrono_tz::America::Guayaquil,
            page_delay: None,
            notify_email: None,
            smtp: None,
            webhook_url: None,
            webhook_token: None,
        }
    }
}

impl TrackerConfig {
    /// Parse a "HH:MM" daily run time
    pub fn parse_run_at(text: &str) -> Result<NaiveTime> {
        parse_run_at(text)
            .ok_or_else(|| TrackerError::Config(format!("invalid run time '{}', expected HH:MM", text)))
    }

    /// Parse an IANA timezone name such as "America/Guayaquil"
    pub fn parse_timezone(name: &str) -> Result<Tz> {
        name.parse::<Tz>()
            .map_err(|_| TrackerError::Config(format!("unknown timezone '{}'", name)))
    }

    /// Reject settings that would make a run meaningless
    pub fn validate(&self) -> Result<()> {
        if self.max_pages == 0 {
            return Err(TrackerError::Config("max pages must be at least 1".to_string()));
        }
        if self.window_days < 0 {
            return Err(TrackerError::Config("window days must not be negative".to_string()));
        }
        if self.notify_email.is_some() && self.smtp.is_none() {
            return Err(TrackerError::Config(
                "a notification email needs an SMTP host".to_string(),
            ));
        }
        Ok(())
    }

    /// Current calendar date in the configured zone
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }
}
