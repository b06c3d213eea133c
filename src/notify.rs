//! Run notifications
//!
//! The delivery channel is pluggable. Credentials come from configuration
//! and are never compiled in.

use crate::config::SmtpSettings;
use crate::error::{Result, TrackerError};
use async_trait::async_trait;
use chrono::NaiveDate;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Serialize;
use std::path::PathBuf;

/// Summary of a finished run, ready for delivery
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub subject: String,
    pub recipient: Option<String>,
    /// HTML body
    pub message: String,
    pub new_count: usize,
    pub updated_count: usize,
    pub report_path: Option<PathBuf>,
}

impl Notification {
    /// Daily report notification for the given run counts
    pub fn daily(
        date: NaiveDate,
        recipient: Option<String>,
        new_count: usize,
        updated_count: usize,
        report_path: Option<PathBuf>,
    ) -> Self {
        let mut message = format!(
            "<p>Daily car price scraping has completed:</p>\n\
             <ul>\n\
             <li>{} new listings added</li>\n\
             <li>{} price updates detected</li>\n\
             </ul>",
            new_count, updated_count
        );
        if let Some(path) = &report_path {
            message.push_str(&format!("\n<p>Full report: {}</p>", path.display()));
        }
        Self {
            subject: format!("Daily Car Price Report - {}", date.format("%Y-%m-%d")),
            recipient,
            message,
            new_count,
            updated_count,
            report_path,
        }
    }
}

/// How a notification left the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to an external channel
    Sent,
    /// Only written to the log
    Logged,
}

/// Delivers run notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name of the delivery channel
    fn channel(&self) -> &'static str;

    async fn notify(&self, notification: &Notification) -> Result<Delivery>;
}

/// Writes notifications to the log; used when no channel is configured
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn channel(&self) -> &'static str {
        "log"
    }

    async fn notify(&self, notification: &Notification) -> Result<Delivery> {
        log::info!(
            "{}: {} new listings, {} price updates (no delivery channel configured)",
            notification.subject,
            notification.new_count,
            notification.updated_count
        );
        Ok(Delivery::Logged)
    }
}

/// Mails notifications over SMTP with the report attached
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

fn mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| TrackerError::Config(format!("invalid email address '{}': {}", address, e)))
}

impl SmtpNotifier {
    /// Build the notifier; no connection is made until the first send
    pub fn new(settings: &SmtpSettings, recipient: &str) -> Result<Self> {
        let sender = settings
            .sender()
            .ok_or_else(|| TrackerError::Config("SMTP sender address is not set".to_string()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
            .map_err(|e| TrackerError::Config(format!("SMTP host '{}': {}", settings.host, e)))?
            .port(settings.port);
        if let (Some(user), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: mailbox(sender)?,
            to: mailbox(recipient)?,
        })
    }

    /// Compose the mail: HTML body, plus the report file when it can be read
    pub fn build_message(&self, notification: &Notification) -> Result<Message> {
        let builder = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(notification.subject.clone());

        let report = notification
            .report_path
            .as_ref()
            .and_then(|path| match std::fs::read(path) {
                Ok(bytes) => Some((path, bytes)),
                Err(e) => {
                    log::warn!("Report {} not attached: {}", path.display(), e);
                    None
                }
            });

        let message = match report {
            Some((path, bytes)) => {
                let filename = path
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_else(|| "report.html".to_string());
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::html(notification.message.clone()))
                        .singlepart(Attachment::new(filename).body(bytes, ContentType::TEXT_HTML)),
                )
            }
            None => builder
                .header(ContentType::TEXT_HTML)
                .body(notification.message.clone()),
        };

        message.map_err(|e| TrackerError::Notification(format!("could not build email: {}", e)))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    fn channel(&self) -> &'static str {
        "smtp"
    }

    async fn notify(&self, notification: &Notification) -> Result<Delivery> {
        let message = self.build_message(notification)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| TrackerError::Notification(format!("SMTP delivery failed: {}", e)))?;

        log::info!("Email notification sent to {}", self.to);
        Ok(Delivery::Sent)
    }
}

/// POSTs notifications as JSON to a webhook (mail relay, chat bot, ...)
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            token,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn channel(&self) -> &'static str {
        "webhook"
    }

    async fn notify(&self, notification: &Notification) -> Result<Delivery> {
        let mut request = self.client.post(&self.url).json(notification);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(TrackerError::Notification(format!(
                "webhook returned {}",
                response.status()
            )));
        }

        log::info!("Notification sent to webhook");
        Ok(Delivery::Sent)
    }
}
