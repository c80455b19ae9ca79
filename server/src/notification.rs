use std::fmt;

use chrono::{Local, NaiveDateTime};

use crate::config::Config;
use crate::email::{DeliveryStatus, EmailMessage, EmailTransport};

#[derive(Debug, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent(DeliveryStatus),
    Failed(String),
    /// No recipient configured.
    Skipped,
}

impl NotifyOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, NotifyOutcome::Failed(_))
    }
}

impl fmt::Display for NotifyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyOutcome::Sent(DeliveryStatus::Accepted(code)) => {
                write!(f, "Email sent! Status code: {}", code)
            }
            NotifyOutcome::Sent(DeliveryStatus::LoggedOnly) => {
                write!(f, "Email logged only (no API key configured)")
            }
            NotifyOutcome::Failed(e) => write!(f, "Failed to send email: {}", e),
            NotifyOutcome::Skipped => write!(f, "No recipient configured, email skipped"),
        }
    }
}

/// Daily summary mail. The template only carries location, date and time;
/// it doesn't read the logged records back.
pub fn compose(location: &str, from: &str, to: &str, now: NaiveDateTime) -> EmailMessage {
    EmailMessage {
        from: from.to_string(),
        to: to.to_string(),
        subject: format!("Weather Update - {}", now.format("%Y-%m-%d")),
        body: format!(
            "Good morning!\n\
             \n\
             Here is your weather update for today:\n\
             - City: {}\n\
             - Date: {}\n\
             - Time: {}\n\
             \n\
             Please check your dashboard or logs for detailed info.\n",
            location,
            now.format("%A, %d %B %Y"),
            now.format("%H:%M"),
        ),
    }
}

pub struct NotificationWorkflow<T> {
    transport: T,
    location: String,
    from: String,
    to: Option<String>,
}

impl<T: EmailTransport> NotificationWorkflow<T> {
    pub fn new(config: &Config, transport: T) -> Self {
        Self {
            transport,
            location: config.app.city_name.clone(),
            from: config.email.from.clone(),
            to: config.email.to.clone(),
        }
    }

    pub async fn run(&self) -> NotifyOutcome {
        self.run_at(Local::now().naive_local()).await
    }

    pub async fn run_at(&self, now: NaiveDateTime) -> NotifyOutcome {
        let Some(to) = &self.to else {
            return NotifyOutcome::Skipped;
        };

        let message = compose(&self.location, &self.from, to, now);
        match self.transport.send(&message).await {
            Ok(status) => NotifyOutcome::Sent(status),
            Err(e) => NotifyOutcome::Failed(e.to_string()),
        }
    }
}
