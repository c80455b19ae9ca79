use std::future::Future;
use std::time::Duration;

use serde::Serialize;

use crate::config::EmailConfig;
use crate::error::EmailError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Provider accepted the message with this HTTP status.
    Accepted(u16),
    /// No API key configured: the message was only written to the log.
    LoggedOnly,
}

pub trait EmailTransport {
    fn send(
        &self,
        message: &EmailMessage,
    ) -> impl Future<Output = Result<DeliveryStatus, EmailError>> + Send;
}

#[derive(Serialize)]
struct SendGridAddress<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct SendGridPersonalization<'a> {
    to: Vec<SendGridAddress<'a>>,
}

#[derive(Serialize)]
struct SendGridContent<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: &'a str,
}

#[derive(Serialize)]
struct SendGridRequest<'a> {
    personalizations: Vec<SendGridPersonalization<'a>>,
    from: SendGridAddress<'a>,
    subject: &'a str,
    content: Vec<SendGridContent<'a>>,
}

impl<'a> From<&'a EmailMessage> for SendGridRequest<'a> {
    fn from(message: &'a EmailMessage) -> Self {
        SendGridRequest {
            personalizations: vec![SendGridPersonalization {
                to: vec![SendGridAddress { email: &message.to }],
            }],
            from: SendGridAddress {
                email: &message.from,
            },
            subject: &message.subject,
            content: vec![SendGridContent {
                kind: "text/plain",
                value: &message.body,
            }],
        }
    }
}

/// Sends plain-text mail through the SendGrid v3 API.
pub struct SendGridTransport {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl SendGridTransport {
    pub fn new(config: &EmailConfig) -> Result<Self, EmailError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

impl EmailTransport for SendGridTransport {
    async fn send(&self, message: &EmailMessage) -> Result<DeliveryStatus, EmailError> {
        // In dev mode without API key, just log the message
        if self.api_key.is_empty() {
            log::info!(
                "DEV MODE: email to {} ({}):\n{}",
                message.to,
                message.subject,
                message.body
            );
            return Ok(DeliveryStatus::LoggedOnly);
        }

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&SendGridRequest::from(message))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Rejected { status, body });
        }

        Ok(DeliveryStatus::Accepted(status.as_u16()))
    }
}
