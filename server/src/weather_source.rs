//! wttr.in client.
//!
//! One GET per invocation, no retries: a failed fetch simply means no log
//! line for that tick.

use std::time::Duration;

use reqwest::Url;

use crate::config::AppConfig;
use crate::error::FetchError;
use crate::payload::WeatherPayload;

pub struct WeatherSource {
    client: reqwest::Client,
    base_url: Url,
    format: String,
}

impl WeatherSource {
    pub fn new(base_url: &str, format: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| FetchError::InvalidBaseUrl(base_url.to_string()))?;

        Ok(Self {
            client,
            base_url,
            format: format.to_string(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, FetchError> {
        Self::new(
            &config.weather_base_url,
            &config.weather_format,
            config.fetch_timeout(),
        )
    }

    /// URL format: `{base}/{location}?format={format}`, location encoded as a
    /// single path segment.
    pub fn build_url(&self, location: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(location);
        }
        url.query_pairs_mut().append_pair("format", &self.format);
        url
    }

    pub async fn fetch(&self, location: &str) -> Result<WeatherPayload, FetchError> {
        let url = self.build_url(location);

        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
