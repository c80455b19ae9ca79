use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Azure,
    S3,
    Local,
    Memory,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_provider")]
    pub provider: StorageProvider,
    #[serde(default = "default_container_name")]
    pub container_name: String,
    /// Azure storage account; credentials come from the `AZURE_*` environment.
    pub account_name: Option<String>,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,
    #[serde(default)]
    pub partition_by_location: bool,
    #[serde(default = "default_max_write_attempts")]
    pub max_write_attempts: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_email_api_url")]
    pub api_url: String,
    #[serde(default = "default_email_from")]
    pub from: String,
    pub to: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_city_name")]
    pub city_name: String,
    #[serde(default = "default_weather_base_url")]
    pub weather_base_url: String,
    #[serde(default = "default_weather_format")]
    pub weather_format: String,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_timer_schedule")]
    pub timer_schedule: String,
    #[serde(default = "default_email_timer_schedule")]
    pub email_timer_schedule: String,
    #[serde(default = "default_true")]
    pub run_on_startup: bool,
}

impl AppConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Process configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppConfig,
    pub storage: StorageConfig,
    pub email: EmailConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let app = envy::prefixed("WEATHERLOG_")
            .from_env::<AppConfig>()
            .context("Invalid WEATHERLOG_* settings")?;
        let storage = envy::prefixed("WEATHERLOG_STORAGE_")
            .from_env::<StorageConfig>()
            .context("Invalid WEATHERLOG_STORAGE_* settings")?;
        let email = envy::prefixed("WEATHERLOG_EMAIL_")
            .from_env::<EmailConfig>()
            .context("Invalid WEATHERLOG_EMAIL_* settings")?;

        Ok(Config {
            app,
            storage,
            email,
        })
    }
}

fn default_provider() -> StorageProvider {
    StorageProvider::Azure
}

fn default_container_name() -> String {
    "weather-loger1".to_string()
}

fn default_local_root() -> PathBuf {
    PathBuf::from("./data")
}

fn default_max_write_attempts() -> u32 {
    4
}

fn default_email_api_url() -> String {
    "https://api.sendgrid.com/v3/mail/send".to_string()
}

fn default_email_from() -> String {
    "weather-logger@localhost".to_string()
}

fn default_city_name() -> String {
    "Lagos".to_string()
}

fn default_weather_base_url() -> String {
    "https://wttr.in".to_string()
}

fn default_weather_format() -> String {
    "j1".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_timer_schedule() -> String {
    "0 */3 * * *".to_string()
}

fn default_email_timer_schedule() -> String {
    "0 0 5 * * *".to_string()
}

fn default_true() -> bool {
    true
}
