use std::fmt;

use chrono::{Local, NaiveDateTime};
use object_store::path::Path;

use crate::config::Config;
use crate::error::{FetchError, WorkflowError};
use crate::extractor;
use crate::log_store::{LogKey, LogStore};
use crate::record::{LogRecord, Provenance};
use crate::weather_source::WeatherSource;

/// What a single tick of the logger achieved. Errors stop here: the
/// scheduler only ever sees an outcome.
#[derive(Debug)]
pub enum Outcome {
    Logged {
        path: Path,
        tomorrow_provenance: Provenance,
    },
    FetchFailed(String),
    StoreFailed(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Logged { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Logged {
                path,
                tomorrow_provenance,
            } => write!(
                f,
                "Weather data appended to {} (tomorrow: {})",
                path, tomorrow_provenance
            ),
            Outcome::FetchFailed(e) => write!(f, "Error fetching weather: {}", e),
            Outcome::StoreFailed(e) => write!(f, "Error storing weather log: {}", e),
        }
    }
}

impl From<WorkflowError> for Outcome {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Fetch(e) => Outcome::FetchFailed(e.to_string()),
            WorkflowError::Store(e) => Outcome::StoreFailed(e.to_string()),
        }
    }
}

pub struct WeatherLogWorkflow {
    source: WeatherSource,
    store: LogStore,
    location: String,
}

impl WeatherLogWorkflow {
    pub fn new(config: &Config, store: LogStore) -> Result<Self, FetchError> {
        Ok(Self {
            source: WeatherSource::from_config(&config.app)?,
            store,
            location: config.app.city_name.clone(),
        })
    }

    pub async fn run(&self) -> Outcome {
        self.run_at(Local::now().naive_local()).await
    }

    pub async fn run_at(&self, now: NaiveDateTime) -> Outcome {
        match self.try_run(now).await {
            Ok((path, record)) => Outcome::Logged {
                path,
                tomorrow_provenance: record.tomorrow_provenance,
            },
            Err(e) => e.into(),
        }
    }

    async fn try_run(&self, now: NaiveDateTime) -> Result<(Path, LogRecord), WorkflowError> {
        let payload = self.source.fetch(&self.location).await?;
        let record = extractor::extract(&payload, now);
        let key = LogKey::new(&self.location, now.date());
        let path = self.store.append(&key, &record).await?;
        Ok((path, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, EmailConfig, StorageConfig};
    use crate::retry::RetryConfig;
    use crate::storage::Container;
    use chrono::NaiveDate;
    use object_store::memory::InMemory;
    use object_store::{GetOptions, ObjectStore};
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> Config {
        let app: AppConfig = envy::from_iter(vec![(
            "WEATHER_BASE_URL".to_string(),
            base_url.to_string(),
        )])
        .unwrap();
        Config {
            app,
            storage: envy::from_iter::<_, StorageConfig>(Vec::<(String, String)>::new()).unwrap(),
            email: envy::from_iter::<_, EmailConfig>(Vec::<(String, String)>::new()).unwrap(),
        }
    }

    fn workflow(base_url: &str, backend: &Arc<dyn ObjectStore>) -> WeatherLogWorkflow {
        let store = LogStore::new(
            Container::with_store("weather-loger1", backend.clone()),
            false,
            RetryConfig::new(4, 1),
        );
        WeatherLogWorkflow::new(&config(base_url), store).unwrap()
    }

    fn sample(temp: &str, wind: &str) -> serde_json::Value {
        json!({"tempC": temp, "windspeedKmph": wind})
    }

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(5, 0, 0)
            .unwrap()
    }

    async fn content(backend: &Arc<dyn ObjectStore>, path: &Path) -> String {
        let bytes = backend
            .get_opts(path, GetOptions::default())
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_on_empty_store() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Lagos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "current_condition": [{"temp_C": "27", "windspeedKmph": "10"}],
                "weather": [
                    {"hourly": [
                        sample("25", "9"), sample("26", "9"), sample("28", "12"), sample("26", "7")
                    ]},
                    {"hourly": [
                        sample("23", "6"), sample("23", "6"), sample("25", "7"), sample("26", "9"),
                        sample("24", "8")
                    ]}
                ]
            })))
            .mount(&server)
            .await;
        let backend: Arc<dyn ObjectStore> = Arc::new(InMemory::new());

        let outcome = workflow(&server.uri(), &backend).run_at(at()).await;

        let (path, tomorrow_provenance) = match outcome {
            Outcome::Logged {
                path,
                tomorrow_provenance,
            } => (path, tomorrow_provenance),
            other => panic!("unexpected outcome: {other}"),
        };
        assert_eq!(path.to_string(), "weather_2024_05_01.log");
        assert_eq!(tomorrow_provenance, Provenance::Forecast);
        assert_eq!(
            content(&backend, &path).await,
            "year\tmonth\tday\thour\tcurrent_temp\tcurrent_wind\ttomorrow_temp\ttomorrow_wind\n\
             2024\tMay\t01\t05:00:00\t27°C\t10km/h\t24°C\t8km/h\n"
        );
    }

    #[tokio::test]
    async fn test_degraded_fallback_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "current_condition": [{"temp_C": "27", "windspeedKmph": "10"}],
                "weather": [{"hourly": [sample("25", "9"), sample("22", "4")]}]
            })))
            .mount(&server)
            .await;
        let backend: Arc<dyn ObjectStore> = Arc::new(InMemory::new());

        let outcome = workflow(&server.uri(), &backend).run_at(at()).await;

        match outcome {
            Outcome::Logged {
                tomorrow_provenance,
                path,
            } => {
                assert_eq!(tomorrow_provenance, Provenance::DegradedFallback);
                assert!(content(&backend, &path).await.ends_with("\t22°C\t4km/h\n"));
            }
            other => panic!("unexpected outcome: {other}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let backend: Arc<dyn ObjectStore> = Arc::new(InMemory::new());

        let outcome = workflow(&server.uri(), &backend).run_at(at()).await;

        assert!(matches!(outcome, Outcome::FetchFailed(_)));
        assert!(!outcome.is_success());
        let stored = backend
            .get_opts(&Path::from("weather_2024_05_01.log"), GetOptions::default())
            .await;
        assert!(matches!(stored, Err(object_store::Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_store_failure_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
        let backend: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        // Existing object that isn't text.
        backend
            .put_opts(
                &Path::from("weather_2024_05_01.log"),
                bytes::Bytes::from_static(&[0xff, 0xfe, 0x00]).into(),
                Default::default(),
            )
            .await
            .unwrap();

        let outcome = workflow(&server.uri(), &backend).run_at(at()).await;

        assert!(matches!(outcome, Outcome::StoreFailed(_)));
        assert!(outcome.to_string().contains("not valid UTF-8"));
    }

    #[tokio::test]
    async fn test_repeated_runs_append() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "current_condition": [{"temp_C": "27", "windspeedKmph": "10"}]
            })))
            .mount(&server)
            .await;
        let backend: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let workflow = workflow(&server.uri(), &backend);

        for hour in [5, 8, 11] {
            let now = at().date().and_hms_opt(hour, 0, 0).unwrap();
            assert!(workflow.run_at(now).await.is_success());
        }

        let text = content(&backend, &Path::from("weather_2024_05_01.log")).await;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[3], "2024\tMay\t01\t11:00:00\t27°C\t10km/h\tN/A°C\tN/Akm/h");
    }
}
