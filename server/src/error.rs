use thiserror::Error;

/// Failure reaching the weather source or decoding its response.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("weather request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("weather source answered {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("weather payload is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid weather base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Storage backend unreachable, refusing access or losing every write race.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object store error: {0}")]
    Backend(#[from] object_store::Error),
    #[error("container {name} is not reachable: {source}")]
    Container {
        name: String,
        #[source]
        source: object_store::Error,
    },
    #[error("could not create container {name}: {reason}")]
    Create { name: String, reason: String },
    #[error("failed to create container directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("log object {path} is not valid UTF-8")]
    Encoding { path: String },
    #[error("gave up appending to {path} after {attempts} conflicting writes")]
    Contention { path: String, attempts: u32 },
    #[error("storage is misconfigured: {0}")]
    Config(String),
}

/// Payload field that exists but can't be read as a number.
///
/// Never leaves the extractor: it is logged and replaced by the unavailable
/// sentinel.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("field {field} has non-numeric value {value}")]
    NotNumeric { field: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("email request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("email provider rejected the message ({status}): {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression {expression:?}: {source}")]
    InvalidExpression {
        expression: String,
        #[source]
        source: cron::error::Error,
    },
}
