use std::fmt;

use chrono::NaiveDateTime;

/// Column names, written once as the first line of every log object.
pub const HEADER: &str =
    "year\tmonth\tday\thour\tcurrent_temp\tcurrent_wind\ttomorrow_temp\ttomorrow_wind\n";

const UNAVAILABLE: &str = "N/A";
const TIMESTAMP_FORMAT: &str = "%Y\t%b\t%d\t%H:%M:%S";

/// A measured value as the source wrote it, or the marker for a value that
/// couldn't be derived.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reading {
    Value(String),
    Unavailable,
}

impl Reading {
    pub fn as_str(&self) -> &str {
        match self {
            Reading::Value(text) => text,
            Reading::Unavailable => UNAVAILABLE,
        }
    }

    /// Render with a unit suffix. The sentinel gets the suffix too
    /// (`N/A°C`), matching lines already in existing log files.
    pub fn with_unit(&self, unit: &str) -> String {
        format!("{}{}", self.as_str(), unit)
    }
}

impl From<Option<String>> for Reading {
    fn from(value: Option<String>) -> Self {
        value.map_or(Reading::Unavailable, Reading::Value)
    }
}

/// Where a pair of readings came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provenance {
    /// Current conditions section.
    Observed,
    /// Tomorrow's mid-day forecast sample.
    Forecast,
    /// Today's latest sample standing in for a missing tomorrow forecast.
    DegradedFallback,
    Unavailable,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Observed => write!(f, "observed"),
            Provenance::Forecast => write!(f, "true_forecast"),
            Provenance::DegradedFallback => write!(f, "degraded_fallback"),
            Provenance::Unavailable => write!(f, "unavailable"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LogRecord {
    pub timestamp: NaiveDateTime,
    pub current_temperature: Reading,
    pub current_wind: Reading,
    pub current_provenance: Provenance,
    pub tomorrow_temperature: Reading,
    pub tomorrow_wind: Reading,
    pub tomorrow_provenance: Provenance,
}

impl LogRecord {
    /// One tab-separated line in header column order, newline terminated.
    ///
    /// Provenance is not part of the line: the file keeps its eight columns.
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\n",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.current_temperature.with_unit("°C"),
            self.current_wind.with_unit("km/h"),
            self.tomorrow_temperature.with_unit("°C"),
            self.tomorrow_wind.with_unit("km/h"),
        )
    }
}
