//! Subset of the wttr.in `j1` response used by the logger.
//!
//! Every section is optional: wttr.in drops forecast days or hourly samples
//! now and then, and the extractor decides what to do with the gaps.

use serde::Deserialize;
use serde_json::Value;

use crate::error::FormatError;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WeatherPayload {
    #[serde(default)]
    pub current_condition: Vec<CurrentCondition>,
    /// Forecast days, today first.
    #[serde(default)]
    pub weather: Vec<ForecastDay>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CurrentCondition {
    #[serde(rename = "temp_C")]
    pub temp_c: Option<Value>,
    #[serde(rename = "windspeedKmph")]
    pub windspeed_kmph: Option<Value>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ForecastDay {
    #[serde(default)]
    pub hourly: Vec<HourlySample>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct HourlySample {
    #[serde(rename = "tempC")]
    pub temp_c: Option<Value>,
    #[serde(rename = "windspeedKmph")]
    pub windspeed_kmph: Option<Value>,
}

impl WeatherPayload {
    pub fn current(&self) -> Option<&CurrentCondition> {
        self.current_condition.first()
    }
}

/// Read a payload field as numeric text.
///
/// `Ok(None)` means the field is absent or null. wttr.in sends numbers as
/// strings, so both forms are accepted; the text is kept as sent once it
/// parses as a finite number.
pub fn numeric(field: &'static str, value: Option<&Value>) -> Result<Option<String>, FormatError> {
    let not_numeric = |v: &Value| FormatError::NotNumeric {
        field,
        value: v.to_string(),
    };

    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(v @ Value::String(s)) => match s.trim() {
            "" => Ok(None),
            trimmed if trimmed.parse::<f64>().is_ok_and(f64::is_finite) => {
                Ok(Some(trimmed.to_string()))
            }
            _ => Err(not_numeric(v)),
        },
        Some(v) => Err(not_numeric(v)),
    }
}
