use chrono::NaiveDateTime;
use serde_json::Value;

use crate::payload::{numeric, WeatherPayload};
use crate::record::{LogRecord, Provenance, Reading};

/// Hourly sample used as tomorrow's representative reading (mid-day in the
/// 3-hourly `j1` layout).
const TOMORROW_SAMPLE: usize = 4;

/// Build a log record from a payload. Never fails: anything missing or
/// unreadable becomes `Reading::Unavailable`.
pub fn extract(payload: &WeatherPayload, at: NaiveDateTime) -> LogRecord {
    let (current_temperature, current_wind, current_provenance) = match payload.current() {
        Some(current) => (
            reading("temp_C", current.temp_c.as_ref()),
            reading("windspeedKmph", current.windspeed_kmph.as_ref()),
            Provenance::Observed,
        ),
        None => (Reading::Unavailable, Reading::Unavailable, Provenance::Unavailable),
    };

    let (tomorrow_temperature, tomorrow_wind, tomorrow_provenance) = tomorrow(payload);

    LogRecord {
        timestamp: at,
        current_temperature,
        current_wind,
        current_provenance,
        tomorrow_temperature,
        tomorrow_wind,
        tomorrow_provenance,
    }
}

fn tomorrow(payload: &WeatherPayload) -> (Reading, Reading, Provenance) {
    let forecast = &payload.weather;

    if let Some(sample) = forecast
        .get(1)
        .and_then(|day| day.hourly.get(TOMORROW_SAMPLE))
    {
        return (
            reading("tempC", sample.temp_c.as_ref()),
            reading("windspeedKmph", sample.windspeed_kmph.as_ref()),
            Provenance::Forecast,
        );
    }

    if let Some(sample) = forecast.first().and_then(|day| day.hourly.last()) {
        log::warn!("Tomorrow's forecast unavailable. Using today's late data.");
        return (
            reading("tempC", sample.temp_c.as_ref()),
            reading("windspeedKmph", sample.windspeed_kmph.as_ref()),
            Provenance::DegradedFallback,
        );
    }

    (Reading::Unavailable, Reading::Unavailable, Provenance::Unavailable)
}

fn reading(field: &'static str, value: Option<&Value>) -> Reading {
    match numeric(field, value) {
        Ok(value) => value.into(),
        Err(e) => {
            log::debug!("Ignoring unreadable payload field: {}", e);
            Reading::Unavailable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::cell::RefCell;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(5, 0, 0)
            .unwrap()
    }

    fn hours(samples: &[(&str, &str)]) -> serde_json::Value {
        samples
            .iter()
            .map(|(t, w)| json!({"tempC": t, "windspeedKmph": w}))
            .collect()
    }

    fn payload(value: serde_json::Value) -> WeatherPayload {
        serde_json::from_value(value).unwrap()
    }

    fn text(value: &str) -> Reading {
        Reading::Value(value.to_string())
    }

    thread_local! {
        static WARNINGS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    }

    /// Keeps warnings emitted on the current test thread.
    struct WarningCapture;

    impl log::Log for WarningCapture {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            metadata.level() <= log::Level::Warn
        }

        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                WARNINGS.with(|w| w.borrow_mut().push(record.args().to_string()));
            }
        }

        fn flush(&self) {}
    }

    static CAPTURE: WarningCapture = WarningCapture;

    fn capture_warnings<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
        // Fails harmlessly if another test installed it first.
        let _ = log::set_logger(&CAPTURE);
        log::set_max_level(log::LevelFilter::Warn);
        WARNINGS.with(|w| w.borrow_mut().clear());
        let result = f();
        (result, WARNINGS.with(|w| w.take()))
    }

    #[test]
    fn test_complete_forecast_uses_tomorrow_sample() {
        let p = payload(json!({
            "current_condition": [{"temp_C": "27", "windspeedKmph": "10"}],
            "weather": [
                {"hourly": hours(&[("20", "1"), ("21", "2"), ("22", "3"), ("23", "4")])},
                {"hourly": hours(&[
                    ("18", "5"), ("19", "6"), ("21", "7"), ("23", "7"), ("24", "8"), ("22", "9")
                ])}
            ]
        }));
        let (record, warnings) = capture_warnings(|| extract(&p, at()));

        assert!(warnings.is_empty());
        assert_eq!(record.current_temperature, text("27"));
        assert_eq!(record.current_wind, text("10"));
        assert_eq!(record.current_provenance, Provenance::Observed);
        assert_eq!(record.tomorrow_temperature, text("24"));
        assert_eq!(record.tomorrow_wind, text("8"));
        assert_eq!(record.tomorrow_provenance, Provenance::Forecast);
        assert_eq!(record.timestamp, at());
    }

    #[test]
    fn test_single_day_falls_back_to_last_sample() {
        let p = payload(json!({
            "current_condition": [{"temp_C": "27", "windspeedKmph": "10"}],
            "weather": [
                {"hourly": hours(&[("20", "1"), ("21", "2"), ("26", "11")])}
            ]
        }));
        let (record, warnings) = capture_warnings(|| extract(&p, at()));

        assert_eq!(
            warnings,
            vec!["Tomorrow's forecast unavailable. Using today's late data.".to_string()]
        );
        assert_eq!(record.tomorrow_temperature, text("26"));
        assert_eq!(record.tomorrow_wind, text("11"));
        assert_eq!(record.tomorrow_provenance, Provenance::DegradedFallback);
    }

    #[test]
    fn test_short_tomorrow_falls_back_to_today() {
        let p = payload(json!({
            "weather": [
                {"hourly": hours(&[("20", "1"), ("25", "3")])},
                {"hourly": hours(&[("18", "5"), ("19", "6"), ("21", "7"), ("23", "7")])}
            ]
        }));
        let (record, warnings) = capture_warnings(|| extract(&p, at()));

        assert_eq!(warnings.len(), 1);
        assert_eq!(record.tomorrow_temperature, text("25"));
        assert_eq!(record.tomorrow_wind, text("3"));
        assert_eq!(record.tomorrow_provenance, Provenance::DegradedFallback);
    }

    #[test]
    fn test_no_forecast_is_unavailable() {
        let current = json!([{"temp_C": "30", "windspeedKmph": "14"}]);
        for weather in [json!([]), json!([{}]), json!([{"hourly": []}, {"hourly": []}])] {
            let p = payload(json!({"current_condition": current, "weather": weather}));
            let record = extract(&p, at());

            assert_eq!(record.tomorrow_temperature, Reading::Unavailable);
            assert_eq!(record.tomorrow_wind, Reading::Unavailable);
            assert_eq!(record.tomorrow_provenance, Provenance::Unavailable);
            assert_eq!(record.current_temperature, text("30"));
            assert_eq!(record.current_wind, text("14"));
        }
    }

    #[test]
    fn test_missing_current_conditions() {
        let record = extract(&payload(json!({})), at());

        assert_eq!(record.current_temperature, Reading::Unavailable);
        assert_eq!(record.current_wind, Reading::Unavailable);
        assert_eq!(record.current_provenance, Provenance::Unavailable);
        assert_eq!(record.tomorrow_provenance, Provenance::Unavailable);
    }

    #[test]
    fn test_verbatim_values() {
        let p = payload(json!({
            "current_condition": [{"temp_C": "27.0", "windspeedKmph": "010"}]
        }));
        let record = extract(&p, at());

        assert_eq!(
            record.to_line(),
            "2024\tMay\t01\t05:00:00\t27.0°C\t010km/h\tN/A°C\tN/Akm/h\n"
        );
    }

    #[test]
    fn test_unreadable_fields_become_unavailable() {
        let p = payload(json!({
            "current_condition": [{"temp_C": "hot", "windspeedKmph": 12}],
            "weather": [{}, {"hourly": [{}, {}, {}, {}, {"tempC": "24"}]}]
        }));
        let record = extract(&p, at());

        assert_eq!(record.current_temperature, Reading::Unavailable);
        assert_eq!(record.current_wind, text("12"));
        assert_eq!(record.tomorrow_temperature, text("24"));
        assert_eq!(record.tomorrow_wind, Reading::Unavailable);
        assert_eq!(record.tomorrow_provenance, Provenance::Forecast);
    }
}
