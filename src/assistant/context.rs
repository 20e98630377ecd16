//! # Telemetry Context Injector
//!
//! Builds the instructional payload sent to the assistant backend from the
//! user's prompt and the latest cached reading.
//!
//! Readings are rendered as labelled prose lines, never as the raw wire or
//! serialized form. Absent values render as [`NO_DATA`].

use std::fmt::{self, Write};

use crate::telemetry::reading::{Metric, Reading};

/// Marker for values the sensors did not report
pub const NO_DATA: &str = "no data";

/// Default assistant persona line
pub const DEFAULT_PERSONA: &str = "You are AgriRobot, a smart assistant for agriculture.";

/// Merges telemetry context into outgoing prompts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextInjector {
    persona: String,
}

impl ContextInjector {
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
        }
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    /// Build the payload for one prompt
    ///
    /// Pure and deterministic: the same prompt and reading always produce the
    /// same text.
    ///
    /// # Examples
    ///
    /// ```
    /// use agri_rover_link::assistant::context::ContextInjector;
    ///
    /// let payload = ContextInjector::default().build_payload("status?", None);
    /// assert!(payload.contains("status?"));
    /// assert!(payload.contains("no data"));
    /// ```
    pub fn build_payload(&self, prompt: &str, latest: Option<&Reading>) -> String {
        let mut payload = String::new();
        match self.write_payload(&mut payload, prompt, latest) {
            Ok(()) => payload,
            // Formatting into a String only fails if a Display impl does
            Err(fmt::Error) => format!("{}\n\nUser asked:\n{}", self.persona.trim(), prompt),
        }
    }

    fn write_payload(
        &self,
        out: &mut impl Write,
        prompt: &str,
        latest: Option<&Reading>,
    ) -> fmt::Result {
        writeln!(out, "{}", self.persona.trim())?;
        writeln!(
            out,
            "Use the following real-time sensor data to help the user, but do not show it to them directly."
        )?;
        writeln!(out)?;
        writeln!(out, "Sensor data:")?;

        for metric in Metric::ALL {
            let value = latest.and_then(|r| r.value(metric));
            writeln!(out, "- {}: {}", label(metric), render_value(value, metric.unit()))?;
        }

        let rain = latest.map(|r| r.rain_prediction.to_string());
        writeln!(out, "- Rain prediction: {}", rain.as_deref().unwrap_or(NO_DATA))?;

        let irrigation = latest
            .and_then(|r| r.irrigation_advice())
            .map(|advice| advice.to_string());
        writeln!(out, "- Irrigation: {}", irrigation.as_deref().unwrap_or(NO_DATA))?;

        let observed = latest.map(|r| r.observed_at.format("%Y-%m-%d %H:%M:%S UTC").to_string());
        writeln!(out, "- Observed at: {}", observed.as_deref().unwrap_or(NO_DATA))?;

        writeln!(out)?;
        writeln!(out, "User asked:")?;
        write!(out, "{}", prompt)
    }
}

impl Default for ContextInjector {
    fn default() -> Self {
        Self::new(DEFAULT_PERSONA)
    }
}

fn label(metric: Metric) -> &'static str {
    match metric {
        Metric::Temperature => "Temperature",
        Metric::Humidity => "Humidity",
        Metric::AirQuality => "Air quality index",
        Metric::SoilMoisture => "Soil moisture",
        Metric::ObstacleDistance => "Obstacle distance",
    }
}

fn render_value(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) if v.is_finite() => {
            if unit.is_empty() {
                format!("{}", v)
            } else {
                format!("{} {}", v, unit)
            }
        }
        _ => NO_DATA.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::decoder::decode_at;
    use chrono::{TimeZone, Utc};

    fn reading_from(raw: &str) -> Reading {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap();
        decode_at(raw.as_bytes(), at).unwrap()
    }

    #[test]
    fn test_payload_contains_prompt_and_moisture() {
        let raw = r#"{"moisture": 20}"#;
        let reading = reading_from(raw);
        let payload = ContextInjector::default().build_payload("status?", Some(&reading));

        assert!(payload.contains("status?"));
        assert!(payload.contains("- Soil moisture: 20 %"));
        // Not the raw frame, not the serialized reading
        assert!(!payload.contains(raw));
        assert!(!payload.contains(&serde_json::to_string(&reading).unwrap()));
        assert!(!payload.contains('{'));
    }

    #[test]
    fn test_absent_fields_render_as_no_data() {
        let reading = reading_from(r#"{"moisture": 20}"#);
        let payload = ContextInjector::default().build_payload("hi", Some(&reading));

        assert!(payload.contains("- Temperature: no data"));
        assert!(payload.contains("- Humidity: no data"));
        assert!(payload.contains("- Obstacle distance: no data"));
        assert!(!payload.contains("NaN"));
        assert!(!payload.contains("Temperature: 0"));
    }

    #[test]
    fn test_no_reading_yet() {
        let payload = ContextInjector::default().build_payload("hello", None);
        assert!(payload.contains("- Rain prediction: no data"));
        assert!(payload.contains("- Irrigation: no data"));
        assert!(payload.contains("- Observed at: no data"));
        assert!(payload.ends_with("User asked:\nhello"));
    }

    #[test]
    fn test_derived_signals_included() {
        let reading = reading_from(r#"{"temperature": 18, "humidity": 85, "moisture": 25}"#);
        let payload = ContextInjector::default().build_payload("water?", Some(&reading));
        assert!(payload.contains("- Rain prediction: rain is likely"));
        assert!(payload.contains("- Irrigation: soil is dry, irrigate now"));
        assert!(payload.contains("- Temperature: 18 °C"));
        assert!(payload.contains("- Observed at: 2025-06-01 08:30:00 UTC"));
    }

    #[test]
    fn test_prompt_is_verbatim() {
        let prompt = "  multi\nline   prompt ";
        let payload = ContextInjector::default().build_payload(prompt, None);
        assert!(payload.ends_with(prompt));
    }

    #[test]
    fn test_deterministic() {
        let reading = reading_from(r#"{"temperature": 21.5, "airQuality": 33}"#);
        let injector = ContextInjector::new("You are a test persona.");
        let a = injector.build_payload("q", Some(&reading));
        let b = injector.build_payload("q", Some(&reading));
        assert_eq!(a, b);
        assert!(a.starts_with("You are a test persona.\n"));
        assert!(a.contains("- Air quality index: 33\n"));
    }

    #[test]
    fn test_non_finite_renders_as_no_data() {
        assert_eq!(render_value(Some(f64::NAN), "%"), NO_DATA);
        assert_eq!(render_value(Some(f64::INFINITY), ""), NO_DATA);
        assert_eq!(render_value(Some(12.5), "cm"), "12.5 cm");
    }
}
