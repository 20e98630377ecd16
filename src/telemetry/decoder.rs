//! # Telemetry Frame Decoder
//!
//! Decodes one text-encoded sensor frame into a [`Reading`].

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::reading::{RainPrediction, Reading};
use crate::error::DecodeError;

/// Wire layout of a sensor frame
///
/// Every field is optional. Firmware aliases are accepted next to the
/// canonical names; unknown keys (including any `rainPrediction`) are ignored.
#[derive(Debug, Default, Deserialize)]
struct WireFrame {
    temperature: Option<f64>,

    humidity: Option<f64>,

    #[serde(alias = "airQuality")]
    air_quality: Option<f64>,

    #[serde(alias = "soilMoisture", alias = "moisture")]
    soil_moisture: Option<f64>,

    #[serde(alias = "obstacleDistance", alias = "distance")]
    obstacle_distance: Option<f64>,
}

/// Decode a telemetry frame, timestamped now
///
/// # Arguments
///
/// * `raw` - Frame payload as received from the telemetry connection
///
/// # Returns
///
/// * `Result<Reading, DecodeError>` - Normalized reading, or error if invalid
///
/// # Errors
///
/// Returns [`DecodeError::Malformed`] if:
/// - The payload is not a JSON object
/// - A known field carries a non-numeric value
///
/// # Examples
///
/// ```
/// use agri_rover_link::telemetry::decoder::decode;
/// use agri_rover_link::telemetry::reading::RainPrediction;
///
/// let reading = decode(br#"{"temperature": 18, "humidity": 85}"#).unwrap();
/// assert_eq!(reading.rain_prediction, RainPrediction::Likely);
/// assert_eq!(reading.soil_moisture, None);
/// ```
pub fn decode(raw: &[u8]) -> Result<Reading, DecodeError> {
    decode_at(raw, Utc::now())
}

/// Decode a telemetry frame with an explicit observation time
pub fn decode_at(raw: &[u8], observed_at: DateTime<Utc>) -> Result<Reading, DecodeError> {
    let value: serde_json::Value =
        serde_json::from_slice(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    // Derived struct deserializers also accept sequences; frames are keyed only
    if !value.is_object() {
        return Err(DecodeError::Malformed(format!(
            "expected a JSON object, got {}",
            json_kind(&value)
        )));
    }

    let frame =
        WireFrame::deserialize(value).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    Ok(Reading {
        temperature: frame.temperature,
        humidity: frame.humidity,
        air_quality: frame.air_quality,
        soil_moisture: frame.soil_moisture,
        obstacle_distance: frame.obstacle_distance,
        rain_prediction: RainPrediction::derive(frame.temperature, frame.humidity),
        observed_at,
    })
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
