//! # Telemetry Reading Types
//!
//! Normalized sensor sample and the signals derived from it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Humidity (%) above which rain is likely when it is also cool
pub const RAIN_LIKELY_HUMIDITY: f64 = 80.0;

/// Temperature (°C) below which high humidity means rain is likely
pub const RAIN_LIKELY_TEMPERATURE: f64 = 20.0;

/// Humidity (%) above which there is a chance of rain
pub const RAIN_CHANCE_HUMIDITY: f64 = 60.0;

/// Temperature (°C) below which moderate humidity means a chance of rain
pub const RAIN_CHANCE_TEMPERATURE: f64 = 30.0;

/// Soil moisture (%) below which the soil counts as dry
pub const SOIL_DRY_MOISTURE: f64 = 30.0;

/// Soil moisture (%) below which light irrigation is recommended
pub const SOIL_LOW_MOISTURE: f64 = 50.0;

/// Soil moisture (%) above which the soil counts as waterlogged
pub const SOIL_WET_MOISTURE: f64 = 80.0;

/// Temperature (°C) above which dry-ish soil is under heat stress
pub const HEAT_STRESS_TEMPERATURE: f64 = 35.0;

/// Rain likelihood derived from temperature and humidity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RainPrediction {
    Likely,
    Chance,
    Unlikely,
}

impl RainPrediction {
    /// Derive the rain prediction from temperature (°C) and humidity (%)
    ///
    /// Absent values mean "no data" and fall through to [`RainPrediction::Unlikely`].
    ///
    /// # Examples
    ///
    /// ```
    /// use agri_rover_link::telemetry::reading::RainPrediction;
    ///
    /// assert_eq!(RainPrediction::derive(Some(18.0), Some(85.0)), RainPrediction::Likely);
    /// assert_eq!(RainPrediction::derive(Some(28.0), Some(65.0)), RainPrediction::Chance);
    /// assert_eq!(RainPrediction::derive(None, Some(95.0)), RainPrediction::Unlikely);
    /// ```
    pub fn derive(temperature: Option<f64>, humidity: Option<f64>) -> Self {
        let (t, h) = match (temperature, humidity) {
            (Some(t), Some(h)) => (t, h),
            _ => return RainPrediction::Unlikely,
        };

        if h > RAIN_LIKELY_HUMIDITY && t < RAIN_LIKELY_TEMPERATURE {
            RainPrediction::Likely
        } else if h > RAIN_CHANCE_HUMIDITY && t < RAIN_CHANCE_TEMPERATURE {
            RainPrediction::Chance
        } else {
            RainPrediction::Unlikely
        }
    }
}

impl fmt::Display for RainPrediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RainPrediction::Likely => "rain is likely",
            RainPrediction::Chance => "chance of rain",
            RainPrediction::Unlikely => "no rain expected",
        };
        f.write_str(text)
    }
}

/// Irrigation recommendation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IrrigationLevel {
    /// Soil is dry
    IrrigateNow,
    /// Soil is on the dry side
    LightIrrigation,
    /// Soil moisture is fine
    Adequate,
    /// Soil is waterlogged
    TooWet,
}

/// Irrigation advice derived from soil moisture and temperature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IrrigationAdvice {
    pub level: IrrigationLevel,
    /// Hot weather on soil that is not well watered
    pub heat_stress: bool,
}

impl fmt::Display for IrrigationAdvice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self.level {
            IrrigationLevel::IrrigateNow => "soil is dry, irrigate now",
            IrrigationLevel::LightIrrigation => "light irrigation recommended",
            IrrigationLevel::Adequate => "soil moisture is fine",
            IrrigationLevel::TooWet => "too wet, hold off on irrigation",
        };
        f.write_str(text)?;
        if self.heat_stress {
            f.write_str(" (high temperature, consider more watering)")?;
        }
        Ok(())
    }
}

/// Numeric channels carried by a [`Reading`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Temperature,
    Humidity,
    AirQuality,
    SoilMoisture,
    ObstacleDistance,
}

impl Metric {
    /// All metrics, in display order
    pub const ALL: [Metric; 5] = [
        Metric::Temperature,
        Metric::Humidity,
        Metric::AirQuality,
        Metric::SoilMoisture,
        Metric::ObstacleDistance,
    ];

    /// Unit suffix, empty for unitless metrics
    pub fn unit(&self) -> &'static str {
        match self {
            Metric::Temperature => "°C",
            Metric::Humidity | Metric::SoilMoisture => "%",
            Metric::AirQuality => "",
            Metric::ObstacleDistance => "cm",
        }
    }
}

/// Normalized telemetry sample
///
/// Absent numeric fields stay `None`; they are never coerced to zero.
/// `rain_prediction` is always computed locally at decode time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    /// Temperature in °C
    pub temperature: Option<f64>,

    /// Relative humidity in %
    pub humidity: Option<f64>,

    /// Air quality index (unitless)
    pub air_quality: Option<f64>,

    /// Soil moisture in %
    pub soil_moisture: Option<f64>,

    /// Distance to the nearest obstacle in cm
    pub obstacle_distance: Option<f64>,

    /// Derived rain likelihood
    pub rain_prediction: RainPrediction,

    /// When the frame was decoded
    pub observed_at: DateTime<Utc>,
}

impl Reading {
    /// Value of one metric, `None` if the frame did not carry it
    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::AirQuality => self.air_quality,
            Metric::SoilMoisture => self.soil_moisture,
            Metric::ObstacleDistance => self.obstacle_distance,
        }
    }

    /// Irrigation advice, or `None` when soil moisture is unknown
    ///
    /// Heat stress is only flagged when temperature is known.
    pub fn irrigation_advice(&self) -> Option<IrrigationAdvice> {
        let moisture = self.soil_moisture?;

        let level = if moisture < SOIL_DRY_MOISTURE {
            IrrigationLevel::IrrigateNow
        } else if moisture < SOIL_LOW_MOISTURE {
            IrrigationLevel::LightIrrigation
        } else if moisture > SOIL_WET_MOISTURE {
            IrrigationLevel::TooWet
        } else {
            IrrigationLevel::Adequate
        };

        let heat_stress = self
            .temperature
            .map_or(false, |t| t > HEAT_STRESS_TEMPERATURE && moisture < SOIL_LOW_MOISTURE);

        Some(IrrigationAdvice { level, heat_stress })
    }
}
