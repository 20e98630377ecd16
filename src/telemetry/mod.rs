//! # Telemetry Module
//!
//! Live sensor feed handling.
//!
//! This module handles:
//! - Decoding JSON sensor frames into typed readings
//! - Deriving rain prediction and irrigation advice
//! - Retaining a bounded rolling history for charts
//! - Running the feed connection and restarting it per policy

pub mod decoder;
pub mod history;
pub mod reading;
pub mod reconnect;
pub mod session;

pub use history::HistoryBuffer;
pub use reading::{Metric, RainPrediction, Reading};
pub use session::{SessionOutcome, SessionState, TelemetryHandle, TelemetrySession, TelemetryStore};
