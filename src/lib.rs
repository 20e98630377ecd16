//! # AgriRover Link Library
//!
//! Real-time streaming core behind the AgriRover dashboard.
//!
//! This library keeps a live connection to the rover's sensor feed, decodes
//! and retains readings, and relays user prompts (enriched with the latest
//! telemetry) to an assistant backend whose streamed answer is reassembled
//! into a conversation transcript.

pub mod assistant;
pub mod config;
pub mod error;
pub mod logging;
pub mod telemetry;
pub mod transport;
