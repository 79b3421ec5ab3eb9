//! # bustap telemetry
//!
//! Logging setup and capture counters.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::MetricsRecorder;
