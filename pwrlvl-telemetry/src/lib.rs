//! # pwrlvl Telemetry
//!
//! Crate for operator-facing logging and metrics. User-facing progress goes through the
//! event bus in `pwrlvl-core`; this crate only covers diagnostics.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::{MetricsError, MetricsRecorder};
