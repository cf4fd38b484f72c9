//! ## pwrlvl-telemetry::logging
//! **Structured logging with `tracing`**
//!
//! Installs the global subscriber once at startup. `RUST_LOG` wins over the configured level.

use pwrlvl_config::TelemetryConfig;
use tracing::info_span;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone, Debug)]
pub struct EventLogger;

impl EventLogger {
    /// Install the global subscriber. Later calls are ignored.
    pub fn init(config: &TelemetryConfig) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

        let builder = fmt().with_env_filter(filter).with_thread_names(true);
        let result = if config.json {
            builder.json().try_init()
        } else {
            builder.try_init()
        };

        if result.is_err() {
            tracing::debug!("tracing subscriber already installed");
        }
    }

    /// Record an operator-level audit line for a control action (start/stop/shutdown).
    pub fn log_action(action: &str, operation: &str, outcome: &str) {
        let span = info_span!("control_action", action, operation);
        let _guard = span.enter();
        tracing::info!(outcome, "Control action handled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_logging() {
        EventLogger::log_action("start", "scan", "accepted");
        assert!(logs_contain("Control action handled"));
        assert!(logs_contain("accepted"));
    }

    // init_twice_is_harmless lives in tests/logging_init.rs: it installs the
    // global subscriber, which would collide with #[traced_test] in this binary.
}
